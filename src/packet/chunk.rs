use super::{Packet, WireReader};
use crate::error::ProtocolError;
use crate::protocol::CHUNK_MIN_SIZE;

/// One data frame: `seq (u32) | data_len (u64) | data`.
///
/// Decoding only enforces a minimum; bytes past `data_len` are padding and
/// are dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub sequence_number: u32,
    pub data: Vec<u8>,
}

impl Chunk {
    pub fn new(sequence_number: u32, data: Vec<u8>) -> Self {
        Self {
            sequence_number,
            data,
        }
    }

    pub fn data_length(&self) -> u64 {
        self.data.len() as u64
    }

    /// Length of the serialized frame before any padding.
    pub fn encoded_len(&self) -> usize {
        CHUNK_MIN_SIZE + self.data.len()
    }
}

impl Packet for Chunk {
    const KIND: &'static str = "chunk";

    fn serialize(&self) -> Result<Vec<u8>, ProtocolError> {
        let mut buf = Vec::with_capacity(self.encoded_len());
        buf.extend_from_slice(&self.sequence_number.to_be_bytes());
        buf.extend_from_slice(&self.data_length().to_be_bytes());
        buf.extend_from_slice(&self.data);
        Ok(buf)
    }

    fn deserialize(data: &[u8]) -> Result<Self, ProtocolError> {
        if data.len() < CHUNK_MIN_SIZE {
            return Err(ProtocolError::InvalidChunkSize {
                needed: CHUNK_MIN_SIZE as u64,
                available: data.len(),
            });
        }

        let mut r = WireReader::new(data);
        let sequence_number = r.u32()?;
        let data_length = r.u64()?;

        if data_length > r.remaining() as u64 {
            return Err(ProtocolError::InvalidChunkSize {
                needed: data_length.saturating_add(CHUNK_MIN_SIZE as u64),
                available: data.len(),
            });
        }
        let payload = r.take(data_length as usize)?;

        Ok(Self {
            sequence_number,
            data: payload.to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_round_trip() {
        let chunk = Chunk::new(2, vec![1, 2]);
        let buf = chunk.serialize().unwrap();
        assert_eq!(buf, vec![0, 0, 0, 2, 0, 0, 0, 0, 0, 0, 0, 2, 1, 2]);
        assert_eq!(Chunk::deserialize(&buf).unwrap(), chunk);
    }

    #[test]
    fn test_empty_chunk() {
        let chunk = Chunk::new(7, Vec::new());
        let buf = chunk.serialize().unwrap();
        assert_eq!(buf.len(), CHUNK_MIN_SIZE);
        assert_eq!(Chunk::deserialize(&buf).unwrap(), chunk);
    }

    #[test]
    fn test_padding_is_ignored() {
        let chunk = Chunk::new(1, vec![0xAB; 5]);
        let mut buf = chunk.serialize().unwrap();
        buf.resize(64, 0);
        assert_eq!(Chunk::deserialize(&buf).unwrap(), chunk);
    }

    #[test]
    fn test_short_frame_rejected() {
        for len in 0..CHUNK_MIN_SIZE {
            let err = Chunk::deserialize(&vec![0u8; len]).unwrap_err();
            assert!(matches!(err, ProtocolError::InvalidChunkSize { .. }), "len {}", len);
        }
    }

    #[test]
    fn test_declared_length_past_buffer_rejected() {
        let mut buf = Chunk::new(0, vec![1, 2, 3]).serialize().unwrap();
        buf.truncate(CHUNK_MIN_SIZE + 2);
        let err = Chunk::deserialize(&buf).unwrap_err();
        assert_eq!(
            err,
            ProtocolError::InvalidChunkSize {
                needed: 15,
                available: 14
            }
        );

        // A hostile length must not overflow or allocate
        let mut huge = vec![0u8; CHUNK_MIN_SIZE];
        huge[4..12].copy_from_slice(&u64::MAX.to_be_bytes());
        assert!(matches!(
            Chunk::deserialize(&huge),
            Err(ProtocolError::InvalidChunkSize { .. })
        ));
    }
}
