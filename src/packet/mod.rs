//! Wire packets. Every integer is fixed-width big-endian.
//!
//! Four record types make up the protocol: one [`TransferHeader`] per
//! connection, one [`DirHeader`] per directory entry, one [`FileHeader`] per
//! file and `chunk_count` [`Chunk`]s per file. Each is acknowledged with a
//! single byte (see [`crate::protocol::ACK`]).

mod chunk;
mod dir_header;
mod file_header;
mod transfer_header;

pub use chunk::Chunk;
pub use dir_header::DirHeader;
pub use file_header::FileHeader;
pub use transfer_header::TransferHeader;

use crate::error::ProtocolError;

/// Serialize/deserialize capability shared by all four packet types.
pub trait Packet: Sized {
    /// Short name used in log lines.
    const KIND: &'static str;

    fn serialize(&self) -> Result<Vec<u8>, ProtocolError>;
    fn deserialize(data: &[u8]) -> Result<Self, ProtocolError>;
}

/// The closed set of frames that can travel from sender to receiver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Transfer(TransferHeader),
    Dir(DirHeader),
    File(FileHeader),
    Chunk(Chunk),
}

impl Frame {
    pub fn kind(&self) -> &'static str {
        match self {
            Frame::Transfer(_) => TransferHeader::KIND,
            Frame::Dir(_) => DirHeader::KIND,
            Frame::File(_) => FileHeader::KIND,
            Frame::Chunk(_) => Chunk::KIND,
        }
    }

    pub fn serialize(&self) -> Result<Vec<u8>, ProtocolError> {
        match self {
            Frame::Transfer(h) => h.serialize(),
            Frame::Dir(h) => h.serialize(),
            Frame::File(h) => h.serialize(),
            Frame::Chunk(c) => c.serialize(),
        }
    }
}

impl From<TransferHeader> for Frame {
    fn from(h: TransferHeader) -> Self {
        Frame::Transfer(h)
    }
}

impl From<DirHeader> for Frame {
    fn from(h: DirHeader) -> Self {
        Frame::Dir(h)
    }
}

impl From<FileHeader> for Frame {
    fn from(h: FileHeader) -> Self {
        Frame::File(h)
    }
}

impl From<Chunk> for Frame {
    fn from(c: Chunk) -> Self {
        Frame::Chunk(c)
    }
}

/// Bounds-checked big-endian cursor over a received frame.
pub(crate) struct WireReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> WireReader<'a> {
    pub(crate) fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub(crate) fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub(crate) fn take(&mut self, n: usize) -> Result<&'a [u8], ProtocolError> {
        if self.remaining() < n {
            return Err(ProtocolError::Truncated {
                offset: self.pos,
                needed: n,
                available: self.remaining(),
            });
        }
        let out = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], ProtocolError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    pub(crate) fn u8(&mut self) -> Result<u8, ProtocolError> {
        Ok(self.take(1)?[0])
    }

    pub(crate) fn u16(&mut self) -> Result<u16, ProtocolError> {
        Ok(u16::from_be_bytes(self.array()?))
    }

    pub(crate) fn u32(&mut self) -> Result<u32, ProtocolError> {
        Ok(u32::from_be_bytes(self.array()?))
    }

    pub(crate) fn u64(&mut self) -> Result<u64, ProtocolError> {
        Ok(u64::from_be_bytes(self.array()?))
    }
}

/// Rejects a frame whose total length falls outside `[min, max]`.
pub(crate) fn check_size(len: usize, min: usize, max: usize) -> Result<(), ProtocolError> {
    if len < min || len > max {
        return Err(ProtocolError::InvalidHeaderSize { len, min, max });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reader_truncation_reports_offset() {
        let mut r = WireReader::new(&[0, 1, 2]);
        assert_eq!(r.u16().unwrap(), 1);
        let err = r.u32().unwrap_err();
        assert_eq!(
            err,
            ProtocolError::Truncated {
                offset: 2,
                needed: 4,
                available: 1
            }
        );
    }

    #[test]
    fn test_frame_dispatch() {
        let frame: Frame = DirHeader { file_count: 3 }.into();
        assert_eq!(frame.kind(), "dir header");
        assert_eq!(frame.serialize().unwrap(), vec![0, 0, 0, 3]);

        let frame: Frame = Chunk::new(0, vec![9]).into();
        assert_eq!(frame.kind(), "chunk");
        assert_eq!(frame.serialize().unwrap().len(), 13);
    }
}
