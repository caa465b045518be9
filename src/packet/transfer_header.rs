use super::{check_size, Packet, WireReader};
use crate::bitmap;
use crate::error::ProtocolError;
use crate::protocol::{MAX_ENTRY_COUNT, TRANSFER_HEADER_MAX_SIZE, TRANSFER_HEADER_MIN_SIZE};

/// Session announcement: `version (u8) | entry_count (u16) | is_dir bitmap`.
///
/// `is_directory[i]` tells the receiver whether entry `i` opens with a
/// DirHeader or a FileHeader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferHeader {
    pub version: u8,
    pub is_directory: Vec<bool>,
}

impl TransferHeader {
    pub fn new(version: u8, is_directory: Vec<bool>) -> Self {
        Self {
            version,
            is_directory,
        }
    }

    pub fn entry_count(&self) -> usize {
        self.is_directory.len()
    }

    pub fn check_version(&self, expected: u8) -> Result<(), ProtocolError> {
        if self.version != expected {
            return Err(ProtocolError::VersionMismatch {
                got: self.version,
                expected,
            });
        }
        Ok(())
    }
}

impl Packet for TransferHeader {
    const KIND: &'static str = "transfer header";

    fn serialize(&self) -> Result<Vec<u8>, ProtocolError> {
        let count = self.entry_count();
        if count > MAX_ENTRY_COUNT {
            return Err(ProtocolError::TooManyEntries {
                count,
                max: MAX_ENTRY_COUNT,
            });
        }

        let flags = bitmap::encode(&self.is_directory);
        let mut buf = Vec::with_capacity(TRANSFER_HEADER_MIN_SIZE + flags.len());
        buf.push(self.version);
        buf.extend_from_slice(&(count as u16).to_be_bytes());
        buf.extend_from_slice(&flags);
        Ok(buf)
    }

    fn deserialize(data: &[u8]) -> Result<Self, ProtocolError> {
        check_size(data.len(), TRANSFER_HEADER_MIN_SIZE, TRANSFER_HEADER_MAX_SIZE)?;

        let mut r = WireReader::new(data);
        let version = r.u8()?;
        let count = r.u16()? as usize;
        let packed = r.take(bitmap::packed_len(count))?;
        if r.remaining() != 0 {
            return Err(ProtocolError::InvalidHeaderSize {
                len: data.len(),
                min: TRANSFER_HEADER_MIN_SIZE,
                max: TRANSFER_HEADER_MIN_SIZE + packed.len(),
            });
        }

        let is_directory = bitmap::decode(packed, count)?;
        Ok(Self {
            version,
            is_directory,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transfer_header_round_trip() {
        let header = TransferHeader::new(1, vec![true, false, false, true, true, false, true, false, true]);
        let buf = header.serialize().unwrap();
        assert_eq!(buf, vec![1, 0, 9, 0b1001_1010, 0b1000_0000]);
        assert_eq!(TransferHeader::deserialize(&buf).unwrap(), header);
    }

    #[test]
    fn test_empty_transfer() {
        let header = TransferHeader::new(1, Vec::new());
        let buf = header.serialize().unwrap();
        assert_eq!(buf, vec![1, 0, 0]);
        assert_eq!(TransferHeader::deserialize(&buf).unwrap(), header);
    }

    #[test]
    fn test_maximum_entry_count() {
        let header = TransferHeader::new(1, vec![true; MAX_ENTRY_COUNT]);
        let buf = header.serialize().unwrap();
        assert_eq!(buf.len(), TRANSFER_HEADER_MAX_SIZE);
        assert_eq!(TransferHeader::deserialize(&buf).unwrap(), header);

        let over = TransferHeader::new(1, vec![false; MAX_ENTRY_COUNT + 1]);
        assert!(matches!(
            over.serialize(),
            Err(ProtocolError::TooManyEntries { .. })
        ));
    }

    #[test]
    fn test_bitmap_shorter_than_count() {
        // Claims 9 entries but carries one bitmap byte
        assert!(matches!(
            TransferHeader::deserialize(&[1, 0, 9, 0xff]),
            Err(ProtocolError::Truncated { .. })
        ));
        assert!(matches!(
            TransferHeader::deserialize(&[1, 0]),
            Err(ProtocolError::InvalidHeaderSize { len: 2, .. })
        ));
    }

    #[test]
    fn test_trailing_bytes_rejected() {
        assert!(matches!(
            TransferHeader::deserialize(&[1, 0, 1, 0x80, 0x00]),
            Err(ProtocolError::InvalidHeaderSize { .. })
        ));
    }

    #[test]
    fn test_version_is_checked_by_caller() {
        let header = TransferHeader::deserialize(&[2, 0, 1, 0x80]).unwrap();
        assert_eq!(
            header.check_version(1).unwrap_err(),
            ProtocolError::VersionMismatch {
                got: 2,
                expected: 1
            }
        );
        assert!(header.check_version(2).is_ok());
    }
}
