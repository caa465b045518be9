use super::{Packet, WireReader};
use crate::error::ProtocolError;
use crate::protocol::DIR_HEADER_SIZE;

/// Announces how many files a directory entry expands to. The files follow
/// as `file_count` consecutive FileHeader + chunk groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirHeader {
    pub file_count: u32,
}

impl Packet for DirHeader {
    const KIND: &'static str = "dir header";

    fn serialize(&self) -> Result<Vec<u8>, ProtocolError> {
        Ok(self.file_count.to_be_bytes().to_vec())
    }

    fn deserialize(data: &[u8]) -> Result<Self, ProtocolError> {
        if data.len() < DIR_HEADER_SIZE {
            return Err(ProtocolError::InvalidHeaderSize {
                len: data.len(),
                min: DIR_HEADER_SIZE,
                max: DIR_HEADER_SIZE,
            });
        }
        let file_count = WireReader::new(data).u32()?;
        Ok(Self { file_count })
    }
}
