use super::{check_size, Packet, WireReader};
use crate::error::ProtocolError;
use crate::protocol::{FILE_HEADER_MAX_SIZE, FILE_HEADER_MIN_SIZE, MAX_FILENAME_LENGTH};
use crate::protocol_core::chunk_count;

/// Describes one file about to be streamed.
///
/// Layout: `chunk_size (u32) | chunk_count (u32) | file_size (u64) |
/// name_len (u16) | name`. The name is a `/`-separated relative path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileHeader {
    pub chunk_size: u32,
    pub chunk_count: u32,
    pub file_size: u64,
    pub file_name: String,
}

impl FileHeader {
    /// Header for a file of `file_size` bytes sent in frames of `chunk_size`.
    pub fn new(file_name: impl Into<String>, file_size: u64, chunk_size: u32) -> Self {
        Self {
            chunk_size,
            chunk_count: chunk_count(file_size, chunk_size),
            file_size,
            file_name: file_name.into(),
        }
    }

    pub fn file_name_length(&self) -> usize {
        self.file_name.len()
    }
}

impl Packet for FileHeader {
    const KIND: &'static str = "file header";

    fn serialize(&self) -> Result<Vec<u8>, ProtocolError> {
        let name_len = self.file_name_length();
        if name_len > MAX_FILENAME_LENGTH {
            return Err(ProtocolError::NameTooLong {
                len: name_len,
                max: MAX_FILENAME_LENGTH,
            });
        }

        let mut buf = Vec::with_capacity(FILE_HEADER_MIN_SIZE + name_len);
        buf.extend_from_slice(&self.chunk_size.to_be_bytes());
        buf.extend_from_slice(&self.chunk_count.to_be_bytes());
        buf.extend_from_slice(&self.file_size.to_be_bytes());
        buf.extend_from_slice(&(name_len as u16).to_be_bytes());
        buf.extend_from_slice(self.file_name.as_bytes());
        Ok(buf)
    }

    fn deserialize(data: &[u8]) -> Result<Self, ProtocolError> {
        check_size(data.len(), FILE_HEADER_MIN_SIZE, FILE_HEADER_MAX_SIZE)?;

        let mut r = WireReader::new(data);
        let chunk_size = r.u32()?;
        let chunk_count = r.u32()?;
        let file_size = r.u64()?;
        let name_len = r.u16()? as usize;

        if name_len > MAX_FILENAME_LENGTH {
            return Err(ProtocolError::NameTooLong {
                len: name_len,
                max: MAX_FILENAME_LENGTH,
            });
        }
        let name = r.take(name_len)?;
        if r.remaining() != 0 {
            // Trailing garbage after the name
            return Err(ProtocolError::InvalidHeaderSize {
                len: data.len(),
                min: FILE_HEADER_MIN_SIZE,
                max: FILE_HEADER_MIN_SIZE + name_len,
            });
        }
        let file_name = std::str::from_utf8(name)
            .map_err(|_| ProtocolError::InvalidFileName)?
            .to_string();

        Ok(Self {
            chunk_size,
            chunk_count,
            file_size,
            file_name,
        })
    }
}
