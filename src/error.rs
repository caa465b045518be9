use thiserror::Error;

/// Failures raised by the packet codecs. Decoding never panics; every
/// malformed frame surfaces as one of these.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("invalid header size: {len} bytes (expected {min}..={max})")]
    InvalidHeaderSize { len: usize, min: usize, max: usize },

    #[error("invalid chunk size: frame holds {available} bytes, needs {needed}")]
    InvalidChunkSize { needed: u64, available: usize },

    #[error("truncated frame: needed {needed} more bytes at offset {offset}, {available} left")]
    Truncated {
        offset: usize,
        needed: usize,
        available: usize,
    },

    #[error("filename exceeds maximum length of {max} bytes (got {len})")]
    NameTooLong { len: usize, max: usize },

    #[error("too many entries for one transfer: {count} (max {max})")]
    TooManyEntries { count: usize, max: usize },

    #[error("filename is not valid UTF-8")]
    InvalidFileName,

    #[error("protocol version mismatch: got v{got} protocol while using v{expected} protocol")]
    VersionMismatch { got: u8, expected: u8 },
}
