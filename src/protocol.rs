//! Shared protocol constants for the lnkr lock-step transport

// Protocol header constants
pub const VERSION: u8 = 1;

// Acknowledgment byte values. Every header and chunk gets exactly one back.
pub const ACK: u8 = 1;
pub const NAK: u8 = 0;

// Default chunk frame size (64 KiB), carried on the wire in every FileHeader
pub const CHUNK_SIZE: u32 = 65536;

// Upper bound for a peer-announced chunk size - prevents memory exhaustion
pub const MAX_CHUNK_SIZE: u32 = 16 * 1024 * 1024;

// Chunk frame prefix: sequence number (4) + data length (8)
pub const CHUNK_MIN_SIZE: usize = 4 + 8;

// Longest wire file name in bytes
pub const MAX_FILENAME_LENGTH: usize = 255;

// Entry count is a u16 on the wire
pub const MAX_ENTRY_COUNT: usize = u16::MAX as usize;

pub const DIR_HEADER_SIZE: usize = 4;

// Version (1) + entry count (2)
pub const TRANSFER_HEADER_MIN_SIZE: usize = 1 + 2;
pub const TRANSFER_HEADER_MAX_SIZE: usize = TRANSFER_HEADER_MIN_SIZE + (MAX_ENTRY_COUNT + 7) / 8;

// Chunk size (4) + chunk count (4) + file size (8) + name length (2)
pub const FILE_HEADER_MIN_SIZE: usize = 4 + 4 + 8 + 2;
pub const FILE_HEADER_MAX_SIZE: usize = FILE_HEADER_MIN_SIZE + MAX_FILENAME_LENGTH;

// The closing timestamp blob the receiver sends is read with this bound
pub const FINAL_ACK_MAX_SIZE: usize = 64;

/// Bytes of file data one chunk frame of `chunk_size` bytes can carry.
/// Zero for frames too small to hold the chunk prefix.
pub const fn data_capacity(chunk_size: u32) -> usize {
    (chunk_size as usize).saturating_sub(CHUNK_MIN_SIZE)
}

// Centralized timeout defaults; per-step deadlines live in TransferConfig
pub mod timeouts {
    // Deadline for every socket read or write step (ms)
    pub const IO_STEP_MS: u64 = 30_000;

    // Deadline for the sender's final acknowledgment read (ms)
    pub const FINAL_ACK_MS: u64 = 5_000;

    // Connection establishment timeout (ms)
    pub const CONNECT_MS: u64 = 10_000;
}
