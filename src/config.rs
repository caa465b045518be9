use anyhow::{bail, Result};
use std::path::PathBuf;
use std::time::Duration;

use crate::protocol::{timeouts, CHUNK_MIN_SIZE, CHUNK_SIZE, MAX_CHUNK_SIZE, VERSION};

/// Transfer settings, built once at startup and shared read-only by every
/// connection worker.
#[derive(Clone, Debug)]
pub struct TransferConfig {
    pub protocol_version: u8,
    /// Frame size for outgoing chunks. Incoming files use the size their
    /// FileHeader announces.
    pub chunk_size: u32,
    /// Deadline for each socket read or write step.
    pub io_timeout: Duration,
    /// Deadline for the sender's closing acknowledgment read.
    pub final_ack_timeout: Duration,
    pub connect_timeout: Duration,
    pub receive_dir: PathBuf,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            protocol_version: VERSION,
            chunk_size: CHUNK_SIZE,
            io_timeout: Duration::from_millis(timeouts::IO_STEP_MS),
            final_ack_timeout: Duration::from_millis(timeouts::FINAL_ACK_MS),
            connect_timeout: Duration::from_millis(timeouts::CONNECT_MS),
            receive_dir: PathBuf::from("."),
        }
    }
}

impl TransferConfig {
    pub fn validate(&self) -> Result<()> {
        validate_chunk_size(self.chunk_size)?;
        if self.io_timeout.is_zero() {
            bail!("I/O timeout must be greater than zero");
        }
        Ok(())
    }
}

/// A chunk frame must carry at least one data byte and stay bounded.
pub fn validate_chunk_size(chunk_size: u32) -> Result<()> {
    let min = CHUNK_MIN_SIZE as u32 + 1;
    if chunk_size < min || chunk_size > MAX_CHUNK_SIZE {
        bail!(
            "chunk size {} out of range ({}..={})",
            chunk_size,
            min,
            MAX_CHUNK_SIZE
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let cfg = TransferConfig::default();
        assert_eq!(cfg.chunk_size, 65536);
        assert_eq!(cfg.protocol_version, 1);
        cfg.validate().unwrap();
    }

    #[test]
    fn test_chunk_size_bounds() {
        assert!(validate_chunk_size(12).is_err());
        assert!(validate_chunk_size(13).is_ok());
        assert!(validate_chunk_size(MAX_CHUNK_SIZE).is_ok());
        assert!(validate_chunk_size(MAX_CHUNK_SIZE + 1).is_err());
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let cfg = TransferConfig {
            io_timeout: Duration::ZERO,
            ..TransferConfig::default()
        };
        assert!(cfg.validate().is_err());
    }
}
