//! Lock-step transfer engine.
//!
//! The sender listens and spawns one task per accepted connection; the
//! receiver dials once and walks the entries the sender announces. Every
//! frame is answered with one acknowledgment byte before the next is sent.
//!
//! Failure policy shared by both roles: a rejected FileHeader or Chunk
//! (NAK) skips the rest of that file and both peers stay frame-aligned.
//! Socket errors, timeouts and a version mismatch end the connection.

pub mod receiver;
pub mod sender;

pub use receiver::{ReceiveSummary, Receiver};
pub use sender::{SendSummary, Sender};

use chrono::Utc;

/// Closing status the receiver hands back to the sender.
pub fn completion_stamp() -> String {
    Utc::now().format("%A, %d-%b-%y %H:%M:%S UTC").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::FINAL_ACK_MAX_SIZE;

    #[test]
    fn test_completion_stamp_fits_final_read() {
        let stamp = completion_stamp();
        assert!(stamp.ends_with(" UTC"));
        assert!(stamp.len() <= FINAL_ACK_MAX_SIZE);
    }
}
