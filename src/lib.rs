//! lnkr: point-to-point file and directory transfer
//!
//! A sender listens and serves a fixed set of entries to every receiver
//! that connects. Each frame on the wire is answered with a one-byte
//! acknowledgment before the next one is sent.

pub mod bitmap;
pub mod cli;
pub mod config;
pub mod error;
pub mod fs_enum;
pub mod logger;
pub mod net;
pub mod packet;
pub mod progress;
pub mod protocol;
pub mod protocol_core;
pub mod transfer;
