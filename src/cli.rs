//! Command line surface and its validation into runtime settings

use anyhow::{bail, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

use crate::config::TransferConfig;
use crate::net::{local_ipv4, Endpoint, Network};
use crate::protocol::CHUNK_SIZE;

#[derive(Debug, Parser)]
#[command(
    name = "lnkr",
    author,
    version,
    about = "Point-to-point file and directory transfer over a lock-step TCP protocol"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Chunk frame size in bytes (12 bytes of it are framing)
    #[arg(long, global = true, default_value_t = CHUNK_SIZE)]
    pub chunk_size: u32,

    /// Per-step socket timeout in seconds
    #[arg(long, global = true, default_value_t = 30)]
    pub timeout: u64,

    /// Also append log lines to this file
    #[arg(long = "log-file", global = true)]
    pub log_file: Option<PathBuf>,

    /// No progress bars
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Log every header exchanged
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Listen and serve the given files and directories to every receiver
    Send(SendArgs),
    /// Connect to a sender and store what it transfers
    Receive(ReceiveArgs),
}

#[derive(Debug, Args)]
pub struct AddrArgs {
    /// Address as host:port
    #[arg(long, conflicts_with_all = ["host", "port"])]
    pub addr: Option<String>,

    #[arg(long)]
    pub host: Option<String>,

    #[arg(long)]
    pub port: Option<u16>,

    #[arg(long, value_enum, default_value_t = Network::Tcp)]
    pub network: Network,
}

#[derive(Debug, Args)]
pub struct SendArgs {
    /// Files or directories to send
    pub entries: Vec<PathBuf>,

    /// Additional entry (repeatable)
    #[arg(short = 'f', long = "file")]
    pub files: Vec<PathBuf>,

    #[command(flatten)]
    pub addr: AddrArgs,
}

#[derive(Debug, Args)]
pub struct ReceiveArgs {
    #[command(flatten)]
    pub addr: AddrArgs,

    /// Directory to store received entries in
    #[arg(short = 'd', long = "dir", default_value = ".")]
    pub dir: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Role {
    Send {
        endpoint: Endpoint,
        entries: Vec<PathBuf>,
    },
    Receive {
        endpoint: Endpoint,
    },
}

/// Everything `main` needs, checked before any socket is opened.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub role: Role,
    pub transfer: TransferConfig,
    pub log_file: Option<PathBuf>,
    pub quiet: bool,
    pub verbose: bool,
}

impl Cli {
    pub fn into_config(self) -> Result<AppConfig> {
        if self.timeout == 0 {
            bail!("--timeout must be at least 1 second");
        }
        let mut transfer = TransferConfig {
            chunk_size: self.chunk_size,
            io_timeout: Duration::from_secs(self.timeout),
            ..TransferConfig::default()
        };

        let role = match self.command {
            Command::Send(args) => {
                let mut entries = args.entries;
                entries.extend(args.files);
                if entries.is_empty() {
                    bail!("nothing to send: give at least one file or directory");
                }
                for entry in &entries {
                    if !entry.exists() {
                        bail!("{}: no such file or directory", entry.display());
                    }
                }
                Role::Send {
                    endpoint: send_endpoint(&args.addr)?,
                    entries,
                }
            }
            Command::Receive(args) => {
                transfer.receive_dir = args.dir;
                Role::Receive {
                    endpoint: receive_endpoint(&args.addr)?,
                }
            }
        };
        transfer.validate()?;

        Ok(AppConfig {
            role,
            transfer,
            log_file: self.log_file,
            quiet: self.quiet,
            verbose: self.verbose,
        })
    }
}

// Host defaults to this machine's LAN address, port to an OS-assigned one
fn send_endpoint(args: &AddrArgs) -> Result<Endpoint> {
    if let Some(addr) = &args.addr {
        return Endpoint::parse(addr, args.network);
    }
    let host = args
        .host
        .clone()
        .unwrap_or_else(|| local_ipv4().to_string());
    Ok(Endpoint::new(host, args.port.unwrap_or(0), args.network))
}

fn receive_endpoint(args: &AddrArgs) -> Result<Endpoint> {
    if let Some(addr) = &args.addr {
        return Endpoint::parse(addr, args.network);
    }
    match (&args.host, args.port) {
        (Some(host), Some(port)) => Ok(Endpoint::new(host.clone(), port, args.network)),
        _ => bail!("receive needs --addr, or both --host and --port"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn config(args: &[&str]) -> Result<AppConfig> {
        let mut argv = vec!["lnkr"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv)?.into_config()
    }

    #[test]
    fn test_send_collects_positional_and_flag_entries() {
        let tmp = TempDir::new().unwrap();
        let a = tmp.path().join("a.txt");
        let b = tmp.path().join("b.txt");
        std::fs::write(&a, b"a").unwrap();
        std::fs::write(&b, b"b").unwrap();

        let cfg = config(&[
            "send",
            a.to_str().unwrap(),
            "-f",
            b.to_str().unwrap(),
            "--addr",
            "127.0.0.1:7000",
        ])
        .unwrap();
        match cfg.role {
            Role::Send { endpoint, entries } => {
                assert_eq!(entries, vec![a, b]);
                assert_eq!(endpoint.addr(), "127.0.0.1:7000");
            }
            other => panic!("unexpected role {:?}", other),
        }
        assert_eq!(cfg.transfer.chunk_size, CHUNK_SIZE);
    }

    #[test]
    fn test_send_defaults_host_and_port() {
        let tmp = TempDir::new().unwrap();
        let cfg = config(&["send", tmp.path().to_str().unwrap()]).unwrap();
        match cfg.role {
            Role::Send { endpoint, .. } => {
                assert_eq!(endpoint.port, 0);
                assert_eq!(endpoint.host, local_ipv4().to_string());
            }
            other => panic!("unexpected role {:?}", other),
        }
    }

    #[test]
    fn test_send_requires_existing_entries() {
        assert!(config(&["send", "--addr", "127.0.0.1:7000"]).is_err());
        let err = config(&["send", "/definitely/not/here.bin"]).unwrap_err();
        assert!(err.to_string().contains("no such file"));
    }

    #[test]
    fn test_addr_conflicts_with_host_and_port() {
        assert!(config(&["receive", "--addr", "h:1", "--host", "h"]).is_err());
        assert!(config(&["receive", "--addr", "h:1", "--port", "2"]).is_err());
    }

    #[test]
    fn test_receive_needs_full_address() {
        assert!(config(&["receive"]).is_err());
        assert!(config(&["receive", "--host", "127.0.0.1"]).is_err());
        assert!(config(&["receive", "--port", "7000"]).is_err());
        assert!(config(&["receive", "--addr", "localhost"]).is_err());

        let cfg = config(&["receive", "--host", "::1", "--port", "7000", "-d", "out"]).unwrap();
        assert_eq!(cfg.transfer.receive_dir, PathBuf::from("out"));
        match cfg.role {
            Role::Receive { endpoint } => assert_eq!(endpoint.addr(), "[::1]:7000"),
            other => panic!("unexpected role {:?}", other),
        }
    }

    #[test]
    fn test_global_flags_validated() {
        assert!(config(&["receive", "--addr", "h:1", "--chunk-size", "12"]).is_err());
        assert!(config(&["receive", "--addr", "h:1", "--timeout", "0"]).is_err());

        let cfg = config(&[
            "--chunk-size",
            "4096",
            "--quiet",
            "receive",
            "--addr",
            "h:1",
            "--timeout",
            "5",
        ])
        .unwrap();
        assert_eq!(cfg.transfer.chunk_size, 4096);
        assert_eq!(cfg.transfer.io_timeout, Duration::from_secs(5));
        assert!(cfg.quiet);
    }
}
