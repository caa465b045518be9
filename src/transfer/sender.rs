use anyhow::{bail, Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::fs::File;
use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::{sleep, Duration};

use crate::config::TransferConfig;
use crate::fs_enum::{FileEntry, PlannedEntry, TransferPlan};
use crate::logger::Logger;
use crate::net::{Endpoint, FrameStream};
use crate::packet::{Chunk, DirHeader, FileHeader, Frame, Packet, TransferHeader};
use crate::progress::Progress;
use crate::protocol::{data_capacity, FINAL_ACK_MAX_SIZE};
use crate::protocol_core::{chunk_data_len, fits_chunk_count};

/// Result of one connection's transfer, as seen by the sender.
#[derive(Debug, Clone, Default)]
pub struct SendSummary {
    pub peer: String,
    pub files_sent: u64,
    pub files_skipped: u64,
    pub bytes_sent: u64,
    /// Status text the receiver returned after the last entry
    pub final_ack: Option<String>,
}

/// Serves the same set of entries to every peer that connects.
pub struct Sender {
    endpoint: Endpoint,
    entries: Vec<PathBuf>,
    config: Arc<TransferConfig>,
    logger: Arc<dyn Logger>,
    progress: Arc<dyn Progress>,
}

impl Sender {
    pub fn new(
        endpoint: Endpoint,
        entries: Vec<PathBuf>,
        config: Arc<TransferConfig>,
        logger: Arc<dyn Logger>,
        progress: Arc<dyn Progress>,
    ) -> Self {
        Self {
            endpoint,
            entries,
            config,
            logger,
            progress,
        }
    }

    pub async fn bind(&self) -> Result<TcpListener> {
        self.endpoint.bind().await
    }

    /// Bind the configured endpoint and serve until the process exits.
    pub async fn listen(self) -> Result<()> {
        let listener = self.bind().await?;
        Arc::new(self).serve(listener).await
    }

    /// Accept loop: one independent task per connection.
    pub async fn serve(self: Arc<Self>, listener: TcpListener) -> Result<()> {
        let local = listener.local_addr().context("listener address")?;
        self.logger.info(&format!("Listening on: {}", local));
        loop {
            let (stream, peer) = match listener.accept().await {
                Ok(conn) => conn,
                Err(e) => {
                    self.logger.error(&format!("failed to accept connection: {}", e));
                    sleep(Duration::from_millis(100)).await;
                    continue;
                }
            };
            let this = Arc::clone(&self);
            tokio::spawn(async move {
                match this.handle_connection(stream).await {
                    Ok(summary) => this.logger.info(&format!(
                        "{}: sent {} files ({} bytes), skipped {}",
                        peer, summary.files_sent, summary.bytes_sent, summary.files_skipped
                    )),
                    Err(e) => this
                        .logger
                        .error(&format!("transfer to {} aborted: {:#}", peer, e)),
                }
            });
        }
    }

    /// Drive one peer through the whole session.
    pub async fn handle_connection(&self, stream: TcpStream) -> Result<SendSummary> {
        let mut conn = FrameStream::new(stream, self.config.io_timeout);
        self.logger.connected(conn.peer());

        let plan = TransferPlan::build(&self.entries, self.config.chunk_size)?;
        for skipped in &plan.skipped {
            self.logger.entry_skipped(&skipped.path, &skipped.reason);
        }
        self.logger.info(&format!(
            "sending {} files ({} bytes) to {}",
            plan.files().count(),
            plan.total_bytes(),
            conn.peer()
        ));

        let header = plan.transfer_header(self.config.protocol_version);
        let entry_count = header.entry_count();
        conn.send_frame(&Frame::Transfer(header)).await?;
        if !conn.await_ack().await? {
            bail!("transfer header rejected by {}", conn.peer());
        }
        self.logger
            .header_sent(TransferHeader::KIND, &format!("{} entries", entry_count));

        let mut summary = SendSummary {
            peer: conn.peer().to_string(),
            ..SendSummary::default()
        };

        for entry in &plan.entries {
            match entry {
                PlannedEntry::File(file) => self.send_file(&mut conn, file, &mut summary).await?,
                PlannedEntry::Directory { root, files } => {
                    let file_count = u32::try_from(files.len())
                        .with_context(|| format!("too many files under {}", root.display()))?;
                    conn.send_frame(&Frame::Dir(DirHeader { file_count })).await?;
                    if !conn.await_ack().await? {
                        bail!("dir header for {} rejected", entry.path().display());
                    }
                    self.logger.header_sent(
                        DirHeader::KIND,
                        &format!("{} ({} files)", root.display(), file_count),
                    );
                    for file in files {
                        self.send_file(&mut conn, file, &mut summary).await?;
                    }
                }
            }
        }

        summary.final_ack = self.read_final_ack(&mut conn).await;
        Ok(summary)
    }

    /// FileHeader, then `chunk_count` fixed-size chunk frames, each acked.
    ///
    /// A NAK skips the rest of the file. Errors are fatal: the peer was
    /// promised this file and the stream can no longer be trusted.
    async fn send_file(
        &self,
        conn: &mut FrameStream,
        file: &FileEntry,
        summary: &mut SendSummary,
    ) -> Result<()> {
        let chunk_size = self.config.chunk_size;
        let mut src = File::open(&file.path)
            .await
            .with_context(|| format!("failed to open {}", file.path.display()))?;
        // Re-stat: the size may have moved since planning
        let file_size = src.metadata().await?.len();
        if !fits_chunk_count(file_size, chunk_size) {
            bail!("{} grew past the chunk count limit", file.path.display());
        }

        let header = FileHeader::new(file.wire_name.clone(), file_size, chunk_size);
        let name = header.file_name.as_str();
        conn.send_frame(&Frame::File(header.clone())).await?;
        if !conn.await_ack().await? {
            self.logger
                .entry_skipped(&file.path, "file header rejected by receiver");
            summary.files_skipped += 1;
            return Ok(());
        }
        self.logger.header_sent(FileHeader::KIND, name);

        let mut bar = self.progress.begin(name, file_size);
        let mut data = Vec::with_capacity(data_capacity(chunk_size));
        let mut sent = 0u64;

        for seq in 0..header.chunk_count {
            // Never more than the header announced, even if the file grew
            data.resize(chunk_data_len(file_size, chunk_size, seq), 0);
            let n = read_up_to(&mut src, &mut data)
                .await
                .with_context(|| format!("failed to read {}", file.path.display()))?;
            data.truncate(n);

            let chunk = Chunk::new(seq, data);
            let mut frame = chunk.serialize()?;
            // Every chunk frame is exactly chunk_size bytes on the wire
            frame.resize(chunk_size as usize, 0);
            data = chunk.data;

            let accepted = match exchange(conn, &frame).await {
                Ok(accepted) => accepted,
                Err(e) => {
                    self.logger.chunk_failed(name, seq, &format!("{:#}", e));
                    return Err(e);
                }
            };
            if !accepted {
                self.logger.chunk_failed(name, seq, "rejected by receiver");
                summary.files_skipped += 1;
                return Ok(());
            }
            sent += n as u64;
            bar.update(sent);
        }
        bar.finish();

        summary.files_sent += 1;
        summary.bytes_sent += sent;
        self.logger.file_done(name, sent);
        Ok(())
    }

    async fn read_final_ack(&self, conn: &mut FrameStream) -> Option<String> {
        match conn
            .read_some(FINAL_ACK_MAX_SIZE, self.config.final_ack_timeout)
            .await
        {
            Ok(bytes) if bytes.is_empty() => {
                self.logger
                    .warning(&format!("{} closed without a final acknowledgment", conn.peer()));
                None
            }
            Ok(bytes) => {
                let text = String::from_utf8_lossy(&bytes).trim().to_string();
                self.logger.success(&format!("{}: {}", conn.peer(), text));
                Some(text)
            }
            Err(e) => {
                self.logger
                    .warning(&format!("failed to read response from {}: {:#}", conn.peer(), e));
                None
            }
        }
    }
}

async fn exchange(conn: &mut FrameStream, frame: &[u8]) -> Result<bool> {
    conn.write_all_timed(frame).await?;
    conn.await_ack().await
}

/// Fill `buf` from `src`, stopping early only at end of file.
async fn read_up_to(src: &mut File, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = src.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}
