use anyhow::{anyhow, bail, Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

use super::completion_stamp;
use crate::bitmap;
use crate::config::{validate_chunk_size, TransferConfig};
use crate::logger::Logger;
use crate::net::{Endpoint, FrameStream};
use crate::packet::{Chunk, DirHeader, FileHeader, Packet, TransferHeader};
use crate::progress::Progress;
use crate::error::ProtocolError;
use crate::protocol::{
    DIR_HEADER_SIZE, FILE_HEADER_MIN_SIZE, MAX_FILENAME_LENGTH, TRANSFER_HEADER_MIN_SIZE,
};
use crate::protocol_core::{ensure_dir_exists, ensure_parent_exists, normalize_under_root};

/// What one session left on disk.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReceiveSummary {
    pub entries: usize,
    pub files_received: u64,
    pub files_skipped: u64,
    pub bytes_received: u64,
    /// Destination paths of the completed files, in arrival order
    pub written: Vec<PathBuf>,
}

/// Dials a sender once and stores everything it announces under
/// `receive_dir`.
pub struct Receiver {
    endpoint: Endpoint,
    config: Arc<TransferConfig>,
    logger: Arc<dyn Logger>,
    progress: Arc<dyn Progress>,
}

impl Receiver {
    pub fn new(
        endpoint: Endpoint,
        config: Arc<TransferConfig>,
        logger: Arc<dyn Logger>,
        progress: Arc<dyn Progress>,
    ) -> Self {
        Self {
            endpoint,
            config,
            logger,
            progress,
        }
    }

    pub async fn connect(&self) -> Result<ReceiveSummary> {
        let stream = self.endpoint.connect(self.config.connect_timeout).await?;
        self.receive(stream).await
    }

    /// Run the receiving side of one session over an established stream.
    pub async fn receive(&self, stream: TcpStream) -> Result<ReceiveSummary> {
        ensure_dir_exists(&self.config.receive_dir)?;
        let mut conn = FrameStream::new(stream, self.config.io_timeout);
        self.logger.connected(conn.peer());

        let header = self.read_transfer_header(&mut conn).await?;
        let mut summary = ReceiveSummary {
            entries: header.entry_count(),
            ..ReceiveSummary::default()
        };

        for is_directory in &header.is_directory {
            if *is_directory {
                let dir = self.read_dir_header(&mut conn).await?;
                for _ in 0..dir.file_count {
                    self.receive_file(&mut conn, &mut summary).await?;
                }
            } else {
                self.receive_file(&mut conn, &mut summary).await?;
            }
        }

        let stamp = completion_stamp();
        conn.write_all_timed(stamp.as_bytes())
            .await
            .context("failed to send final acknowledgment")?;
        let _ = conn.shutdown().await;
        self.logger.success(&format!(
            "received {} files ({} bytes) from {}, skipped {}",
            summary.files_received,
            summary.bytes_received,
            conn.peer(),
            summary.files_skipped
        ));
        Ok(summary)
    }

    async fn read_transfer_header(&self, conn: &mut FrameStream) -> Result<TransferHeader> {
        let mut buf = conn
            .read_vec(TRANSFER_HEADER_MIN_SIZE)
            .await
            .context("failed to read transfer header")?;
        let count = u16::from_be_bytes([buf[1], buf[2]]) as usize;
        let flags = conn
            .read_vec(bitmap::packed_len(count))
            .await
            .context("failed to read transfer header")?;
        buf.extend_from_slice(&flags);

        let header = match TransferHeader::deserialize(&buf) {
            Ok(header) => header,
            Err(e) => {
                let _ = conn.send_ack(false).await;
                return Err(anyhow!(e).context("malformed transfer header"));
            }
        };
        if let Err(e) = header.check_version(self.config.protocol_version) {
            let _ = conn.send_ack(false).await;
            return Err(e.into());
        }
        conn.send_ack(true).await?;
        Ok(header)
    }

    async fn read_dir_header(&self, conn: &mut FrameStream) -> Result<DirHeader> {
        let buf = conn
            .read_vec(DIR_HEADER_SIZE)
            .await
            .context("failed to read dir header")?;
        let dir = DirHeader::deserialize(&buf)?;
        conn.send_ack(true).await?;
        Ok(dir)
    }

    /// One FileHeader and its chunks. A rejected header or chunk is NAKed
    /// and the file skipped. Transport failures and a name length past the
    /// wire limit end the session.
    async fn receive_file(
        &self,
        conn: &mut FrameStream,
        summary: &mut ReceiveSummary,
    ) -> Result<()> {
        let mut buf = conn
            .read_vec(FILE_HEADER_MIN_SIZE)
            .await
            .context("failed to read file header")?;
        let name_len = u16::from_be_bytes([buf[16], buf[17]]) as usize;
        if name_len > MAX_FILENAME_LENGTH {
            // The name bytes cannot be skipped safely; framing is lost
            let _ = conn.send_ack(false).await;
            return Err(ProtocolError::NameTooLong {
                len: name_len,
                max: MAX_FILENAME_LENGTH,
            }
            .into());
        }
        let name = conn
            .read_vec(name_len)
            .await
            .context("failed to read file name")?;
        buf.extend_from_slice(&name);

        let header = match FileHeader::deserialize(&buf) {
            Ok(header) => header,
            Err(e) => {
                self.logger.error(&format!("malformed file header: {}", e));
                conn.send_ack(false).await?;
                summary.files_skipped += 1;
                return Ok(());
            }
        };

        let (dest, mut file) = match self.open_destination(&header).await {
            Ok(opened) => opened,
            Err(e) => {
                self.logger
                    .entry_skipped(Path::new(&header.file_name), &format!("{:#}", e));
                conn.send_ack(false).await?;
                summary.files_skipped += 1;
                return Ok(());
            }
        };
        conn.send_ack(true).await?;

        let name = header.file_name.as_str();
        let mut frame = vec![0u8; header.chunk_size as usize];
        let mut bar = self.progress.begin(name, header.file_size);
        let mut written = 0u64;

        for seq in 0..header.chunk_count {
            conn.read_exact_timed(&mut frame)
                .await
                .with_context(|| format!("failed to read chunk {} of {}", seq, name))?;
            let room = header.file_size.saturating_sub(written);
            let stored = store_chunk(&mut file, &frame, seq, room).await;
            match stored {
                Ok(n) => {
                    conn.send_ack(true).await?;
                    written += n;
                    bar.update(written);
                }
                Err(e) => {
                    conn.send_ack(false).await?;
                    self.logger.chunk_failed(name, seq, &format!("{:#}", e));
                    drop(file);
                    let _ = tokio::fs::remove_file(&dest).await;
                    summary.files_skipped += 1;
                    return Ok(());
                }
            }
        }

        if let Err(e) = file.flush().await {
            self.logger
                .error(&format!("failed to flush {}: {}", dest.display(), e));
            summary.files_skipped += 1;
            return Ok(());
        }
        bar.finish();
        if written != header.file_size {
            self.logger.warning(&format!(
                "{}: received {} of {} announced bytes",
                name, written, header.file_size
            ));
        }

        self.logger.file_done(name, written);
        summary.files_received += 1;
        summary.bytes_received += written;
        summary.written.push(dest);
        Ok(())
    }

    /// Validate an announced file and create (or truncate) its destination.
    async fn open_destination(&self, header: &FileHeader) -> Result<(PathBuf, File)> {
        validate_chunk_size(header.chunk_size)?;
        let dest = normalize_under_root(&self.config.receive_dir, Path::new(&header.file_name))?;
        ensure_parent_exists(&dest)?;
        let file = File::create(&dest)
            .await
            .with_context(|| format!("failed to create {}", dest.display()))?;
        Ok((dest, file))
    }
}

/// Decode one chunk frame and append its data. Returns the bytes written.
async fn store_chunk(file: &mut File, frame: &[u8], expected_seq: u32, room: u64) -> Result<u64> {
    let chunk = Chunk::deserialize(frame)?;
    if chunk.sequence_number != expected_seq {
        bail!(
            "out of order chunk: got {}, expected {}",
            chunk.sequence_number,
            expected_seq
        );
    }
    if chunk.data_length() > room {
        bail!("chunk overruns the announced file size");
    }
    file.write_all(&chunk.data)
        .await
        .context("failed to write the data to the file")?;
    Ok(chunk.data_length())
}
