//! Filesystem enumeration and transfer planning

use anyhow::{anyhow, bail, Context, Result};
use std::path::{Component, Path, PathBuf};

use crate::config::validate_chunk_size;
use crate::packet::TransferHeader;
use crate::protocol::{MAX_ENTRY_COUNT, MAX_FILENAME_LENGTH};
use crate::protocol_core::fits_chunk_count;

/// Regular file scheduled for sending
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    pub path: PathBuf,
    pub size: u64,
    /// `/`-separated name the receiver recreates under its receive directory
    pub wire_name: String,
}

/// One top-level entry of a session, in announcement order
#[derive(Debug, Clone)]
pub enum PlannedEntry {
    File(FileEntry),
    Directory { root: PathBuf, files: Vec<FileEntry> },
}

impl PlannedEntry {
    pub fn is_directory(&self) -> bool {
        matches!(self, PlannedEntry::Directory { .. })
    }

    pub fn path(&self) -> &Path {
        match self {
            PlannedEntry::File(f) => &f.path,
            PlannedEntry::Directory { root, .. } => root,
        }
    }
}

/// Something requested that will not be sent, with the reason
#[derive(Debug, Clone)]
pub struct SkippedEntry {
    pub path: PathBuf,
    pub reason: String,
}

/// Everything one connection will send. Built before the TransferHeader so
/// that every announced entry and file count can be honoured.
#[derive(Debug, Clone, Default)]
pub struct TransferPlan {
    pub entries: Vec<PlannedEntry>,
    pub skipped: Vec<SkippedEntry>,
}

impl TransferPlan {
    pub fn build(requested: &[PathBuf], chunk_size: u32) -> Result<Self> {
        validate_chunk_size(chunk_size)?;
        if requested.len() > MAX_ENTRY_COUNT {
            bail!(
                "too many entries: {} (max {})",
                requested.len(),
                MAX_ENTRY_COUNT
            );
        }

        let mut plan = TransferPlan::default();
        for path in requested {
            match plan_entry(path, chunk_size, &mut plan.skipped) {
                Ok(entry) => plan.entries.push(entry),
                Err(e) => plan.skipped.push(SkippedEntry {
                    path: path.clone(),
                    reason: format!("{:#}", e),
                }),
            }
        }
        Ok(plan)
    }

    pub fn transfer_header(&self, version: u8) -> TransferHeader {
        TransferHeader::new(
            version,
            self.entries.iter().map(PlannedEntry::is_directory).collect(),
        )
    }

    pub fn files(&self) -> impl Iterator<Item = &FileEntry> {
        self.entries.iter().flat_map(|entry| match entry {
            PlannedEntry::File(f) => std::slice::from_ref(f).iter(),
            PlannedEntry::Directory { files, .. } => files.iter(),
        })
    }

    pub fn total_bytes(&self) -> u64 {
        self.files().map(|f| f.size).sum()
    }
}

fn plan_entry(path: &Path, chunk_size: u32, skipped: &mut Vec<SkippedEntry>) -> Result<PlannedEntry> {
    let metadata =
        std::fs::metadata(path).with_context(|| format!("stat {}", path.display()))?;

    if metadata.is_dir() {
        let root = path
            .canonicalize()
            .with_context(|| format!("canonicalize {}", path.display()))?;
        let files = enumerate_directory(&root, chunk_size, skipped)?;
        return Ok(PlannedEntry::Directory { root, files });
    }
    if !metadata.is_file() {
        bail!("not a regular file or directory");
    }

    let name = path
        .file_name()
        .ok_or_else(|| anyhow!("path has no file name"))?;
    let wire_name = wire_name(Path::new(name))?;
    check_size(metadata.len(), chunk_size)?;
    Ok(PlannedEntry::File(FileEntry {
        path: path.to_path_buf(),
        size: metadata.len(),
        wire_name,
    }))
}

/// Recursive walk of `root` collecting regular files, named relative to
/// `root`'s parent. Directory nodes themselves are not part of the result.
pub fn enumerate_directory(
    root: &Path,
    chunk_size: u32,
    skipped: &mut Vec<SkippedEntry>,
) -> Result<Vec<FileEntry>> {
    use walkdir::WalkDir;

    let base = root.parent().unwrap_or(root);
    let mut entries = Vec::new();

    for entry in WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
    {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                skipped.push(SkippedEntry {
                    path: e.path().map(Path::to_path_buf).unwrap_or_else(|| root.to_path_buf()),
                    reason: e.to_string(),
                });
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let planned = entry
            .metadata()
            .map_err(anyhow::Error::from)
            .and_then(|metadata| {
                check_size(metadata.len(), chunk_size)?;
                let rel = path.strip_prefix(base).unwrap_or(path);
                Ok(FileEntry {
                    path: path.to_path_buf(),
                    size: metadata.len(),
                    wire_name: wire_name(rel)?,
                })
            });
        match planned {
            Ok(file) => entries.push(file),
            Err(e) => skipped.push(SkippedEntry {
                path: path.to_path_buf(),
                reason: format!("{:#}", e),
            }),
        }
    }

    Ok(entries)
}

/// Portable `/`-joined form of a relative path, bounded to the wire limit.
pub fn wire_name(rel: &Path) -> Result<String> {
    let mut parts = Vec::new();
    for component in rel.components() {
        match component {
            Component::CurDir => {}
            Component::Normal(s) => parts.push(
                s.to_str()
                    .ok_or_else(|| anyhow!("name is not valid UTF-8: {:?}", s))?,
            ),
            other => bail!("unexpected path component {:?}", other),
        }
    }
    let name = parts.join("/");
    if name.is_empty() {
        bail!("empty file name");
    }
    if name.len() > MAX_FILENAME_LENGTH {
        bail!(
            "name {} is {} bytes (max {})",
            name,
            name.len(),
            MAX_FILENAME_LENGTH
        );
    }
    Ok(name)
}

fn check_size(size: u64, chunk_size: u32) -> Result<()> {
    if !fits_chunk_count(size, chunk_size) {
        bail!("file of {} bytes needs more than {} chunks", size, u32::MAX);
    }
    Ok(())
}
