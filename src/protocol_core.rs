//! Shared protocol logic for both transfer roles
//!
//! Chunk arithmetic used when building and checking FileHeaders, and the
//! filesystem guards the receiver applies before writing anything.

use anyhow::{anyhow, bail, Result};
use std::path::{Component, Path, PathBuf};

use crate::protocol::data_capacity;

/// Number of chunk frames for a file: `file_size / capacity + 1`.
///
/// The last chunk is partial and is empty when the size is an exact
/// multiple of the frame's data capacity.
///
/// Interop: senders that divide by the whole `chunk_size` announce fewer
/// chunks than the data needs for some sizes (65524..=65535 with 64 KiB
/// frames gets 1 instead of 2), so the counts on the wire differ there.
/// The receiver only trusts the count it is given and accepts either.
///
/// A `chunk_size` with no data capacity yields `u32::MAX`; callers reject
/// such sizes with [`crate::config::validate_chunk_size`] first.
pub fn chunk_count(file_size: u64, chunk_size: u32) -> u32 {
    match file_size.checked_div(data_capacity(chunk_size) as u64) {
        Some(full) => u32::try_from(full + 1).unwrap_or(u32::MAX),
        None => u32::MAX,
    }
}

/// Whether a file of `file_size` bytes can be described by a u32 chunk count.
pub fn fits_chunk_count(file_size: u64, chunk_size: u32) -> bool {
    file_size
        .checked_div(data_capacity(chunk_size) as u64)
        .map_or(false, |full| full < u32::MAX as u64)
}

/// Byte length of chunk `index` for a file of `file_size` bytes.
pub fn chunk_data_len(file_size: u64, chunk_size: u32, index: u32) -> usize {
    let cap = data_capacity(chunk_size) as u64;
    let offset = index as u64 * cap;
    file_size.saturating_sub(offset).min(cap) as usize
}

/// Normalize a received path to be safely under a root directory.
/// This prevents path traversal attacks by:
/// 1. Rejecting absolute paths, parent directory components, and root/prefix components
/// 2. Rejecting NUL bytes and empty names
/// 3. On Windows, rejecting ':' in path components (ADS defense)
/// 4. Canonicalizing the deepest existing ancestor to resolve symlinks
/// 5. Ensuring the result is under the root
pub fn normalize_under_root(root: &Path, p: &Path) -> Result<PathBuf> {
    use Component::{CurDir, Normal, ParentDir, Prefix, RootDir};

    let path_str = p.to_string_lossy();
    if path_str.contains('\0') {
        bail!("path contains NUL byte");
    }

    let mut safe = PathBuf::new();
    for component in p.components() {
        match component {
            CurDir => {}
            Normal(s) => {
                #[cfg(windows)]
                if s.to_string_lossy().contains(':') {
                    bail!("path component contains colon (potential ADS attack)");
                }
                safe.push(s);
            }
            ParentDir | RootDir | Prefix(_) => {
                bail!("path contains disallowed component: {:?}", component);
            }
        }
    }
    if safe.as_os_str().is_empty() {
        bail!("empty file name");
    }

    let root = if root.exists() {
        root.canonicalize()
            .map_err(|e| anyhow!("failed to canonicalize root {:?}: {}", root, e))?
    } else {
        root.to_path_buf()
    };
    let joined = root.join(&safe);

    // Resolve symlinks on whatever part of the path already exists
    let final_path = if joined.exists() {
        joined
            .canonicalize()
            .map_err(|e| anyhow!("failed to canonicalize {:?}: {}", joined, e))?
    } else {
        let mut existing = joined.as_path();
        let mut tail = Vec::new();
        while !existing.exists() {
            match (existing.parent(), existing.file_name()) {
                (Some(parent), Some(name)) => {
                    tail.push(name.to_os_string());
                    existing = parent;
                }
                _ => break,
            }
        }
        let mut resolved = if existing.exists() {
            existing
                .canonicalize()
                .map_err(|e| anyhow!("failed to canonicalize parent {:?}: {}", existing, e))?
        } else {
            existing.to_path_buf()
        };
        for name in tail.into_iter().rev() {
            resolved.push(name);
        }
        resolved
    };

    if !final_path.starts_with(&root) {
        bail!("path {:?} escapes root {:?}", p, root);
    }

    Ok(final_path)
}

/// Create directory with parent creation
pub fn ensure_dir_exists(path: &Path) -> Result<()> {
    if !path.exists() {
        std::fs::create_dir_all(path)?;
    }
    Ok(())
}

/// Create parent directory if needed
pub fn ensure_parent_exists(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        ensure_dir_exists(parent)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::CHUNK_SIZE;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_chunk_count_examples() {
        assert_eq!(chunk_count(0, CHUNK_SIZE), 1);
        assert_eq!(chunk_count(12, CHUNK_SIZE), 1);
        assert_eq!(chunk_count(150_000, CHUNK_SIZE), 3);
        // Exact multiple of the capacity ends with an empty chunk
        assert_eq!(chunk_count(65524, CHUNK_SIZE), 2);
        assert_eq!(chunk_data_len(65524, CHUNK_SIZE, 1), 0);
        // Dividing by the frame size would announce one chunk here
        assert_eq!(chunk_count(65530, CHUNK_SIZE), 2);
        assert_eq!(chunk_count(65535, CHUNK_SIZE), 2);
    }

    #[test]
    fn test_frames_without_capacity_do_not_panic() {
        assert_eq!(chunk_count(100, 12), u32::MAX);
        assert_eq!(chunk_count(100, 3), u32::MAX);
        assert!(!fits_chunk_count(0, 12));
        assert!(!fits_chunk_count(100, 0));
        assert_eq!(chunk_data_len(100, 12, 0), 0);
    }

    #[test]
    fn test_chunk_lengths_cover_file() {
        for size in [0u64, 1, 65523, 65524, 65525, 65535, 65536, 150_000, 1_000_000, 4 * 65524 + 7] {
            let count = chunk_count(size, CHUNK_SIZE);
            let total: u64 = (0..count)
                .map(|i| chunk_data_len(size, CHUNK_SIZE, i) as u64)
                .sum();
            assert_eq!(total, size, "size {}", size);
            // Only the last chunk may be short
            for i in 0..count.saturating_sub(1) {
                assert_eq!(chunk_data_len(size, CHUNK_SIZE, i), 65524);
            }
        }
    }

    #[test]
    fn test_scenario_chunk_split() {
        let lens: Vec<usize> = (0..chunk_count(150_000, CHUNK_SIZE))
            .map(|i| chunk_data_len(150_000, CHUNK_SIZE, i))
            .collect();
        assert_eq!(lens, vec![65524, 65524, 18952]);
    }

    #[test]
    fn test_fits_chunk_count() {
        assert!(fits_chunk_count(u32::MAX as u64, CHUNK_SIZE));
        assert!(!fits_chunk_count(u64::MAX, CHUNK_SIZE));
        assert!(!fits_chunk_count(u32::MAX as u64, 13));
    }

    #[test]
    fn test_normalize_under_root_safe_paths() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        let canon = root.canonicalize().unwrap();

        let result = normalize_under_root(root, Path::new("subdir/file.txt")).unwrap();
        assert!(result.starts_with(&canon));
        assert!(result.ends_with("subdir/file.txt"));

        let result = normalize_under_root(root, Path::new("./subdir/./file.txt")).unwrap();
        assert!(result.ends_with("subdir/file.txt"));

        let result = normalize_under_root(root, Path::new("a/b/c/deep.bin")).unwrap();
        assert_eq!(result, canon.join("a/b/c/deep.bin"));
    }

    #[test]
    fn test_normalize_under_root_unsafe_paths() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();

        assert!(normalize_under_root(root, Path::new("../etc/passwd")).is_err());
        assert!(normalize_under_root(root, Path::new("subdir/../../etc/passwd")).is_err());
        assert!(normalize_under_root(root, Path::new("/etc/passwd")).is_err());
        assert!(normalize_under_root(root, Path::new("file\0.txt")).is_err());
        assert!(normalize_under_root(root, Path::new("")).is_err());
        assert!(normalize_under_root(root, Path::new("./.")).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_normalize_rejects_symlink_escape() {
        let temp_dir = TempDir::new().unwrap();
        let outside = TempDir::new().unwrap();
        let root = temp_dir.path();
        std::os::unix::fs::symlink(outside.path(), root.join("link")).unwrap();

        assert!(normalize_under_root(root, Path::new("link/file.txt")).is_err());
        assert!(normalize_under_root(root, Path::new("link/new/dir/file.txt")).is_err());
    }

    #[test]
    fn test_normalize_existing_file() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        let subdir = root.join("subdir");
        fs::create_dir(&subdir).unwrap();
        let file = subdir.join("file.txt");
        fs::write(&file, "test").unwrap();

        let result = normalize_under_root(root, Path::new("subdir/file.txt")).unwrap();
        assert_eq!(result, file.canonicalize().unwrap());
    }

    #[test]
    fn test_ensure_dir_exists() {
        let temp_dir = TempDir::new().unwrap();
        let new_dir = temp_dir.path().join("new").join("nested").join("dir");

        assert!(!new_dir.exists());
        ensure_dir_exists(&new_dir).unwrap();
        assert!(new_dir.is_dir());

        // Should be idempotent
        ensure_dir_exists(&new_dir).unwrap();
        assert!(new_dir.exists());
    }

    #[test]
    fn test_ensure_parent_exists() {
        let temp_dir = TempDir::new().unwrap();
        let file_path = temp_dir.path().join("new").join("nested").join("file.txt");

        assert!(!file_path.parent().unwrap().exists());
        ensure_parent_exists(&file_path).unwrap();
        assert!(file_path.parent().unwrap().is_dir());
    }
}
