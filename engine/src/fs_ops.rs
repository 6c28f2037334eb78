//! Filesystem operations module.
//!
//! This module provides low-level operations for:
//! - Walking a source tree into an ordered copy plan
//! - Copying files with metadata preservation
//! - Recreating symbolic links
//! - Removing whole trees

use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use crate::error::EngineError;

/// Kind of a planned entry. Symbolic links are never followed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Dir,
    File,
    Symlink,
}

/// A single entry of the source tree, relative to the source root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanEntry {
    pub relative_path: PathBuf,
    pub kind: EntryKind,
    /// File length, or the link's own length for symlinks; 0 for directories
    pub size: u64,
}

/// Ordered list of entries to recreate at the destination.
///
/// Directories are listed before anything that lives inside them, and
/// entries of one directory are sorted by name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TreePlan {
    pub entries: Vec<PlanEntry>,
}

impl TreePlan {
    pub fn dirs(&self) -> impl Iterator<Item = &PlanEntry> {
        self.entries.iter().filter(|e| e.kind == EntryKind::Dir)
    }

    /// Files and symlinks, i.e. everything that counts towards progress.
    pub fn files(&self) -> impl Iterator<Item = &PlanEntry> {
        self.entries.iter().filter(|e| e.kind != EntryKind::Dir)
    }

    pub fn total_bytes(&self) -> u64 {
        self.files().map(|e| e.size).sum()
    }

    pub fn file_count(&self) -> u64 {
        self.files().count() as u64
    }

    pub fn dir_count(&self) -> u64 {
        self.dirs().count() as u64
    }
}

/// Walk `source` and return every entry beneath it.
///
/// The walk uses an explicit stack of pending directories, so tree depth is
/// bounded by heap memory rather than the call stack.
///
/// # Errors
/// Returns `EnumerationFailed` if any directory or entry cannot be read.
pub fn enumerate_tree(source: &Path) -> Result<TreePlan, EngineError> {
    let mut entries = Vec::new();
    let mut pending: Vec<PathBuf> = vec![PathBuf::new()];

    while let Some(rel_dir) = pending.pop() {
        let abs_dir = source.join(&rel_dir);
        let read_dir = fs::read_dir(&abs_dir).map_err(|e| EngineError::EnumerationFailed {
            path: abs_dir.clone(),
            source: e,
        })?;

        let mut children = Vec::new();
        for entry in read_dir {
            let entry = entry.map_err(|e| EngineError::EnumerationFailed {
                path: abs_dir.clone(),
                source: e,
            })?;
            // DirEntry::metadata does not traverse symlinks
            let metadata = entry.metadata().map_err(|e| EngineError::EnumerationFailed {
                path: entry.path(),
                source: e,
            })?;
            let file_type = metadata.file_type();
            let kind = if file_type.is_symlink() {
                EntryKind::Symlink
            } else if file_type.is_dir() {
                EntryKind::Dir
            } else if file_type.is_file() {
                EntryKind::File
            } else {
                // Opening a FIFO or device would block or never end
                return Err(EngineError::UnsupportedEntry {
                    path: entry.path(),
                    kind: special_kind(&file_type),
                });
            };
            let size = if kind == EntryKind::Dir { 0 } else { metadata.len() };
            children.push(PlanEntry {
                relative_path: rel_dir.join(entry.file_name()),
                kind,
                size,
            });
        }
        children.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));

        // Reverse so the stack pops subdirectories in name order
        for child in children.iter().rev() {
            if child.kind == EntryKind::Dir {
                pending.push(child.relative_path.clone());
            }
        }
        entries.extend(children);
    }

    Ok(TreePlan { entries })
}

#[cfg(unix)]
fn special_kind(file_type: &fs::FileType) -> &'static str {
    use std::os::unix::fs::FileTypeExt;

    if file_type.is_fifo() {
        "named pipe"
    } else if file_type.is_socket() {
        "socket"
    } else if file_type.is_char_device() {
        "character device"
    } else if file_type.is_block_device() {
        "block device"
    } else {
        "special file"
    }
}

#[cfg(not(unix))]
fn special_kind(_file_type: &fs::FileType) -> &'static str {
    "special file"
}

const COPY_BUFFER_SIZE: usize = 64 * 1024;

/// Pump `reader` into `writer`, blaming whichever side actually failed.
fn copy_stream<R: Read, W: Write>(
    reader: &mut R,
    writer: &mut W,
    src: &Path,
    dst: &Path,
) -> Result<u64, EngineError> {
    let mut buffer = vec![0u8; COPY_BUFFER_SIZE];
    let mut total = 0u64;

    loop {
        let n = match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                return Err(EngineError::ReadError {
                    path: src.to_path_buf(),
                    source: e,
                })
            }
        };
        writer
            .write_all(&buffer[..n])
            .map_err(|e| EngineError::WriteError {
                path: dst.to_path_buf(),
                source: e,
            })?;
        total += n as u64;
    }

    Ok(total)
}

/// Copy a file from source to destination, optionally carrying over mtime.
///
/// # Returns
/// Number of bytes copied
///
/// # Errors
/// Returns `ReadError` or `WriteError` depending on which side failed.
pub fn copy_file_with_metadata(
    src: &Path,
    dst: &Path,
    preserve_mtime: bool,
) -> Result<u64, EngineError> {
    let mut src_file = fs::File::open(src).map_err(|e| EngineError::ReadError {
        path: src.to_path_buf(),
        source: e,
    })?;

    let src_metadata = src_file.metadata().map_err(|e| EngineError::ReadError {
        path: src.to_path_buf(),
        source: e,
    })?;

    let mut dst_file = fs::File::create(dst).map_err(|e| EngineError::WriteError {
        path: dst.to_path_buf(),
        source: e,
    })?;

    let bytes_copied = copy_stream(&mut src_file, &mut dst_file, src, dst)?;

    dst_file.sync_all().map_err(|e| EngineError::WriteError {
        path: dst.to_path_buf(),
        source: e,
    })?;
    drop(dst_file);

    if preserve_mtime {
        if let Ok(mtime) = src_metadata.modified() {
            if let Err(e) = filetime::set_file_mtime(dst, filetime::FileTime::from_system_time(mtime))
            {
                tracing::debug!(path = %dst.display(), error = %e, "could not preserve mtime");
            }
        }
    }

    Ok(bytes_copied)
}

/// Recreate the symbolic link `src` at `dst` without following it.
///
/// # Returns
/// The length of the link itself
pub fn copy_symlink(src: &Path, dst: &Path) -> Result<u64, EngineError> {
    let target = fs::read_link(src).map_err(|e| EngineError::ReadError {
        path: src.to_path_buf(),
        source: e,
    })?;
    let link_len = fs::symlink_metadata(src)
        .map(|m| m.len())
        .map_err(|e| EngineError::ReadError {
            path: src.to_path_buf(),
            source: e,
        })?;

    create_symlink(src, &target, dst).map_err(|e| EngineError::WriteError {
        path: dst.to_path_buf(),
        source: e,
    })?;

    Ok(link_len)
}

#[cfg(unix)]
fn create_symlink(_src: &Path, target: &Path, dst: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(target, dst)
}

#[cfg(windows)]
fn create_symlink(src: &Path, target: &Path, dst: &Path) -> io::Result<()> {
    // Windows needs to know whether the link points at a directory
    if fs::metadata(src).map(|m| m.is_dir()).unwrap_or(false) {
        std::os::windows::fs::symlink_dir(target, dst)
    } else {
        std::os::windows::fs::symlink_file(target, dst)
    }
}

#[cfg(not(any(unix, windows)))]
fn create_symlink(_src: &Path, _target: &Path, _dst: &Path) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "symbolic links are not supported on this platform",
    ))
}

/// Create a single directory. An existing directory is accepted.
pub fn create_dir(path: &Path) -> Result<(), EngineError> {
    match fs::create_dir(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists && path.is_dir() => Ok(()),
        Err(e) => Err(EngineError::DirectoryCreationFailed {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

/// True if anything (file, directory or dangling link) exists at `path`.
pub fn path_exists(path: &Path) -> bool {
    fs::symlink_metadata(path).is_ok()
}

/// Remove whatever lives at `path`: a directory tree, a file or a link.
///
/// Links are removed, never followed. A missing path is not an error.
pub fn remove_path(path: &Path) -> io::Result<()> {
    match fs::symlink_metadata(path) {
        Ok(metadata) if metadata.is_dir() => fs::remove_dir_all(path),
        Ok(_) => remove_file_or_link(path),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

#[cfg(windows)]
fn remove_file_or_link(path: &Path) -> io::Result<()> {
    // Directory symlinks must be removed with remove_dir on Windows
    fs::remove_file(path).or_else(|_| fs::remove_dir(path))
}

#[cfg(not(windows))]
fn remove_file_or_link(path: &Path) -> io::Result<()> {
    fs::remove_file(path)
}
