//! Error types for the copy engine.
//!
//! `EngineError` is the rich, internal error type: it carries the paths and
//! underlying `io::Error`s that explain what went wrong. It never crosses the
//! engine boundary. `job::run` flattens it into an `ErrorKind` plus a
//! human-readable message inside `CopyOutcome::Failed`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Failure taxonomy reported to callers in `CopyOutcome::Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Source path is missing or not a directory
    SourceNotFound,
    /// Source and destination overlap or cannot be paired
    InvalidRequest,
    /// Destination volume cannot hold the source tree
    InsufficientSpace,
    /// A previous `_old` backup could not be removed
    BackupCleanupFailed,
    /// The destination could not be renamed to `_old`
    BackupRenameFailed,
    /// Copying the tree failed
    CopyFailed,
    /// The caller asked the run to stop
    Cancelled,
    /// Restoring the `_old` backup failed; the filesystem needs inspection
    RollbackFailed,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::SourceNotFound => "source not found",
            ErrorKind::InvalidRequest => "invalid request",
            ErrorKind::InsufficientSpace => "insufficient space",
            ErrorKind::BackupCleanupFailed => "backup cleanup failed",
            ErrorKind::BackupRenameFailed => "backup rename failed",
            ErrorKind::CopyFailed => "copy failed",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::RollbackFailed => "rollback failed",
        };
        f.write_str(name)
    }
}

/// Errors raised while validating, backing up, copying or restoring.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Source directory not found: {}", path.display())]
    SourceNotFound { path: PathBuf },

    #[error("Source is not a directory: {}", path.display())]
    SourceNotDirectory { path: PathBuf },

    #[error("Invalid request: {reason}")]
    InvalidRequest { reason: String },

    #[error("Insufficient space on destination: need {required} bytes, have {available} bytes")]
    InsufficientSpace { required: u64, available: u64 },

    #[error(
        "Free space on the destination volume is unknown: could not query {}: {source}",
        path.display()
    )]
    SpaceQueryFailed { path: PathBuf, source: io::Error },

    #[error("Failed to enumerate directory {}: {source}", path.display())]
    EnumerationFailed { path: PathBuf, source: io::Error },

    #[error("Failed to remove old backup {}: {source}", path.display())]
    BackupCleanupFailed { path: PathBuf, source: io::Error },

    #[error("Failed to rename {} to {}: {source}", from.display(), to.display())]
    BackupRenameFailed {
        from: PathBuf,
        to: PathBuf,
        source: io::Error,
    },

    #[error("Unsupported {kind} in source: {}", path.display())]
    UnsupportedEntry { path: PathBuf, kind: &'static str },

    #[error("Failed to read {}: {source}", path.display())]
    ReadError { path: PathBuf, source: io::Error },

    #[error("Failed to write {}: {source}", path.display())]
    WriteError { path: PathBuf, source: io::Error },

    #[error("Failed to create directory {}: {source}", path.display())]
    DirectoryCreationFailed { path: PathBuf, source: io::Error },

    #[error("Checksum mismatch after copying {}", path.display())]
    VerificationFailed { path: PathBuf },

    #[error("Copy cancelled")]
    Cancelled,

    #[error(
        "Rollback failed: {reason}. Original data may now be only in {}; inspect {} manually",
        backup.display(),
        destination.display()
    )]
    RollbackFailed {
        destination: PathBuf,
        backup: PathBuf,
        reason: String,
    },
}

impl EngineError {
    /// Map this error onto the caller-facing taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::SourceNotFound { .. } | Self::SourceNotDirectory { .. } => {
                ErrorKind::SourceNotFound
            }
            Self::InvalidRequest { .. } => ErrorKind::InvalidRequest,
            Self::InsufficientSpace { .. } | Self::SpaceQueryFailed { .. } => {
                ErrorKind::InsufficientSpace
            }
            Self::BackupCleanupFailed { .. } => ErrorKind::BackupCleanupFailed,
            Self::BackupRenameFailed { .. } => ErrorKind::BackupRenameFailed,
            Self::EnumerationFailed { .. }
            | Self::UnsupportedEntry { .. }
            | Self::ReadError { .. }
            | Self::WriteError { .. }
            | Self::DirectoryCreationFailed { .. }
            | Self::VerificationFailed { .. } => ErrorKind::CopyFailed,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::RollbackFailed { .. } => ErrorKind::RollbackFailed,
        }
    }

    /// Extract the OS error code from this error, if available.
    pub fn raw_os_error(&self) -> Option<i32> {
        match self {
            Self::SpaceQueryFailed { source, .. }
            | Self::EnumerationFailed { source, .. }
            | Self::BackupCleanupFailed { source, .. }
            | Self::BackupRenameFailed { source, .. }
            | Self::ReadError { source, .. }
            | Self::WriteError { source, .. }
            | Self::DirectoryCreationFailed { source, .. } => source.raw_os_error(),
            _ => None,
        }
    }
}
