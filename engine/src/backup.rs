//! Backup swap and rollback.
//!
//! A pre-existing destination is preserved by renaming it to its `_old`
//! sibling before anything is written. The rename is a single syscall, so the
//! original content is always reachable under one of the two names. Rollback
//! reverses the swap after a failed or cancelled copy.

use std::io;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use crate::error::EngineError;
use crate::fs_ops;
use crate::model::BackupState;

/// Pause before the single retry of a failed `_old` removal.
const CLEANUP_RETRY_DELAY: Duration = Duration::from_millis(250);

/// Delete a previous `_old` backup, retrying once on failure.
///
/// Returns `Ok(false)` when there was nothing to remove.
pub fn remove_old_backup(backup: &Path) -> Result<bool, EngineError> {
    if !fs_ops::path_exists(backup) {
        return Ok(false);
    }

    match fs_ops::remove_path(backup) {
        Ok(()) => {}
        Err(first) => {
            tracing::warn!(
                path = %backup.display(),
                error = %first,
                "removing old backup failed, retrying once"
            );
            thread::sleep(CLEANUP_RETRY_DELAY);
            fs_ops::remove_path(backup).map_err(|e| EngineError::BackupCleanupFailed {
                path: backup.to_path_buf(),
                source: e,
            })?;
        }
    }

    tracing::info!(path = %backup.display(), "deleted existing backup");
    Ok(true)
}

/// Rename `destination` to `backup`.
pub fn create_backup(destination: &Path, backup: &Path) -> Result<BackupState, EngineError> {
    std::fs::rename(destination, backup).map_err(|e| EngineError::BackupRenameFailed {
        from: destination.to_path_buf(),
        to: backup.to_path_buf(),
        source: e,
    })?;
    tracing::info!(
        from = %destination.display(),
        to = %backup.display(),
        "renamed destination to backup"
    );
    Ok(BackupState::DestinationRenamedToOld(destination.to_path_buf()))
}

/// Restore the pre-run destination from `backup`.
///
/// Discards the partially written destination, then renames the backup back
/// into place.
///
/// # Errors
/// `RollbackFailed` if either step fails; the message names both paths.
pub fn rollback(state: &BackupState, backup: &Path) -> Result<(), EngineError> {
    let destination = match state {
        BackupState::NoBackupTaken => return Ok(()),
        BackupState::DestinationRenamedToOld(original) => original,
    };

    let fail = |reason: String| EngineError::RollbackFailed {
        destination: destination.clone(),
        backup: backup.to_path_buf(),
        reason,
    };

    if !fs_ops::path_exists(backup) {
        return Err(fail("backup is missing".to_string()));
    }

    fs_ops::remove_path(destination)
        .map_err(|e| fail(format!("could not remove partial destination: {}", e)))?;

    std::fs::rename(backup, destination)
        .map_err(|e| fail(format!("could not rename backup into place: {}", e)))?;

    tracing::info!(
        destination = %destination.display(),
        "restored destination from backup"
    );
    Ok(())
}

/// Remove a destination this run created from scratch.
///
/// Used when a copy fails without a backup having been taken, so the
/// filesystem returns to its pre-run shape.
pub fn discard_partial(destination: &Path) -> io::Result<()> {
    fs_ops::remove_path(destination)
}

/// The `_old` path for `destination`, as an engine error when impossible.
pub fn backup_path(destination: &Path) -> Result<PathBuf, EngineError> {
    crate::model::backup_path_for(destination).ok_or_else(|| EngineError::InvalidRequest {
        reason: format!(
            "destination {} has no final component to derive a backup name from",
            destination.display()
        ),
    })
}
