//! Core data model for copy runs.
//!
//! This module defines the data structures that flow through a run:
//! - CopyRequest / CancelToken: what to copy and how to stop it
//! - CopyOptions: knobs that change how the copy behaves
//! - CopyOutcome: the single terminal result of a run
//! - ProgressEvent / Stage: the status stream emitted while running
//! - EngineState / BackupState: internal bookkeeping for one run

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::checksums::ChecksumAlgorithm;
use crate::error::ErrorKind;

/// Suffix appended to the destination's final component to name the backup.
pub const BACKUP_SUFFIX: &str = "_old";

/// Cooperative cancellation flag shared between the caller and a run.
///
/// Cloning yields another handle to the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the run to stop at the next check point.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// The shared flag, for wiring into signal handlers.
    pub fn flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.flag)
    }
}

/// A single request to copy `source_path` over `destination_path`.
#[derive(Debug, Clone)]
pub struct CopyRequest {
    /// Identifier used to correlate log lines of one run
    pub id: Uuid,

    /// Root source directory
    pub source_path: PathBuf,

    /// Root destination directory (may not exist yet)
    pub destination_path: PathBuf,

    /// Flag the caller sets to stop the run
    pub cancel: CancelToken,
}

impl CopyRequest {
    pub fn new<P: AsRef<Path>, Q: AsRef<Path>>(source: P, destination: Q) -> Self {
        CopyRequest {
            id: Uuid::new_v4(),
            source_path: source.as_ref().to_path_buf(),
            destination_path: destination.as_ref().to_path_buf(),
            cancel: CancelToken::new(),
        }
    }

    /// Path of the backup sibling, e.g. `/data/b` -> `/data/b_old`.
    ///
    /// Returns `None` when the destination has no final component.
    pub fn backup_path(&self) -> Option<PathBuf> {
        backup_path_for(&self.destination_path)
    }
}

/// Build the `_old` sibling path for a destination.
pub fn backup_path_for(destination: &Path) -> Option<PathBuf> {
    let name = destination.file_name()?;
    let mut backup_name = name.to_os_string();
    backup_name.push(BACKUP_SUFFIX);
    Some(destination.with_file_name(backup_name))
}

/// Extra free space demanded on top of the source size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SpaceReserve {
    /// Exact comparison: required <= available
    #[default]
    None,
    /// A fixed number of bytes
    Bytes(u64),
    /// A percentage of the required bytes, rounded up
    Percent(u8),
}

impl SpaceReserve {
    /// Bytes to reserve for a tree of `required` bytes.
    pub fn reserve_for(&self, required: u64) -> u64 {
        match *self {
            SpaceReserve::None => 0,
            SpaceReserve::Bytes(bytes) => bytes,
            SpaceReserve::Percent(pct) => {
                let pct = u64::from(pct.min(100));
                required.saturating_mul(pct).div_ceil(100)
            }
        }
    }
}

/// Options controlling a run.
#[derive(Debug, Clone)]
pub struct CopyOptions {
    /// Free-space margin required beyond the source size
    pub space_reserve: SpaceReserve,

    /// Copy source modification times onto destination files
    pub preserve_mtime: bool,

    /// Re-hash every copied file and compare with its source
    pub verify: Option<ChecksumAlgorithm>,
}

impl Default for CopyOptions {
    fn default() -> Self {
        CopyOptions {
            space_reserve: SpaceReserve::None,
            preserve_mtime: true,
            verify: None,
        }
    }
}

/// Terminal result of a run. Exactly one is produced per request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CopyOutcome {
    Success {
        files_copied: u64,
        bytes_copied: u64,
    },
    Failed {
        reason: ErrorKind,
        message: String,
        /// True when the pre-run destination was restored from `_old`
        rolled_back: bool,
    },
}

impl CopyOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, CopyOutcome::Success { .. })
    }

    /// True when the filesystem may be left inconsistent.
    pub fn is_degraded(&self) -> bool {
        matches!(
            self,
            CopyOutcome::Failed {
                reason: ErrorKind::RollbackFailed,
                ..
            }
        )
    }

    pub fn reason(&self) -> Option<ErrorKind> {
        match self {
            CopyOutcome::Success { .. } => None,
            CopyOutcome::Failed { reason, .. } => Some(*reason),
        }
    }
}

/// Stage reported in a progress event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Stage {
    Analyzing,
    PreparingDestination,
    RemovingOldBackup,
    CreatingBackup,
    Copying,
    RollingBack,
    Completed,
    Cancelled,
    Failed,
}

impl Stage {
    /// Fixed percent at which a stage begins, if it has one.
    pub fn base_percent(&self) -> Option<u8> {
        match self {
            Stage::Analyzing => Some(5),
            Stage::PreparingDestination => Some(10),
            Stage::RemovingOldBackup => Some(15),
            Stage::CreatingBackup => Some(20),
            Stage::Copying => Some(COPY_START_PERCENT),
            Stage::Completed => Some(100),
            Stage::RollingBack | Stage::Cancelled | Stage::Failed => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Stage::Completed | Stage::Cancelled | Stage::Failed)
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Stage::Analyzing => "Analyzing source",
            Stage::PreparingDestination => "Preparing destination",
            Stage::RemovingOldBackup => "Removing old backup",
            Stage::CreatingBackup => "Creating backup",
            Stage::Copying => "Copying",
            Stage::RollingBack => "Rolling back",
            Stage::Completed => "Completed",
            Stage::Cancelled => "Cancelled",
            Stage::Failed => "Failed",
        };
        f.write_str(label)
    }
}

pub const COPY_START_PERCENT: u8 = 25;
pub const COPY_END_PERCENT: u8 = 95;

/// Percent reached after `done` of `total` entries have been copied.
pub fn copy_percent(done: u64, total: u64) -> u8 {
    if total == 0 {
        return COPY_END_PERCENT;
    }
    let span = u64::from(COPY_END_PERCENT - COPY_START_PERCENT);
    let done = done.min(total);
    COPY_START_PERCENT + (span * done / total) as u8
}

/// A unit of status emitted while a run progresses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub stage: Stage,

    /// 0..=100, never decreasing within one run
    pub percent: u8,

    /// Relative path of the entry being processed, when relevant
    pub current_item: Option<String>,

    pub files_done: u64,
    pub files_total: u64,
}

/// Lifecycle of the engine during one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Idle,
    Analyzing,
    PreparingBackup,
    Copying,
    RollingBack,
    Completed,
    Failed,
}

impl EngineState {
    /// Whether the machine may move from `self` to `next`.
    pub fn can_transition_to(&self, next: EngineState) -> bool {
        use EngineState::*;
        matches!(
            (self, next),
            (Idle, Analyzing)
                | (Analyzing, PreparingBackup)
                | (Analyzing, Failed)
                | (PreparingBackup, Copying)
                | (PreparingBackup, Failed)
                | (Copying, Completed)
                | (Copying, RollingBack)
                | (Copying, Failed)
                | (RollingBack, Failed)
        )
    }
}

/// Whether the destination has been moved aside during this run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackupState {
    NoBackupTaken,
    DestinationRenamedToOld(PathBuf),
}
