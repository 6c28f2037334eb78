//! Copy orchestration.
//!
//! `run` drives one request through the engine's state machine:
//!
//! ```text
//! Idle -> Analyzing -> PreparingBackup -> Copying -> Completed
//!                                            \-> RollingBack -> Failed
//! ```
//!
//! Every failure is caught here and turned into a `CopyOutcome::Failed`;
//! nothing escapes the engine boundary as an error or panic.

use std::path::{Path, PathBuf};

use crate::backup;
use crate::checksums;
use crate::error::{EngineError, ErrorKind};
use crate::fs_ops::{self, EntryKind, TreePlan};
use crate::model::{
    copy_percent, BackupState, CopyOptions, CopyOutcome, CopyRequest, EngineState,
    ProgressEvent, Stage,
};
use crate::progress::ProgressSink;
use crate::space;

/// Emits progress events and keeps `percent` from ever going backwards.
struct Reporter<'a> {
    sink: Option<&'a dyn ProgressSink>,
    percent: u8,
    files_done: u64,
    files_total: u64,
}

impl<'a> Reporter<'a> {
    fn new(sink: Option<&'a dyn ProgressSink>) -> Self {
        Reporter {
            sink,
            percent: 0,
            files_done: 0,
            files_total: 0,
        }
    }

    fn emit(&mut self, stage: Stage, percent: Option<u8>, current_item: Option<String>) {
        if let Some(p) = percent {
            self.percent = self.percent.max(p.min(100));
        }
        if let Some(sink) = self.sink {
            sink.on_progress(&ProgressEvent {
                stage,
                percent: self.percent,
                current_item,
                files_done: self.files_done,
                files_total: self.files_total,
            });
        }
    }

    fn stage(&mut self, stage: Stage) {
        self.emit(stage, stage.base_percent(), None);
    }

    fn entry_copied(&mut self, relative_path: &Path) {
        self.files_done += 1;
        let percent = copy_percent(self.files_done, self.files_total);
        self.emit(
            Stage::Copying,
            Some(percent),
            Some(relative_path.display().to_string()),
        );
    }
}

/// Mutable bookkeeping for a single run.
struct Run<'a> {
    request: &'a CopyRequest,
    options: &'a CopyOptions,
    reporter: Reporter<'a>,
    state: EngineState,
    backup: BackupState,
    backup_path: Option<PathBuf>,
}

impl<'a> Run<'a> {
    fn transition(&mut self, next: EngineState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "illegal transition {:?} -> {:?}",
            self.state,
            next
        );
        tracing::debug!(from = ?self.state, to = ?next, "state transition");
        self.state = next;
    }

    fn destination(&self) -> &'a Path {
        &self.request.destination_path
    }

    /// Analyzing: run the precondition checker.
    fn analyze(&mut self) -> Result<TreePlan, EngineError> {
        self.transition(EngineState::Analyzing);
        self.reporter.stage(Stage::Analyzing);

        let report = space::check_request(self.request, self.options)?;
        tracing::info!(
            files = report.files_total,
            dirs = report.dirs_total,
            bytes = report.required_bytes,
            available = report.available_bytes,
            "source analyzed"
        );
        self.reporter.files_total = report.files_total;
        Ok(report.plan)
    }

    /// PreparingDestination plus the backup swap when the destination exists.
    fn prepare_destination(&mut self) -> Result<(), EngineError> {
        self.transition(EngineState::PreparingBackup);
        self.reporter.stage(Stage::PreparingDestination);

        let destination = self.destination();
        if !fs_ops::path_exists(destination) {
            tracing::debug!(destination = %destination.display(), "destination absent, no backup needed");
            return Ok(());
        }

        let backup_path = backup::backup_path(destination)?;

        self.reporter.stage(Stage::RemovingOldBackup);
        backup::remove_old_backup(&backup_path)?;

        self.reporter.stage(Stage::CreatingBackup);
        self.backup = backup::create_backup(destination, &backup_path)?;
        self.backup_path = Some(backup_path);
        Ok(())
    }

    fn check_cancelled(&self) -> Result<(), EngineError> {
        if self.request.cancel.is_cancelled() {
            tracing::info!("cancellation observed");
            return Err(EngineError::Cancelled);
        }
        Ok(())
    }

    /// Copying: recreate directories first, then files and links.
    fn copy_tree(&mut self, plan: &TreePlan) -> Result<(u64, u64), EngineError> {
        self.transition(EngineState::Copying);
        self.reporter.stage(Stage::Copying);
        self.check_cancelled()?;

        let source = &self.request.source_path;
        let destination = self.destination();

        std::fs::create_dir_all(destination).map_err(|e| {
            EngineError::DirectoryCreationFailed {
                path: destination.to_path_buf(),
                source: e,
            }
        })?;

        for dir in plan.dirs() {
            self.check_cancelled()?;
            fs_ops::create_dir(&destination.join(&dir.relative_path))?;
        }

        let mut files_copied = 0u64;
        let mut bytes_copied = 0u64;

        for entry in plan.files() {
            self.check_cancelled()?;

            let src = source.join(&entry.relative_path);
            let dst = destination.join(&entry.relative_path);
            let bytes = match entry.kind {
                EntryKind::Symlink => fs_ops::copy_symlink(&src, &dst)?,
                _ => {
                    let bytes =
                        fs_ops::copy_file_with_metadata(&src, &dst, self.options.preserve_mtime)?;
                    if let Some(algorithm) = self.options.verify {
                        if !checksums::verify_copy(&src, &dst, algorithm)? {
                            return Err(EngineError::VerificationFailed { path: dst });
                        }
                    }
                    bytes
                }
            };
            tracing::trace!(path = %entry.relative_path.display(), bytes, "copied");

            files_copied += 1;
            bytes_copied += bytes;
            self.reporter.entry_copied(&entry.relative_path);
        }

        Ok((files_copied, bytes_copied))
    }

    /// Undo whatever the failed copy left behind, then report the failure.
    fn recover(mut self, error: EngineError) -> CopyOutcome {
        tracing::warn!(error = %error, "copy failed, recovering");

        let backup_path = match (&self.backup, &self.backup_path) {
            (BackupState::DestinationRenamedToOld(_), Some(path)) => Some(path.clone()),
            _ => None,
        };

        match backup_path {
            Some(backup_path) => {
                self.transition(EngineState::RollingBack);
                self.reporter.stage(Stage::RollingBack);
                match backup::rollback(&self.backup, &backup_path) {
                    Ok(()) => self.fail(error, true),
                    Err(rollback_error) => self.fail(rollback_error, false),
                }
            }
            None => {
                let destination = self.destination();
                if let Err(e) = backup::discard_partial(destination) {
                    tracing::warn!(
                        destination = %destination.display(),
                        error = %e,
                        "could not remove partially copied destination"
                    );
                }
                self.fail(error, false)
            }
        }
    }

    fn fail(mut self, error: EngineError, rolled_back: bool) -> CopyOutcome {
        self.transition(EngineState::Failed);
        let kind = error.kind();
        let message = error.to_string();
        let os_error = error.raw_os_error();

        match kind {
            ErrorKind::Cancelled => {
                tracing::warn!(rolled_back, "copy cancelled");
                self.reporter.stage(Stage::Cancelled);
            }
            ErrorKind::RollbackFailed => {
                tracing::error!(
                    error = %message,
                    "ROLLBACK FAILED: destination may be inconsistent, manual inspection required"
                );
                self.reporter.stage(Stage::Failed);
            }
            _ => {
                tracing::error!(
                    reason = %kind,
                    error = %message,
                    os_error = ?os_error,
                    rolled_back,
                    "copy failed"
                );
                self.reporter.stage(Stage::Failed);
            }
        }

        CopyOutcome::Failed {
            reason: kind,
            message,
            rolled_back,
        }
    }
}

/// Execute a copy request on the current thread.
///
/// Blocks until the run finishes; use `worker::spawn_copy` to run it off the
/// caller's thread. Progress is reported through `progress`, if given.
///
/// The caller must not run two requests on the same destination at once and
/// must keep other processes away from the destination and its `_old`
/// sibling for the duration of the run.
pub fn run(
    request: &CopyRequest,
    options: &CopyOptions,
    progress: Option<&dyn ProgressSink>,
) -> CopyOutcome {
    let span = tracing::info_span!("copy", run_id = %request.id);
    let _guard = span.enter();

    tracing::info!(
        source = %request.source_path.display(),
        destination = %request.destination_path.display(),
        "starting copy"
    );

    let mut run = Run {
        request,
        options,
        reporter: Reporter::new(progress),
        state: EngineState::Idle,
        backup: BackupState::NoBackupTaken,
        backup_path: None,
    };

    let plan = match run.analyze() {
        Ok(plan) => plan,
        Err(e) => return run.fail(e, false),
    };

    if let Err(e) = run.prepare_destination() {
        // Nothing on disk changed: cleanup or rename failed before the swap
        return run.fail(e, false);
    }

    match run.copy_tree(&plan) {
        Ok((files_copied, bytes_copied)) => {
            run.transition(EngineState::Completed);
            run.reporter.stage(Stage::Completed);
            tracing::info!(files_copied, bytes_copied, "copy completed");
            CopyOutcome::Success {
                files_copied,
                bytes_copied,
            }
        }
        Err(e) => run.recover(e),
    }
}
