//! # Copier Engine - Backup-and-Copy Library
//!
//! A headless engine that copies a directory tree over a destination while
//! keeping the destination's previous contents safe.
//!
//! ## Overview
//!
//! A run goes through four steps:
//! - Analyze the source tree and check free space on the destination volume
//! - Move an existing destination aside to `<destination>_old` (one rename)
//! - Copy the tree, reporting progress and honouring cancellation
//! - On failure or cancellation, put the original destination back
//!
//! The `_old` backup is kept after a successful run as a safety copy; the
//! next run replaces it, so at most one generation exists.
//!
//! ## Basic Usage
//!
//! ```no_run
//! use copier_engine::{spawn_copy, CopyOptions, CopyRequest, EngineMessage};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let request = CopyRequest::new("/data/projects", "/mnt/share/projects");
//! let handle = spawn_copy(request, CopyOptions::default())?;
//!
//! for message in handle.events().iter() {
//!     match message {
//!         EngineMessage::Progress(event) => println!("{:>3}% {}", event.percent, event.stage),
//!         EngineMessage::Finished(outcome) => println!("{:?}", outcome),
//!     }
//! }
//! let _outcome = handle.join();
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - **model**: Requests, options, outcomes and progress events
//! - **error**: Error taxonomy
//! - **space**: Read-only precondition and free-space checks
//! - **fs_ops**: Tree walking, file copying and removal
//! - **backup**: The `_old` swap and its rollback
//! - **job**: The run state machine
//! - **progress**: Progress sink trait and channel sink
//! - **worker**: Running a job on a background thread
//! - **checksums**: Optional verify-after-copy

pub mod backup;
pub mod checksums;
pub mod error;
pub mod fs_ops;
pub mod job;
pub mod model;
pub mod progress;
pub mod space;
pub mod worker;

// Re-export main types and functions
pub use checksums::{compute_file_checksum, ChecksumAlgorithm, ChecksumValue};
pub use error::{EngineError, ErrorKind};
pub use job::run;
pub use model::{
    backup_path_for, BackupState, CancelToken, CopyOptions, CopyOutcome, CopyRequest,
    EngineState, ProgressEvent, SpaceReserve, Stage, BACKUP_SUFFIX,
};
pub use progress::{ChannelSink, EngineMessage, ProgressSink};
pub use space::{check, check_request, SpaceReport};
pub use worker::{spawn_copy, CopyHandle};
