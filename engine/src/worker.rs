//! Background execution of copy runs.
//!
//! `spawn_copy` moves a run onto its own thread so an interactive caller
//! never blocks. Everything the run has to say comes back over a crossbeam
//! channel: any number of `EngineMessage::Progress` followed by exactly one
//! `EngineMessage::Finished`.

use std::thread::{self, JoinHandle};

use crossbeam_channel::{unbounded, Receiver};

use crate::error::ErrorKind;
use crate::job;
use crate::model::{CancelToken, CopyOptions, CopyOutcome, CopyRequest};
use crate::progress::{ChannelSink, EngineMessage};

/// Handle to a run executing on a worker thread.
pub struct CopyHandle {
    events: Receiver<EngineMessage>,
    cancel: CancelToken,
    thread: JoinHandle<CopyOutcome>,
}

impl CopyHandle {
    /// Stream of progress messages, terminated by `Finished`.
    pub fn events(&self) -> &Receiver<EngineMessage> {
        &self.events
    }

    /// Ask the run to stop at its next check point.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Wait for the worker and return its outcome.
    pub fn join(self) -> CopyOutcome {
        self.thread.join().unwrap_or_else(|_| {
            tracing::error!("copy worker panicked");
            CopyOutcome::Failed {
                reason: ErrorKind::CopyFailed,
                message: "worker thread panicked".to_string(),
                rolled_back: false,
            }
        })
    }
}

/// Spawn a background worker thread to execute a copy request.
pub fn spawn_copy(request: CopyRequest, options: CopyOptions) -> std::io::Result<CopyHandle> {
    let (tx, rx) = unbounded::<EngineMessage>();
    let cancel = request.cancel.clone();

    let thread = thread::Builder::new()
        .name(format!("copy-{}", request.id))
        .spawn(move || {
            let sink = ChannelSink::new(tx.clone());
            let outcome = job::run(&request, &options, Some(&sink));
            let _ = tx.send(EngineMessage::Finished(outcome.clone()));
            outcome
        })?;

    Ok(CopyHandle {
        events: rx,
        cancel,
        thread,
    })
}
