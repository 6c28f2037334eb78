//! Progress reporting.
//!
//! This module defines the `ProgressSink` trait, which decouples the copy
//! engine from whatever surface displays status (CLI, GUI, tests).
//!
//! Sinks are invoked synchronously on the thread executing the run. When the
//! run executes on a worker (see `worker::spawn_copy`), `ChannelSink` forwards
//! every event through a crossbeam channel so the caller's thread only ever
//! reads messages and never shares mutable state with the engine.

use crossbeam_channel::Sender;
use serde::{Deserialize, Serialize};

use crate::model::{CopyOutcome, ProgressEvent};

/// Receives progress events from a run.
pub trait ProgressSink: Send + Sync {
    /// Called at every stage transition and after every copied entry.
    fn on_progress(&self, event: &ProgressEvent);
}

/// Item carried over the worker channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EngineMessage {
    Progress(ProgressEvent),
    /// Always the last message of a run
    Finished(CopyOutcome),
}

/// A ProgressSink that forwards events into a channel.
pub struct ChannelSink {
    sender: Sender<EngineMessage>,
}

impl ChannelSink {
    pub fn new(sender: Sender<EngineMessage>) -> Self {
        ChannelSink { sender }
    }
}

impl ProgressSink for ChannelSink {
    fn on_progress(&self, event: &ProgressEvent) {
        // A dropped receiver only means nobody is watching any more
        let _ = self.sender.send(EngineMessage::Progress(event.clone()));
    }
}

impl<F> ProgressSink for F
where
    F: Fn(&ProgressEvent) + Send + Sync,
{
    fn on_progress(&self, event: &ProgressEvent) {
        self(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Stage;
    use crossbeam_channel::unbounded;

    fn event(stage: Stage, percent: u8) -> ProgressEvent {
        ProgressEvent {
            stage,
            percent,
            current_item: None,
            files_done: 0,
            files_total: 0,
        }
    }

    #[test]
    fn test_channel_sink_forwards_events() {
        let (tx, rx) = unbounded();
        let sink = ChannelSink::new(tx);
        sink.on_progress(&event(Stage::Analyzing, 5));
        sink.on_progress(&event(Stage::PreparingDestination, 10));

        let received: Vec<_> = rx.try_iter().collect();
        assert_eq!(
            received,
            vec![
                EngineMessage::Progress(event(Stage::Analyzing, 5)),
                EngineMessage::Progress(event(Stage::PreparingDestination, 10)),
            ]
        );
    }

    #[test]
    fn test_channel_sink_tolerates_closed_receiver() {
        let (tx, rx) = unbounded();
        drop(rx);
        ChannelSink::new(tx).on_progress(&event(Stage::Copying, 25));
    }

    #[test]
    fn test_closure_sink() {
        let seen = std::sync::Mutex::new(Vec::new());
        let sink = |e: &ProgressEvent| seen.lock().unwrap().push(e.percent);
        sink.on_progress(&event(Stage::Analyzing, 5));
        assert_eq!(*seen.lock().unwrap(), vec![5]);
    }
}
