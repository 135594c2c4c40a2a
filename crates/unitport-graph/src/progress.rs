//! Progress reporting
//!
//! Components take a `&dyn ProgressSink` argument instead of publishing to
//! process-wide state, so each call's progress goes exactly where its caller
//! wants it.

use crate::node::NodeStatus;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Progress event emitted by resolution, detection and transfer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ProgressEvent {
    /// A pipeline stage started
    Stage { name: String },

    /// A definition was fetched during discovery
    DefinitionFetched { name: String, found: bool },

    /// A node's status was settled
    NodeResolved {
        name: String,
        status: NodeStatus,
        depth: usize,
    },

    /// Resolution finished
    ResolutionFinished {
        root: String,
        nodes: usize,
        found: usize,
        missing: usize,
    },

    /// Target installation indexed
    TargetScanned { definitions: usize, files: usize },

    /// Conflict detected
    ConflictFound { name: String, kind: String },

    /// One file written into the destination
    FileTransferred {
        relative_path: String,
        index: usize,
        total: usize,
    },

    /// Transfer aborted on a file
    TransferFailed {
        relative_path: String,
        reason: String,
    },

    /// Operations undone
    RolledBack { operations: usize },
}

/// Receiver of progress events
pub trait ProgressSink: Send + Sync {
    /// Deliver one event; must not block
    fn emit(&self, event: ProgressEvent);
}

/// Discards every event
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSink;

impl ProgressSink for NoopSink {
    #[inline]
    fn emit(&self, _event: ProgressEvent) {}
}

/// Forwards events to `tracing` at debug level
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl ProgressSink for TracingSink {
    fn emit(&self, event: ProgressEvent) {
        tracing::debug!(?event, "progress");
    }
}

impl ProgressSink for mpsc::UnboundedSender<ProgressEvent> {
    fn emit(&self, event: ProgressEvent) {
        // Receiver gone means nobody is listening any more.
        let _ = self.send(event);
    }
}

/// Keeps every event in memory
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<ProgressEvent>>,
}

impl RecordingSink {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of recorded events
    #[must_use]
    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events.lock().clone()
    }

    /// Number of events matching a predicate
    pub fn count(&self, predicate: impl Fn(&ProgressEvent) -> bool) -> usize {
        self.events.lock().iter().filter(|e| predicate(e)).count()
    }
}

impl ProgressSink for RecordingSink {
    fn emit(&self, event: ProgressEvent) {
        self.events.lock().push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_sink_keeps_order() {
        let sink = RecordingSink::new();
        sink.emit(ProgressEvent::Stage {
            name: "resolve".to_string(),
        });
        sink.emit(ProgressEvent::RolledBack { operations: 2 });

        let events = sink.events();
        assert_eq!(events.len(), 2);
        assert!(matches!(events[1], ProgressEvent::RolledBack { operations: 2 }));
        assert_eq!(sink.count(|e| matches!(e, ProgressEvent::Stage { .. })), 1);
    }

    #[tokio::test]
    async fn channel_sink_delivers_events() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        tx.emit(ProgressEvent::TargetScanned {
            definitions: 3,
            files: 4,
        });
        drop(tx);

        let event = rx.recv().await.unwrap();
        assert_eq!(
            event,
            ProgressEvent::TargetScanned {
                definitions: 3,
                files: 4
            }
        );
    }

    #[test]
    fn channel_sink_ignores_closed_receiver() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        tx.emit(ProgressEvent::RolledBack { operations: 0 });
    }
}
