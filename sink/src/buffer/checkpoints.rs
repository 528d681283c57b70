use serde_json::Value;
use tracing::debug;

/// Tracks checkpoint messages that cannot be emitted yet.
///
/// A checkpoint covers whatever streams had buffered records when it arrived.
/// Emitting it early would claim durability for rows still sitting in memory,
/// so it is held until every covered stream has flushed. Checkpoints are kept
/// in arrival order; when several become eligible at once, only the most
/// recent one is worth emitting and the caller drops the rest.
#[derive(Debug, Default)]
pub struct CheckpointTracker {
    pending: Vec<PendingCheckpoint>,
}

#[derive(Debug)]
struct PendingCheckpoint {
    value: Value,
    dirty_streams: Vec<String>,
}

impl CheckpointTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Holds a checkpoint until all of `dirty_streams` have flushed.
    pub fn push(&mut self, value: Value, dirty_streams: Vec<String>) {
        debug!(
            streams = ?dirty_streams,
            "holding checkpoint until covered streams flush"
        );
        self.pending.push(PendingCheckpoint {
            value,
            dirty_streams,
        });
    }

    /// Marks `stream` as flushed on every pending checkpoint.
    pub fn mark_clean(&mut self, stream: &str) {
        for checkpoint in &mut self.pending {
            checkpoint.dirty_streams.retain(|s| s != stream);
        }
    }

    /// Removes and returns all checkpoints whose covered streams have all
    /// flushed, oldest first.
    pub fn take_ready(&mut self) -> Vec<Value> {
        let mut ready = Vec::new();
        self.pending.retain_mut(|checkpoint| {
            if checkpoint.dirty_streams.is_empty() {
                ready.push(checkpoint.value.take());
                false
            } else {
                true
            }
        });

        ready
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}
