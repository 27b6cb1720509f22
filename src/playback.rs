//! Gap-free playback scheduling for streamed response audio.
//!
//! Each incoming buffer starts when the previous one ends, or immediately if
//! the queue has drained. An interruption drops everything still queued and
//! resets the cursor.

use serde::Serialize;
use std::collections::BTreeMap;

/// One buffer placed on the playback timeline (seconds on the session clock).
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledSource {
    pub id: u64,
    pub start_at: f64,
    pub duration: f64,
}

impl ScheduledSource {
    pub fn end_at(&self) -> f64 {
        self.start_at + self.duration
    }
}

#[derive(Debug, Default)]
pub struct PlaybackScheduler {
    next_start_time: f64,
    next_id: u64,
    sources: BTreeMap<u64, ScheduledSource>,
}

impl PlaybackScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Places a buffer of `duration` seconds at `max(cursor, now)` and moves
    /// the cursor to its end.
    pub fn schedule(&mut self, duration: f64, now: f64) -> ScheduledSource {
        self.prune(now);

        let start_at = self.next_start_time.max(now);
        let source = ScheduledSource {
            id: self.next_id,
            start_at,
            duration: duration.max(0.0),
        };

        self.next_id += 1;
        self.next_start_time = source.end_at();
        self.sources.insert(source.id, source);
        source
    }

    /// Stops every source that has not finished by `now`, forgets all
    /// sources and resets the cursor to zero. Returns the stopped ids.
    pub fn interrupt(&mut self, now: f64) -> Vec<u64> {
        let stopped = self
            .sources
            .values()
            .filter(|s| s.end_at() > now)
            .map(|s| s.id)
            .collect();

        self.sources.clear();
        self.next_start_time = 0.0;
        stopped
    }

    /// Marks a source as ended ahead of its scheduled end.
    pub fn mark_ended(&mut self, id: u64) {
        self.sources.remove(&id);
    }

    /// Drops every tracked source and resets the cursor.
    pub fn close(&mut self) {
        self.sources.clear();
        self.next_start_time = 0.0;
    }

    /// Forgets sources that finished playing by `now`.
    pub fn prune(&mut self, now: f64) {
        self.sources.retain(|_, s| s.end_at() > now);
    }

    pub fn next_start_time(&self) -> f64 {
        self.next_start_time
    }

    pub fn active_count(&self) -> usize {
        self.sources.len()
    }
}
