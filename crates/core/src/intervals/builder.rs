//! Scans presence transitions into maximal offline intervals.
//!
//! # Algorithm
//! 1. Drop duplicate `source_event_id`s within the batch (first arrival wins)
//! 2. Sort by `(timestamp, id)` for deterministic processing
//! 3. Drop stragglers older than the watermark timestamp
//! 4. Fold over transitions: `offline` opens an interval, any active status
//!    closes it; a new `offline` landing within the merge gap of the most
//!    recently closed interval reopens it, recording the absorbed wake gap
//!
//! Reopening also applies across pass boundaries: the caller hands in the
//! user's most recently persisted interval and a merge re-emits it under its
//! original id so the stored row is extended rather than duplicated.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use noctua_domain::{
    InferenceConfig, OfflineInterval, OpenInterval, PresenceEvent, PresenceStatus, Watermark,
};
use tracing::warn;

/// Result of folding one batch of events into interval state.
#[derive(Debug, Clone, Default)]
pub struct BuiltIntervals {
    /// Intervals closed by this batch, in start order. An entry may carry
    /// the id of an already-stored row it extends.
    pub closed: Vec<OfflineInterval>,
    /// Interval still open when the batch ended; carried on the watermark.
    pub open: Option<OpenInterval>,
    /// Events that participated in the fold.
    pub consumed: u64,
    /// Duplicates and stragglers rejected per-event.
    pub skipped: u64,
    /// Latest event timestamp incorporated, merged with the prior watermark.
    pub last_event_ts: Option<DateTime<Utc>>,
}

/// Builds offline intervals from presence transitions.
pub struct IntervalBuilder {
    config: InferenceConfig,
}

impl IntervalBuilder {
    pub fn new(config: InferenceConfig) -> Self {
        Self { config }
    }

    /// Fold a batch of events into the interval state carried by `watermark`.
    ///
    /// `resume` is the user's most recently persisted interval, consulted
    /// only when nothing is open and the first offline transition lands
    /// within the merge gap of its end.
    pub fn build(
        &self,
        user_id: i64,
        events: Vec<PresenceEvent>,
        watermark: &Watermark,
        resume: Option<OfflineInterval>,
    ) -> BuiltIntervals {
        let mut skipped = 0_u64;
        let mut scan = self.prepare(user_id, events, watermark, &mut skipped);

        let consumed = scan.len() as u64;
        let mut open = watermark.open_interval.clone();
        // A persisted interval can only be resumed while nothing is open.
        let mut resume = if open.is_none() { resume } else { None };
        let mut closed: Vec<OfflineInterval> = Vec::new();
        let mut last_event_ts = watermark.last_event_ts;

        for (position, event) in scan.drain(..).enumerate() {
            match event.status {
                PresenceStatus::Offline => {
                    if open.is_none() {
                        open = Some(self.open_at(event.timestamp, &mut closed, &mut resume));
                    }
                }
                PresenceStatus::Online | PresenceStatus::RecentlyActive => {
                    if let Some(interval) = open.take() {
                        // Zero-duration flickers are dropped outright.
                        if event.timestamp > interval.start {
                            closed.push(interval.close(user_id, event.timestamp));
                        }
                    } else if position == 0 && event.status == PresenceStatus::Online {
                        // Stream begins mid-offline: the collector missed the
                        // offline transition, so the start is approximated at
                        // the watermark boundary.
                        if let Some(boundary) = watermark.last_event_ts {
                            if event.timestamp > boundary {
                                let mut interval =
                                    OfflineInterval::new(user_id, boundary, event.timestamp);
                                interval.start_approximated = true;
                                closed.push(interval);
                            }
                        }
                    }
                }
            }
            last_event_ts = Some(last_event_ts.map_or(event.timestamp, |ts| ts.max(event.timestamp)));
        }

        BuiltIntervals { closed, open, consumed, skipped, last_event_ts }
    }

    /// Dedupe, sort, and drop stragglers; returns the scan sequence.
    fn prepare(
        &self,
        user_id: i64,
        events: Vec<PresenceEvent>,
        watermark: &Watermark,
        skipped: &mut u64,
    ) -> Vec<PresenceEvent> {
        let mut seen: HashSet<String> = HashSet::with_capacity(events.len());
        let mut batch: Vec<PresenceEvent> = Vec::with_capacity(events.len());
        for event in events {
            if !seen.insert(event.source_event_id.clone()) {
                *skipped += 1;
                warn!(
                    user_id,
                    source_event_id = %event.source_event_id,
                    "duplicate source event id in batch, skipping"
                );
                continue;
            }
            batch.push(event);
        }

        batch.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then(a.id.cmp(&b.id)));

        if let Some(boundary) = watermark.last_event_ts {
            batch.retain(|event| {
                if event.timestamp < boundary {
                    *skipped += 1;
                    warn!(
                        user_id,
                        event_id = event.id,
                        timestamp = %event.timestamp,
                        "event older than watermark, skipping"
                    );
                    false
                } else {
                    true
                }
            });
        }
        batch
    }

    /// Open an interval at `start`, reopening the most recently closed one
    /// when the gap is short enough to absorb.
    fn open_at(
        &self,
        start: DateTime<Utc>,
        closed: &mut Vec<OfflineInterval>,
        resume: &mut Option<OfflineInterval>,
    ) -> OpenInterval {
        let merge_gap = self.config.merge_gap();

        if closed.last().is_some_and(|interval| interval.merges_with(start, merge_gap)) {
            if let Some(interval) = closed.pop() {
                return OpenInterval::resume(interval, start);
            }
        }
        if resume.as_ref().is_some_and(|interval| interval.merges_with(start, merge_gap)) {
            if let Some(interval) = resume.take() {
                return OpenInterval::resume(interval, start);
            }
        }
        OpenInterval::new(start)
    }
}
