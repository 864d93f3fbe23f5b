//! One aggregation pass: fan out over users, fold events into intervals,
//! close elapsed dates, commit each user atomically.
//!
//! Users are independent, so they are processed with bounded concurrency
//! and one user's failure never touches another's watermark. Only storage
//! unavailability aborts the whole pass.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use futures::stream::{self, StreamExt};
use noctua_domain::{
    Anomaly, Baseline, NoctuaConfig, NoctuaError, OfflineInterval, PassSummary, Result,
    SleepWindow, TrackedUser, UserBatch, UserFailure, Watermark,
};
use tracing::{debug, error, info, warn};

use super::ports::{AggregateStore, EventStore};
use crate::anomaly::AnomalyDetector;
use crate::baseline::BaselineTracker;
use crate::inference::{NightWindow, WindowInferencer};
use crate::intervals::{BuiltIntervals, IntervalBuilder};

/// Per-user counters rolled up into the pass summary.
#[derive(Debug, Clone, Copy, Default)]
pub struct UserTally {
    pub events_consumed: u64,
    pub events_skipped: u64,
    pub intervals_closed: u64,
    pub windows_inferred: u64,
    pub anomalies_flagged: u64,
}

enum UserOutcome {
    Processed(UserTally),
    SkippedNoTimezone,
}

/// Everything the date walk finalized for one user.
struct InferredDates {
    windows: Vec<SleepWindow>,
    anomalies: Vec<Anomaly>,
    baseline: Option<Baseline>,
    last_closed_date: Option<NaiveDate>,
}

/// Drives aggregation passes over the storage ports.
pub struct AggregationService {
    events: Arc<dyn EventStore>,
    store: Arc<dyn AggregateStore>,
    config: NoctuaConfig,
    builder: IntervalBuilder,
    inferencer: WindowInferencer,
    detector: AnomalyDetector,
}

impl AggregationService {
    pub fn new(
        events: Arc<dyn EventStore>,
        store: Arc<dyn AggregateStore>,
        config: NoctuaConfig,
    ) -> Self {
        let builder = IntervalBuilder::new(config.inference.clone());
        let inferencer = WindowInferencer::new(config.inference.clone());
        let detector = AnomalyDetector::new(config.anomaly.clone(), config.baseline.min_samples);
        Self { events, store, config, builder, inferencer, detector }
    }

    /// Run one pass over every tracked user at `reference`.
    ///
    /// The reference time is captured once by the caller so every user sees
    /// the same notion of "now" regardless of scheduling.
    pub async fn run_pass(&self, reference: DateTime<Utc>) -> Result<PassSummary> {
        let users = self.events.list_users().await?;
        info!(users = users.len(), %reference, "aggregation pass starting");

        let mut summary = PassSummary::new(reference);
        summary.users_total = users.len();

        let workers = self.config.pass.workers.max(1);
        let results: Vec<(i64, Result<UserOutcome>)> = stream::iter(users)
            .map(|user| async move {
                let user_id = user.user_id;
                (user_id, self.process_user(&user, reference).await)
            })
            .buffer_unordered(workers)
            .collect()
            .await;

        for (user_id, result) in results {
            match result {
                Ok(UserOutcome::Processed(tally)) => {
                    summary.users_processed += 1;
                    summary.events_consumed += tally.events_consumed;
                    summary.events_skipped += tally.events_skipped;
                    summary.intervals_closed += tally.intervals_closed;
                    summary.windows_inferred += tally.windows_inferred;
                    summary.anomalies_flagged += tally.anomalies_flagged;
                }
                Ok(UserOutcome::SkippedNoTimezone) => summary.users_skipped += 1,
                Err(error) if error.is_fatal() => {
                    error!(user_id, %error, "storage unavailable, aborting pass");
                    return Err(error);
                }
                Err(error) => {
                    error!(user_id, %error, "user failed, watermark untouched");
                    summary.failures.push(UserFailure { user_id, error: error.to_string() });
                }
            }
        }

        info!(
            users_processed = summary.users_processed,
            users_skipped = summary.users_skipped,
            users_failed = summary.failures.len(),
            events_consumed = summary.events_consumed,
            events_skipped = summary.events_skipped,
            intervals_closed = summary.intervals_closed,
            windows_inferred = summary.windows_inferred,
            anomalies_flagged = summary.anomalies_flagged,
            "aggregation pass finished"
        );
        Ok(summary)
    }

    /// The per-user pipeline: events -> intervals -> windows -> anomalies,
    /// then one atomic commit. Nothing is written when nothing changed.
    async fn process_user(
        &self,
        user: &TrackedUser,
        reference: DateTime<Utc>,
    ) -> Result<UserOutcome> {
        let Some(tz) = self.resolve_timezone(user)? else {
            warn!(user_id = user.user_id, "no timezone resolvable, skipping user");
            return Ok(UserOutcome::SkippedNoTimezone);
        };

        let previous = self
            .store
            .watermark(user.user_id)
            .await?
            .unwrap_or_else(|| Watermark::initial(user.user_id));

        let batch = self.events.events_after(user.user_id, previous.last_event_id).await?;
        let last_event_id = batch.last_event_id.unwrap_or(previous.last_event_id);

        // Cross-pass merge continuation only matters while nothing is open.
        let resume = if previous.open_interval.is_none() {
            self.store.latest_interval(user.user_id).await?
        } else {
            None
        };

        let mut tally = UserTally { events_skipped: batch.skipped, ..UserTally::default() };
        let built = self.builder.build(user.user_id, batch.events, &previous, resume);
        tally.events_consumed = built.consumed;
        tally.events_skipped += built.skipped;
        tally.intervals_closed = built.closed.len() as u64;

        let inferred = self.close_elapsed_dates(user.user_id, tz, reference, &previous, &built).await?;
        tally.windows_inferred = inferred.windows.len() as u64;
        tally.anomalies_flagged = inferred.anomalies.len() as u64;

        let watermark = Watermark {
            user_id: user.user_id,
            last_event_id,
            last_event_ts: built.last_event_ts,
            open_interval: built.open.clone(),
            last_closed_date: inferred.last_closed_date,
        };

        let commit = UserBatch {
            user_id: user.user_id,
            intervals: built.closed,
            windows: inferred.windows,
            anomalies: inferred.anomalies,
            baseline: inferred.baseline,
            watermark,
        };

        if commit.is_empty(&previous) {
            debug!(user_id = user.user_id, "nothing new for user");
            return Ok(UserOutcome::Processed(tally));
        }

        self.store.commit_user(commit).await?;
        debug!(
            user_id = user.user_id,
            events_consumed = tally.events_consumed,
            intervals_closed = tally.intervals_closed,
            windows_inferred = tally.windows_inferred,
            anomalies_flagged = tally.anomalies_flagged,
            "user committed"
        );
        Ok(UserOutcome::Processed(tally))
    }

    /// Walk local dates strictly after the watermark's last closed date up
    /// to the latest date whose night window has elapsed, inferring a
    /// window and checking anomalies for each; stops early while an open
    /// interval could still become a walked date's sleep.
    async fn close_elapsed_dates(
        &self,
        user_id: i64,
        tz: Tz,
        reference: DateTime<Utc>,
        previous: &Watermark,
        built: &BuiltIntervals,
    ) -> Result<InferredDates> {
        let mut outcome = InferredDates {
            windows: Vec::new(),
            anomalies: Vec::new(),
            baseline: None,
            last_closed_date: previous.last_closed_date,
        };

        let inference_config = &self.config.inference;
        let latest = NightWindow::latest_elapsed_date(reference, tz, inference_config);
        let candidates = self.walk_candidates(user_id, tz, latest, previous, built).await?;

        let first = match previous.last_closed_date {
            Some(date) => date.succ_opt(),
            None => {
                // First inference for this user: anchor on the earliest
                // evidence, stored or still open.
                let earliest_closed = candidates.first().map(|interval| interval.start);
                let earliest_open = built.open.as_ref().map(|open| open.start);
                let earliest = match (earliest_closed, earliest_open) {
                    (Some(a), Some(b)) => Some(a.min(b)),
                    (a, b) => a.or(b),
                };
                earliest.map(|start| {
                    NightWindow::anchor_date(&start.with_timezone(&tz), inference_config)
                })
            }
        };
        let Some(first) = first else { return Ok(outcome) };
        if first > latest {
            return Ok(outcome);
        }

        let history =
            self.store.recent_windows(user_id, self.config.baseline.window_size).await?;
        let mut tracker = BaselineTracker::seed(user_id, tz, &self.config.baseline, &history);

        let mut date = first;
        while date <= latest {
            let night = NightWindow::for_date(date, tz, inference_config);
            if built.open.as_ref().is_some_and(|open| open.start < night.end) {
                // The unfinished offline span may yet become this date's
                // sleep; defer the date until it closes.
                break;
            }

            let inference = self.inferencer.infer(user_id, date, tz, &candidates);
            // Anomalies judge the date against the baseline as it stood
            // before that date.
            let baseline_before = tracker.snapshot();
            outcome.anomalies.extend(self.detector.detect(
                user_id,
                date,
                tz,
                inference.as_ref(),
                baseline_before.as_ref(),
            ));
            if let Some(inference) = inference {
                tracker.observe(&inference.window);
                outcome.windows.push(inference.window);
            }
            outcome.last_closed_date = Some(date);

            let Some(next) = date.succ_opt() else { break };
            date = next;
        }

        // The baseline row is rewritten only when new windows moved it, so
        // replaying a pass stays write-free.
        if !outcome.windows.is_empty() {
            outcome.baseline = tracker.snapshot();
        }
        Ok(outcome)
    }

    /// Stored intervals relevant to the walk range, overlaid with the ones
    /// built this pass (an extended interval replaces its stale stored
    /// copy), sorted by start.
    async fn walk_candidates(
        &self,
        user_id: i64,
        tz: Tz,
        latest: NaiveDate,
        previous: &Watermark,
        built: &BuiltIntervals,
    ) -> Result<Vec<OfflineInterval>> {
        let inference_config = &self.config.inference;
        let range_start = match previous.last_closed_date {
            Some(date) => date
                .succ_opt()
                .map(|next| NightWindow::for_date(next, tz, inference_config).start),
            None => Some(DateTime::<Utc>::MIN_UTC),
        };
        let range_end = NightWindow::for_date(latest, tz, inference_config).end;

        let stored = match range_start {
            Some(start) if start < range_end => {
                self.store.intervals_overlapping(user_id, start, range_end).await?
            }
            _ => Vec::new(),
        };

        let mut combined = stored;
        for interval in &built.closed {
            match combined.iter_mut().find(|existing| existing.id == interval.id) {
                Some(existing) => *existing = interval.clone(),
                None => combined.push(interval.clone()),
            }
        }
        combined.sort_by_key(|interval| interval.start);
        Ok(combined)
    }

    /// Timezone resolution order: config override, collector-recorded zone,
    /// configured default. `Ok(None)` means the user is skipped this pass.
    fn resolve_timezone(&self, user: &TrackedUser) -> Result<Option<Tz>> {
        let name = self
            .config
            .users
            .timezone_override(user.user_id)
            .or(user.timezone.as_deref())
            .or(self.config.users.default_timezone.as_deref());

        let Some(name) = name else { return Ok(None) };
        let tz = name.parse::<Tz>().map_err(|_| {
            NoctuaError::Config(format!("invalid timezone '{name}' for user {}", user.user_id))
        })?;
        Ok(Some(tz))
    }
}
