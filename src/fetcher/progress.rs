//! Progress computation: throughput, remaining count, remaining time and ETA.

use chrono::{DateTime, SecondsFormat, Utc};
use std::time::Duration;
use tokio::time::Instant;

use crate::types::{Progress, TaskStatus};

/// Rendered in place of a time value that cannot be computed yet
pub const CALCULATING: &str = "Calculating...";

// Floor for the elapsed time used as the throughput denominator
const MIN_ELAPSED_SECS: f64 = 1e-3;
// Floor for the throughput used as the remaining-time denominator
const MIN_SPEED: f64 = 1e-6;

/// Format a number of seconds as `"{h}h {m}m {s}s"`
///
/// Non-finite or negative input renders as `"Calculating..."`.
pub fn format_time(seconds: f64) -> String {
    if !seconds.is_finite() || seconds < 0.0 {
        return CALCULATING.to_string();
    }
    // float-to-int casts saturate, so absurdly large values stay well-formed
    let total = seconds.floor() as u64;
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let secs = total % 60;
    format!("{hours}h {minutes}m {secs}s")
}

/// Absolute completion time `now + remaining_secs` as RFC 3339 (UTC, millisecond precision)
pub fn format_eta(now: DateTime<Utc>, remaining_secs: f64) -> String {
    if !remaining_secs.is_finite() || remaining_secs < 0.0 {
        return CALCULATING.to_string();
    }
    let millis = (remaining_secs * 1000.0).round();
    if millis >= i64::MAX as f64 {
        return CALCULATING.to_string();
    }
    chrono::Duration::try_milliseconds(millis as i64)
        .and_then(|delta| now.checked_add_signed(delta))
        .map(|eta| eta.to_rfc3339_opts(SecondsFormat::Millis, true))
        .unwrap_or_else(|| CALCULATING.to_string())
}

/// Running counters of one fetch task
///
/// Owned by the task's engine run; every snapshot is recomputed from scratch.
#[derive(Debug)]
pub struct ProgressTracker {
    started: Instant,
    total: Option<u64>,
    processed: u64,
}

impl ProgressTracker {
    /// Start tracking now with an advisory working total
    pub fn new(total: Option<u64>) -> Self {
        Self {
            started: Instant::now(),
            total,
            processed: 0,
        }
    }

    /// Replace the working total once the provider estimate is known
    pub fn set_total(&mut self, total: Option<u64>) {
        self.total = total;
    }

    /// Working total
    pub fn total(&self) -> Option<u64> {
        self.total
    }

    /// Count one more fetched item
    pub fn record_item(&mut self) {
        self.processed += 1;
    }

    /// Items fetched so far
    pub fn processed(&self) -> u64 {
        self.processed
    }

    /// Snapshot at the current instant
    pub fn snapshot(&self, status: TaskStatus) -> Progress {
        self.snapshot_at(self.started.elapsed(), Utc::now(), status)
    }

    /// Snapshot of a task that failed with `error`
    pub fn failed(&self, error: impl Into<String>) -> Progress {
        Progress {
            error: Some(error.into()),
            ..self.snapshot(TaskStatus::Error)
        }
    }

    /// Snapshot for an explicit elapsed time and wall clock
    pub fn snapshot_at(
        &self,
        elapsed: Duration,
        now: DateTime<Utc>,
        status: TaskStatus,
    ) -> Progress {
        let elapsed_secs = elapsed.as_secs_f64().max(MIN_ELAPSED_SECS);
        let speed = self.processed as f64 / elapsed_secs;

        let (remaining, remaining_secs) = match self.total {
            Some(total) => {
                let remaining = total.saturating_sub(self.processed);
                let secs = if self.processed == 0 {
                    f64::INFINITY
                } else {
                    remaining as f64 / speed.max(MIN_SPEED)
                };
                (remaining, secs)
            }
            None => (0, f64::NAN),
        };

        Progress {
            processed: self.processed,
            total: self.total,
            current_speed: speed,
            remaining_emails: remaining,
            remaining_time_formatted: format_time(remaining_secs),
            eta_formatted: format_eta(now, remaining_secs),
            status,
            error: None,
        }
    }
}
