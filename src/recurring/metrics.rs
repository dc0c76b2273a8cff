//! Counters describing how the scheduler has been doing since the process started.

use std::{
    sync::{Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use serde::{Serialize, Serializer};
use time::OffsetDateTime;

/// Outcomes of processing attempts, from both the main and retry loops.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProcessingMetrics {
    /// Attempts that materialized a ledger entry and advanced the schedule.
    pub total_processed: u64,
    /// Attempts that failed, including failures to fetch due recurring transactions.
    pub total_failed: u64,
    /// When the most recent successful attempt happened.
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_processed_at: Option<OffsetDateTime>,
    /// When the most recent failed attempt happened.
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_error_at: Option<OffsetDateTime>,
    /// Wall-clock duration of the most recent processing cycle.
    #[serde(rename = "processing_time_ms", serialize_with = "serialize_millis")]
    pub processing_time: Duration,
}

/// A consistent snapshot of the retry queue's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RetryQueueMetrics {
    /// Recurring transactions currently waiting for another attempt.
    pub current_size: usize,
    /// Failures added to the queue, first failures included.
    pub total_retries: u64,
    /// Queued recurring transactions that later succeeded.
    pub total_successes: u64,
    /// Queued recurring transactions that ran out of retries.
    pub permanent_failures: u64,
}

/// Everything the scheduler reports about itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SchedulerMetrics {
    /// Processing outcomes.
    pub processing: ProcessingMetrics,
    /// Retry queue state.
    pub retry_queue: RetryQueueMetrics,
}

fn serialize_millis<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
}

/// Shared, thread-safe recorder for [ProcessingMetrics].
///
/// The counters are never reset while the process is running.
#[derive(Debug, Default)]
pub struct MetricsRecorder {
    metrics: Mutex<ProcessingMetrics>,
}

impl MetricsRecorder {
    /// Create a recorder with every counter at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Count a successful attempt at `at`.
    pub fn record_processed(&self, at: OffsetDateTime) {
        let mut metrics = self.lock();
        metrics.total_processed += 1;
        metrics.last_processed_at = Some(at);
    }

    /// Count a failed attempt at `at`.
    pub fn record_failed(&self, at: OffsetDateTime) {
        let mut metrics = self.lock();
        metrics.total_failed += 1;
        metrics.last_error_at = Some(at);
    }

    /// Record how long the latest processing cycle took.
    pub fn record_processing_time(&self, duration: Duration) {
        self.lock().processing_time = duration;
    }

    /// A copy of all counters taken under one lock.
    pub fn snapshot(&self) -> ProcessingMetrics {
        self.lock().clone()
    }

    // Counters stay meaningful even if a holder of the lock panicked.
    fn lock(&self) -> MutexGuard<'_, ProcessingMetrics> {
        self.metrics.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
