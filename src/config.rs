//! Settings for the recurring transaction scheduler.

use std::time::Duration;

/// The shortest allowed gap between two processing cycles.
pub const MIN_PROCESSING_INTERVAL: Duration = Duration::from_secs(60);

/// How often due recurring transactions are processed unless configured otherwise.
pub const DEFAULT_PROCESSING_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// How many times a failed recurring transaction is retried before it is
/// reported as a permanent failure.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// How often the retry queue is checked for items that are due another attempt.
pub const RETRY_CHECK_INTERVAL: Duration = Duration::from_secs(60);

/// The time budget for a single retry attempt.
pub const RETRY_ITEM_TIMEOUT: Duration = Duration::from_secs(30);

/// Timing and retry settings for the scheduler worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// The gap between processing cycles. Never less than [MIN_PROCESSING_INTERVAL].
    pub processing_interval: Duration,
    /// The time budget for one processing cycle, half the processing interval
    /// unless set otherwise.
    pub cycle_timeout: Duration,
    /// How many failed attempts a recurring transaction gets before it is
    /// reported as a permanent failure.
    pub max_retries: u32,
    /// How often the retry queue is drained.
    pub retry_check_interval: Duration,
    /// The time budget for one retry attempt.
    pub retry_item_timeout: Duration,
}

impl SchedulerConfig {
    /// Create a config with the given processing interval and retry budget.
    ///
    /// Intervals shorter than one minute are raised to one minute and a
    /// `max_retries` of zero falls back to [DEFAULT_MAX_RETRIES].
    pub fn new(processing_interval: Duration, max_retries: u32) -> Self {
        if processing_interval < MIN_PROCESSING_INTERVAL {
            tracing::warn!(
                "Processing interval of {processing_interval:?} is too short, using {MIN_PROCESSING_INTERVAL:?}"
            );
        }

        let processing_interval = processing_interval.max(MIN_PROCESSING_INTERVAL);

        Self {
            processing_interval,
            cycle_timeout: processing_interval / 2,
            max_retries: if max_retries == 0 {
                DEFAULT_MAX_RETRIES
            } else {
                max_retries
            },
            retry_check_interval: RETRY_CHECK_INTERVAL,
            retry_item_timeout: RETRY_ITEM_TIMEOUT,
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self::new(DEFAULT_PROCESSING_INTERVAL, DEFAULT_MAX_RETRIES)
    }
}
