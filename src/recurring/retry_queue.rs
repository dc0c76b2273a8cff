//! Tracks recurring transactions that failed to process and schedules
//! further attempts with exponential backoff.
//!
//! An item is added on its first failure with a retry count of one. Every
//! further failure bumps the count and pushes the next attempt out by
//! `min(2^(count - 1), 60)` minutes. A success removes the item. Once the count
//! exceeds the configured maximum the owner is told the occurrence failed for
//! good and the item is evicted on the next scan.
//!
//! The queue lives in memory only: restarting the process forgets pending retries.

use std::{
    collections::HashMap,
    sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use time::{Duration, OffsetDateTime};

use crate::{
    Error,
    clock::Clock,
    config::DEFAULT_MAX_RETRIES,
    notification::Notifier,
    recurring::{
        metrics::RetryQueueMetrics,
        models::{RecurringTransaction, RecurringTransactionId},
    },
};

/// The longest wait between two attempts.
pub const MAX_BACKOFF: Duration = Duration::HOUR;

/// A recurring transaction waiting for another processing attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryItem {
    /// The recurring transaction as it was when it last failed.
    pub recurring_transaction: RecurringTransaction,
    /// How many attempts have failed, starting at one.
    pub retry_count: u32,
    /// The earliest time of the next attempt.
    pub next_retry_time: OffsetDateTime,
    /// The error from the latest failed attempt.
    pub last_error: String,
    /// When the latest failure was recorded.
    pub last_retry_time: OffsetDateTime,
}

#[derive(Debug, Default)]
struct QueueState {
    items: HashMap<RecurringTransactionId, RetryItem>,
    total_retries: u64,
    total_successes: u64,
    permanent_failures: u64,
}

enum Notice {
    Transient(u32),
    Permanent,
}

/// The in-memory retry queue shared by the scheduler's loops.
pub struct RetryQueue {
    state: RwLock<QueueState>,
    max_retries: u32,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
}

/// How long to wait before attempt `retry_count + 1`.
pub fn backoff(retry_count: u32) -> Duration {
    let exponent = retry_count.saturating_sub(1).min(6);

    Duration::minutes(1 << exponent).min(MAX_BACKOFF)
}

impl RetryQueue {
    /// Create an empty queue. A `max_retries` of zero falls back to
    /// [DEFAULT_MAX_RETRIES].
    pub fn new(max_retries: u32, notifier: Arc<dyn Notifier>, clock: Arc<dyn Clock>) -> Self {
        Self {
            state: RwLock::new(QueueState::default()),
            max_retries: if max_retries == 0 {
                DEFAULT_MAX_RETRIES
            } else {
                max_retries
            },
            notifier,
            clock,
        }
    }

    /// The number of failed attempts allowed before an occurrence is given up on.
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Record a failed attempt for `recurring_transaction` and notify its owner.
    ///
    /// The owner gets a transient failure notice while retries remain and a
    /// single permanent failure notice when the count first exceeds the
    /// maximum. Notification errors are logged and otherwise ignored.
    pub fn add(&self, recurring_transaction: RecurringTransaction, error: &Error) {
        let error = error.to_string();
        let now = self.clock.now();
        let id = recurring_transaction.id;

        let (item, notice) = {
            let mut state = self.write();
            let retry_count = state
                .items
                .get(&id)
                .map_or(1, |item| item.retry_count.saturating_add(1));

            let item = RetryItem {
                recurring_transaction,
                retry_count,
                next_retry_time: now + backoff(retry_count),
                last_error: error.clone(),
                last_retry_time: now,
            };
            state.items.insert(id, item.clone());
            state.total_retries += 1;

            let notice = match retry_count {
                count if count <= self.max_retries => Some(Notice::Transient(count)),
                count if count == self.max_retries.saturating_add(1) => Some(Notice::Permanent),
                _ => None,
            };

            (item, notice)
        };

        let result = match notice {
            Some(Notice::Transient(retry_count)) => {
                tracing::info!(
                    "Recurring transaction {id} failed (attempt {retry_count} of {}), next retry at {}: {error}",
                    self.max_retries,
                    item.next_retry_time
                );
                self.notifier.notify_recurring_failure(
                    &item.recurring_transaction,
                    &error,
                    retry_count,
                )
            }
            Some(Notice::Permanent) => {
                tracing::warn!(
                    "Recurring transaction {id} failed after {} retries: {error}",
                    self.max_retries
                );
                self.notifier
                    .notify_permanent_failure(&item.recurring_transaction, &error)
            }
            None => {
                tracing::debug!(
                    "Recurring transaction {id} failed again after running out of retries: {error}"
                );
                Ok(())
            }
        };

        if let Err(error) = result {
            tracing::warn!("Could not notify user about recurring transaction {id}: {error}");
        }
    }

    /// The items due for another attempt at `now`, earliest first.
    ///
    /// Items that have run out of retries are evicted and counted as permanent
    /// failures instead of being returned.
    pub fn get_due_items(&self, now: OffsetDateTime) -> Vec<RetryItem> {
        let mut state = self.write();
        let max_retries = self.max_retries;

        let size_before = state.items.len();
        state.items.retain(|id, item| {
            let keep = item.retry_count <= max_retries;

            if !keep {
                tracing::debug!(
                    "Evicting recurring transaction {id} after {} failed attempts",
                    item.retry_count
                );
            }

            keep
        });
        let evicted = size_before - state.items.len();
        state.permanent_failures += evicted as u64;

        let mut due: Vec<RetryItem> = state
            .items
            .values()
            .filter(|item| item.next_retry_time <= now)
            .cloned()
            .collect();
        due.sort_by_key(|item| (item.next_retry_time, item.recurring_transaction.id));

        due
    }

    /// Stop tracking `id` after a successful attempt. Does nothing if `id` is not queued.
    pub fn remove(&self, id: RecurringTransactionId) {
        let mut state = self.write();

        if state.items.remove(&id).is_some() {
            state.total_successes += 1;
            tracing::info!("Recurring transaction {id} succeeded on retry");
        }
    }

    /// Stop tracking `id` without counting a success, e.g. because its
    /// recurring transaction was paused or deleted while it waited.
    pub fn discard(&self, id: RecurringTransactionId) {
        if self.write().items.remove(&id).is_some() {
            tracing::info!("Dropped recurring transaction {id} from the retry queue");
        }
    }

    /// A copy of the tracked item for `id`, if any.
    pub fn item_status(&self, id: RecurringTransactionId) -> Option<RetryItem> {
        self.read().items.get(&id).cloned()
    }

    /// A consistent snapshot of the queue's counters.
    pub fn metrics(&self) -> RetryQueueMetrics {
        let state = self.read();

        RetryQueueMetrics {
            current_size: state.items.len(),
            total_retries: state.total_retries,
            total_successes: state.total_successes,
            permanent_failures: state.permanent_failures,
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, QueueState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, QueueState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}
