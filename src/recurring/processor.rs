//! Turns due recurring transactions into ledger entries and advances their schedules.

use std::{sync::Arc, time::Instant};

use time::OffsetDateTime;
use tokio_util::sync::CancellationToken;

use crate::{
    Error,
    recurring::{
        metrics::MetricsRecorder,
        models::{RecurringTransaction, RecurringTransactionId},
        store::RecurringStore,
    },
    transaction::Transaction,
};

/// A recurring transaction that could not be processed, with the reason why.
#[derive(Debug, PartialEq)]
pub struct FailedRecurringTransaction {
    /// The recurring transaction as it was fetched.
    pub recurring_transaction: RecurringTransaction,
    /// Why processing failed.
    pub error: Error,
}

/// The outcome of one processing cycle.
#[derive(Debug, Default, PartialEq)]
pub struct ProcessReport {
    /// Recurring transactions that were materialized and advanced.
    pub processed: usize,
    /// Recurring transactions that failed. The caller decides whether to retry them.
    pub failed: Vec<FailedRecurringTransaction>,
    /// Due recurring transactions left untouched because the cycle was cancelled.
    pub skipped: usize,
}

/// Materializes due recurring transactions.
///
/// The processor only reports failures, queueing them for another attempt is
/// up to the caller.
pub struct RecurringProcessor {
    store: Arc<dyn RecurringStore>,
    metrics: Arc<MetricsRecorder>,
}

impl RecurringProcessor {
    /// Create a processor that reads from and writes to `store` and records outcomes in `metrics`.
    pub fn new(store: Arc<dyn RecurringStore>, metrics: Arc<MetricsRecorder>) -> Self {
        Self { store, metrics }
    }

    /// The recorder this processor reports to.
    pub fn metrics(&self) -> &MetricsRecorder {
        &self.metrics
    }

    /// Process every recurring transaction that is due at `now`.
    ///
    /// # Errors
    /// Returns an error only if the due recurring transactions could not be
    /// fetched. Failures of individual recurring transactions are collected in
    /// the report.
    pub fn process_due(&self, now: OffsetDateTime) -> Result<ProcessReport, Error> {
        self.process_due_until(now, &CancellationToken::new())
    }

    /// Like [RecurringProcessor::process_due], but stops before the next
    /// recurring transaction once `cancel` fires. The one in flight is finished.
    pub fn process_due_until(
        &self,
        now: OffsetDateTime,
        cancel: &CancellationToken,
    ) -> Result<ProcessReport, Error> {
        let started = Instant::now();

        let due = match self.store.get_due_recurring_transactions(now) {
            Ok(due) => due,
            Err(error) => {
                tracing::error!("Could not fetch due recurring transactions: {error}");
                self.metrics.record_failed(now);
                self.metrics.record_processing_time(started.elapsed());
                return Err(error);
            }
        };

        let mut report = ProcessReport::default();
        let total = due.len();

        for recurring_transaction in due {
            if cancel.is_cancelled() {
                report.skipped = total - report.processed - report.failed.len();
                tracing::warn!(
                    "Processing cancelled, skipping {} due recurring transactions",
                    report.skipped
                );
                break;
            }

            match self.process_one(&recurring_transaction, now) {
                Ok(()) => report.processed += 1,
                Err(error) => report.failed.push(FailedRecurringTransaction {
                    recurring_transaction,
                    error,
                }),
            }
        }

        let elapsed = started.elapsed();
        self.metrics.record_processing_time(elapsed);

        if total > 0 {
            tracing::info!(
                "Processed {} of {total} due recurring transactions in {elapsed:?}, {} failed",
                report.processed,
                report.failed.len()
            );
        }

        Ok(report)
    }

    /// The stored version of a recurring transaction that is waiting for a
    /// retry, or `None` if it has since been deleted or paused.
    ///
    /// # Errors
    /// Returns an error if the recurring transaction could not be read.
    pub fn reload(
        &self,
        id: RecurringTransactionId,
    ) -> Result<Option<RecurringTransaction>, Error> {
        match self.store.get_recurring_transaction(id) {
            Ok(recurring_transaction) if recurring_transaction.active => {
                Ok(Some(recurring_transaction))
            }
            Ok(_) | Err(Error::NotFound) => Ok(None),
            Err(error) => Err(error),
        }
    }

    /// Materialize a single recurring transaction at `now` and advance its
    /// schedule. Used for both scheduled runs and retries.
    ///
    /// # Errors
    /// Returns the error from creating the ledger entry or from saving the
    /// new schedule. In both cases the schedule is left where it was.
    pub fn process_one(
        &self,
        recurring_transaction: &RecurringTransaction,
        now: OffsetDateTime,
    ) -> Result<(), Error> {
        match self.materialize(recurring_transaction, now) {
            Ok(()) => {
                self.metrics.record_processed(now);
                Ok(())
            }
            Err(error) => {
                tracing::warn!(
                    "Failed to process recurring transaction {}: {error}",
                    recurring_transaction.id
                );
                self.metrics.record_failed(now);
                Err(error)
            }
        }
    }

    fn materialize(
        &self,
        recurring_transaction: &RecurringTransaction,
        now: OffsetDateTime,
    ) -> Result<(), Error> {
        let transaction = self.store.create_transaction(
            Transaction::build(
                recurring_transaction.user_id,
                recurring_transaction.account_id,
                recurring_transaction.amount,
                now,
                &recurring_transaction.description,
            )
            .category_id(Some(recurring_transaction.category_id))
            .recurring_transaction_id(Some(recurring_transaction.id)),
        )?;

        let next_run = recurring_transaction.calculate_next_run(now);

        self.store
            .update_last_run(recurring_transaction.id, now, next_run)?;

        match next_run {
            Some(next_run) => tracing::debug!(
                "Created transaction {} from recurring transaction {}, next run at {next_run}",
                transaction.id,
                recurring_transaction.id
            ),
            None => tracing::info!(
                "Created transaction {} from recurring transaction {}, which has now ended",
                transaction.id,
                recurring_transaction.id
            ),
        }

        Ok(())
    }
}
