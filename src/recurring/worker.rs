//! The background worker that drives the recurring transaction processor.
//!
//! Two loops run for the lifetime of the worker: one processes every due
//! recurring transaction on a fixed interval, the other periodically retries
//! the ones that failed. Both stop when the shared cancellation token fires.

use std::sync::Arc;

use time::OffsetDateTime;
use tokio::{
    task::{JoinError, JoinHandle},
    time::{Instant, MissedTickBehavior},
};
use tokio_util::{sync::CancellationToken, task::TaskTracker};

use crate::{
    Error,
    clock::Clock,
    config::{MIN_PROCESSING_INTERVAL, SchedulerConfig},
    recurring::{
        metrics::SchedulerMetrics,
        processor::{ProcessReport, RecurringProcessor},
        retry_queue::RetryQueue,
    },
};

/// Runs the processing and retry loops.
pub struct RecurringTransactionWorker {
    processor: Arc<RecurringProcessor>,
    retry_queue: Arc<RetryQueue>,
    clock: Arc<dyn Clock>,
    config: SchedulerConfig,
    tasks: TaskTracker,
}

/// Controls a running [RecurringTransactionWorker].
#[derive(Debug)]
pub struct WorkerHandle {
    cancel: CancellationToken,
    processing_loop: JoinHandle<()>,
    retry_loop: JoinHandle<()>,
    tasks: TaskTracker,
}

impl WorkerHandle {
    /// Signal both loops to stop and wait until they, and any processing
    /// work they started, have exited.
    pub async fn stop(self) {
        self.cancel.cancel();

        for (name, handle) in [
            ("processing", self.processing_loop),
            ("retry", self.retry_loop),
        ] {
            if let Err(error) = handle.await {
                tracing::error!("The recurring transaction {name} loop did not exit cleanly: {error}");
            }
        }

        self.tasks.close();
        self.tasks.wait().await;
    }
}

impl RecurringTransactionWorker {
    /// Create a worker. A processing interval below one minute is raised to one minute.
    pub fn new(
        processor: Arc<RecurringProcessor>,
        retry_queue: Arc<RetryQueue>,
        clock: Arc<dyn Clock>,
        mut config: SchedulerConfig,
    ) -> Self {
        if config.processing_interval < MIN_PROCESSING_INTERVAL {
            tracing::warn!(
                "Processing interval of {:?} is too short, using {MIN_PROCESSING_INTERVAL:?}",
                config.processing_interval
            );
            config.processing_interval = MIN_PROCESSING_INTERVAL;
        }

        Self {
            processor,
            retry_queue,
            clock,
            config,
            tasks: TaskTracker::new(),
        }
    }

    /// The queue of recurring transactions waiting for another attempt.
    pub fn retry_queue(&self) -> &RetryQueue {
        &self.retry_queue
    }

    /// The settings the worker runs with.
    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// A snapshot of the processing and retry queue counters.
    pub fn metrics(&self) -> SchedulerMetrics {
        SchedulerMetrics {
            processing: self.processor.metrics().snapshot(),
            retry_queue: self.retry_queue.metrics(),
        }
    }

    /// Spawn the processing and retry loops on the current tokio runtime.
    ///
    /// The loops stop when `shutdown` is cancelled or [WorkerHandle::stop] is called.
    pub fn start(self: Arc<Self>, shutdown: &CancellationToken) -> WorkerHandle {
        let cancel = shutdown.child_token();
        self.tasks.reopen();

        tracing::info!(
            "Starting recurring transaction worker, processing every {:?} and retrying every {:?}",
            self.config.processing_interval,
            self.config.retry_check_interval
        );

        let processing_loop = tokio::spawn(self.clone().run_processing_loop(cancel.clone()));
        let retry_loop = tokio::spawn(self.clone().run_retry_loop(cancel.clone()));

        WorkerHandle {
            cancel,
            processing_loop,
            retry_loop,
            tasks: self.tasks.clone(),
        }
    }

    /// Run one processing cycle right away, queueing any failures for retry.
    ///
    /// # Errors
    /// Returns an error if the due recurring transactions could not be
    /// fetched or the cycle did not finish in time.
    pub async fn process_due_now(&self) -> Result<ProcessReport, Error> {
        self.run_processing_cycle(&CancellationToken::new()).await
    }

    async fn run_processing_loop(self: Arc<Self>, cancel: CancellationToken) {
        // The first tick completes immediately so due work is caught up on startup.
        let mut interval = tokio::time::interval(self.config.processing_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = interval.tick() => {
                    if let Err(error) = self.run_processing_cycle(&cancel).await {
                        tracing::error!("Recurring transaction processing cycle failed: {error}");
                    }
                }
            }
        }

        tracing::info!("Recurring transaction processing loop stopped");
    }

    async fn run_retry_loop(self: Arc<Self>, cancel: CancellationToken) {
        let period = self.config.retry_check_interval;
        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = interval.tick() => self.run_retry_cycle(&cancel).await,
            }
        }

        tracing::info!("Recurring transaction retry loop stopped");
    }

    /// Process everything that is due, bounded by the cycle timeout.
    ///
    /// On timeout the cycle stops picking up new recurring transactions and
    /// the failures from the work already started are still queued once it
    /// finishes.
    pub(crate) async fn run_processing_cycle(
        &self,
        cancel: &CancellationToken,
    ) -> Result<ProcessReport, Error> {
        let now = self.clock.now();
        let cycle_cancel = cancel.child_token();
        let processor = self.processor.clone();
        let task_cancel = cycle_cancel.clone();
        let mut task = self
            .tasks
            .spawn_blocking(move || processor.process_due_until(now, &task_cancel));

        let timeout = self.config.cycle_timeout;
        match tokio::time::timeout(timeout, &mut task).await {
            Ok(joined) => finish_cycle(&self.processor, &self.retry_queue, now, joined),
            Err(_) => {
                tracing::warn!(
                    "Processing cycle did not finish within {timeout:?}, skipping the remaining recurring transactions"
                );
                cycle_cancel.cancel();

                let processor = self.processor.clone();
                let retry_queue = self.retry_queue.clone();
                self.tasks.spawn(async move {
                    if let Err(error) = finish_cycle(&processor, &retry_queue, now, task.await) {
                        tracing::error!("Timed out processing cycle failed: {error}");
                    }
                });

                Err(Error::Timeout(timeout))
            }
        }
    }

    /// Attempt every retry item that is due, one at a time.
    ///
    /// Each recurring transaction is read again first. One that was paused or
    /// deleted while it waited is dropped from the queue.
    pub(crate) async fn run_retry_cycle(&self, cancel: &CancellationToken) {
        let items = self.retry_queue.get_due_items(self.clock.now());

        if items.is_empty() {
            return;
        }

        tracing::info!("Retrying {} failed recurring transactions", items.len());

        for item in items {
            if cancel.is_cancelled() {
                break;
            }

            let recurring_transaction = item.recurring_transaction;
            let id = recurring_transaction.id;
            let processor = self.processor.clone();
            let now = self.clock.now();
            let task = self.tasks.spawn_blocking(move || -> Result<bool, Error> {
                match processor.reload(id)? {
                    Some(current) => processor.process_one(&current, now).map(|()| true),
                    None => Ok(false),
                }
            });

            let timeout = self.config.retry_item_timeout;
            let result = match tokio::time::timeout(timeout, task).await {
                Ok(Ok(result)) => result,
                Ok(Err(join_error)) => Err(Error::TaskFailed(join_error.to_string())),
                Err(_) => Err(Error::Timeout(timeout)),
            };

            match result {
                Ok(true) => self.retry_queue.remove(id),
                Ok(false) => self.retry_queue.discard(id),
                Err(error) => self.retry_queue.add(recurring_transaction, &error),
            }
        }
    }
}

fn finish_cycle(
    processor: &RecurringProcessor,
    retry_queue: &RetryQueue,
    now: OffsetDateTime,
    joined: Result<Result<ProcessReport, Error>, JoinError>,
) -> Result<ProcessReport, Error> {
    let report = match joined {
        Ok(result) => result?,
        Err(join_error) => {
            tracing::error!("Processing cycle panicked: {join_error}");
            processor.metrics().record_failed(now);
            return Err(Error::TaskFailed(join_error.to_string()));
        }
    };

    for failed in &report.failed {
        retry_queue.add(failed.recurring_transaction.clone(), &failed.error);
    }

    Ok(report)
}
