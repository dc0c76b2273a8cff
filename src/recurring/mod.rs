//! Recurring transactions: user-owned rules, their schedules and the
//! background scheduler that turns due rules into ledger entries.

mod db;
mod endpoints;
mod metrics;
mod models;
mod occurrence;
mod processor;
mod retry_queue;
mod service;
mod store;
mod worker;

pub(crate) use db::create_recurring_transaction_table;
pub use endpoints::{
    create_recurring_transaction_endpoint, delete_recurring_transaction_endpoint,
    get_notifications_endpoint, get_recurring_transaction_endpoint, get_scheduler_metrics,
    list_recurring_transactions_endpoint, mark_notification_read_endpoint, process_due_endpoint,
    set_recurring_transaction_active_endpoint, update_recurring_transaction_endpoint,
};
pub use metrics::{MetricsRecorder, ProcessingMetrics, RetryQueueMetrics, SchedulerMetrics};
pub use models::{
    Interval, NewRecurringTransaction, RecurringTransaction, RecurringTransactionFilter,
    RecurringTransactionId, Schedule,
};
pub use occurrence::{is_due, next_occurrence};
pub use processor::{FailedRecurringTransaction, ProcessReport, RecurringProcessor};
pub use retry_queue::{RetryItem, RetryQueue, backoff};
pub use service::{
    create_recurring_transaction, delete_recurring_transaction,
    get_recurring_transaction_for_user, list_recurring_transactions,
    set_recurring_transaction_active, update_recurring_transaction,
};
pub use store::{RecurringStore, SqliteRecurringStore};
pub use worker::{RecurringTransactionWorker, WorkerHandle};
