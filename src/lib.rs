//! A personal-finance backend built around a recurring-transaction scheduler.
//!
//! Users own accounts and categories and define recurring transactions (wages,
//! rent, subscriptions). A background worker periodically materializes the
//! recurring transactions that have fallen due into ledger entries, advances
//! their schedules, and retries failures with exponential backoff, notifying
//! the owner as it goes.
//!
//! The scheduler's metrics and an on-demand "process now" operation are
//! exposed over a small JSON API.

#![warn(missing_docs)]

use std::{net::SocketAddr, time::Duration};

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use axum_server::Handle;
use serde_json::json;
use tokio::signal;
use tokio_util::sync::CancellationToken;

mod account;
mod app_state;
mod category;
mod clock;
mod config;
mod database_id;
mod db;
mod endpoints;
mod notification;
mod recurring;
mod routing;
mod transaction;
mod user;

#[cfg(test)]
mod test_utils;

pub use account::{Account, AccountId, create_account, get_account};
pub use app_state::AppState;
pub use category::{Category, CategoryId, CategoryName, create_category, get_category};
pub use clock::{Clock, SystemClock};
pub use config::SchedulerConfig;
pub use db::initialize as initialize_db;
pub use endpoints::format_endpoint;
pub use notification::{
    NewNotification, Notification, NotificationKind, NotificationPriority, Notifier,
    SqliteNotifier, create_notification, get_notifications_for_user, mark_notification_read,
};
pub use recurring::{
    FailedRecurringTransaction, Interval, MetricsRecorder, NewRecurringTransaction,
    ProcessReport, ProcessingMetrics, RecurringProcessor, RecurringStore, RecurringTransaction,
    RecurringTransactionFilter, RecurringTransactionId, RecurringTransactionWorker, RetryItem,
    RetryQueue, RetryQueueMetrics, Schedule, SchedulerMetrics, SqliteRecurringStore,
    WorkerHandle, backoff, create_recurring_transaction, delete_recurring_transaction,
    get_recurring_transaction_for_user, is_due, list_recurring_transactions, next_occurrence,
    set_recurring_transaction_active, update_recurring_transaction,
};
pub use routing::build_router;
pub use transaction::{
    Transaction, TransactionBuilder, TransactionId, create_transaction,
    get_transactions_for_user,
};
pub use user::{User, UserId, create_user, get_user_by_id};

/// An async task that waits for either the ctrl+c or terminate signal, whichever comes first, and
/// then signals the server and the background workers to shut down gracefully.
///
/// `handle` is a handle to an Axum `Server` and `shutdown` is the token shared
/// with the scheduler worker.
pub async fn graceful_shutdown(handle: Handle<SocketAddr>, shutdown: CancellationToken) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::debug!("Received ctrl+c signal.");
        },
        _ = terminate => {
            tracing::debug!("Received terminate signal.");
        },
    }

    shutdown.cancel();
    handle.graceful_shutdown(Some(Duration::from_secs(1)));
}

/// The errors that may occur in the application.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum Error {
    /// The requested resource was not found.
    ///
    /// Internally, this error may occur when a query returns no rows.
    #[error("the requested resource could not be found")]
    NotFound,

    /// An unhandled/unexpected SQL error.
    #[error("an unexpected SQL error occurred: {0}")]
    SqlError(rusqlite::Error),

    /// Could not acquire the database lock
    #[error("could not acquire the database lock")]
    DatabaseLockError,

    /// A row referenced an account, category, user or recurring transaction
    /// that does not exist.
    #[error("a referenced row does not exist in the database")]
    InvalidForeignKey,

    /// A recurring transaction must move some money.
    #[error("the amount must not be zero")]
    ZeroAmount,

    /// A recurring transaction needs a description so the user can recognise
    /// the ledger entries it creates.
    #[error("the description must not be empty")]
    EmptyDescription,

    /// An empty string was used to create a category name.
    #[error("Category name cannot be empty")]
    EmptyCategoryName,

    /// The interval name is not one of daily, weekly, monthly or yearly.
    #[error("\"{0}\" is not a valid interval")]
    InvalidInterval(String),

    /// Days of the week are numbered 0 (Sunday) to 6 (Saturday).
    #[error("day of week must be between 0 (Sunday) and 6 (Saturday), got {0}")]
    InvalidDayOfWeek(u8),

    /// Days of the month are numbered 1 to 31.
    #[error("day of month must be between 1 and 31, got {0}")]
    InvalidDayOfMonth(u8),

    /// A day-of-week anchor was given for a non-weekly schedule, or a
    /// day-of-month anchor for a non-monthly schedule.
    #[error("the day anchor does not apply to a {0} schedule")]
    AnchorIntervalMismatch(recurring::Interval),

    /// The end date of a schedule came before its start date.
    #[error("the end date must not be before the start date")]
    EndBeforeStart,

    /// The account does not exist or belongs to another user.
    #[error("account {0} not found")]
    AccountNotFound(AccountId),

    /// The category does not exist or belongs to another user.
    #[error("category {0} not found")]
    CategoryNotFound(CategoryId),

    /// Tried to update a recurring transaction that does not exist
    #[error("tried to update a recurring transaction that is not in the database")]
    UpdateMissingRecurringTransaction,

    /// Tried to delete a recurring transaction that does not exist
    #[error("tried to delete a recurring transaction that is not in the database")]
    DeleteMissingRecurringTransaction,

    /// A unit of background work did not finish within its time budget.
    #[error("the operation timed out after {0:?}")]
    Timeout(Duration),

    /// A background task panicked or was cancelled by the runtime.
    #[error("background task failed: {0}")]
    TaskFailed(String),

    /// A notification could not be delivered to its recipient.
    #[error("could not send notification: {0}")]
    NotificationFailed(String),
}

impl From<rusqlite::Error> for Error {
    fn from(value: rusqlite::Error) -> Self {
        match value {
            rusqlite::Error::SqliteFailure(sql_error, _)
                if sql_error.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_FOREIGNKEY =>
            {
                Error::InvalidForeignKey
            }
            rusqlite::Error::QueryReturnedNoRows => Error::NotFound,
            error => {
                tracing::error!("an unhandled SQL error occurred: {}", error);
                Error::SqlError(error)
            }
        }
    }
}

impl Error {
    /// Whether the error was caused by bad input from the caller rather than
    /// a fault on the server.
    pub fn is_validation_error(&self) -> bool {
        matches!(
            self,
            Error::ZeroAmount
                | Error::EmptyDescription
                | Error::EmptyCategoryName
                | Error::InvalidInterval(_)
                | Error::InvalidDayOfWeek(_)
                | Error::InvalidDayOfMonth(_)
                | Error::AnchorIntervalMismatch(_)
                | Error::EndBeforeStart
                | Error::AccountNotFound(_)
                | Error::CategoryNotFound(_)
                | Error::InvalidForeignKey
        )
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = match &self {
            error if error.is_validation_error() => StatusCode::BAD_REQUEST,
            Error::NotFound
            | Error::UpdateMissingRecurringTransaction
            | Error::DeleteMissingRecurringTransaction => StatusCode::NOT_FOUND,
            error => {
                tracing::error!("An unexpected error occurred: {}", error);
                return (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({
                        "error": "An unexpected error occurred, check the server logs for more details."
                    })),
                )
                    .into_response();
            }
        };

        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
