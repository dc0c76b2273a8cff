//! The storage the recurring transaction processor reads from and writes to.

use std::sync::{Arc, Mutex};

use rusqlite::Connection;
use time::OffsetDateTime;

use crate::{
    Error,
    recurring::{
        db,
        models::{RecurringTransaction, RecurringTransactionId},
    },
    transaction::{self, Transaction, TransactionBuilder},
};

/// Reads due recurring transactions, records ledger entries and advances schedules.
///
/// Implementations are called from blocking worker threads.
pub trait RecurringStore: Send + Sync {
    /// Every active recurring transaction that is due at `now`, in the order
    /// they should be processed.
    fn get_due_recurring_transactions(
        &self,
        now: OffsetDateTime,
    ) -> Result<Vec<RecurringTransaction>, Error>;

    /// The stored version of a recurring transaction.
    ///
    /// # Errors
    /// Returns [Error::NotFound] if it has been deleted.
    fn get_recurring_transaction(
        &self,
        id: RecurringTransactionId,
    ) -> Result<RecurringTransaction, Error>;

    /// Record a ledger entry.
    fn create_transaction(&self, builder: TransactionBuilder) -> Result<Transaction, Error>;

    /// Record that a recurring transaction ran at `last_run` and is next due
    /// at `next_run`, or never again if `next_run` is `None`.
    fn update_last_run(
        &self,
        id: RecurringTransactionId,
        last_run: OffsetDateTime,
        next_run: Option<OffsetDateTime>,
    ) -> Result<(), Error>;
}

/// A [RecurringStore] backed by the application's SQLite database.
#[derive(Debug, Clone)]
pub struct SqliteRecurringStore {
    db_connection: Arc<Mutex<Connection>>,
}

impl SqliteRecurringStore {
    /// Create a store that shares `db_connection` with the rest of the application.
    pub fn new(db_connection: Arc<Mutex<Connection>>) -> Self {
        Self { db_connection }
    }

    fn with_connection<T>(
        &self,
        f: impl FnOnce(&Connection) -> Result<T, Error>,
    ) -> Result<T, Error> {
        let connection = self.db_connection.lock().map_err(|error| {
            tracing::error!("could not acquire database lock: {error}");
            Error::DatabaseLockError
        })?;

        f(&connection)
    }
}

impl RecurringStore for SqliteRecurringStore {
    fn get_due_recurring_transactions(
        &self,
        now: OffsetDateTime,
    ) -> Result<Vec<RecurringTransaction>, Error> {
        self.with_connection(|connection| db::get_due_recurring_transactions(now, connection))
    }

    fn get_recurring_transaction(
        &self,
        id: RecurringTransactionId,
    ) -> Result<RecurringTransaction, Error> {
        self.with_connection(|connection| db::get_recurring_transaction_by_id(id, connection))
    }

    fn create_transaction(&self, builder: TransactionBuilder) -> Result<Transaction, Error> {
        self.with_connection(|connection| transaction::create_transaction(builder, connection))
    }

    fn update_last_run(
        &self,
        id: RecurringTransactionId,
        last_run: OffsetDateTime,
        next_run: Option<OffsetDateTime>,
    ) -> Result<(), Error> {
        self.with_connection(|connection| db::update_last_run(id, last_run, next_run, connection))
    }
}
