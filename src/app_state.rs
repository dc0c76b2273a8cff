//! Implements a struct that holds the state of the REST server.

use std::sync::{Arc, Mutex};

use rusqlite::Connection;

use crate::{
    Error,
    clock::Clock,
    config::SchedulerConfig,
    db::initialize,
    notification::SqliteNotifier,
    recurring::{
        MetricsRecorder, RecurringProcessor, RecurringTransactionWorker, RetryQueue,
        SqliteRecurringStore,
    },
};

/// The state of the REST server.
#[derive(Clone)]
pub struct AppState {
    /// The database connection
    pub db_connection: Arc<Mutex<Connection>>,

    /// The source of "now" for handlers and the scheduler.
    pub clock: Arc<dyn Clock>,

    /// The recurring transaction scheduler. Its loops are started separately
    /// with [RecurringTransactionWorker::start].
    pub scheduler: Arc<RecurringTransactionWorker>,
}

impl AppState {
    /// Create a new [AppState] with a SQLite database connection.
    ///
    /// This function will initialize the database by adding the tables for the
    /// domain models and wire the scheduler to it.
    ///
    /// # Errors
    /// Returns an error if the database cannot be initialized.
    pub fn new(
        db_connection: Connection,
        clock: Arc<dyn Clock>,
        config: SchedulerConfig,
    ) -> Result<Self, Error> {
        initialize(&db_connection)?;

        let db_connection = Arc::new(Mutex::new(db_connection));
        let store = Arc::new(SqliteRecurringStore::new(db_connection.clone()));
        let notifier = Arc::new(SqliteNotifier::new(db_connection.clone(), clock.clone()));
        let processor = Arc::new(RecurringProcessor::new(
            store,
            Arc::new(MetricsRecorder::new()),
        ));
        let retry_queue = Arc::new(RetryQueue::new(
            config.max_retries,
            notifier,
            clock.clone(),
        ));
        let scheduler = Arc::new(RecurringTransactionWorker::new(
            processor,
            retry_queue,
            clock.clone(),
            config,
        ));

        Ok(Self {
            db_connection,
            clock,
            scheduler,
        })
    }
}
