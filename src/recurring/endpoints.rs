//! JSON endpoints for recurring transactions and the scheduler.

use std::sync::{Arc, Mutex, MutexGuard};

use axum::{
    Json,
    extract::{FromRef, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use rusqlite::Connection;
use serde::Deserialize;
use serde_json::json;

use crate::{
    AppState, Error,
    clock::Clock,
    database_id::DatabaseId,
    notification::{get_notifications_for_user, mark_notification_read},
    recurring::{
        metrics::SchedulerMetrics,
        models::{NewRecurringTransaction, RecurringTransactionFilter, RecurringTransactionId},
        service::{
            create_recurring_transaction, delete_recurring_transaction,
            get_recurring_transaction_for_user, list_recurring_transactions,
            set_recurring_transaction_active, update_recurring_transaction,
        },
        worker::RecurringTransactionWorker,
    },
    user::UserId,
};

/// The state needed for the scheduler endpoints.
#[derive(Clone)]
pub struct SchedulerState {
    /// The scheduler the endpoints report on and trigger.
    pub scheduler: Arc<RecurringTransactionWorker>,
}

impl FromRef<AppState> for SchedulerState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            scheduler: state.scheduler.clone(),
        }
    }
}

/// The state needed for managing recurring transactions.
#[derive(Clone)]
pub struct RecurringTransactionState {
    /// The database connection for managing recurring transactions.
    pub db_connection: Arc<Mutex<Connection>>,
    /// Stamps creation and update times.
    pub clock: Arc<dyn Clock>,
}

impl FromRef<AppState> for RecurringTransactionState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            db_connection: state.db_connection.clone(),
            clock: state.clock.clone(),
        }
    }
}

impl RecurringTransactionState {
    fn connection(&self) -> Result<MutexGuard<'_, Connection>, Error> {
        self.db_connection.lock().map_err(|error| {
            tracing::error!("could not acquire database lock: {error}");
            Error::DatabaseLockError
        })
    }
}

/// The request body for pausing or resuming a recurring transaction.
#[derive(Debug, Deserialize)]
pub struct ActiveForm {
    /// Whether the recurring transaction should be processed.
    pub active: bool,
}

/// Get a snapshot of the scheduler's processing and retry queue metrics.
pub async fn get_scheduler_metrics(State(state): State<SchedulerState>) -> Json<SchedulerMetrics> {
    Json(state.scheduler.metrics())
}

/// Process every due recurring transaction now instead of waiting for the next cycle.
pub async fn process_due_endpoint(State(state): State<SchedulerState>) -> Response {
    match state.scheduler.process_due_now().await {
        Ok(report) => Json(json!({
            "processed": report.processed,
            "failed": report.failed.len(),
            "skipped": report.skipped,
        }))
        .into_response(),
        Err(error) => error.into_response(),
    }
}

/// List a user's recurring transactions, optionally filtered by account,
/// category or active flag.
pub async fn list_recurring_transactions_endpoint(
    Path(user_id): Path<i64>,
    Query(filter): Query<RecurringTransactionFilter>,
    State(state): State<RecurringTransactionState>,
) -> Response {
    let result = state.connection().and_then(|connection| {
        list_recurring_transactions(UserId::new(user_id), &filter, &connection)
    });

    match result {
        Ok(recurring_transactions) => Json(recurring_transactions).into_response(),
        Err(error) => error.into_response(),
    }
}

/// Create a recurring transaction for a user.
pub async fn create_recurring_transaction_endpoint(
    Path(user_id): Path<i64>,
    State(state): State<RecurringTransactionState>,
    Json(new): Json<NewRecurringTransaction>,
) -> Response {
    let now = state.clock.now();
    let result = state.connection().and_then(|connection| {
        create_recurring_transaction(UserId::new(user_id), new, now, &connection)
    });

    match result {
        Ok(recurring_transaction) => {
            (StatusCode::CREATED, Json(recurring_transaction)).into_response()
        }
        Err(error) => error.into_response(),
    }
}

/// Get one of a user's recurring transactions.
pub async fn get_recurring_transaction_endpoint(
    Path((user_id, id)): Path<(i64, RecurringTransactionId)>,
    State(state): State<RecurringTransactionState>,
) -> Response {
    let result = state.connection().and_then(|connection| {
        get_recurring_transaction_for_user(id, UserId::new(user_id), &connection)
    });

    match result {
        Ok(recurring_transaction) => Json(recurring_transaction).into_response(),
        Err(error) => error.into_response(),
    }
}

/// Replace one of a user's recurring transactions.
pub async fn update_recurring_transaction_endpoint(
    Path((user_id, id)): Path<(i64, RecurringTransactionId)>,
    State(state): State<RecurringTransactionState>,
    Json(new): Json<NewRecurringTransaction>,
) -> Response {
    let now = state.clock.now();
    let result = state.connection().and_then(|connection| {
        update_recurring_transaction(id, UserId::new(user_id), new, now, &connection)
    });

    match result {
        Ok(recurring_transaction) => Json(recurring_transaction).into_response(),
        Err(error) => error.into_response(),
    }
}

/// Pause or resume one of a user's recurring transactions.
pub async fn set_recurring_transaction_active_endpoint(
    Path((user_id, id)): Path<(i64, RecurringTransactionId)>,
    State(state): State<RecurringTransactionState>,
    Json(form): Json<ActiveForm>,
) -> Response {
    let now = state.clock.now();
    let result = state.connection().and_then(|connection| {
        set_recurring_transaction_active(id, UserId::new(user_id), form.active, now, &connection)
    });

    match result {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(error) => error.into_response(),
    }
}

/// Delete one of a user's recurring transactions.
pub async fn delete_recurring_transaction_endpoint(
    Path((user_id, id)): Path<(i64, RecurringTransactionId)>,
    State(state): State<RecurringTransactionState>,
) -> Response {
    let result = state.connection().and_then(|connection| {
        delete_recurring_transaction(id, UserId::new(user_id), &connection)
    });

    match result {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(error) => error.into_response(),
    }
}

/// List a user's notifications, newest first.
pub async fn get_notifications_endpoint(
    Path(user_id): Path<i64>,
    State(state): State<RecurringTransactionState>,
) -> Response {
    let result = state
        .connection()
        .and_then(|connection| get_notifications_for_user(UserId::new(user_id), &connection));

    match result {
        Ok(notifications) => Json(notifications).into_response(),
        Err(error) => error.into_response(),
    }
}

/// Mark one of a user's notifications as read.
pub async fn mark_notification_read_endpoint(
    Path((user_id, notification_id)): Path<(i64, DatabaseId)>,
    State(state): State<RecurringTransactionState>,
) -> Response {
    let result = state.connection().and_then(|connection| {
        mark_notification_read(notification_id, UserId::new(user_id), &connection)
    });

    match result {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(error) => error.into_response(),
    }
}


#[cfg(test)]
mod recurring_transaction_endpoint_tests {
    use std::sync::{Arc, Mutex};

    use axum::{
        Router,
        http::StatusCode,
        routing::{get, put},
    };
    use axum_test::TestServer;
    use serde_json::{Value, json};
    use time::macros::datetime;

    use crate::{
        endpoints::{self, format_endpoint},
        test_utils::{ManualClock, TestOwner, get_test_connection, insert_owner, insert_test_owner},
    };

    use super::{
        RecurringTransactionState, create_recurring_transaction_endpoint,
        delete_recurring_transaction_endpoint, get_recurring_transaction_endpoint,
        list_recurring_transactions_endpoint, set_recurring_transaction_active_endpoint,
        update_recurring_transaction_endpoint,
    };

    fn get_test_server() -> (TestServer, TestOwner, TestOwner) {
        let connection = get_test_connection();
        let owner = insert_test_owner(&connection);
        let other = insert_owner("other@example.com", &connection);
        let state = RecurringTransactionState {
            db_connection: Arc::new(Mutex::new(connection)),
            clock: Arc::new(ManualClock::new(datetime!(2025-01-01 00:00 UTC))),
        };
        let app = Router::new()
            .route(
                endpoints::USER_RECURRING_TRANSACTIONS,
                get(list_recurring_transactions_endpoint).post(create_recurring_transaction_endpoint),
            )
            .route(
                endpoints::USER_RECURRING_TRANSACTION,
                get(get_recurring_transaction_endpoint)
                    .put(update_recurring_transaction_endpoint)
                    .delete(delete_recurring_transaction_endpoint),
            )
            .route(
                endpoints::USER_RECURRING_TRANSACTION_ACTIVE,
                put(set_recurring_transaction_active_endpoint),
            )
            .with_state(state);

        (
            TestServer::try_new(app).expect("Could not create test server."),
            owner,
            other,
        )
    }

    fn rent(owner: &TestOwner) -> Value {
        json!({
            "account_id": owner.account.id,
            "category_id": owner.category.id,
            "amount": -1450.0,
            "description": "Rent",
            "schedule": {
                "interval": "monthly",
                "day_of_month": 31,
                "day_of_week": null,
                "start_date": "2025-01-31T00:00:00Z",
            },
        })
    }

    #[tokio::test]
    async fn create_then_get() {
        let (server, owner, _) = get_test_server();
        let collection = format_endpoint(endpoints::USER_RECURRING_TRANSACTIONS, &[owner.user.id.as_i64()]);

        let response = server.post(&collection).json(&rent(&owner)).await;
        response.assert_status(StatusCode::CREATED);
        let created: Value = response.json();
        assert_eq!(created["next_run"], "2025-01-31T00:00:00Z");
        assert_eq!(created["last_run"], Value::Null);
        assert_eq!(created["schedule"]["interval"], "monthly");

        let id = created["id"].as_i64().unwrap();
        let item = format_endpoint(endpoints::USER_RECURRING_TRANSACTION, &[owner.user.id.as_i64(), id]);
        let got: Value = server.get(&item).await.json();
        assert_eq!(got, created);

        let listed: Value = server.get(&collection).await.json();
        assert_eq!(listed, json!([created]));
    }

    #[tokio::test]
    async fn create_rejects_invalid_rule() {
        let (server, owner, _) = get_test_server();
        let collection = format_endpoint(endpoints::USER_RECURRING_TRANSACTIONS, &[owner.user.id.as_i64()]);
        let mut body = rent(&owner);
        body["amount"] = json!(0.0);

        let response = server.post(&collection).json(&body).await;

        response.assert_status_bad_request();
        response.assert_json(&json!({ "error": "the amount must not be zero" }));
    }

    #[tokio::test]
    async fn create_rejects_other_users_account() {
        let (server, owner, other) = get_test_server();
        let collection = format_endpoint(endpoints::USER_RECURRING_TRANSACTIONS, &[owner.user.id.as_i64()]);
        let mut body = rent(&owner);
        body["account_id"] = json!(other.account.id);

        let response = server.post(&collection).json(&body).await;

        response.assert_status_bad_request();
    }

    #[tokio::test]
    async fn other_user_gets_not_found() {
        let (server, owner, other) = get_test_server();
        let collection = format_endpoint(endpoints::USER_RECURRING_TRANSACTIONS, &[owner.user.id.as_i64()]);
        let created: Value = server.post(&collection).json(&rent(&owner)).await.json();
        let id = created["id"].as_i64().unwrap();

        let response = server
            .get(&format_endpoint(endpoints::USER_RECURRING_TRANSACTION, &[other.user.id.as_i64(), id]))
            .await;

        response.assert_status_not_found();
    }

    #[tokio::test]
    async fn update_pause_and_delete() {
        let (server, owner, _) = get_test_server();
        let user_id = owner.user.id.as_i64();
        let collection = format_endpoint(endpoints::USER_RECURRING_TRANSACTIONS, &[user_id]);
        let created: Value = server.post(&collection).json(&rent(&owner)).await.json();
        let id = created["id"].as_i64().unwrap();
        let item = format_endpoint(endpoints::USER_RECURRING_TRANSACTION, &[user_id, id]);

        let mut body = rent(&owner);
        body["description"] = json!("Rent (new flat)");
        let updated: Value = server.put(&item).json(&body).await.json();
        assert_eq!(updated["description"], "Rent (new flat)");

        server
            .put(&format_endpoint(endpoints::USER_RECURRING_TRANSACTION_ACTIVE, &[user_id, id]))
            .json(&json!({ "active": false }))
            .await
            .assert_status(StatusCode::NO_CONTENT);
        let paused: Value = server.get(&format!("{collection}?active=false")).await.json();
        assert_eq!(paused.as_array().map(Vec::len), Some(1));

        server.delete(&item).await.assert_status(StatusCode::NO_CONTENT);
        server.delete(&item).await.assert_status_not_found();
    }
}
