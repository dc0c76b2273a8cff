//! Application router configuration.

use axum::{
    Router,
    response::{IntoResponse, Response},
    routing::{get, post, put},
};

use crate::{
    AppState, Error, endpoints,
    recurring::{
        create_recurring_transaction_endpoint, delete_recurring_transaction_endpoint,
        get_notifications_endpoint, get_recurring_transaction_endpoint, get_scheduler_metrics,
        list_recurring_transactions_endpoint, mark_notification_read_endpoint, process_due_endpoint,
        set_recurring_transaction_active_endpoint, update_recurring_transaction_endpoint,
    },
};

/// Return a router with all the app's routes.
pub fn build_router(state: AppState) -> Router {
    let scheduler_routes = Router::new()
        .route(endpoints::RECURRING_METRICS, get(get_scheduler_metrics))
        .route(endpoints::PROCESS_RECURRING, post(process_due_endpoint));

    let user_routes = Router::new()
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
        .route(endpoints::USER_NOTIFICATIONS, get(get_notifications_endpoint))
        .route(
            endpoints::USER_NOTIFICATION_READ,
            put(mark_notification_read_endpoint),
        );

    scheduler_routes
        .merge(user_routes)
        .fallback(get_404_not_found)
        .with_state(state)
}

async fn get_404_not_found() -> Response {
    Error::NotFound.into_response()
}
