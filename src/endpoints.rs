//! The API endpoints URIs.
//!
//! For endpoints that take parameters, e.g., '/api/users/{user_id}/recurring', use [format_endpoint].

use crate::database_id::DatabaseId;

/// The route for a snapshot of the scheduler's metrics.
pub const RECURRING_METRICS: &str = "/api/recurring/metrics";
/// The route to run a processing cycle immediately.
pub const PROCESS_RECURRING: &str = "/api/recurring/process";
/// The route to list or create a user's recurring transactions.
pub const USER_RECURRING_TRANSACTIONS: &str = "/api/users/{user_id}/recurring";
/// The route to get, replace or delete one of a user's recurring transactions.
pub const USER_RECURRING_TRANSACTION: &str = "/api/users/{user_id}/recurring/{recurring_id}";
/// The route to pause or resume one of a user's recurring transactions.
pub const USER_RECURRING_TRANSACTION_ACTIVE: &str =
    "/api/users/{user_id}/recurring/{recurring_id}/active";
/// The route for a user's notifications.
pub const USER_NOTIFICATIONS: &str = "/api/users/{user_id}/notifications";
/// The route to mark one of a user's notifications as read.
pub const USER_NOTIFICATION_READ: &str =
    "/api/users/{user_id}/notifications/{notification_id}/read";

/// Replace the parameters in `endpoint_path` with `ids`, in order.
///
/// A parameter is a string that starts with a left brace, followed by
/// lowercase letters or underscores, and ends with a right brace.
/// For example, in the endpoint path '/users/{user_id}', '{user_id}' is the parameter.
///
/// This function assumes that an endpoint path only contains ASCII characters.
/// Parameters without a matching ID are left as they are, and extra IDs are ignored.
pub fn format_endpoint(endpoint_path: &str, ids: &[DatabaseId]) -> String {
    let mut formatted = String::with_capacity(endpoint_path.len());
    let mut rest = endpoint_path;
    let mut ids = ids.iter();

    while let Some(param_start) = rest.find('{') {
        let Some(param_length) = rest[param_start..].find('}') else {
            break;
        };
        let Some(id) = ids.next() else {
            break;
        };

        formatted.push_str(&rest[..param_start]);
        formatted.push_str(&id.to_string());
        rest = &rest[param_start + param_length + 1..];
    }

    formatted.push_str(rest);
    formatted
}
