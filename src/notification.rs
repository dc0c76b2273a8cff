//! In-app notifications telling users that a recurring transaction failed.

use std::{
    fmt::Display,
    str::FromStr,
    sync::{Arc, Mutex},
};

use rusqlite::{
    Connection, Row,
    types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, Type, ValueRef},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use time::OffsetDateTime;

use crate::{
    Error,
    clock::Clock,
    database_id::DatabaseId,
    db::{InvalidEnumValue, get_timestamp, timestamp_to_sql},
    recurring::RecurringTransaction,
    user::UserId,
};

/// Tells the owner of a recurring transaction that processing it failed.
///
/// Callers treat delivery as fire-and-forget: errors are logged, never propagated.
pub trait Notifier: Send + Sync {
    /// A processing attempt failed and will be retried.
    fn notify_recurring_failure(
        &self,
        recurring_transaction: &RecurringTransaction,
        error: &str,
        retry_count: u32,
    ) -> Result<(), Error>;

    /// The retry budget is spent and this occurrence will not be materialized.
    fn notify_permanent_failure(
        &self,
        recurring_transaction: &RecurringTransaction,
        error: &str,
    ) -> Result<(), Error>;
}

/// What a notification is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    /// A recurring transaction failed and is queued for another attempt.
    RecurringFailed,
    /// A recurring transaction ran out of retries.
    PermanentFail,
}

impl NotificationKind {
    fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::RecurringFailed => "recurring_failed",
            NotificationKind::PermanentFail => "permanent_fail",
        }
    }
}

impl FromStr for NotificationKind {
    type Err = InvalidEnumValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "recurring_failed" => Ok(NotificationKind::RecurringFailed),
            "permanent_fail" => Ok(NotificationKind::PermanentFail),
            other => Err(InvalidEnumValue(other.to_owned())),
        }
    }
}

/// How urgently the user should look at a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationPriority {
    /// Informational.
    Low,
    /// Worth a look soon.
    Medium,
    /// Needs the user's attention.
    High,
}

impl NotificationPriority {
    fn as_str(&self) -> &'static str {
        match self {
            NotificationPriority::Low => "low",
            NotificationPriority::Medium => "medium",
            NotificationPriority::High => "high",
        }
    }
}

impl FromStr for NotificationPriority {
    type Err = InvalidEnumValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(NotificationPriority::Low),
            "medium" => Ok(NotificationPriority::Medium),
            "high" => Ok(NotificationPriority::High),
            other => Err(InvalidEnumValue(other.to_owned())),
        }
    }
}

impl Display for NotificationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Display for NotificationPriority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ToSql for NotificationKind {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(self.as_str().into())
    }
}

impl FromSql for NotificationKind {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|error| FromSqlError::Other(Box::new(error)))
    }
}

impl ToSql for NotificationPriority {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(self.as_str().into())
    }
}

impl FromSql for NotificationPriority {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|error| FromSqlError::Other(Box::new(error)))
    }
}

/// A message shown to a user inside the app.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    /// The ID of the notification.
    pub id: DatabaseId,
    /// The user the notification is for.
    pub user_id: UserId,
    /// What the notification is about.
    pub kind: NotificationKind,
    /// How urgent the notification is.
    pub priority: NotificationPriority,
    /// A short headline.
    pub title: String,
    /// The full message.
    pub message: String,
    /// Structured details, e.g. the recurring transaction ID and the error.
    pub data: serde_json::Value,
    /// Whether the user has seen the notification.
    pub read: bool,
    /// When the notification was created.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// The fields needed to create a [Notification].
#[derive(Debug, Clone, PartialEq)]
pub struct NewNotification {
    /// The user the notification is for.
    pub user_id: UserId,
    /// What the notification is about.
    pub kind: NotificationKind,
    /// How urgent the notification is.
    pub priority: NotificationPriority,
    /// A short headline.
    pub title: String,
    /// The full message.
    pub message: String,
    /// Structured details.
    pub data: serde_json::Value,
}

/// Create the notification table.
pub fn create_notification_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute_batch(
        "CREATE TABLE IF NOT EXISTS notification (
            id INTEGER PRIMARY KEY,
            user_id INTEGER NOT NULL,
            kind TEXT NOT NULL,
            priority TEXT NOT NULL,
            title TEXT NOT NULL,
            message TEXT NOT NULL,
            data TEXT NOT NULL,
            read INTEGER NOT NULL DEFAULT 0,
            created_at INTEGER NOT NULL,
            FOREIGN KEY(user_id) REFERENCES user(id) ON UPDATE CASCADE ON DELETE CASCADE
        );

        CREATE INDEX IF NOT EXISTS idx_notification_user_id ON notification(user_id, created_at);",
    )?;

    Ok(())
}

/// Store a new, unread notification.
pub fn create_notification(
    notification: NewNotification,
    created_at: OffsetDateTime,
    connection: &Connection,
) -> Result<Notification, Error> {
    connection
        .prepare(
            "INSERT INTO notification (user_id, kind, priority, title, message, data, read, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, ?7)
             RETURNING id, user_id, kind, priority, title, message, data, read, created_at",
        )?
        .query_row(
            (
                notification.user_id.as_i64(),
                notification.kind,
                notification.priority,
                &notification.title,
                &notification.message,
                notification.data.to_string(),
                timestamp_to_sql(created_at),
            ),
            map_notification_row,
        )
        .map_err(|error| error.into())
}

/// Retrieve a user's notifications, newest first.
pub fn get_notifications_for_user(
    user_id: UserId,
    connection: &Connection,
) -> Result<Vec<Notification>, Error> {
    connection
        .prepare(
            "SELECT id, user_id, kind, priority, title, message, data, read, created_at
             FROM notification
             WHERE user_id = :user_id
             ORDER BY created_at DESC, id DESC",
        )?
        .query_map(&[(":user_id", &user_id.as_i64())], map_notification_row)?
        .map(|maybe_notification| maybe_notification.map_err(|error| error.into()))
        .collect()
}

/// Mark one of a user's notifications as read.
///
/// # Errors
/// Returns [Error::NotFound] if the user has no notification with `id`.
pub fn mark_notification_read(
    id: DatabaseId,
    user_id: UserId,
    connection: &Connection,
) -> Result<(), Error> {
    let rows_affected = connection.execute(
        "UPDATE notification SET read = 1 WHERE id = ?1 AND user_id = ?2",
        (id, user_id.as_i64()),
    )?;

    if rows_affected == 0 {
        return Err(Error::NotFound);
    }

    Ok(())
}

fn map_notification_row(row: &Row) -> Result<Notification, rusqlite::Error> {
    let raw_data: String = row.get(6)?;
    let data = serde_json::from_str(&raw_data).map_err(|error| {
        rusqlite::Error::FromSqlConversionFailure(6, Type::Text, Box::new(error))
    })?;

    Ok(Notification {
        id: row.get(0)?,
        user_id: UserId::new(row.get(1)?),
        kind: row.get(2)?,
        priority: row.get(3)?,
        title: row.get(4)?,
        message: row.get(5)?,
        data,
        read: row.get(7)?,
        created_at: get_timestamp(row, 8)?,
    })
}

/// A [Notifier] that stores notifications in the application database.
#[derive(Clone)]
pub struct SqliteNotifier {
    db_connection: Arc<Mutex<Connection>>,
    clock: Arc<dyn Clock>,
}

impl SqliteNotifier {
    /// Create a notifier that writes through `db_connection`, stamping
    /// notifications with the time from `clock`.
    pub fn new(db_connection: Arc<Mutex<Connection>>, clock: Arc<dyn Clock>) -> Self {
        Self {
            db_connection,
            clock,
        }
    }

    fn store(&self, notification: NewNotification) -> Result<(), Error> {
        let connection = self.db_connection.lock().map_err(|error| {
            tracing::error!("could not acquire database lock: {error}");
            Error::DatabaseLockError
        })?;

        let notification = create_notification(notification, self.clock.now(), &connection)
            .map_err(|error| Error::NotificationFailed(error.to_string()))?;
        tracing::debug!(
            "Created {} notification {} for user {}",
            notification.kind,
            notification.id,
            notification.user_id
        );

        Ok(())
    }
}

impl Notifier for SqliteNotifier {
    fn notify_recurring_failure(
        &self,
        recurring_transaction: &RecurringTransaction,
        error: &str,
        retry_count: u32,
    ) -> Result<(), Error> {
        self.store(NewNotification {
            user_id: recurring_transaction.user_id,
            kind: NotificationKind::RecurringFailed,
            priority: NotificationPriority::High,
            title: "Recurring Transaction Failed".to_owned(),
            message: format!(
                "Failed to process recurring transaction: {}",
                recurring_transaction.description
            ),
            data: json!({
                "recurring_transaction_id": recurring_transaction.id,
                "error": error,
                "retry_count": retry_count,
                "amount": recurring_transaction.amount,
            }),
        })
    }

    fn notify_permanent_failure(
        &self,
        recurring_transaction: &RecurringTransaction,
        error: &str,
    ) -> Result<(), Error> {
        self.store(NewNotification {
            user_id: recurring_transaction.user_id,
            kind: NotificationKind::PermanentFail,
            priority: NotificationPriority::High,
            title: "Recurring Transaction Permanently Failed".to_owned(),
            message: format!(
                "Recurring transaction has permanently failed after multiple retries: {}",
                recurring_transaction.description
            ),
            data: json!({
                "recurring_transaction_id": recurring_transaction.id,
                "error": error,
                "amount": recurring_transaction.amount,
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use serde_json::json;
    use time::macros::datetime;

    use crate::{
        Error,
        recurring::{Interval, Schedule},
        test_utils::{ManualClock, get_test_connection, insert_test_owner, test_recurring_transaction},
    };

    use super::{
        NotificationKind, NotificationPriority, Notifier, SqliteNotifier,
        get_notifications_for_user, mark_notification_read,
    };

    fn daily() -> Schedule {
        Schedule {
            interval: Interval::Daily,
            day_of_month: None,
            day_of_week: None,
            start_date: datetime!(2025-01-01 00:00 UTC),
            end_date: None,
        }
    }

    #[test]
    fn stores_transient_and_permanent_failures() {
        let connection = get_test_connection();
        let owner = insert_test_owner(&connection);
        let db_connection = Arc::new(Mutex::new(connection));
        let clock = Arc::new(ManualClock::new(datetime!(2025-01-05 10:00 UTC)));
        let notifier = SqliteNotifier::new(db_connection.clone(), clock.clone());
        let mut rule = test_recurring_transaction(7, daily());
        rule.user_id = owner.user.id;
        rule.description = "Gym".to_owned();

        notifier
            .notify_recurring_failure(&rule, "disk full", 2)
            .unwrap();
        clock.set(datetime!(2025-01-05 11:00 UTC));
        notifier.notify_permanent_failure(&rule, "disk full").unwrap();

        let connection = db_connection.lock().unwrap();
        let got = get_notifications_for_user(owner.user.id, &connection).unwrap();
        assert_eq!(got.len(), 2);

        let permanent = &got[0];
        assert_eq!(permanent.kind, NotificationKind::PermanentFail);
        assert_eq!(permanent.title, "Recurring Transaction Permanently Failed");
        assert_eq!(
            permanent.message,
            "Recurring transaction has permanently failed after multiple retries: Gym"
        );
        assert_eq!(permanent.created_at, datetime!(2025-01-05 11:00 UTC));

        let transient = &got[1];
        assert_eq!(transient.kind, NotificationKind::RecurringFailed);
        assert_eq!(transient.priority, NotificationPriority::High);
        assert_eq!(transient.message, "Failed to process recurring transaction: Gym");
        assert_eq!(
            transient.data,
            json!({
                "recurring_transaction_id": 7,
                "error": "disk full",
                "retry_count": 2,
                "amount": rule.amount,
            })
        );
        assert!(!transient.read);
    }

    #[test]
    fn unknown_user_fails() {
        let db_connection = Arc::new(Mutex::new(get_test_connection()));
        let clock = Arc::new(ManualClock::new(datetime!(2025-01-05 10:00 UTC)));
        let notifier = SqliteNotifier::new(db_connection, clock);
        let rule = test_recurring_transaction(7, daily());

        let result = notifier.notify_permanent_failure(&rule, "boom");

        assert_eq!(
            result,
            Err(Error::NotificationFailed(Error::InvalidForeignKey.to_string()))
        );
    }

    #[test]
    fn mark_read_only_touches_own_notifications() {
        let connection = get_test_connection();
        let owner = insert_test_owner(&connection);
        let db_connection = Arc::new(Mutex::new(connection));
        let notifier = SqliteNotifier::new(
            db_connection.clone(),
            Arc::new(ManualClock::new(datetime!(2025-01-05 10:00 UTC))),
        );
        let mut rule = test_recurring_transaction(7, daily());
        rule.user_id = owner.user.id;
        notifier.notify_recurring_failure(&rule, "boom", 1).unwrap();

        let connection = db_connection.lock().unwrap();
        let id = get_notifications_for_user(owner.user.id, &connection).unwrap()[0].id;

        assert_eq!(
            mark_notification_read(id, crate::UserId::new(owner.user.id.as_i64() + 1), &connection),
            Err(Error::NotFound)
        );
        assert_eq!(mark_notification_read(id, owner.user.id, &connection), Ok(()));
        assert!(get_notifications_for_user(owner.user.id, &connection).unwrap()[0].read);
    }
}
