//! Database initialization and helpers for the column types shared between tables.

use rusqlite::{Connection, Row, Transaction as SqlTransaction, types::Type};
use time::OffsetDateTime;

use crate::{
    Error, account::create_account_table, category::create_category_table,
    notification::create_notification_table, recurring::create_recurring_transaction_table,
    transaction::create_transaction_table, user::create_user_table,
};

/// Create the application tables if they do not already exist.
///
/// Foreign key enforcement is switched on for `connection`, so this must be
/// called before any rows are written.
///
/// # Errors
/// Returns an error if any of the tables could not be created.
pub fn initialize(connection: &Connection) -> Result<(), Error> {
    connection.execute_batch("PRAGMA foreign_keys = ON;")?;

    let transaction =
        SqlTransaction::new_unchecked(connection, rusqlite::TransactionBehavior::Exclusive)?;

    create_user_table(&transaction)?;
    create_account_table(&transaction)?;
    create_category_table(&transaction)?;
    create_recurring_transaction_table(&transaction)?;
    create_transaction_table(&transaction)?;
    create_notification_table(&transaction)?;

    transaction.commit()?;

    Ok(())
}

/// A text column held a value that does not map to any enum variant.
#[derive(Debug, thiserror::Error)]
#[error("\"{0}\" is not a recognised value")]
pub struct InvalidEnumValue(pub String);

/// Timestamps are stored as unix seconds so that range queries compare numbers.
pub(crate) fn timestamp_to_sql(timestamp: OffsetDateTime) -> i64 {
    timestamp.unix_timestamp()
}

/// Read a unix-seconds column as a UTC timestamp.
pub(crate) fn get_timestamp(row: &Row, index: usize) -> Result<OffsetDateTime, rusqlite::Error> {
    let seconds: i64 = row.get(index)?;

    OffsetDateTime::from_unix_timestamp(seconds).map_err(|error| {
        rusqlite::Error::FromSqlConversionFailure(index, Type::Integer, Box::new(error))
    })
}

/// Read a nullable unix-seconds column as a UTC timestamp.
pub(crate) fn get_optional_timestamp(
    row: &Row,
    index: usize,
) -> Result<Option<OffsetDateTime>, rusqlite::Error> {
    let seconds: Option<i64> = row.get(index)?;

    seconds
        .map(|seconds| {
            OffsetDateTime::from_unix_timestamp(seconds).map_err(|error| {
                rusqlite::Error::FromSqlConversionFailure(index, Type::Integer, Box::new(error))
            })
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use rusqlite::Connection;
    use time::macros::datetime;

    use super::{get_optional_timestamp, get_timestamp, initialize, timestamp_to_sql};

    #[test]
    fn initialize_is_idempotent() {
        let connection = Connection::open_in_memory().unwrap();

        assert_eq!(Ok(()), initialize(&connection));
        assert_eq!(Ok(()), initialize(&connection));
    }

    #[test]
    fn initialize_enables_foreign_keys() {
        let connection = Connection::open_in_memory().unwrap();
        initialize(&connection).unwrap();

        let enabled: bool = connection
            .query_row("PRAGMA foreign_keys", [], |row| row.get(0))
            .unwrap();

        assert!(enabled);
    }

    #[test]
    fn timestamps_are_read_back_in_utc() {
        let connection = Connection::open_in_memory().unwrap();
        let timestamp = datetime!(2024-02-29 13:45:00 +13:00);

        let (got, got_null) = connection
            .query_row(
                "SELECT ?1, NULL",
                (timestamp_to_sql(timestamp),),
                |row| Ok((get_timestamp(row, 0)?, get_optional_timestamp(row, 1)?)),
            )
            .unwrap();

        assert_eq!(got, timestamp);
        assert_eq!(got.offset(), time::UtcOffset::UTC);
        assert_eq!(got_null, None);
    }
}
