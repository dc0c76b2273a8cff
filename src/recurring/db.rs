//! Database operations for recurring transactions.

use rusqlite::{Connection, Row, named_params};
use time::OffsetDateTime;

use crate::{
    Error,
    db::{get_optional_timestamp, get_timestamp, timestamp_to_sql},
    recurring::models::{
        NewRecurringTransaction, RecurringTransaction, RecurringTransactionFilter,
        RecurringTransactionId, Schedule,
    },
    user::UserId,
};

const COLUMNS: &str = "id, user_id, account_id, category_id, amount, description, frequency, \
    day_of_month, day_of_week, start_date, end_date, last_run, next_run, active, created_at, \
    updated_at";

/// Initialize the recurring transaction table and indexes.
pub fn create_recurring_transaction_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute_batch(
        "CREATE TABLE IF NOT EXISTS recurring_transaction (
            id INTEGER PRIMARY KEY,
            user_id INTEGER NOT NULL,
            account_id INTEGER NOT NULL,
            category_id INTEGER NOT NULL,
            amount REAL NOT NULL,
            description TEXT NOT NULL,
            frequency TEXT NOT NULL,
            day_of_month INTEGER,
            day_of_week INTEGER,
            start_date INTEGER NOT NULL,
            end_date INTEGER,
            last_run INTEGER,
            next_run INTEGER,
            active INTEGER NOT NULL DEFAULT 1,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            FOREIGN KEY(user_id) REFERENCES user(id) ON UPDATE CASCADE ON DELETE CASCADE,
            FOREIGN KEY(account_id) REFERENCES account(id) ON UPDATE CASCADE ON DELETE CASCADE,
            FOREIGN KEY(category_id) REFERENCES category(id) ON UPDATE CASCADE ON DELETE CASCADE
        );

        CREATE INDEX IF NOT EXISTS idx_recurring_transaction_due
            ON recurring_transaction(active, next_run);
        CREATE INDEX IF NOT EXISTS idx_recurring_transaction_user_id
            ON recurring_transaction(user_id);",
    )?;

    Ok(())
}

/// Insert a recurring transaction for `user_id` and return it with its generated ID.
///
/// The caller is responsible for validation and ownership checks.
pub fn insert_recurring_transaction(
    user_id: UserId,
    new: &NewRecurringTransaction,
    next_run: Option<OffsetDateTime>,
    now: OffsetDateTime,
    connection: &Connection,
) -> Result<RecurringTransaction, Error> {
    let schedule = &new.schedule;

    connection
        .prepare(&format!(
            "INSERT INTO recurring_transaction
                (user_id, account_id, category_id, amount, description, frequency, day_of_month,
                 day_of_week, start_date, end_date, last_run, next_run, active, created_at, updated_at)
             VALUES (:user_id, :account_id, :category_id, :amount, :description, :frequency,
                 :day_of_month, :day_of_week, :start_date, :end_date, NULL, :next_run, 1, :now, :now)
             RETURNING {COLUMNS}"
        ))?
        .query_row(
            named_params! {
                ":user_id": user_id.as_i64(),
                ":account_id": new.account_id,
                ":category_id": new.category_id,
                ":amount": new.amount,
                ":description": &new.description,
                ":frequency": schedule.interval,
                ":day_of_month": schedule.day_of_month,
                ":day_of_week": schedule.day_of_week,
                ":start_date": timestamp_to_sql(schedule.start_date),
                ":end_date": schedule.end_date.map(timestamp_to_sql),
                ":next_run": next_run.map(timestamp_to_sql),
                ":now": timestamp_to_sql(now),
            },
            map_recurring_transaction_row,
        )
        .map_err(|error| error.into())
}

/// Retrieve a recurring transaction owned by `user_id`.
///
/// # Errors
/// Returns [Error::NotFound] if the recurring transaction does not exist or
/// belongs to another user.
pub fn get_recurring_transaction(
    id: RecurringTransactionId,
    user_id: UserId,
    connection: &Connection,
) -> Result<RecurringTransaction, Error> {
    connection
        .prepare(&format!(
            "SELECT {COLUMNS} FROM recurring_transaction WHERE id = :id AND user_id = :user_id"
        ))?
        .query_row(
            named_params! { ":id": id, ":user_id": user_id.as_i64() },
            map_recurring_transaction_row,
        )
        .map_err(|error| error.into())
}

/// Retrieve a recurring transaction by ID regardless of its owner.
pub fn get_recurring_transaction_by_id(
    id: RecurringTransactionId,
    connection: &Connection,
) -> Result<RecurringTransaction, Error> {
    connection
        .prepare(&format!("SELECT {COLUMNS} FROM recurring_transaction WHERE id = :id"))?
        .query_row(named_params! { ":id": id }, map_recurring_transaction_row)
        .map_err(|error| error.into())
}

/// Retrieve a user's recurring transactions matching `filter`, ordered by ID.
pub fn query_recurring_transactions(
    user_id: UserId,
    filter: &RecurringTransactionFilter,
    connection: &Connection,
) -> Result<Vec<RecurringTransaction>, Error> {
    connection
        .prepare(&format!(
            "SELECT {COLUMNS} FROM recurring_transaction
             WHERE user_id = :user_id
                AND (:account_id IS NULL OR account_id = :account_id)
                AND (:category_id IS NULL OR category_id = :category_id)
                AND (:active IS NULL OR active = :active)
             ORDER BY id ASC"
        ))?
        .query_map(
            named_params! {
                ":user_id": user_id.as_i64(),
                ":account_id": filter.account_id,
                ":category_id": filter.category_id,
                ":active": filter.active,
            },
            map_recurring_transaction_row,
        )?
        .map(|maybe_rule| maybe_rule.map_err(|error| error.into()))
        .collect()
}

/// Replace the user-editable fields of a recurring transaction.
///
/// # Errors
/// Returns [Error::UpdateMissingRecurringTransaction] if no recurring
/// transaction with `id` is owned by `user_id`.
pub fn replace_recurring_transaction(
    id: RecurringTransactionId,
    user_id: UserId,
    new: &NewRecurringTransaction,
    next_run: Option<OffsetDateTime>,
    now: OffsetDateTime,
    connection: &Connection,
) -> Result<(), Error> {
    let schedule = &new.schedule;
    let rows_affected = connection.execute(
        "UPDATE recurring_transaction
         SET account_id = :account_id, category_id = :category_id, amount = :amount,
             description = :description, frequency = :frequency, day_of_month = :day_of_month,
             day_of_week = :day_of_week, start_date = :start_date, end_date = :end_date,
             next_run = :next_run, updated_at = :now
         WHERE id = :id AND user_id = :user_id",
        named_params! {
            ":id": id,
            ":user_id": user_id.as_i64(),
            ":account_id": new.account_id,
            ":category_id": new.category_id,
            ":amount": new.amount,
            ":description": &new.description,
            ":frequency": schedule.interval,
            ":day_of_month": schedule.day_of_month,
            ":day_of_week": schedule.day_of_week,
            ":start_date": timestamp_to_sql(schedule.start_date),
            ":end_date": schedule.end_date.map(timestamp_to_sql),
            ":next_run": next_run.map(timestamp_to_sql),
            ":now": timestamp_to_sql(now),
        },
    )?;

    if rows_affected == 0 {
        return Err(Error::UpdateMissingRecurringTransaction);
    }

    Ok(())
}

/// Switch a recurring transaction on or off.
pub fn update_active(
    id: RecurringTransactionId,
    user_id: UserId,
    active: bool,
    now: OffsetDateTime,
    connection: &Connection,
) -> Result<(), Error> {
    let rows_affected = connection.execute(
        "UPDATE recurring_transaction SET active = ?1, updated_at = ?2 WHERE id = ?3 AND user_id = ?4",
        (active, timestamp_to_sql(now), id, user_id.as_i64()),
    )?;

    if rows_affected == 0 {
        return Err(Error::UpdateMissingRecurringTransaction);
    }

    Ok(())
}

/// Delete a recurring transaction. Ledger entries it created are kept.
pub fn remove_recurring_transaction(
    id: RecurringTransactionId,
    user_id: UserId,
    connection: &Connection,
) -> Result<(), Error> {
    let rows_affected = connection.execute(
        "DELETE FROM recurring_transaction WHERE id = ?1 AND user_id = ?2",
        (id, user_id.as_i64()),
    )?;

    if rows_affected == 0 {
        return Err(Error::DeleteMissingRecurringTransaction);
    }

    Ok(())
}

/// Retrieve every recurring transaction that is due at `now`, across all
/// users, oldest occurrence first.
///
/// Applies the same rules as [crate::recurring::is_due].
pub fn get_due_recurring_transactions(
    now: OffsetDateTime,
    connection: &Connection,
) -> Result<Vec<RecurringTransaction>, Error> {
    connection
        .prepare(&format!(
            "SELECT {COLUMNS} FROM recurring_transaction
             WHERE active = 1
                AND (end_date IS NULL OR end_date >= :now)
                AND (
                    (last_run IS NULL AND start_date <= :now)
                    OR (last_run IS NOT NULL AND next_run IS NOT NULL AND next_run <= :now)
                )
             ORDER BY COALESCE(next_run, start_date) ASC, id ASC"
        ))?
        .query_map(
            named_params! { ":now": timestamp_to_sql(now) },
            map_recurring_transaction_row,
        )?
        .map(|maybe_rule| maybe_rule.map_err(|error| error.into()))
        .collect()
}

/// Record a successful run and the next due date. A `next_run` of `None`
/// leaves the recurring transaction dormant.
pub fn update_last_run(
    id: RecurringTransactionId,
    last_run: OffsetDateTime,
    next_run: Option<OffsetDateTime>,
    connection: &Connection,
) -> Result<(), Error> {
    let rows_affected = connection.execute(
        "UPDATE recurring_transaction SET last_run = ?1, next_run = ?2, updated_at = ?1 WHERE id = ?3",
        (
            timestamp_to_sql(last_run),
            next_run.map(timestamp_to_sql),
            id,
        ),
    )?;

    if rows_affected == 0 {
        return Err(Error::UpdateMissingRecurringTransaction);
    }

    Ok(())
}

fn map_recurring_transaction_row(row: &Row) -> Result<RecurringTransaction, rusqlite::Error> {
    Ok(RecurringTransaction {
        id: row.get(0)?,
        user_id: UserId::new(row.get(1)?),
        account_id: row.get(2)?,
        category_id: row.get(3)?,
        amount: row.get(4)?,
        description: row.get(5)?,
        schedule: Schedule {
            interval: row.get(6)?,
            day_of_month: row.get(7)?,
            day_of_week: row.get(8)?,
            start_date: get_timestamp(row, 9)?,
            end_date: get_optional_timestamp(row, 10)?,
        },
        last_run: get_optional_timestamp(row, 11)?,
        next_run: get_optional_timestamp(row, 12)?,
        active: row.get(13)?,
        created_at: get_timestamp(row, 14)?,
        updated_at: get_timestamp(row, 15)?,
    })
}
