//! Defines the ledger transaction model and its database queries.

use rusqlite::{Connection, Row};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::{
    Error,
    account::AccountId,
    category::CategoryId,
    database_id::DatabaseId,
    db::{get_timestamp, timestamp_to_sql},
    recurring::RecurringTransactionId,
    user::UserId,
};

/// Alias for ledger transaction IDs.
pub type TransactionId = DatabaseId;

/// An expense or income, i.e. an event where money was either spent or earned.
///
/// To create a new `Transaction`, use [Transaction::build].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    /// The ID of the transaction.
    pub id: TransactionId,
    /// The user the transaction belongs to.
    pub user_id: UserId,
    /// The account the money moved in or out of.
    pub account_id: AccountId,
    /// The category the transaction is booked under.
    pub category_id: Option<CategoryId>,
    /// The amount of money spent or earned in this transaction.
    pub amount: f64,
    /// When the transaction happened.
    #[serde(with = "time::serde::rfc3339")]
    pub date: OffsetDateTime,
    /// A text description of what the transaction was for.
    pub description: String,
    /// The recurring transaction that created this entry, if any.
    pub recurring_transaction_id: Option<RecurringTransactionId>,
}

impl Transaction {
    /// Create a new transaction.
    ///
    /// Shortcut for [TransactionBuilder] for discoverability.
    pub fn build(
        user_id: UserId,
        account_id: AccountId,
        amount: f64,
        date: OffsetDateTime,
        description: &str,
    ) -> TransactionBuilder {
        TransactionBuilder {
            user_id,
            account_id,
            amount,
            date,
            description: description.to_owned(),
            category_id: None,
            recurring_transaction_id: None,
        }
    }
}

/// A builder for creating [Transaction] instances.
#[derive(Debug, PartialEq, Clone)]
pub struct TransactionBuilder {
    /// The user the transaction belongs to.
    pub user_id: UserId,

    /// The account the money moved in or out of.
    pub account_id: AccountId,

    /// The monetary amount of the transaction.
    ///
    /// Positive values represent income/credits, negative values represent
    /// expenses/debits.
    pub amount: f64,

    /// When the transaction occurred.
    pub date: OffsetDateTime,

    /// A human-readable description of the transaction.
    pub description: String,

    /// The category of the transaction, e.g. "Groceries", "Transport", "Rent".
    pub category_id: Option<CategoryId>,

    /// Set when the transaction was materialized from a recurring transaction.
    pub recurring_transaction_id: Option<RecurringTransactionId>,
}

impl TransactionBuilder {
    /// Set the category id for the transaction.
    pub fn category_id(mut self, category_id: Option<CategoryId>) -> Self {
        self.category_id = category_id;
        self
    }

    /// Link the transaction to the recurring transaction that produced it.
    pub fn recurring_transaction_id(
        mut self,
        recurring_transaction_id: Option<RecurringTransactionId>,
    ) -> Self {
        self.recurring_transaction_id = recurring_transaction_id;
        self
    }
}

/// Create the ledger transaction table.
pub fn create_transaction_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute(
        "CREATE TABLE IF NOT EXISTS \"transaction\" (
            id INTEGER PRIMARY KEY,
            user_id INTEGER NOT NULL,
            account_id INTEGER NOT NULL,
            category_id INTEGER,
            amount REAL NOT NULL,
            date INTEGER NOT NULL,
            description TEXT NOT NULL,
            recurring_transaction_id INTEGER,
            FOREIGN KEY(user_id) REFERENCES user(id) ON UPDATE CASCADE ON DELETE CASCADE,
            FOREIGN KEY(account_id) REFERENCES account(id) ON UPDATE CASCADE ON DELETE CASCADE,
            FOREIGN KEY(category_id) REFERENCES category(id) ON UPDATE CASCADE ON DELETE SET NULL,
            FOREIGN KEY(recurring_transaction_id) REFERENCES recurring_transaction(id)
                ON UPDATE CASCADE ON DELETE SET NULL
        )",
        (),
    )?;

    connection.execute(
        "CREATE INDEX IF NOT EXISTS idx_transaction_user_date ON \"transaction\"(user_id, date)",
        (),
    )?;

    Ok(())
}

/// Create a new transaction in the database from a builder.
///
/// # Errors
/// This function will return a:
/// - [Error::InvalidForeignKey] if the user, account, category or recurring
///   transaction does not exist,
/// - or [Error::SqlError] if there is some other SQL error.
pub fn create_transaction(
    builder: TransactionBuilder,
    connection: &Connection,
) -> Result<Transaction, Error> {
    connection
        .prepare(
            "INSERT INTO \"transaction\"
                (user_id, account_id, category_id, amount, date, description, recurring_transaction_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             RETURNING id, user_id, account_id, category_id, amount, date, description, recurring_transaction_id",
        )?
        .query_row(
            (
                builder.user_id.as_i64(),
                builder.account_id,
                builder.category_id,
                builder.amount,
                timestamp_to_sql(builder.date),
                &builder.description,
                builder.recurring_transaction_id,
            ),
            map_transaction_row,
        )
        .map_err(|error| error.into())
}

/// Retrieve a user's transactions ordered by date, oldest first.
///
/// # Errors
/// This function will return an error if there is an SQL error.
pub fn get_transactions_for_user(
    user_id: UserId,
    connection: &Connection,
) -> Result<Vec<Transaction>, Error> {
    connection
        .prepare(
            "SELECT id, user_id, account_id, category_id, amount, date, description, recurring_transaction_id
             FROM \"transaction\"
             WHERE user_id = :user_id
             ORDER BY date ASC, id ASC",
        )?
        .query_map(&[(":user_id", &user_id.as_i64())], map_transaction_row)?
        .map(|maybe_transaction| maybe_transaction.map_err(|error| error.into()))
        .collect()
}

fn map_transaction_row(row: &Row) -> Result<Transaction, rusqlite::Error> {
    Ok(Transaction {
        id: row.get(0)?,
        user_id: UserId::new(row.get(1)?),
        account_id: row.get(2)?,
        category_id: row.get(3)?,
        amount: row.get(4)?,
        date: get_timestamp(row, 5)?,
        description: row.get(6)?,
        recurring_transaction_id: row.get(7)?,
    })
}
