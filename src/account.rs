//! Bank accounts and credit cards that transactions are recorded against.

use rusqlite::{Connection, Row};
use serde::{Deserialize, Serialize};

use crate::{Error, database_id::DatabaseId, user::UserId};

/// Alias for account IDs.
pub type AccountId = DatabaseId;

/// A bank account or credit card owned by a user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    /// The id for the account.
    pub id: AccountId,
    /// The user that owns the account.
    pub user_id: UserId,
    /// The display name of the account, unique per user.
    pub name: String,
}

/// Create the account table.
pub fn create_account_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute(
        "CREATE TABLE IF NOT EXISTS account (
            id INTEGER PRIMARY KEY,
            user_id INTEGER NOT NULL,
            name TEXT NOT NULL,
            FOREIGN KEY(user_id) REFERENCES user(id) ON UPDATE CASCADE ON DELETE CASCADE,
            UNIQUE(user_id, name)
        )",
        (),
    )?;

    connection.execute(
        "CREATE INDEX IF NOT EXISTS idx_account_user_id ON account(user_id)",
        (),
    )?;

    Ok(())
}

/// Create an account for `user_id`.
///
/// # Errors
/// Returns [Error::InvalidForeignKey] if the user does not exist, or
/// [Error::SqlError] for any other SQL error.
pub fn create_account(user_id: UserId, name: &str, connection: &Connection) -> Result<Account, Error> {
    connection
        .prepare("INSERT INTO account (user_id, name) VALUES (?1, ?2) RETURNING id, user_id, name")?
        .query_row((user_id.as_i64(), name), map_row_to_account)
        .map_err(|error| error.into())
}

/// Retrieve an account by its ID.
///
/// # Errors
/// Returns [Error::NotFound] if there is no account with the ID `account_id`.
pub fn get_account(account_id: AccountId, connection: &Connection) -> Result<Account, Error> {
    connection
        .prepare("SELECT id, user_id, name FROM account WHERE id = :id")?
        .query_row(&[(":id", &account_id)], map_row_to_account)
        .map_err(|error| error.into())
}

fn map_row_to_account(row: &Row) -> Result<Account, rusqlite::Error> {
    Ok(Account {
        id: row.get(0)?,
        user_id: UserId::new(row.get(1)?),
        name: row.get(2)?,
    })
}
