//! This file defines the `Category` type used to group a user's spending.
//! Every recurring transaction books its ledger entries into one category.

use std::fmt::Display;

use rusqlite::{Connection, Row};
use serde::{Deserialize, Serialize};

use crate::{Error, database_id::DatabaseId, user::UserId};

/// Alias for category IDs.
pub type CategoryId = DatabaseId;

/// The name of a category.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Hash)]
pub struct CategoryName(String);

impl CategoryName {
    /// Create a category name.
    ///
    /// # Errors
    ///
    /// This function will return an error if `name` is an empty string.
    pub fn new(name: &str) -> Result<Self, Error> {
        if name.trim().is_empty() {
            Err(Error::EmptyCategoryName)
        } else {
            Ok(Self(name.to_string()))
        }
    }

    /// Create a category name without validation.
    ///
    /// The caller should ensure that the string is not empty.
    pub fn new_unchecked(name: &str) -> Self {
        Self(name.to_string())
    }
}

impl AsRef<str> for CategoryName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Display for CategoryName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A category for expenses and income, e.g., 'Groceries', 'Eating Out', 'Wages'.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    /// The ID of the category.
    pub id: CategoryId,
    /// The user that owns the category.
    pub user_id: UserId,
    /// The name of the category.
    pub name: CategoryName,
}

/// Create the category table.
pub fn create_category_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute(
        "CREATE TABLE IF NOT EXISTS category (
            id INTEGER PRIMARY KEY,
            user_id INTEGER NOT NULL,
            name TEXT NOT NULL,
            FOREIGN KEY(user_id) REFERENCES user(id) ON UPDATE CASCADE ON DELETE CASCADE,
            UNIQUE(user_id, name)
        )",
        (),
    )?;

    Ok(())
}

/// Create a category for `user_id`.
///
/// # Errors
/// Returns [Error::InvalidForeignKey] if the user does not exist, or
/// [Error::SqlError] for any other SQL error.
pub fn create_category(
    user_id: UserId,
    name: CategoryName,
    connection: &Connection,
) -> Result<Category, Error> {
    connection
        .prepare("INSERT INTO category (user_id, name) VALUES (?1, ?2) RETURNING id, user_id, name")?
        .query_row((user_id.as_i64(), name.as_ref()), map_category_row)
        .map_err(|error| error.into())
}

/// Retrieve a category by its ID.
///
/// # Errors
/// Returns [Error::NotFound] if there is no category with the ID `category_id`.
pub fn get_category(category_id: CategoryId, connection: &Connection) -> Result<Category, Error> {
    connection
        .prepare("SELECT id, user_id, name FROM category WHERE id = :id")?
        .query_row(&[(":id", &category_id)], map_category_row)
        .map_err(|error| error.into())
}

fn map_category_row(row: &Row) -> Result<Category, rusqlite::Error> {
    let raw_name: String = row.get(2)?;

    Ok(Category {
        id: row.get(0)?,
        user_id: UserId::new(row.get(1)?),
        name: CategoryName::new_unchecked(&raw_name),
    })
}
