use rusqlite::Connection;

use crate::{
    account::{Account, create_account},
    category::{Category, CategoryName, create_category},
    db::initialize,
    user::{User, create_user},
};

pub(crate) fn get_test_connection() -> Connection {
    let connection =
        Connection::open_in_memory().expect("Could not open in-memory SQLite database");
    initialize(&connection).expect("Could not initialize database");
    connection
}

/// A user with one account and one category.
#[derive(Debug, Clone)]
pub(crate) struct TestOwner {
    pub user: User,
    pub account: Account,
    pub category: Category,
}

pub(crate) fn insert_owner(email: &str, connection: &Connection) -> TestOwner {
    let user = create_user(email, connection).expect("Could not create test user");
    let account =
        create_account(user.id, "Everyday", connection).expect("Could not create test account");
    let category = create_category(user.id, CategoryName::new_unchecked("Bills"), connection)
        .expect("Could not create test category");

    TestOwner {
        user,
        account,
        category,
    }
}

pub(crate) fn insert_test_owner(connection: &Connection) -> TestOwner {
    insert_owner("test@example.com", connection)
}
