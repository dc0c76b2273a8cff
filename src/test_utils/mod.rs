#![allow(missing_docs)]

pub(crate) mod clock;
pub(crate) mod db;
pub(crate) mod notifier;
pub(crate) mod store;

pub(crate) use clock::ManualClock;
pub(crate) use db::{TestOwner, get_test_connection, insert_owner, insert_test_owner};
pub(crate) use notifier::{RecordingNotifier, SentNotice};
pub(crate) use store::{FakeStore, test_recurring_transaction};
