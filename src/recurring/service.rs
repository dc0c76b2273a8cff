//! User-facing operations on recurring transactions: validation and
//! ownership checks in front of the database queries.

use rusqlite::Connection;
use time::OffsetDateTime;

use crate::{
    Error,
    account::{AccountId, get_account},
    category::{CategoryId, get_category},
    recurring::{
        db::{
            get_recurring_transaction, insert_recurring_transaction,
            query_recurring_transactions, remove_recurring_transaction,
            replace_recurring_transaction, update_active,
        },
        models::{
            NewRecurringTransaction, RecurringTransaction, RecurringTransactionFilter,
            RecurringTransactionId,
        },
        occurrence::next_occurrence,
    },
    user::UserId,
};

/// Validate and store a new recurring transaction for `user_id`.
///
/// The first run is scheduled for the start date.
///
/// # Errors
/// Returns a validation error from [NewRecurringTransaction::validate],
/// [Error::AccountNotFound] or [Error::CategoryNotFound] if the account or
/// category does not belong to `user_id`, or [Error::SqlError] for any other
/// SQL error.
pub fn create_recurring_transaction(
    user_id: UserId,
    new: NewRecurringTransaction,
    now: OffsetDateTime,
    connection: &Connection,
) -> Result<RecurringTransaction, Error> {
    new.validate()?;
    check_ownership(user_id, new.account_id, new.category_id, connection)?;

    let next_run = next_occurrence(&new.schedule, None, now);
    let recurring_transaction =
        insert_recurring_transaction(user_id, &new, next_run, now, connection)?;

    tracing::info!(
        "Created {} recurring transaction {} for user {user_id}",
        recurring_transaction.schedule.interval,
        recurring_transaction.id
    );

    Ok(recurring_transaction)
}

/// Retrieve one of a user's recurring transactions.
///
/// # Errors
/// Returns [Error::NotFound] if `user_id` owns no recurring transaction with `id`.
pub fn get_recurring_transaction_for_user(
    id: RecurringTransactionId,
    user_id: UserId,
    connection: &Connection,
) -> Result<RecurringTransaction, Error> {
    get_recurring_transaction(id, user_id, connection)
}

/// Retrieve a user's recurring transactions matching `filter`.
pub fn list_recurring_transactions(
    user_id: UserId,
    filter: &RecurringTransactionFilter,
    connection: &Connection,
) -> Result<Vec<RecurringTransaction>, Error> {
    query_recurring_transactions(user_id, filter, connection)
}

/// Replace the editable fields of a recurring transaction.
///
/// If the schedule changed, the next run is recalculated from the last run
/// under the new schedule. Otherwise the stored next run is kept.
///
/// # Errors
/// Returns the same validation errors as [create_recurring_transaction] and
/// [Error::UpdateMissingRecurringTransaction] if `user_id` owns no recurring
/// transaction with `id`.
pub fn update_recurring_transaction(
    id: RecurringTransactionId,
    user_id: UserId,
    new: NewRecurringTransaction,
    now: OffsetDateTime,
    connection: &Connection,
) -> Result<RecurringTransaction, Error> {
    new.validate()?;
    check_ownership(user_id, new.account_id, new.category_id, connection)?;

    let existing = match get_recurring_transaction(id, user_id, connection) {
        Ok(existing) => existing,
        Err(Error::NotFound) => return Err(Error::UpdateMissingRecurringTransaction),
        Err(error) => return Err(error),
    };

    let next_run = if existing.schedule == new.schedule {
        existing.next_run
    } else {
        next_occurrence(&new.schedule, existing.last_run, now)
    };

    replace_recurring_transaction(id, user_id, &new, next_run, now, connection)?;

    get_recurring_transaction(id, user_id, connection)
}

/// Pause or resume a recurring transaction.
///
/// # Errors
/// Returns [Error::UpdateMissingRecurringTransaction] if `user_id` owns no
/// recurring transaction with `id`.
pub fn set_recurring_transaction_active(
    id: RecurringTransactionId,
    user_id: UserId,
    active: bool,
    now: OffsetDateTime,
    connection: &Connection,
) -> Result<(), Error> {
    update_active(id, user_id, active, now, connection)
}

/// Delete a recurring transaction. Ledger entries it already created are kept.
///
/// # Errors
/// Returns [Error::DeleteMissingRecurringTransaction] if `user_id` owns no
/// recurring transaction with `id`.
pub fn delete_recurring_transaction(
    id: RecurringTransactionId,
    user_id: UserId,
    connection: &Connection,
) -> Result<(), Error> {
    remove_recurring_transaction(id, user_id, connection)
}

fn check_ownership(
    user_id: UserId,
    account_id: AccountId,
    category_id: CategoryId,
    connection: &Connection,
) -> Result<(), Error> {
    match get_account(account_id, connection) {
        Ok(account) if account.user_id == user_id => {}
        Ok(_) | Err(Error::NotFound) => return Err(Error::AccountNotFound(account_id)),
        Err(error) => return Err(error),
    }

    match get_category(category_id, connection) {
        Ok(category) if category.user_id == user_id => Ok(()),
        Ok(_) | Err(Error::NotFound) => Err(Error::CategoryNotFound(category_id)),
        Err(error) => Err(error),
    }
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use crate::{
        Error,
        recurring::models::{
            Interval, NewRecurringTransaction, RecurringTransactionFilter, Schedule,
        },
        test_utils::{TestOwner, get_test_connection, insert_owner, insert_test_owner},
    };

    use super::{
        create_recurring_transaction, delete_recurring_transaction,
        get_recurring_transaction_for_user, list_recurring_transactions,
        set_recurring_transaction_active, update_recurring_transaction,
    };

    fn weekly_gym(owner: &TestOwner) -> NewRecurringTransaction {
        NewRecurringTransaction {
            account_id: owner.account.id,
            category_id: owner.category.id,
            amount: -15.0,
            description: "Gym".to_owned(),
            schedule: Schedule {
                interval: Interval::Weekly,
                day_of_month: None,
                day_of_week: Some(1),
                start_date: datetime!(2025-01-06 06:00 UTC),
                end_date: None,
            },
        }
    }

    #[test]
    fn create_schedules_first_run_on_start_date() {
        let connection = get_test_connection();
        let owner = insert_test_owner(&connection);

        let created = create_recurring_transaction(
            owner.user.id,
            weekly_gym(&owner),
            datetime!(2025-01-01 00:00 UTC),
            &connection,
        )
        .unwrap();

        assert_eq!(created.user_id, owner.user.id);
        assert_eq!(created.next_run, Some(datetime!(2025-01-06 06:00 UTC)));
        assert_eq!(created.last_run, None);
        assert_eq!(created.created_at, datetime!(2025-01-01 00:00 UTC));
    }

    #[test]
    fn create_rejects_invalid_rule() {
        let connection = get_test_connection();
        let owner = insert_test_owner(&connection);
        let mut new = weekly_gym(&owner);
        new.schedule.day_of_week = Some(9);

        let result = create_recurring_transaction(
            owner.user.id,
            new,
            datetime!(2025-01-01 00:00 UTC),
            &connection,
        );

        assert_eq!(result, Err(Error::InvalidDayOfWeek(9)));
    }

    #[test]
    fn create_rejects_another_users_account_and_category() {
        let connection = get_test_connection();
        let owner = insert_test_owner(&connection);
        let other = insert_owner("other@example.com", &connection);

        let mut new = weekly_gym(&owner);
        new.account_id = other.account.id;
        let result = create_recurring_transaction(
            owner.user.id,
            new,
            datetime!(2025-01-01 00:00 UTC),
            &connection,
        );
        assert_eq!(result, Err(Error::AccountNotFound(other.account.id)));

        let mut new = weekly_gym(&owner);
        new.category_id = other.category.id;
        let result = create_recurring_transaction(
            owner.user.id,
            new,
            datetime!(2025-01-01 00:00 UTC),
            &connection,
        );
        assert_eq!(result, Err(Error::CategoryNotFound(other.category.id)));
    }

    #[test]
    fn create_rejects_missing_account() {
        let connection = get_test_connection();
        let owner = insert_test_owner(&connection);
        let mut new = weekly_gym(&owner);
        new.account_id = 999;

        let result = create_recurring_transaction(
            owner.user.id,
            new,
            datetime!(2025-01-01 00:00 UTC),
            &connection,
        );

        assert_eq!(result, Err(Error::AccountNotFound(999)));
    }

    #[test]
    fn other_users_cannot_read_or_delete() {
        let connection = get_test_connection();
        let owner = insert_test_owner(&connection);
        let other = insert_owner("other@example.com", &connection);
        let created = create_recurring_transaction(
            owner.user.id,
            weekly_gym(&owner),
            datetime!(2025-01-01 00:00 UTC),
            &connection,
        )
        .unwrap();

        assert_eq!(
            get_recurring_transaction_for_user(created.id, other.user.id, &connection),
            Err(Error::NotFound)
        );
        assert_eq!(
            delete_recurring_transaction(created.id, other.user.id, &connection),
            Err(Error::DeleteMissingRecurringTransaction)
        );
        assert_eq!(
            delete_recurring_transaction(created.id, owner.user.id, &connection),
            Ok(())
        );
    }

    #[test]
    fn update_recomputes_next_run_when_schedule_changes() {
        let connection = get_test_connection();
        let owner = insert_test_owner(&connection);
        let created = create_recurring_transaction(
            owner.user.id,
            weekly_gym(&owner),
            datetime!(2025-01-01 00:00 UTC),
            &connection,
        )
        .unwrap();

        let mut changed = weekly_gym(&owner);
        changed.schedule.start_date = datetime!(2025-02-03 06:00 UTC);
        let updated = update_recurring_transaction(
            created.id,
            owner.user.id,
            changed,
            datetime!(2025-01-02 00:00 UTC),
            &connection,
        )
        .unwrap();

        assert_eq!(updated.next_run, Some(datetime!(2025-02-03 06:00 UTC)));
        assert_eq!(updated.updated_at, datetime!(2025-01-02 00:00 UTC));
    }

    #[test]
    fn update_keeps_next_run_when_only_amount_changes() {
        let connection = get_test_connection();
        let owner = insert_test_owner(&connection);
        let created = create_recurring_transaction(
            owner.user.id,
            weekly_gym(&owner),
            datetime!(2025-01-01 00:00 UTC),
            &connection,
        )
        .unwrap();

        let mut changed = weekly_gym(&owner);
        changed.amount = -20.0;
        let updated = update_recurring_transaction(
            created.id,
            owner.user.id,
            changed,
            datetime!(2025-01-02 00:00 UTC),
            &connection,
        )
        .unwrap();

        assert_eq!(updated.amount, -20.0);
        assert_eq!(updated.next_run, created.next_run);
    }

    #[test]
    fn update_missing_returns_error() {
        let connection = get_test_connection();
        let owner = insert_test_owner(&connection);

        let result = update_recurring_transaction(
            404,
            owner.user.id,
            weekly_gym(&owner),
            datetime!(2025-01-02 00:00 UTC),
            &connection,
        );

        assert_eq!(result, Err(Error::UpdateMissingRecurringTransaction));
    }

    #[test]
    fn deactivated_rule_is_filtered_out() {
        let connection = get_test_connection();
        let owner = insert_test_owner(&connection);
        let created = create_recurring_transaction(
            owner.user.id,
            weekly_gym(&owner),
            datetime!(2025-01-01 00:00 UTC),
            &connection,
        )
        .unwrap();

        set_recurring_transaction_active(
            created.id,
            owner.user.id,
            false,
            datetime!(2025-01-02 00:00 UTC),
            &connection,
        )
        .unwrap();

        let active = list_recurring_transactions(
            owner.user.id,
            &RecurringTransactionFilter {
                active: Some(true),
                ..Default::default()
            },
            &connection,
        )
        .unwrap();
        let inactive = list_recurring_transactions(
            owner.user.id,
            &RecurringTransactionFilter {
                active: Some(false),
                ..Default::default()
            },
            &connection,
        )
        .unwrap();

        assert!(active.is_empty());
        assert_eq!(inactive.len(), 1);
        assert!(!inactive[0].active);
    }
}
