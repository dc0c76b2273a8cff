use std::{fmt::Display, str::FromStr};

use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::{
    Error, account::AccountId, category::CategoryId, database_id::DatabaseId,
    db::InvalidEnumValue, recurring::occurrence, user::UserId,
};

/// Alias for recurring transaction IDs.
pub type RecurringTransactionId = DatabaseId;

/// How often a recurring transaction happens.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Interval {
    /// Every day.
    Daily,
    /// Every seven days, optionally aligned to a day of the week.
    Weekly,
    /// A calendar month of variable length, optionally anchored to a day of the month.
    Monthly,
    /// Every calendar year on the same month and day.
    Yearly,
}

impl Interval {
    /// The name used for the interval in the database and in JSON.
    pub fn as_str(&self) -> &'static str {
        match self {
            Interval::Daily => "daily",
            Interval::Weekly => "weekly",
            Interval::Monthly => "monthly",
            Interval::Yearly => "yearly",
        }
    }
}

impl Display for Interval {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Interval {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "daily" => Ok(Interval::Daily),
            "weekly" => Ok(Interval::Weekly),
            "monthly" => Ok(Interval::Monthly),
            "yearly" => Ok(Interval::Yearly),
            other => Err(Error::InvalidInterval(other.to_owned())),
        }
    }
}

impl ToSql for Interval {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(self.as_str().into())
    }
}

impl FromSql for Interval {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let text = value.as_str()?;

        text.parse()
            .map_err(|_| FromSqlError::Other(Box::new(InvalidEnumValue(text.to_owned()))))
    }
}

/// When and how often a recurring transaction repeats.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schedule {
    /// The gap between occurrences.
    pub interval: Interval,
    /// For monthly schedules, the day of the month (1-31) each occurrence
    /// lands on. Clamped to the last day of shorter months.
    pub day_of_month: Option<u8>,
    /// For weekly schedules, the day of the week (0 = Sunday, 6 = Saturday)
    /// each occurrence lands on.
    pub day_of_week: Option<u8>,
    /// The first occurrence.
    #[serde(with = "time::serde::rfc3339")]
    pub start_date: OffsetDateTime,
    /// No occurrence is scheduled after this point.
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub end_date: Option<OffsetDateTime>,
}

impl Schedule {
    /// Check the interval-specific fields and the date range.
    ///
    /// # Errors
    /// Returns a:
    /// - [Error::InvalidDayOfWeek] or [Error::InvalidDayOfMonth] if an anchor is out of range,
    /// - [Error::AnchorIntervalMismatch] if an anchor is set for an interval it does not apply to,
    /// - [Error::EndBeforeStart] if the end date is before the start date.
    pub fn validate(&self) -> Result<(), Error> {
        match (self.interval, self.day_of_month, self.day_of_week) {
            (Interval::Weekly, None, Some(day)) if day > 6 => {
                return Err(Error::InvalidDayOfWeek(day));
            }
            (Interval::Weekly, None, _) => {}
            (Interval::Monthly, Some(day), None) if !(1..=31).contains(&day) => {
                return Err(Error::InvalidDayOfMonth(day));
            }
            (Interval::Monthly, _, None) => {}
            (Interval::Daily | Interval::Yearly, None, None) => {}
            (interval, _, _) => return Err(Error::AnchorIntervalMismatch(interval)),
        }

        match self.end_date {
            Some(end_date) if end_date < self.start_date => Err(Error::EndBeforeStart),
            _ => Ok(()),
        }
    }
}

/// A user-owned rule that produces a ledger transaction on a schedule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecurringTransaction {
    /// The ID of the recurring transaction.
    pub id: RecurringTransactionId,
    /// The user that owns the recurring transaction.
    pub user_id: UserId,
    /// The account each ledger entry is recorded against.
    pub account_id: AccountId,
    /// The category each ledger entry is booked under.
    pub category_id: CategoryId,
    /// The signed amount of each ledger entry.
    pub amount: f64,
    /// Copied onto each ledger entry.
    pub description: String,
    /// When and how often the transaction repeats.
    pub schedule: Schedule,
    /// When a ledger entry was last materialized.
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_run: Option<OffsetDateTime>,
    /// When the next ledger entry is due. `None` once the schedule has ended.
    #[serde(with = "time::serde::rfc3339::option")]
    pub next_run: Option<OffsetDateTime>,
    /// Inactive recurring transactions are never processed.
    pub active: bool,
    /// When the recurring transaction was created.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    /// When the recurring transaction was last changed.
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl RecurringTransaction {
    /// Whether a ledger entry should be materialized at `now`.
    pub fn is_due(&self, now: OffsetDateTime) -> bool {
        occurrence::is_due(self, now)
    }

    /// The next due date after `now`, counting on from the occurrence that
    /// is being materialized.
    pub fn calculate_next_run(&self, now: OffsetDateTime) -> Option<OffsetDateTime> {
        occurrence::next_occurrence(&self.schedule, Some(self.current_occurrence()), now)
    }

    /// The occurrence that processing this recurring transaction now would
    /// materialize.
    pub fn current_occurrence(&self) -> OffsetDateTime {
        self.next_run.unwrap_or(self.schedule.start_date)
    }
}

/// The user-supplied fields for creating or replacing a recurring transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewRecurringTransaction {
    /// The account each ledger entry is recorded against.
    pub account_id: AccountId,
    /// The category each ledger entry is booked under.
    pub category_id: CategoryId,
    /// The signed, non-zero amount of each ledger entry.
    pub amount: f64,
    /// A non-empty description copied onto each ledger entry.
    pub description: String,
    /// When and how often the transaction repeats.
    pub schedule: Schedule,
}

impl NewRecurringTransaction {
    /// Check the fields that can be validated without the database.
    ///
    /// # Errors
    /// Returns [Error::ZeroAmount], [Error::EmptyDescription] or any error
    /// from [Schedule::validate].
    pub fn validate(&self) -> Result<(), Error> {
        if self.amount == 0.0 || !self.amount.is_finite() {
            return Err(Error::ZeroAmount);
        }

        if self.description.trim().is_empty() {
            return Err(Error::EmptyDescription);
        }

        self.schedule.validate()
    }
}

/// Narrows a listing of a user's recurring transactions.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RecurringTransactionFilter {
    /// Only recurring transactions against this account.
    pub account_id: Option<AccountId>,
    /// Only recurring transactions in this category.
    pub category_id: Option<CategoryId>,
    /// Only active (or only inactive) recurring transactions.
    pub active: Option<bool>,
}
