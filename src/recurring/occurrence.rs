//! Computes when a recurring transaction is next due.
//!
//! Advancing a schedule has to deal with months of different lengths, leap
//! years and weekday alignment. A schedule that has fallen behind (e.g. the
//! server was down for a while) is caught up to the first occurrence strictly
//! after "now".

use time::{Date, Duration, Month, OffsetDateTime};

use crate::recurring::models::{Interval, RecurringTransaction, Schedule};

/// Upper bound on the number of single steps taken when catching up a monthly
/// or yearly schedule. Ten thousand months is over 800 years.
pub const MAX_CATCH_UP_ITERATIONS: usize = 10_000;

/// The next due date for `schedule` given the time of its `last_run`.
///
/// If the schedule has never run, the next due date is its start date. The
/// result is otherwise always strictly after `now`; schedules that fell behind
/// skip the occurrences they missed.
///
/// Returns `None` when the next occurrence would be after the schedule's end
/// date, or the date cannot be represented.
pub fn next_occurrence(
    schedule: &Schedule,
    last_run: Option<OffsetDateTime>,
    now: OffsetDateTime,
) -> Option<OffsetDateTime> {
    let Some(last_run) = last_run else {
        return within_end_date(schedule, schedule.start_date);
    };

    let next = advance(schedule, last_run)?;
    let next = catch_up(schedule, next, now)?;

    within_end_date(schedule, next)
}

/// Whether `recurring_transaction` should be materialized at `now`.
///
/// This mirrors the filter the database applies when fetching due recurring
/// transactions.
pub fn is_due(recurring_transaction: &RecurringTransaction, now: OffsetDateTime) -> bool {
    if !recurring_transaction.active {
        return false;
    }

    if recurring_transaction
        .schedule
        .end_date
        .is_some_and(|end_date| now > end_date)
    {
        return false;
    }

    match (recurring_transaction.last_run, recurring_transaction.next_run) {
        (None, _) => now >= recurring_transaction.schedule.start_date,
        (Some(_), Some(next_run)) => now >= next_run,
        (Some(_), None) => false,
    }
}

/// Apply one step of the schedule's interval to `from`.
pub(crate) fn advance(schedule: &Schedule, from: OffsetDateTime) -> Option<OffsetDateTime> {
    match schedule.interval {
        Interval::Daily => from.checked_add(Duration::DAY),
        Interval::Weekly => {
            let next = from.checked_add(Duration::WEEK)?;

            match schedule.day_of_week {
                Some(day_of_week) => align_to_weekday(next, day_of_week),
                None => Some(next),
            }
        }
        Interval::Monthly => {
            let next = add_months(from, 1)?;

            match schedule.day_of_month {
                Some(day_of_month) => {
                    let date = next.date();
                    let day = day_of_month.min(last_day_of_month(date.year(), date.month()));
                    next.replace_day(day).ok()
                }
                None => Some(next),
            }
        }
        Interval::Yearly => add_years(from, 1),
    }
}

fn catch_up(
    schedule: &Schedule,
    next: OffsetDateTime,
    now: OffsetDateTime,
) -> Option<OffsetDateTime> {
    if next > now {
        return Some(next);
    }

    match schedule.interval {
        // Fixed-length steps keep their weekday alignment, so the missed
        // occurrences can be skipped in one jump.
        Interval::Daily => skip_ahead(next, Duration::DAY, now),
        Interval::Weekly => skip_ahead(next, Duration::WEEK, now),
        Interval::Monthly | Interval::Yearly => {
            let mut next = next;

            for _ in 0..MAX_CATCH_UP_ITERATIONS {
                next = advance(schedule, next)?;

                if next > now {
                    return Some(next);
                }

                if schedule.end_date.is_some_and(|end_date| next > end_date) {
                    return None;
                }
            }

            tracing::warn!(
                "Gave up catching up a {} schedule after {MAX_CATCH_UP_ITERATIONS} steps, last candidate {next}",
                schedule.interval
            );

            None
        }
    }
}

/// The first `next + k * step` (k >= 1) strictly after `now`, where `next <= now`.
fn skip_ahead(next: OffsetDateTime, step: Duration, now: OffsetDateTime) -> Option<OffsetDateTime> {
    let behind = now - next;
    let steps = behind.whole_seconds() / step.whole_seconds() + 1;
    let jump = step.checked_mul(i32::try_from(steps).ok()?)?;

    next.checked_add(jump)
}

/// Move forward zero to six days until the weekday matches `day_of_week` (0 = Sunday).
fn align_to_weekday(from: OffsetDateTime, day_of_week: u8) -> Option<OffsetDateTime> {
    let current = i64::from(from.weekday().number_days_from_sunday());
    let days_ahead = (i64::from(day_of_week) - current).rem_euclid(7);

    from.checked_add(Duration::days(days_ahead))
}

/// Add calendar months, clamping the day to the length of the target month.
fn add_months(from: OffsetDateTime, months: i32) -> Option<OffsetDateTime> {
    let date = from.date();
    let month_index = date.year() * 12 + i32::from(u8::from(date.month())) - 1 + months;
    let year = month_index.div_euclid(12);
    let month = Month::try_from(u8::try_from(month_index.rem_euclid(12) + 1).ok()?).ok()?;
    let day = date.day().min(last_day_of_month(year, month));
    let date = Date::from_calendar_date(year, month, day).ok()?;

    Some(from.replace_date(date))
}

/// Add calendar years. February 29th becomes February 28th in common years.
fn add_years(from: OffsetDateTime, years: i32) -> Option<OffsetDateTime> {
    let date = from.date();
    let year = date.year().checked_add(years)?;
    let day = date.day().min(last_day_of_month(year, date.month()));
    let date = Date::from_calendar_date(year, date.month(), day).ok()?;

    Some(from.replace_date(date))
}

fn last_day_of_month(year: i32, month: Month) -> u8 {
    match month {
        Month::February if time::util::is_leap_year(year) => 29,
        Month::February => 28,
        Month::April | Month::June | Month::September | Month::November => 30,
        _ => 31,
    }
}

fn within_end_date(schedule: &Schedule, candidate: OffsetDateTime) -> Option<OffsetDateTime> {
    match schedule.end_date {
        Some(end_date) if candidate > end_date => None,
        _ => Some(candidate),
    }
}


#[cfg(test)]
mod is_due_tests {
    use time::macros::datetime;

    use crate::{
        recurring::models::{Interval, Schedule},
        test_utils::test_recurring_transaction,
    };

    use super::is_due;

    fn daily_from(start: time::OffsetDateTime) -> Schedule {
        Schedule {
            interval: Interval::Daily,
            day_of_month: None,
            day_of_week: None,
            start_date: start,
            end_date: None,
        }
    }

    #[test]
    fn never_run_is_due_from_start_date() {
        let rule = test_recurring_transaction(1, daily_from(datetime!(2025-01-10 00:00 UTC)));

        assert!(!is_due(&rule, datetime!(2025-01-09 23:59 UTC)));
        assert!(is_due(&rule, datetime!(2025-01-10 00:00 UTC)));
    }

    #[test]
    fn run_rule_is_due_from_next_run() {
        let mut rule = test_recurring_transaction(1, daily_from(datetime!(2025-01-10 00:00 UTC)));
        rule.last_run = Some(datetime!(2025-01-10 00:00 UTC));
        rule.next_run = Some(datetime!(2025-01-11 00:00 UTC));

        assert!(!is_due(&rule, datetime!(2025-01-10 12:00 UTC)));
        assert!(is_due(&rule, datetime!(2025-01-11 00:00 UTC)));
    }

    #[test]
    fn inactive_rule_is_never_due() {
        let mut rule = test_recurring_transaction(1, daily_from(datetime!(2025-01-10 00:00 UTC)));
        rule.active = false;

        assert!(!is_due(&rule, datetime!(2030-01-01 00:00 UTC)));
    }

    #[test]
    fn rule_is_not_due_after_end_date() {
        let mut rule = test_recurring_transaction(1, daily_from(datetime!(2025-01-10 00:00 UTC)));
        rule.schedule.end_date = Some(datetime!(2025-01-20 00:00 UTC));

        assert!(is_due(&rule, datetime!(2025-01-20 00:00 UTC)));
        assert!(!is_due(&rule, datetime!(2025-01-20 00:00:01 UTC)));
    }

    #[test]
    fn dormant_rule_is_not_due() {
        let mut rule = test_recurring_transaction(1, daily_from(datetime!(2025-01-10 00:00 UTC)));
        rule.last_run = Some(datetime!(2025-01-10 00:00 UTC));
        rule.next_run = None;

        assert!(!is_due(&rule, datetime!(2030-01-01 00:00 UTC)));
    }
}
