//! The source of "now" for the scheduler.
//!
//! Everything that compares against the current time takes a [Clock] so tests
//! can pin time to a known instant.

use time::OffsetDateTime;

/// Something that can tell the time.
pub trait Clock: Send + Sync {
    /// The current time in UTC.
    fn now(&self) -> OffsetDateTime;
}

/// The wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }
}

#[cfg(test)]
mod tests {
    use time::{Duration, OffsetDateTime, UtcOffset};

    use super::{Clock, SystemClock};

    #[test]
    fn system_clock_is_utc_and_current() {
        let before = OffsetDateTime::now_utc();

        let now = SystemClock.now();

        assert_eq!(now.offset(), UtcOffset::UTC);
        assert!(now >= before && now - before < Duration::seconds(5));
    }
}
