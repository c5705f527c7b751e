//! External services the manager calls into: current time and fresh ids.
//!
//! Pricing logic never reads the system clock directly; the manager asks
//! its [`Clock`] and passes the instant down. Swap in [`FixedClock`] and
//! [`SequentialIds`] for deterministic tests.

use core::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};

/// Source of the current instant.
pub trait Clock: core::fmt::Debug + Send + Sync {
    /// Returns the current instant.
    fn now(&self) -> DateTime<Utc>;
}

/// Source of unique identifiers.
pub trait IdGenerator: core::fmt::Debug + Send + Sync {
    /// Returns a new identifier, never returned before by this generator.
    fn next_id(&self) -> String;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    #[inline]
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock frozen at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedClock(DateTime<Utc>);

impl FixedClock {
    /// Creates a clock that always reports `instant`.
    #[inline]
    #[must_use]
    pub const fn new(instant: DateTime<Utc>) -> Self {
        Self(instant)
    }
}

impl Clock for FixedClock {
    #[inline]
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Random UUID v4 identifiers.
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidGenerator;

impl IdGenerator for UuidGenerator {
    #[inline]
    fn next_id(&self) -> String {
        uuid::Uuid::new_v4().to_string()
    }
}

/// Deterministic `<prefix>-<n>` identifiers starting at 1.
#[derive(Debug)]
pub struct SequentialIds {
    /// Text placed before the counter.
    prefix: String,
    /// Last issued number.
    counter: AtomicU64,
}

impl SequentialIds {
    /// Creates a generator producing `prefix-1`, `prefix-2`, ...
    #[inline]
    #[must_use]
    pub fn new<T: Into<String>>(prefix: T) -> Self {
        Self {
            prefix: prefix.into(),
            counter: AtomicU64::new(0),
        }
    }
}

impl IdGenerator for SequentialIds {
    #[inline]
    fn next_id(&self) -> String {
        let next = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        format!("{}-{next}", self.prefix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_clock_is_frozen() {
        let instant = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        let clock = FixedClock::new(instant);
        assert_eq!(clock.now(), instant);
        assert_eq!(clock.now(), instant);
    }

    #[test]
    fn system_clock_moves_forward() {
        let first = SystemClock.now();
        let second = SystemClock.now();
        assert!(second >= first);
    }

    #[test]
    fn uuid_generator_produces_distinct_uuids() {
        let first = UuidGenerator.next_id();
        let second = UuidGenerator.next_id();
        assert_ne!(first, second);
        assert!(uuid::Uuid::parse_str(&first).is_ok());
    }

    #[test]
    fn sequential_ids_count_from_one() {
        let ids = SequentialIds::new("calc");
        assert_eq!(ids.next_id(), "calc-1");
        assert_eq!(ids.next_id(), "calc-2");
    }
}
