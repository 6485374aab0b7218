// crates/nda-portal-core/src/core/time.rs
// ============================================================================
// Module: NDA Portal Time Model
// Description: Canonical timestamps and clock seam for audit and history.
// Purpose: Provide comparable unix-millisecond time values and an injectable clock.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Audit entries, status history, and grants are stamped with unix
//! milliseconds. Time is read through the [`Clock`] seam so windowed
//! security queries can be exercised deterministically.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Milliseconds per minute.
const MILLIS_PER_MINUTE: i64 = 60_000;
/// Milliseconds per hour.
const MILLIS_PER_HOUR: i64 = 60 * MILLIS_PER_MINUTE;

// ============================================================================
// SECTION: Time Values
// ============================================================================

/// Canonical timestamp in unix epoch milliseconds.
///
/// # Invariants
/// - Arithmetic saturates instead of wrapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(i64);

impl Timestamp {
    /// Builds a timestamp from unix epoch milliseconds.
    #[must_use]
    pub const fn from_unix_millis(value: i64) -> Self {
        Self(value)
    }

    /// Returns the timestamp as unix epoch milliseconds.
    #[must_use]
    pub const fn as_unix_millis(self) -> i64 {
        self.0
    }

    /// Reads the current wall-clock time.
    #[must_use]
    pub fn now() -> Self {
        let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
        Self(i64::try_from(now.as_millis()).unwrap_or(i64::MAX))
    }

    /// Returns the timestamp shifted back by the given number of minutes.
    #[must_use]
    pub const fn minus_minutes(self, minutes: u32) -> Self {
        Self(self.0.saturating_sub((minutes as i64).saturating_mul(MILLIS_PER_MINUTE)))
    }

    /// Returns the timestamp shifted back by the given number of hours.
    #[must_use]
    pub const fn minus_hours(self, hours: u32) -> Self {
        Self(self.0.saturating_sub((hours as i64).saturating_mul(MILLIS_PER_HOUR)))
    }
}

// ============================================================================
// SECTION: Clock
// ============================================================================

/// Source of the current time.
pub trait Clock: Send + Sync {
    /// Returns the current time.
    fn now(&self) -> Timestamp;
}

/// Clock backed by the system wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Timestamp::now()
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::Timestamp;

    #[test]
    fn minus_minutes_shifts_by_whole_minutes() {
        let base = Timestamp::from_unix_millis(10 * 60_000);
        assert_eq!(base.minus_minutes(3).as_unix_millis(), 7 * 60_000);
    }

    #[test]
    fn minus_hours_saturates_at_minimum() {
        let base = Timestamp::from_unix_millis(i64::MIN + 5);
        assert_eq!(base.minus_hours(24).as_unix_millis(), i64::MIN);
    }
}
