//! Countdown Decomposition
//!
//! Turns the contract's `timeLeft()` into the four display strings of the
//! countdown (days, hours, minutes, seconds).
//!
//! ## Rules
//!
//! - Units are calendar-agnostic: 1 day = 86400 s, 1 hour = 3600 s,
//!   1 minute = 60 s. No weeks, months or years.
//! - Every unit is always present. A zero magnitude renders as `"0"`.
//! - [`TimeBreakdown::unknown`] (all empty strings) means "not fetched
//!   yet" and is never produced from a number. `decompose(0)` is all `"0"`.
//! - Negative input is rejected with [`DurationError::Negative`]; it is
//!   not clamped.

use thiserror::Error;

const SECONDS_PER_MINUTE: u64 = 60;
const SECONDS_PER_HOUR: u64 = 60 * SECONDS_PER_MINUTE;
const SECONDS_PER_DAY: u64 = 24 * SECONDS_PER_HOUR;

#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum DurationError {
    #[error("remaining duration cannot be negative: {0}")]
    Negative(i64),
}

/// Display strings of the countdown.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TimeBreakdown {
    pub days: String,
    pub hours: String,
    pub minutes: String,
    pub seconds: String,
}

impl TimeBreakdown {
    /// The breakdown shown before `timeLeft()` has been observed.
    pub fn unknown() -> Self {
        Self::default()
    }

    /// Decomposes a known, non-negative number of seconds.
    pub fn from_seconds(total: u64) -> Self {
        let days = total / SECONDS_PER_DAY;
        let hours = (total % SECONDS_PER_DAY) / SECONDS_PER_HOUR;
        let minutes = (total % SECONDS_PER_HOUR) / SECONDS_PER_MINUTE;
        let seconds = total % SECONDS_PER_MINUTE;

        Self {
            days: days.to_string(),
            hours: hours.to_string(),
            minutes: minutes.to_string(),
            seconds: seconds.to_string(),
        }
    }

    /// Breakdown for an optional observation: `None` maps to
    /// [`TimeBreakdown::unknown`].
    pub fn from_observed(seconds_left: Option<u64>) -> Self {
        seconds_left.map(Self::from_seconds).unwrap_or_default()
    }

    /// `false` only for the "not yet known" breakdown.
    pub fn is_known(&self) -> bool {
        !self.days.is_empty()
    }

    /// Seconds implied by the four fields, `None` while unknown, if a field
    /// is not a number, or if the total overflows.
    pub fn total_seconds(&self) -> Option<u64> {
        let d: u64 = self.days.parse().ok()?;
        let h: u64 = self.hours.parse().ok()?;
        let m: u64 = self.minutes.parse().ok()?;
        let s: u64 = self.seconds.parse().ok()?;
        d.checked_mul(SECONDS_PER_DAY)?
            .checked_add(h.checked_mul(SECONDS_PER_HOUR)?)?
            .checked_add(m.checked_mul(SECONDS_PER_MINUTE)?)?
            .checked_add(s)
    }
}

/// Decomposes `seconds_left` into days, hours, minutes and seconds.
pub fn decompose(seconds_left: i64) -> Result<TimeBreakdown, DurationError> {
    u64::try_from(seconds_left)
        .map(TimeBreakdown::from_seconds)
        .map_err(|_| DurationError::Negative(seconds_left))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parts(b: &TimeBreakdown) -> (&str, &str, &str, &str) {
        (&b.days, &b.hours, &b.minutes, &b.seconds)
    }

    #[test]
    fn zero_is_all_zero_not_unknown() {
        let b = decompose(0).unwrap_or_else(|e| panic!("{}", e));
        assert_eq!(parts(&b), ("0", "0", "0", "0"));
        assert!(b.is_known());
        assert_ne!(b, TimeBreakdown::unknown());
    }

    #[test]
    fn unknown_is_all_empty() {
        let b = TimeBreakdown::unknown();
        assert_eq!(parts(&b), ("", "", "", ""));
        assert!(!b.is_known());
        assert_eq!(b.total_seconds(), None);
        assert_eq!(TimeBreakdown::from_observed(None), b);
    }

    #[test]
    fn one_of_each_unit() {
        let b = decompose(90_061).unwrap_or_else(|e| panic!("{}", e));
        assert_eq!(parts(&b), ("1", "1", "1", "1"));
    }

    #[test]
    fn under_a_minute() {
        let b = decompose(59).unwrap_or_else(|e| panic!("{}", e));
        assert_eq!(parts(&b), ("0", "0", "0", "59"));
    }

    #[test]
    fn exact_days_keep_smaller_units_as_zero() {
        let b = decompose(3 * 86_400).unwrap_or_else(|e| panic!("{}", e));
        assert_eq!(parts(&b), ("3", "0", "0", "0"));
    }

    #[test]
    fn no_week_or_month_rollup() {
        let b = TimeBreakdown::from_seconds(40 * 86_400 + 7);
        assert_eq!(parts(&b), ("40", "0", "0", "7"));
    }

    #[test]
    fn negative_rejected() {
        assert_eq!(decompose(-1), Err(DurationError::Negative(-1)));
        assert_eq!(decompose(i64::MIN), Err(DurationError::Negative(i64::MIN)));
    }

    #[test]
    fn implied_total_matches_input() {
        let samples = [
            0u64, 1, 59, 60, 61, 3_599, 3_600, 3_601, 86_399, 86_400, 86_401, 90_061,
            1_000_000, 31_536_000, 987_654_321,
        ];
        for s in samples {
            let b = TimeBreakdown::from_seconds(s);
            assert_eq!(b.total_seconds(), Some(s), "seconds_left = {}", s);
            let h: u64 = b.hours.parse().unwrap_or(u64::MAX);
            let m: u64 = b.minutes.parse().unwrap_or(u64::MAX);
            let sec: u64 = b.seconds.parse().unwrap_or(u64::MAX);
            assert!(h < 24 && m < 60 && sec < 60, "out of range for {}", s);
        }
    }

    #[test]
    fn total_seconds_overflow_is_none() {
        let mut b = TimeBreakdown::from_seconds(0);
        b.days = u64::MAX.to_string();
        assert_eq!(b.total_seconds(), None);

        let mut b = TimeBreakdown::from_seconds(0);
        b.seconds = u64::MAX.to_string();
        b.minutes = "1".to_string();
        assert_eq!(b.total_seconds(), None);

        // The largest decomposable value still sums back exactly.
        let b = TimeBreakdown::from_seconds(u64::MAX);
        assert_eq!(b.total_seconds(), Some(u64::MAX));
    }

    #[test]
    fn observed_value_decomposes() {
        assert_eq!(
            TimeBreakdown::from_observed(Some(61)),
            TimeBreakdown::from_seconds(61)
        );
    }
}
