//! Forbidden-window evaluation.
//!
//! Pure functions only; callers sample the clock themselves each time they
//! need an answer. No timezone conversion happens here: the window and `now`
//! are compared as naive local values.

use crate::model::TimeOfDay;
use chrono::{NaiveTime, Timelike};
use std::fmt;

/// Daily half-open interval `[start, end)` during which irrigation must not run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForbiddenWindow {
    pub start: TimeOfDay,
    pub end: TimeOfDay,
}

impl ForbiddenWindow {
    /// True iff `start <= now < end`.
    ///
    /// A window whose end is not after its start never matches.
    pub fn is_forbidden(&self, now_minutes_since_midnight: u16) -> bool {
        let start = self.start.minutes_since_midnight();
        let end = self.end.minutes_since_midnight();
        start <= now_minutes_since_midnight && now_minutes_since_midnight < end
    }

    pub fn is_forbidden_at(&self, now: NaiveTime) -> bool {
        self.is_forbidden(minutes_since_midnight(now))
    }

    pub fn is_permitted_at(&self, now: NaiveTime) -> bool {
        !self.is_forbidden_at(now)
    }
}

impl fmt::Display for ForbiddenWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

/// Whole minutes elapsed since midnight; seconds are truncated.
pub fn minutes_since_midnight(time: NaiveTime) -> u16 {
    (time.hour() * 60 + time.minute()) as u16
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window(start: &str, end: &str) -> ForbiddenWindow {
        ForbiddenWindow {
            start: start.parse().unwrap(),
            end: end.parse().unwrap(),
        }
    }

    fn at(h: u32, m: u32, s: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, s).unwrap()
    }

    #[test]
    fn test_boundaries() {
        let w = window("11:00", "14:30");
        assert!(w.is_forbidden(11 * 60));
        assert!(w.is_forbidden(14 * 60 + 29));
        assert!(!w.is_forbidden(14 * 60 + 30));
        assert!(!w.is_forbidden(10 * 60 + 59));
    }

    #[test]
    fn test_seconds_are_truncated() {
        let w = window("11:00", "14:30");
        assert!(w.is_forbidden_at(at(11, 0, 0)));
        assert!(w.is_forbidden_at(at(14, 29, 59)));
        assert!(!w.is_forbidden_at(at(14, 30, 0)));
        assert!(w.is_permitted_at(at(10, 59, 59)));
    }

    #[test]
    fn test_exhaustive_against_definition() {
        let w = window("11:00", "14:30");
        for now in 0..crate::model::time_of_day::MINUTES_PER_DAY {
            let expected = (660..870).contains(&now);
            assert_eq!(w.is_forbidden(now), expected, "minute {}", now);
        }
    }

    #[test]
    fn test_inverted_or_empty_window_never_matches() {
        let w = window("22:00", "06:00");
        assert!(!w.is_forbidden(23 * 60));
        assert!(!w.is_forbidden(60));

        let w = window("12:00", "12:00");
        assert!(!w.is_forbidden(12 * 60));
    }

    #[test]
    fn test_display() {
        assert_eq!(window("11:00", "14:30").to_string(), "11:00-14:30");
    }
}
