//! Countdown to the trip start.
//!
//! Pure derived computation: given the trip's start timestamp and the
//! current time, break the remaining duration into days/hours/minutes/
//! seconds, or report that the trip has started once the difference is no
//! longer positive. The once-per-second recomputation cadence belongs to
//! the caller; nothing here is stateful.

use chrono::{Duration, Local, NaiveDate, NaiveDateTime, NaiveTime};

use crate::error::{Result, TripPlanError};

/// Remaining time, broken down for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeLeft {
    pub days: i64,
    pub hours: i64,
    pub minutes: i64,
    pub seconds: i64,
}

/// Countdown view state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountdownState {
    /// Still counting down.
    Counting(TimeLeft),
    /// The start moment has been reached or passed.
    Started,
}

impl CountdownState {
    /// Compute the countdown for a stored start timestamp at `now`.
    ///
    /// A difference of zero or less means the trip has started.
    pub fn until(start_date: &str, now: NaiveDateTime) -> Result<CountdownState> {
        let start = parse_start_date(start_date)?;
        let remaining = start.signed_duration_since(now);
        if remaining <= Duration::zero() {
            return Ok(CountdownState::Started);
        }
        Ok(CountdownState::Counting(TimeLeft {
            days: remaining.num_days(),
            hours: remaining.num_hours() % 24,
            minutes: remaining.num_minutes() % 60,
            seconds: remaining.num_seconds() % 60,
        }))
    }

    /// Compute the countdown against the local wall clock.
    pub fn until_now(start_date: &str) -> Result<CountdownState> {
        Self::until(start_date, Local::now().naive_local())
    }
}

/// Parse a stored start timestamp.
///
/// Accepts full ISO-8601 local timestamps (`2025-07-20T00:00:00`, with or
/// without fractional seconds or a seconds field at all) and bare dates
/// (`2025-07-20`), which count from midnight.
pub fn parse_start_date(value: &str) -> Result<NaiveDateTime> {
    if let Ok(dt) = NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f") {
        return Ok(dt);
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M") {
        return Ok(dt);
    }
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return Ok(date.and_time(NaiveTime::MIN));
    }
    Err(TripPlanError::Parse {
        message: format!("'{}' is not a valid start date", value),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, min, s)
            .unwrap()
    }

    #[test]
    fn test_start_in_the_past_is_started() {
        let now = at(2025, 7, 21, 12, 0, 0);
        let state = CountdownState::until("2025-07-20T00:00:00", now).unwrap();
        assert_eq!(state, CountdownState::Started);
    }

    #[test]
    fn test_start_exactly_now_is_started() {
        let now = at(2025, 7, 20, 0, 0, 0);
        let state = CountdownState::until("2025-07-20T00:00:00", now).unwrap();
        assert_eq!(state, CountdownState::Started);
    }

    #[test]
    fn test_one_of_each_unit_remaining() {
        let now = at(2025, 7, 18, 22, 58, 59);
        // Start is exactly 1 day, 1 hour, 1 minute, 1 second later.
        let state = CountdownState::until("2025-07-20T00:00:00", now).unwrap();
        assert_eq!(
            state,
            CountdownState::Counting(TimeLeft {
                days: 1,
                hours: 1,
                minutes: 1,
                seconds: 1,
            })
        );
    }

    #[test]
    fn test_whole_days_remaining() {
        let now = at(2025, 7, 13, 0, 0, 0);
        let state = CountdownState::until("2025-07-20T00:00:00", now).unwrap();
        assert_eq!(
            state,
            CountdownState::Counting(TimeLeft {
                days: 7,
                hours: 0,
                minutes: 0,
                seconds: 0,
            })
        );
    }

    #[test]
    fn test_bare_date_counts_from_midnight() {
        let now = at(2025, 7, 19, 23, 59, 59);
        let state = CountdownState::until("2025-07-20", now).unwrap();
        assert_eq!(
            state,
            CountdownState::Counting(TimeLeft {
                days: 0,
                hours: 0,
                minutes: 0,
                seconds: 1,
            })
        );
    }

    #[test]
    fn test_invalid_start_date_is_a_parse_error() {
        let now = at(2025, 7, 19, 0, 0, 0);
        let err = CountdownState::until("next summer", now).unwrap_err();
        assert!(matches!(err, TripPlanError::Parse { .. }));
    }
}
