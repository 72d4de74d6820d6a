use chrono::{NaiveDate, NaiveDateTime, TimeDelta};
use serde::Serialize;
use utoipa::ToSchema;

use crate::{
    error::{AttendanceError, AttendanceResult, ErrorCode},
    model::{attendance::AttendanceStatus, schedule::Schedule},
    settings::Settings,
};

/// Check-in opens this long before the shift starts.
pub const CHECKIN_OPENS_BEFORE_MINUTES: i64 = 5 * 60;
/// Check-in closes this long after the shift starts.
pub const CHECKIN_CLOSES_AFTER_MINUTES: i64 = 2 * 60 + 30;
/// Leaving earlier than this before shift end counts as left early.
pub const EARLY_LEAVE_TOLERANCE_MINUTES: i64 = 5;

const STAMP: &str = "%Y-%m-%d %H:%M";

/// Check-in timing for one session, anchored to the session date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
pub struct CheckInWindow {
    #[schema(value_type = String, format = "date-time")]
    pub shift_start: NaiveDateTime,
    #[schema(value_type = String, format = "date-time")]
    pub opens_at: NaiveDateTime,
    #[schema(value_type = String, format = "date-time")]
    pub closes_at: NaiveDateTime,
    #[schema(value_type = String, format = "date-time")]
    pub grace_ends_at: NaiveDateTime,
}

impl CheckInWindow {
    pub fn new(schedule: &Schedule, date: NaiveDate, grace_minutes: i64) -> Self {
        let shift_start = schedule.shift_start(date);
        Self {
            shift_start,
            opens_at: shift_start - TimeDelta::minutes(CHECKIN_OPENS_BEFORE_MINUTES),
            closes_at: shift_start + TimeDelta::minutes(CHECKIN_CLOSES_AFTER_MINUTES),
            grace_ends_at: shift_start + TimeDelta::minutes(grace_minutes),
        }
    }

    pub fn contains(&self, now: NaiveDateTime) -> bool {
        self.opens_at <= now && now <= self.closes_at
    }

    pub fn check(&self, now: NaiveDateTime) -> AttendanceResult<()> {
        if now < self.opens_at {
            return Err(AttendanceError::reject(
                ErrorCode::TooEarly,
                format!("Check-in opens at {}", self.opens_at.format(STAMP)),
            ));
        }
        if now > self.closes_at {
            return Err(AttendanceError::reject(
                ErrorCode::TooLate,
                format!("Check-in closed at {}", self.closes_at.format(STAMP)),
            ));
        }
        Ok(())
    }

    /// Status and lateness for a check-in at `now`.
    pub fn classify(&self, now: NaiveDateTime) -> (AttendanceStatus, i64) {
        if now <= self.grace_ends_at {
            (AttendanceStatus::Present, 0)
        } else {
            let late = (now - self.grace_ends_at).num_minutes().max(0);
            (AttendanceStatus::Late, late)
        }
    }
}

/// Configured break window resolved onto a concrete shift.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakWindow {
    pub starts_at: NaiveDateTime,
    pub ends_at: NaiveDateTime,
}

impl BreakWindow {
    /// `None` when either end of the window is not configured.
    pub fn resolve(settings: &Settings, anchor: NaiveDate, schedule: Option<&Schedule>) -> Option<Self> {
        let start = settings.break_start_window?;
        let end = settings.break_end_window?;

        let mut starts_at = anchor.and_time(start);
        let mut ends_at = anchor.and_time(end);

        if end < start {
            ends_at += TimeDelta::days(1);
        } else if schedule.is_some_and(|s| s.crosses_midnight() && start < s.time_in) {
            // An overnight shift reaches this window after midnight.
            starts_at += TimeDelta::days(1);
            ends_at += TimeDelta::days(1);
        }

        Some(Self { starts_at, ends_at })
    }

    pub fn check(&self, now: NaiveDateTime) -> AttendanceResult<()> {
        if now < self.starts_at {
            return Err(AttendanceError::reject(
                ErrorCode::TooEarly,
                format!("Breaks are allowed from {}", self.starts_at.format(STAMP)),
            ));
        }
        if now > self.ends_at {
            return Err(AttendanceError::reject(
                ErrorCode::TooLate,
                format!("Breaks were allowed until {}", self.ends_at.format(STAMP)),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::testing::{at, day};
    use crate::model::schedule::schedule;
    use chrono::NaiveTime;

    #[test]
    fn checkin_window_bounds() {
        let w = CheckInWindow::new(&schedule(1, "09:00", "17:00"), day("2026-03-02"), 15);
        assert_eq!(w.opens_at, at("2026-03-02 04:00"));
        assert_eq!(w.closes_at, at("2026-03-02 11:30"));
        assert_eq!(w.grace_ends_at, at("2026-03-02 09:15"));

        assert_eq!(w.check(at("2026-03-02 03:59")).unwrap_err().code(), ErrorCode::TooEarly);
        assert!(w.check(at("2026-03-02 04:00")).is_ok());
        assert!(w.check(at("2026-03-02 11:30")).is_ok());
        assert_eq!(w.check(at("2026-03-02 11:31")).unwrap_err().code(), ErrorCode::TooLate);
    }

    #[test]
    fn grace_period_classification() {
        let w = CheckInWindow::new(&schedule(1, "09:00", "17:00"), day("2026-03-02"), 15);
        assert_eq!(w.classify(at("2026-03-02 09:14")), (AttendanceStatus::Present, 0));
        assert_eq!(w.classify(at("2026-03-02 09:15")), (AttendanceStatus::Present, 0));
        assert_eq!(w.classify(at("2026-03-02 09:16")), (AttendanceStatus::Late, 1));
        assert_eq!(w.classify(at("2026-03-02 10:15")), (AttendanceStatus::Late, 60));
    }

    #[test]
    fn overnight_window_opens_on_session_date() {
        let w = CheckInWindow::new(&schedule(2, "22:00", "06:00"), day("2026-03-02"), 15);
        assert!(w.contains(at("2026-03-02 21:50")));
        assert!(w.contains(at("2026-03-03 00:29")));
        assert!(!w.contains(at("2026-03-03 00:31")));
    }

    fn break_settings(start: &str, end: &str) -> Settings {
        Settings {
            break_start_window: NaiveTime::parse_from_str(start, "%H:%M").ok(),
            break_end_window: NaiveTime::parse_from_str(end, "%H:%M").ok(),
            ..Settings::default()
        }
    }

    #[test]
    fn unset_break_window_is_unbounded() {
        assert!(BreakWindow::resolve(&Settings::default(), day("2026-03-02"), None).is_none());
    }

    #[test]
    fn day_break_window() {
        let w = BreakWindow::resolve(&break_settings("12:00", "14:00"), day("2026-03-02"), Some(&schedule(1, "09:00", "17:00")))
            .unwrap();
        assert_eq!(w.starts_at, at("2026-03-02 12:00"));
        assert_eq!(w.ends_at, at("2026-03-02 14:00"));
        assert_eq!(w.check(at("2026-03-02 11:59")).unwrap_err().code(), ErrorCode::TooEarly);
        assert_eq!(w.check(at("2026-03-02 14:01")).unwrap_err().code(), ErrorCode::TooLate);
    }

    #[test]
    fn wrapping_break_window_ends_next_day() {
        let w = BreakWindow::resolve(&break_settings("23:00", "01:00"), day("2026-03-02"), None).unwrap();
        assert_eq!(w.starts_at, at("2026-03-02 23:00"));
        assert_eq!(w.ends_at, at("2026-03-03 01:00"));
    }

    #[test]
    fn overnight_shift_moves_early_window_to_next_day() {
        let night = schedule(2, "22:00", "06:00");
        let w = BreakWindow::resolve(&break_settings("01:00", "03:00"), day("2026-03-02"), Some(&night)).unwrap();
        assert_eq!(w.starts_at, at("2026-03-03 01:00"));
        assert_eq!(w.ends_at, at("2026-03-03 03:00"));
        assert!(w.check(at("2026-03-03 02:00")).is_ok());
    }
}
