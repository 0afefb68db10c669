//! Market session resolution.
//!
//! Pure functions mapping a wall-clock time to a market session state and
//! to the next open/close transition. The caller supplies the timestamp
//! (device-local wall time), so there is no clock or timezone dependency
//! here; exchange holiday calendars are deliberately not modeled.

use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime, Timelike, Weekday};
use serde::{Deserialize, Serialize};

// ============================================================================
// Types
// ============================================================================

/// State of the trading venue at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub enum MarketSession {
    Open,
    Closed,
    PreMarket,
    AfterHours,
}

impl std::fmt::Display for MarketSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            MarketSession::Open => "open",
            MarketSession::Closed => "closed",
            MarketSession::PreMarket => "pre-market",
            MarketSession::AfterHours => "after-hours",
        };
        write!(f, "{}", s)
    }
}

/// Daily session boundaries, in whole local hours.
///
/// The market is open on weekdays within `[open_hour, close_hour)`.
/// Pre-market covers `[pre_open_hour, open_hour)` and after-hours
/// `[close_hour, post_close_hour)`; everything else is closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketHours {
    pub pre_open_hour: u32,
    pub open_hour: u32,
    pub close_hour: u32,
    pub post_close_hour: u32,
}

impl Default for MarketHours {
    fn default() -> Self {
        Self {
            pre_open_hour: 8,
            open_hour: 9,
            close_hour: 16,
            post_close_hour: 18,
        }
    }
}

/// The next session boundary relative to some timestamp. Exactly one of
/// the fields is set: `next_close` while the market is open, `next_open`
/// otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketTransition {
    pub next_open: Option<NaiveDateTime>,
    pub next_close: Option<NaiveDateTime>,
}

/// Current session plus the next boundary, as reported to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketStatus {
    pub session: MarketSession,
    pub transition: MarketTransition,
}

// ============================================================================
// Resolution
// ============================================================================

/// Resolve the session state for a local wall-clock timestamp.
pub fn resolve_session(now: NaiveDateTime, hours: &MarketHours) -> MarketSession {
    if is_weekend(now.date()) {
        return MarketSession::Closed;
    }
    let hour = now.hour();
    if hour >= hours.open_hour && hour < hours.close_hour {
        MarketSession::Open
    } else if hour >= hours.pre_open_hour && hour < hours.open_hour {
        MarketSession::PreMarket
    } else if hour >= hours.close_hour && hour < hours.post_close_hour {
        MarketSession::AfterHours
    } else {
        MarketSession::Closed
    }
}

/// True only during the regular session, not pre-market or after-hours.
pub fn is_market_open(now: NaiveDateTime, hours: &MarketHours) -> bool {
    resolve_session(now, hours) == MarketSession::Open
}

/// Compute the next session boundary.
///
/// While open, that is today's close. Otherwise it is the next weekday
/// open: later today if before the bell, else rolled forward day by day
/// past any weekend.
pub fn next_transition(now: NaiveDateTime, hours: &MarketHours) -> MarketTransition {
    if is_market_open(now, hours) {
        return MarketTransition {
            next_open: None,
            next_close: Some(at_hour(now.date(), hours.close_hour)),
        };
    }

    let mut date = now.date();
    if is_weekend(date) || now.hour() >= hours.open_hour {
        date = next_weekday(date);
    }
    MarketTransition {
        next_open: Some(at_hour(date, hours.open_hour)),
        next_close: None,
    }
}

/// Resolve session and transition together.
pub fn market_status(now: NaiveDateTime, hours: &MarketHours) -> MarketStatus {
    MarketStatus {
        session: resolve_session(now, hours),
        transition: next_transition(now, hours),
    }
}

fn is_weekend(date: NaiveDate) -> bool {
    matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

/// The first Mon-Fri date strictly after `date`.
fn next_weekday(date: NaiveDate) -> NaiveDate {
    let mut next = date.succ_opt().unwrap_or(date);
    while is_weekend(next) {
        next = next.succ_opt().unwrap_or(next);
    }
    next
}

fn at_hour(date: NaiveDate, hour: u32) -> NaiveDateTime {
    date.and_hms_opt(hour.min(23), 0, 0)
        .unwrap_or_else(|| date.and_time(NaiveTime::MIN))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn dt(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, min, 0)
            .unwrap()
    }

    fn hours() -> MarketHours {
        MarketHours::default()
    }

    #[test]
    fn test_tuesday_morning_is_open() {
        // 2025-06-10 is a Tuesday
        assert_eq!(resolve_session(dt(2025, 6, 10, 10, 0), &hours()), MarketSession::Open);
        assert!(is_market_open(dt(2025, 6, 10, 10, 0), &hours()));
    }

    #[test]
    fn test_saturday_is_closed_all_day() {
        // 2025-06-14 is a Saturday
        assert_eq!(resolve_session(dt(2025, 6, 14, 10, 0), &hours()), MarketSession::Closed);
        assert_eq!(resolve_session(dt(2025, 6, 14, 8, 30), &hours()), MarketSession::Closed);
    }

    #[test]
    fn test_tuesday_evening_is_closed_with_next_open() {
        let now = dt(2025, 6, 10, 18, 0);
        assert_eq!(resolve_session(now, &hours()), MarketSession::Closed);

        let transition = next_transition(now, &hours());
        assert_eq!(transition.next_open, Some(dt(2025, 6, 11, 9, 0)));
        assert_eq!(transition.next_close, None);
    }

    #[test]
    fn test_pre_market_and_after_hours_windows() {
        assert_eq!(resolve_session(dt(2025, 6, 10, 8, 30), &hours()), MarketSession::PreMarket);
        assert_eq!(resolve_session(dt(2025, 6, 10, 16, 30), &hours()), MarketSession::AfterHours);
        assert_eq!(resolve_session(dt(2025, 6, 10, 17, 59), &hours()), MarketSession::AfterHours);
        // The after-hours window is exclusive at its end.
        assert_eq!(resolve_session(dt(2025, 6, 10, 7, 0), &hours()), MarketSession::Closed);
    }

    #[test]
    fn test_open_session_reports_todays_close() {
        let transition = next_transition(dt(2025, 6, 10, 10, 0), &hours());
        assert_eq!(transition.next_close, Some(dt(2025, 6, 10, 16, 0)));
        assert_eq!(transition.next_open, None);
    }

    #[test]
    fn test_before_open_reports_todays_open() {
        let transition = next_transition(dt(2025, 6, 10, 7, 0), &hours());
        assert_eq!(transition.next_open, Some(dt(2025, 6, 10, 9, 0)));
    }

    #[test]
    fn test_weekend_rolls_to_monday() {
        // Saturday and Sunday both roll to Monday 2025-06-16
        for day in [14, 15] {
            let transition = next_transition(dt(2025, 6, day, 11, 0), &hours());
            assert_eq!(transition.next_open, Some(dt(2025, 6, 16, 9, 0)));
        }
    }

    #[test]
    fn test_friday_after_close_rolls_to_monday() {
        // 2025-06-13 is a Friday
        let transition = next_transition(dt(2025, 6, 13, 17, 0), &hours());
        assert_eq!(transition.next_open, Some(dt(2025, 6, 16, 9, 0)));
    }

    #[test]
    fn test_market_status_combines_both() {
        let status = market_status(dt(2025, 6, 10, 10, 0), &hours());
        assert_eq!(status.session, MarketSession::Open);
        assert!(status.transition.next_close.is_some());
    }
}
