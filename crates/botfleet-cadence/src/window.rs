//! Active posting windows.
//!
//! An agent only posts between `start_hour` (inclusive) and `end_hour`
//! (exclusive), UTC. A window may wrap midnight (`start > end`), and
//! `start == end` means always open.

use chrono::{DateTime, Duration, TimeZone, Timelike, Utc};
use serde::{Deserialize, Serialize};

/// Hours of day an agent is allowed to post in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveWindow {
    pub start_hour: u8,
    pub end_hour: u8,
}

impl ActiveWindow {
    /// Clamps hours into 0..=23.
    pub fn new(start_hour: u8, end_hour: u8) -> Self {
        Self { start_hour: start_hour.min(23), end_hour: end_hour.min(23) }
    }

    /// Window length in hours (24 when always open).
    pub fn len_hours(&self) -> f64 {
        if self.start_hour == self.end_hour {
            24.0
        } else if self.start_hour < self.end_hour {
            (self.end_hour - self.start_hour) as f64
        } else {
            (24 - self.start_hour + self.end_hour) as f64
        }
    }

    /// Is this instant inside the window?
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        let h = at.hour() as u8;
        if self.start_hour == self.end_hour {
            true
        } else if self.start_hour < self.end_hour {
            h >= self.start_hour && h < self.end_hour
        } else {
            h >= self.start_hour || h < self.end_hour
        }
    }

    /// The given instant if already open, otherwise the next window
    /// opening. Never moves backward.
    pub fn next_open(&self, after: DateTime<Utc>) -> DateTime<Utc> {
        if self.contains(after) {
            return after;
        }
        let date = after.date_naive();
        let today_open = Utc
            .from_utc_datetime(&date.and_hms_opt(self.start_hour as u32, 0, 0).unwrap());
        if today_open > after {
            today_open
        } else {
            today_open + Duration::days(1)
        }
    }
}

impl Default for ActiveWindow {
    fn default() -> Self {
        Self { start_hour: 7, end_hour: 23 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 10, h, m, 0).unwrap()
    }

    #[test]
    fn test_plain_window() {
        let w = ActiveWindow::new(7, 23);
        assert!(w.contains(at(7, 0)));
        assert!(w.contains(at(22, 59)));
        assert!(!w.contains(at(23, 0)));
        assert!(!w.contains(at(3, 0)));
        assert_eq!(w.len_hours(), 16.0);
    }

    #[test]
    fn test_wrapped_window() {
        let w = ActiveWindow::new(20, 4);
        assert!(w.contains(at(21, 0)));
        assert!(w.contains(at(2, 30)));
        assert!(!w.contains(at(12, 0)));
        assert_eq!(w.len_hours(), 8.0);
    }

    #[test]
    fn test_always_open() {
        let w = ActiveWindow::new(9, 9);
        assert!(w.contains(at(0, 0)));
        assert_eq!(w.len_hours(), 24.0);
        assert_eq!(w.next_open(at(3, 15)), at(3, 15));
    }

    #[test]
    fn test_next_open() {
        let w = ActiveWindow::new(7, 23);
        // Before opening: snaps forward to today's open
        assert_eq!(w.next_open(at(3, 0)), at(7, 0));
        // Inside: untouched
        assert_eq!(w.next_open(at(12, 0)), at(12, 0));
        // After close: tomorrow's open
        assert_eq!(w.next_open(at(23, 30)), at(7, 0) + Duration::days(1));
    }

    #[test]
    fn test_next_open_wrapped() {
        let w = ActiveWindow::new(20, 4);
        assert_eq!(w.next_open(at(12, 0)), at(20, 0));
        assert_eq!(w.next_open(at(2, 0)), at(2, 0));
        assert_eq!(w.next_open(at(5, 0)), at(20, 0));
    }
}
