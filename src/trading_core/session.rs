//! Session clock and intraday windows
//!
//! Bar timestamps are converted into the trading timezone and reduced to
//! an `HHMM` integer (9:30 → 930) plus a day identifier (`year * 1000 + ordinal`)
//! that is unique across years, so day rollover detection is monotonic.

use anyhow::{anyhow, Result};
use chrono::{DateTime, Datelike, Timelike, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

/// Position of a bar in the trading timezone
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionStamp {
    /// Time of day as HHMM
    pub hhmm: u32,
    /// Day identifier, `year * 1000 + day_of_year`
    pub day_id: i32,
}

/// Converts UTC timestamps into trading-session coordinates
#[derive(Debug, Clone, Copy)]
pub struct SessionClock {
    tz: Tz,
}

impl SessionClock {
    pub fn new(tz: Tz) -> Self {
        Self { tz }
    }

    /// Build from an IANA timezone name such as "America/New_York"
    pub fn from_name(name: &str) -> Result<Self> {
        let tz: Tz = name
            .parse()
            .map_err(|e| anyhow!("unknown timezone '{}': {}", name, e))?;
        Ok(Self::new(tz))
    }

    pub fn timezone(&self) -> Tz {
        self.tz
    }

    pub fn stamp(&self, timestamp: DateTime<Utc>) -> SessionStamp {
        let local = timestamp.with_timezone(&self.tz);
        SessionStamp {
            hhmm: local.hour() * 100 + local.minute(),
            day_id: local.year() * 1000 + local.ordinal() as i32,
        }
    }
}

impl Default for SessionClock {
    fn default() -> Self {
        Self::new(chrono_tz::America::New_York)
    }
}

/// Half-open `[start, end)` window of HHMM times; wraps midnight when start > end
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: u32,
    pub end: u32,
}

impl TimeWindow {
    pub const fn new(start: u32, end: u32) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, hhmm: u32) -> bool {
        if self.start <= self.end {
            hhmm >= self.start && hhmm < self.end
        } else {
            hhmm >= self.start || hhmm < self.end
        }
    }
}

/// Intraday kill zone in which entries are permitted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KillZone {
    /// No kill zone restriction
    Any,
    London,
    NewYorkAm,
    NewYorkPm,
}

impl KillZone {
    pub fn window(&self) -> Option<TimeWindow> {
        match self {
            KillZone::Any => None,
            KillZone::London => Some(TimeWindow::new(200, 500)),
            KillZone::NewYorkAm => Some(TimeWindow::new(830, 1100)),
            KillZone::NewYorkPm => Some(TimeWindow::new(1330, 1600)),
        }
    }

    pub fn contains(&self, hhmm: u32) -> bool {
        self.window().map_or(true, |w| w.contains(hhmm))
    }
}

impl std::fmt::Display for KillZone {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KillZone::Any => write!(f, "ANY"),
            KillZone::London => write!(f, "LONDON"),
            KillZone::NewYorkAm => write!(f, "NY-AM"),
            KillZone::NewYorkPm => write!(f, "NY-PM"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_stamp_uses_trading_timezone() {
        let clock = SessionClock::default();

        // 14:30 UTC in winter is 9:30 ET
        let stamp = clock.stamp(Utc.with_ymd_and_hms(2025, 1, 15, 14, 30, 0).unwrap());
        assert_eq!(stamp.hhmm, 930);
        assert_eq!(stamp.day_id, 2025_015);

        // 13:30 UTC in summer (EDT) is also 9:30 ET
        let stamp = clock.stamp(Utc.with_ymd_and_hms(2025, 7, 1, 13, 30, 0).unwrap());
        assert_eq!(stamp.hhmm, 930);
    }

    #[test]
    fn test_day_id_rolls_at_local_midnight() {
        let clock = SessionClock::default();

        // 03:00 UTC on Jan 16 is still Jan 15 in New York
        let late = clock.stamp(Utc.with_ymd_and_hms(2025, 1, 16, 3, 0, 0).unwrap());
        assert_eq!(late.day_id, 2025_015);
        assert_eq!(late.hhmm, 2200);

        let next = clock.stamp(Utc.with_ymd_and_hms(2025, 1, 16, 5, 30, 0).unwrap());
        assert_eq!(next.day_id, 2025_016);
    }

    #[test]
    fn test_day_id_unique_across_years() {
        let clock = SessionClock::default();
        let dec31 = clock.stamp(Utc.with_ymd_and_hms(2024, 12, 31, 17, 0, 0).unwrap());
        let jan1 = clock.stamp(Utc.with_ymd_and_hms(2025, 1, 1, 17, 0, 0).unwrap());
        assert_eq!(dec31.day_id, 2024_366);
        assert!(jan1.day_id > dec31.day_id);
    }

    #[test]
    fn test_time_window() {
        let window = TimeWindow::new(930, 1100);
        assert!(!window.contains(929));
        assert!(window.contains(930));
        assert!(window.contains(1059));
        assert!(!window.contains(1100));

        let overnight = TimeWindow::new(1800, 300);
        assert!(overnight.contains(2300));
        assert!(overnight.contains(100));
        assert!(!overnight.contains(1200));
    }

    #[test]
    fn test_kill_zones() {
        assert!(KillZone::Any.contains(0));
        assert!(KillZone::NewYorkAm.contains(945));
        assert!(!KillZone::NewYorkAm.contains(1330));
        assert!(KillZone::NewYorkPm.contains(1330));
        assert!(KillZone::London.contains(300));
    }

    #[test]
    fn test_unknown_timezone_rejected() {
        assert!(SessionClock::from_name("Mars/Olympus").is_err());
        assert!(SessionClock::from_name("Europe/London").is_ok());
    }
}
