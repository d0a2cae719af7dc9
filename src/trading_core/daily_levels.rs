//! Daily dealing range
//!
//! Tracks the running high/low of the current trading day and freezes it into
//! the prior-day `DailyRange` at rollover. The frozen range supplies:
//! - Equilibrium: midpoint of the range
//! - Discount/premium thresholds: fractions of the range above the low

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::types::Bar;

/// Prior trading day's high/low, frozen at day rollover
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DailyRange {
    pub high: f64,
    pub low: f64,
    pub complete: bool,
}

impl DailyRange {
    /// High minus low; None until complete or when the range is empty
    pub fn span(&self) -> Option<f64> {
        let span = self.high - self.low;
        (self.complete && span > 0.0).then_some(span)
    }

    /// Midpoint of the dealing range
    pub fn equilibrium(&self) -> f64 {
        (self.high + self.low) / 2.0
    }

    /// Fractional location of `price` inside the range (0 = low, 1 = high)
    pub fn location(&self, price: f64) -> Option<f64> {
        self.span().map(|span| (price - self.low) / span)
    }

    /// Highest price still considered discount for `threshold`
    pub fn discount_ceiling(&self, threshold: f64) -> Option<f64> {
        self.span().map(|span| self.low + span * threshold)
    }

    /// Whether `price` sits at or below the discount threshold; None when no range data
    pub fn is_discount(&self, price: f64, threshold: f64) -> Option<bool> {
        self.discount_ceiling(threshold)
            .map(|ceiling| price <= ceiling + crate::types::PRICE_EPSILON)
    }
}

/// Running high/low for the current day plus the frozen prior-day range
#[derive(Debug, Clone, Default)]
pub struct DailyRangeTracker {
    range: DailyRange,
    today_high: Option<f64>,
    today_low: Option<f64>,
    current_day: Option<i32>,
}

impl DailyRangeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn range(&self) -> &DailyRange {
        &self.range
    }

    pub fn current_day(&self) -> Option<i32> {
        self.current_day
    }

    /// Switch to `day_id`. Freezes the tracked high/low into the prior-day range
    /// and clears today's trackers. Returns false (no-op) when already on that day.
    pub fn roll_to(&mut self, day_id: i32) -> bool {
        if self.current_day == Some(day_id) {
            return false;
        }

        if let (Some(high), Some(low)) = (self.today_high, self.today_low) {
            self.range = DailyRange {
                high,
                low,
                complete: true,
            };
            info!(
                "Daily range frozen: high {:.2} low {:.2} eq {:.2}",
                high,
                low,
                self.range.equilibrium()
            );
        }

        self.today_high = None;
        self.today_low = None;
        self.current_day = Some(day_id);
        true
    }

    /// Fold a bar into today's running high/low
    pub fn observe(&mut self, bar: &Bar) {
        self.today_high = Some(self.today_high.map_or(bar.high, |h| h.max(bar.high)));
        self.today_low = Some(self.today_low.map_or(bar.low, |l| l.min(bar.low)));
    }

    pub fn today(&self) -> Option<(f64, f64)> {
        self.today_high.zip(self.today_low)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::test_bars::{bar_at, session_start};

    fn range(low: f64, high: f64) -> DailyRange {
        DailyRange {
            high,
            low,
            complete: true,
        }
    }

    #[test]
    fn test_discount_threshold() {
        let r = range(100.0, 110.0);
        assert_eq!(r.discount_ceiling(0.5), Some(105.0));
        assert_eq!(r.is_discount(104.0, 0.5), Some(true));
        assert_eq!(r.is_discount(105.0, 0.5), Some(true));
        assert_eq!(r.is_discount(106.0, 0.5), Some(false));
        assert_eq!(r.equilibrium(), 105.0);
        assert_eq!(r.location(102.5), Some(0.25));
    }

    #[test]
    fn test_zero_range_is_no_data() {
        let r = range(100.0, 100.0);
        assert_eq!(r.span(), None);
        assert_eq!(r.location(100.0), None);
        assert_eq!(r.is_discount(100.0, 0.5), None);

        let incomplete = DailyRange::default();
        assert_eq!(incomplete.is_discount(0.0, 0.5), None);
    }

    #[test]
    fn test_rollover_freezes_previous_day() {
        let ts = session_start();
        let mut tracker = DailyRangeTracker::new();

        assert!(tracker.roll_to(2025_063));
        assert!(!tracker.range().complete);

        tracker.observe(&bar_at(ts, 105.0, 110.0, 104.0, 106.0));
        tracker.observe(&bar_at(ts, 106.0, 107.0, 100.0, 101.0));
        assert_eq!(tracker.today(), Some((110.0, 100.0)));

        assert!(tracker.roll_to(2025_064));
        assert_eq!(*tracker.range(), range(100.0, 110.0));
        assert_eq!(tracker.today(), None);
    }

    #[test]
    fn test_roll_is_idempotent() {
        let ts = session_start();
        let mut tracker = DailyRangeTracker::new();
        tracker.roll_to(1);
        tracker.observe(&bar_at(ts, 105.0, 110.0, 100.0, 106.0));
        assert!(tracker.roll_to(2));
        let frozen = *tracker.range();

        // Second roll to the same day changes nothing
        assert!(!tracker.roll_to(2));
        assert_eq!(*tracker.range(), frozen);
        assert_eq!(tracker.current_day(), Some(2));
    }
}
