//! Swing and liquidity location
//!
//! Sell-side liquidity rests below lows. The level a sweep has to take out is
//! chosen once per day from one of:
//! - the prior day low
//! - the lowest confirmed swing low in the lookback window
//! - the largest cluster of equal lows in the lookback window

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::bars::BarSeries;
use super::daily_levels::DailyRange;
use crate::types::PRICE_EPSILON;

/// Equal lows must sit within this many ticks of each other
pub const EQUAL_LOWS_TOLERANCE_TICKS: f64 = 2.0;

/// Bars scanned for the swing high fallback
const SWING_HIGH_FALLBACK_BARS: usize = 10;

/// How the sell-side liquidity level is chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LiquidityMode {
    PriorDayLow,
    SwingLow,
    EqualLows,
}

impl std::fmt::Display for LiquidityMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LiquidityMode::PriorDayLow => write!(f, "PDL"),
            LiquidityMode::SwingLow => write!(f, "SWING-LOW"),
            LiquidityMode::EqualLows => write!(f, "EQL"),
        }
    }
}

fn is_swing_low<S: BarSeries + ?Sized>(series: &S, i: usize, strength: usize) -> bool {
    let low = series.low(i);
    (i - strength..=i + strength)
        .filter(|&j| j != i)
        .all(|j| low < series.low(j))
}

fn is_swing_high<S: BarSeries + ?Sized>(series: &S, i: usize, strength: usize) -> bool {
    let high = series.high(i);
    (i - strength..=i + strength)
        .filter(|&j| j != i)
        .all(|j| high > series.high(j))
}

/// Lowest strict swing low in `[index - lookback, index - strength]`
pub fn swing_low<S: BarSeries + ?Sized>(
    series: &S,
    index: usize,
    lookback: usize,
    strength: usize,
) -> Option<f64> {
    let end = index.checked_sub(strength)?;
    let start = index.saturating_sub(lookback).max(strength);
    if start > end {
        return None;
    }

    (start..=end)
        .filter(|&i| is_swing_low(series, i, strength))
        .map(|i| series.low(i))
        .min_by(|a, b| a.total_cmp(b))
}

/// Nearest strict swing high before `index`, scanning backward from
/// `index - strength - 1`. Falls back to the highest high of the last 10 bars.
pub fn recent_swing_high<S: BarSeries + ?Sized>(series: &S, index: usize, strength: usize) -> f64 {
    if let Some(first) = index.checked_sub(strength + 1) {
        for i in (strength..=first).rev() {
            if is_swing_high(series, i, strength) {
                return series.high(i);
            }
        }
    }

    let start = (index + 1).saturating_sub(SWING_HIGH_FALLBACK_BARS);
    (start..=index)
        .map(|i| series.high(i))
        .fold(f64::NEG_INFINITY, f64::max)
}

/// Low of the largest cluster of lows whose pairwise distance is within `tolerance`.
/// Needs at least two members; ties go to the lower cluster.
pub fn equal_lows<S: BarSeries + ?Sized>(
    series: &S,
    index: usize,
    lookback: usize,
    tolerance: f64,
) -> Option<f64> {
    let start = index.saturating_sub(lookback);
    let mut lows: Vec<f64> = (start..=index).map(|i| series.low(i)).collect();
    lows.sort_by(|a, b| a.total_cmp(b));

    let mut best_start = 0;
    let mut best_len = 0;
    let mut left = 0;
    for right in 0..lows.len() {
        while lows[right] - lows[left] > tolerance + PRICE_EPSILON {
            left += 1;
        }
        let len = right - left + 1;
        if len > best_len {
            best_len = len;
            best_start = left;
        }
    }

    (best_len >= 2).then(|| lows[best_start])
}

/// Picks the daily liquidity level according to the configured mode
#[derive(Debug, Clone, Copy)]
pub struct LiquidityLocator {
    pub mode: LiquidityMode,
    pub lookback: usize,
    pub strength: usize,
    pub tick_size: f64,
}

impl LiquidityLocator {
    /// Level for the bar at `index`; searches fall back to the daily range low
    pub fn locate<S: BarSeries + ?Sized>(&self, series: &S, index: usize, range: &DailyRange) -> f64 {
        let found = match self.mode {
            LiquidityMode::PriorDayLow => None,
            LiquidityMode::SwingLow => swing_low(series, index, self.lookback, self.strength),
            LiquidityMode::EqualLows => equal_lows(
                series,
                index,
                self.lookback,
                EQUAL_LOWS_TOLERANCE_TICKS * self.tick_size,
            ),
        };

        if found.is_none() && self.mode != LiquidityMode::PriorDayLow {
            debug!("No {} found in {} bars, using prior day low", self.mode, self.lookback);
        }
        found.unwrap_or(range.low)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::test_bars::{minute_bars, session_start};
    use crate::types::Bar;

    fn lows_series(lows: &[f64]) -> Vec<Bar> {
        let ohlc: Vec<_> = lows.iter().map(|&l| (l + 1.0, l + 2.0, l, l + 1.0)).collect();
        minute_bars(session_start(), &ohlc)
    }

    fn highs_series(highs: &[f64]) -> Vec<Bar> {
        let ohlc: Vec<_> = highs.iter().map(|&h| (h - 1.0, h, h - 2.0, h - 1.0)).collect();
        minute_bars(session_start(), &ohlc)
    }

    #[test]
    fn test_swing_low_picks_lowest_qualifying() {
        //                       0      1      2     3      4      5     6      7      8
        let bars = lows_series(&[105.0, 103.0, 101.0, 103.0, 104.0, 99.0, 102.0, 103.0, 104.0]);
        let low = swing_low(&bars[..], 8, 8, 2);
        assert_eq!(low, Some(99.0));
    }

    #[test]
    fn test_swing_low_requires_strict_minimum() {
        // Equal neighbours never qualify
        let bars = lows_series(&[105.0, 104.0, 100.0, 100.0, 104.0, 105.0, 106.0]);
        assert_eq!(swing_low(&bars[..], 6, 6, 2), None);
    }

    #[test]
    fn test_swing_low_window_excludes_unconfirmed_bars() {
        // Bar 5 is the lowest but has no right-hand confirmation yet
        let bars = lows_series(&[105.0, 103.0, 101.0, 103.0, 104.0, 95.0]);
        assert_eq!(swing_low(&bars[..], 5, 5, 2), Some(101.0));
        assert_eq!(swing_low(&bars[..], 1, 5, 2), None);
    }

    #[test]
    fn test_recent_swing_high_nearest_first() {
        //                        0      1      2      3      4      5      6      7      8
        let bars = highs_series(&[100.0, 108.0, 101.0, 100.0, 104.0, 101.0, 100.0, 99.0, 98.0]);
        // Scans back from index 8 - 1 - 1 = 6: bar 4 (104) is nearer than bar 1 (108)
        assert_eq!(recent_swing_high(&bars[..], 8, 1), 104.0);
    }

    #[test]
    fn test_recent_swing_high_fallback() {
        let bars = highs_series(&[100.0, 101.0, 102.0, 103.0, 104.0]);
        // Monotonic highs have no swing: max of the last bars
        assert_eq!(recent_swing_high(&bars[..], 4, 1), 104.0);
        assert_eq!(recent_swing_high(&bars[..], 0, 2), 100.0);
    }

    #[test]
    fn test_equal_lows_largest_cluster() {
        let bars = lows_series(&[100.0, 100.25, 103.0, 100.5, 98.0, 103.25, 110.0]);
        // Tolerance 0.5: {100, 100.25, 100.5} beats {103, 103.25}
        assert_eq!(equal_lows(&bars[..], 6, 10, 0.5), Some(100.0));
    }

    #[test]
    fn test_equal_lows_needs_two_members() {
        let bars = lows_series(&[100.0, 102.0, 104.0]);
        assert_eq!(equal_lows(&bars[..], 2, 10, 0.5), None);
    }

    #[test]
    fn test_locator_falls_back_to_daily_low() {
        let bars = lows_series(&[100.0, 102.0, 104.0]);
        let range = DailyRange {
            high: 120.0,
            low: 95.0,
            complete: true,
        };

        let mut locator = LiquidityLocator {
            mode: LiquidityMode::EqualLows,
            lookback: 10,
            strength: 2,
            tick_size: 0.25,
        };
        assert_eq!(locator.locate(&bars[..], 2, &range), 95.0);

        locator.mode = LiquidityMode::PriorDayLow;
        assert_eq!(locator.locate(&bars[..], 2, &range), 95.0);
    }
}
