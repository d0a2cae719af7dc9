//! Risk planning for a filled entry
//!
//! Entry comes from the fair value gap, the stop from one of several
//! structural references, TP1 is always the daily equilibrium.

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::daily_levels::DailyRange;
use super::state_machine::GapZone;

/// Which part of the gap is used as the entry price
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryMode {
    Top,
    Bottom,
    Midpoint,
}

/// Reference the stop is placed below
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopMode {
    /// Fixed distance below entry
    Fixed,
    BelowSweep,
    BelowGap,
    BelowDailyLow,
}

impl std::fmt::Display for StopMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StopMode::Fixed => write!(f, "FIXED"),
            StopMode::BelowSweep => write!(f, "SWEEP"),
            StopMode::BelowGap => write!(f, "FVG"),
            StopMode::BelowDailyLow => write!(f, "PDL"),
        }
    }
}

/// Final target selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TargetMode {
    RiskReward,
    Equilibrium,
    DailyHigh,
}

#[derive(Debug, Clone)]
pub struct RiskConfig {
    pub tick_size: f64,
    pub entry_mode: EntryMode,
    pub stop_mode: StopMode,
    /// Stop distance for `Fixed`, buffer below the reference otherwise
    pub stop_ticks: u32,
    pub target_mode: TargetMode,
    pub rr_multiple: f64,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            tick_size: 0.25,
            entry_mode: EntryMode::Midpoint,
            stop_mode: StopMode::BelowSweep,
            stop_ticks: 4,
            target_mode: TargetMode::RiskReward,
            rr_multiple: 2.0,
        }
    }
}

/// Computed levels for a position
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RiskPlan {
    pub entry: f64,
    pub stop: f64,
    /// Partial target, daily equilibrium
    pub tp1: f64,
    /// Final target
    pub tp2: f64,
}

impl RiskPlan {
    pub fn risk(&self) -> f64 {
        self.entry - self.stop
    }

    pub fn has_positive_risk(&self) -> bool {
        self.risk() > 0.0
    }
}

/// Round `price` to the nearest multiple of `tick_size`
pub fn round_to_tick(price: f64, tick_size: f64) -> f64 {
    if tick_size <= 0.0 {
        return price;
    }
    (price / tick_size).round() * tick_size
}

/// Build the plan for a long entry from `gap`. `round` snaps prices to the
/// instrument's tick grid. Non-positive risk is reported but not rejected.
pub fn plan(
    config: &RiskConfig,
    gap: &GapZone,
    sweep_low: f64,
    range: &DailyRange,
    round: impl Fn(f64) -> f64,
) -> RiskPlan {
    let entry = round(match config.entry_mode {
        EntryMode::Top => gap.top,
        EntryMode::Bottom => gap.bottom,
        EntryMode::Midpoint => gap.midpoint(),
    });

    let buffer = config.stop_ticks as f64 * config.tick_size;
    let stop = round(match config.stop_mode {
        StopMode::Fixed => entry,
        StopMode::BelowSweep => sweep_low,
        StopMode::BelowGap => gap.bottom,
        StopMode::BelowDailyLow => range.low,
    } - buffer);

    let tp1 = round(range.equilibrium());
    let risk = entry - stop;
    let tp2 = round(match config.target_mode {
        TargetMode::RiskReward => entry + risk * config.rr_multiple,
        TargetMode::Equilibrium => range.equilibrium(),
        TargetMode::DailyHigh => range.high,
    });

    if risk <= 0.0 {
        warn!(
            "Non-positive risk: entry {:.2} stop {:.2} ({} stop), targets {:.2}/{:.2}",
            entry, stop, config.stop_mode, tp1, tp2
        );
    }

    RiskPlan { entry, stop, tp1, tp2 }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn range() -> DailyRange {
        DailyRange {
            high: 110.0,
            low: 100.0,
            complete: true,
        }
    }

    fn ticks(price: f64) -> f64 {
        round_to_tick(price, 0.25)
    }

    #[test]
    fn test_round_to_tick() {
        assert_eq!(round_to_tick(101.13, 0.25), 101.25);
        assert_eq!(round_to_tick(101.12, 0.25), 101.0);
        assert_eq!(round_to_tick(101.13, 0.0), 101.13);
    }

    #[test]
    fn test_below_sweep_with_rr_target() {
        let config = RiskConfig {
            entry_mode: EntryMode::Top,
            ..Default::default()
        };
        let gap = GapZone { top: 104.0, bottom: 102.0, bar_index: 7 };

        let plan = plan(&config, &gap, 99.0, &range(), ticks);
        assert_eq!(plan.entry, 104.0);
        assert_eq!(plan.stop, 98.0);
        assert_eq!(plan.risk(), 6.0);
        assert_eq!(plan.tp1, 105.0);
        assert_eq!(plan.tp2, 116.0);
    }

    #[test]
    fn test_entry_modes() {
        let gap = GapZone { top: 103.0, bottom: 101.5, bar_index: 3 };
        let entry = |mode| {
            let config = RiskConfig { entry_mode: mode, ..Default::default() };
            plan(&config, &gap, 99.0, &range(), ticks).entry
        };
        assert_eq!(entry(EntryMode::Top), 103.0);
        assert_eq!(entry(EntryMode::Bottom), 101.5);
        // 102.25 is already on the grid
        assert_eq!(entry(EntryMode::Midpoint), 102.25);
    }

    #[test]
    fn test_stop_modes() {
        let gap = GapZone { top: 103.0, bottom: 101.5, bar_index: 3 };
        let stop = |mode| {
            let config = RiskConfig {
                entry_mode: EntryMode::Top,
                stop_mode: mode,
                stop_ticks: 8,
                ..Default::default()
            };
            plan(&config, &gap, 99.0, &range(), ticks).stop
        };
        assert_eq!(stop(StopMode::Fixed), 101.0);
        assert_eq!(stop(StopMode::BelowSweep), 97.0);
        assert_eq!(stop(StopMode::BelowGap), 99.5);
        assert_eq!(stop(StopMode::BelowDailyLow), 98.0);
    }

    #[test]
    fn test_target_modes() {
        let gap = GapZone { top: 103.0, bottom: 101.5, bar_index: 3 };
        let tp2 = |mode| {
            let config = RiskConfig {
                entry_mode: EntryMode::Top,
                target_mode: mode,
                ..Default::default()
            };
            plan(&config, &gap, 99.0, &range(), ticks).tp2
        };
        assert_eq!(tp2(TargetMode::Equilibrium), 105.0);
        assert_eq!(tp2(TargetMode::DailyHigh), 110.0);
        // risk = 103 - 98 = 5, 2R
        assert_eq!(tp2(TargetMode::RiskReward), 113.0);
    }

    #[test]
    fn test_non_positive_risk_still_planned() {
        // Daily low stop above a gap that formed under the prior day low
        let config = RiskConfig {
            entry_mode: EntryMode::Bottom,
            stop_mode: StopMode::BelowDailyLow,
            stop_ticks: 0,
            ..Default::default()
        };
        let gap = GapZone { top: 99.0, bottom: 98.0, bar_index: 3 };

        let plan = plan(&config, &gap, 97.0, &range(), ticks);
        assert!(!plan.has_positive_risk());
        assert!(plan.tp2 <= plan.entry);
    }
}
