//! Strategy configuration
//!
//! One flat, serde-friendly struct carrying every input the strategy reads.
//! Components get focused views via `detection()` and `risk()`.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::trading_core::liquidity::LiquidityMode;
use crate::trading_core::risk::{EntryMode, RiskConfig, StopMode, TargetMode};
use crate::trading_core::session::{KillZone, SessionClock, TimeWindow};
use crate::trading_core::state_machine::{DetectionConfig, RearmPolicy, SweepCloseRule};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategyConfig {
    /// Symbol traded (e.g., "NQ.c.0")
    pub symbol: String,
    /// IANA timezone for session times
    pub timezone: String,
    /// Minimum price increment
    pub tick_size: f64,
    /// Dollar value per point (NQ = $20)
    pub point_value: f64,

    /// Trade window start (HHMM)
    pub trade_start: u32,
    /// Trade window end (HHMM, exclusive)
    pub trade_end: u32,
    pub kill_zone: KillZone,
    /// Fraction of the daily range (from the low) treated as discount, 0..1
    pub discount_threshold: f64,

    pub liquidity_mode: LiquidityMode,
    /// Bars searched for swing / equal lows
    pub lookback: usize,
    /// Bars each side of a swing point
    pub swing_strength: usize,
    pub sweep_min_ticks: u32,
    pub sweep_close: SweepCloseRule,
    pub displacement_min_ticks: u32,
    pub fvg_min_ticks: u32,

    pub entry_mode: EntryMode,
    /// Bars an entry signal waits for a fill before it is cancelled
    pub max_bars_to_fill: usize,
    pub rearm_after_cancel: RearmPolicy,
    /// Contracts per entry
    pub contracts: u32,

    pub stop_mode: StopMode,
    pub stop_ticks: u32,
    pub target_mode: TargetMode,
    pub rr_multiple: f64,

    pub partial_exit: bool,
    /// Percent of the position closed at TP1
    pub partial_percent: f64,

    pub max_trades_per_day: u32,
    /// End-of-day flatten time (HHMM)
    pub eod_cutoff: u32,
    /// Cancel a pending unfilled entry at the cutoff
    pub cancel_working_at_eod: bool,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            symbol: "NQ.c.0".to_string(),
            timezone: "America/New_York".to_string(),
            tick_size: 0.25,
            point_value: 20.0,
            trade_start: 830,
            trade_end: 1500,
            kill_zone: KillZone::NewYorkAm,
            discount_threshold: 0.5,
            liquidity_mode: LiquidityMode::PriorDayLow,
            lookback: 50,
            swing_strength: 2,
            sweep_min_ticks: 2,
            sweep_close: SweepCloseRule::Any,
            displacement_min_ticks: 8,
            fvg_min_ticks: 2,
            entry_mode: EntryMode::Midpoint,
            max_bars_to_fill: 30,
            rearm_after_cancel: RearmPolicy::NewGap,
            contracts: 2,
            stop_mode: StopMode::BelowSweep,
            stop_ticks: 4,
            target_mode: TargetMode::RiskReward,
            rr_multiple: 2.0,
            partial_exit: true,
            partial_percent: 50.0,
            max_trades_per_day: 1,
            eod_cutoff: 1555,
            cancel_working_at_eod: true,
        }
    }
}

impl StrategyConfig {
    /// Load from a JSON file; missing fields keep their defaults
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {:?}", path))?;
        let config: Self = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse config: {:?}", path))?;
        config.session_clock()?;
        Ok(config)
    }

    pub fn session_clock(&self) -> Result<SessionClock> {
        SessionClock::from_name(&self.timezone)
    }

    pub fn detection(&self) -> DetectionConfig {
        DetectionConfig {
            tick_size: self.tick_size,
            liquidity_mode: self.liquidity_mode,
            lookback: self.lookback,
            swing_strength: self.swing_strength,
            sweep_min_ticks: self.sweep_min_ticks,
            sweep_close: self.sweep_close,
            displacement_min_ticks: self.displacement_min_ticks,
            fvg_min_ticks: self.fvg_min_ticks,
            discount_threshold: self.discount_threshold,
            trade_window: TimeWindow::new(self.trade_start, self.trade_end),
            kill_zone: self.kill_zone,
            max_trades_per_day: self.max_trades_per_day,
            eod_cutoff: self.eod_cutoff,
            max_bars_to_fill: self.max_bars_to_fill,
            rearm: self.rearm_after_cancel,
        }
    }

    pub fn risk(&self) -> RiskConfig {
        RiskConfig {
            tick_size: self.tick_size,
            entry_mode: self.entry_mode,
            stop_mode: self.stop_mode,
            stop_ticks: self.stop_ticks,
            target_mode: self.target_mode,
            rr_multiple: self.rr_multiple,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config: StrategyConfig =
            serde_json::from_str(r#"{ "stop_mode": "BelowGap", "rr_multiple": 3.0 }"#).unwrap();
        assert_eq!(config.stop_mode, StopMode::BelowGap);
        assert_eq!(config.rr_multiple, 3.0);
        assert_eq!(config.tick_size, 0.25);
        assert_eq!(config.kill_zone, KillZone::NewYorkAm);
    }

    #[test]
    fn test_sub_configs() {
        let config = StrategyConfig {
            trade_start: 930,
            trade_end: 1130,
            ..Default::default()
        };
        let detection = config.detection();
        assert!(detection.trade_window.contains(930));
        assert!(!detection.trade_window.contains(1130));
        assert_eq!(detection.max_bars_to_fill, 30);

        let risk = config.risk();
        assert_eq!(risk.stop_ticks, 4);
        assert_eq!(risk.target_mode, TargetMode::RiskReward);
    }

    #[test]
    fn test_from_file_rejects_bad_timezone() {
        let path = std::env::temp_dir().join("mmbm_bad_tz_config.json");
        std::fs::write(&path, r#"{ "timezone": "Nowhere/Special" }"#).unwrap();
        assert!(StrategyConfig::from_file(&path).is_err());
        let _ = std::fs::remove_file(&path);
    }
}
