//! Detection State Machine for the MMBM Strategy
//!
//! Per trading day, strictly forward:
//! 1. AWAITING_SWEEP - Wait for a bar to take out the sell-side liquidity level
//! 2. SWEPT - Track the sweep low, wait for a displacement close above the MSS level
//! 3. STRUCTURE_CONFIRMED - Wait for a bullish fair value gap
//! 4. GAP_DETECTED - Wait for a discount close inside the trade window / kill zone
//! 5. ENTRY_SIGNALED - Entry emitted, waiting for a fill (times out after max bars)
//! 6. FILLED / CANCELLED
//!
//! All per-day state lives in `DayState`, which is recreated at every daily reset.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::bars::BarSeries;
use super::daily_levels::DailyRange;
use super::liquidity::{recent_swing_high, LiquidityLocator, LiquidityMode};
use super::session::{KillZone, SessionStamp, TimeWindow};
use crate::types::{Signal, SignalKind, PRICE_EPSILON};

/// Which close confirms a sweep bar
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SweepCloseRule {
    /// Any penetration qualifies
    Any,
    /// Close must reclaim above the level
    Reclaim,
    /// Close must stay at or below the level
    HoldBelow,
}

/// What a max-bars-to-fill cancellation re-arms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RearmPolicy {
    /// Keep sweep and structure, wait for a brand-new gap
    NewGap,
    /// Start over from the sweep
    NewSweep,
}

/// Configuration for the detection state machine
#[derive(Debug, Clone)]
pub struct DetectionConfig {
    pub tick_size: f64,
    pub liquidity_mode: LiquidityMode,
    /// Bars searched for swing / equal lows
    pub lookback: usize,
    /// Bars on each side of a swing point
    pub swing_strength: usize,
    pub sweep_min_ticks: u32,
    pub sweep_close: SweepCloseRule,
    pub displacement_min_ticks: u32,
    pub fvg_min_ticks: u32,
    /// Fraction of the daily range (from the low) treated as discount
    pub discount_threshold: f64,
    pub trade_window: TimeWindow,
    pub kill_zone: KillZone,
    pub max_trades_per_day: u32,
    /// HHMM after which no entries are signaled and positions are flattened
    pub eod_cutoff: u32,
    pub max_bars_to_fill: usize,
    pub rearm: RearmPolicy,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            tick_size: 0.25,
            liquidity_mode: LiquidityMode::PriorDayLow,
            lookback: 50,
            swing_strength: 2,
            sweep_min_ticks: 2,
            sweep_close: SweepCloseRule::Any,
            displacement_min_ticks: 8,
            fvg_min_ticks: 2,
            discount_threshold: 0.5,
            trade_window: TimeWindow::new(830, 1500),
            kill_zone: KillZone::NewYorkAm,
            max_trades_per_day: 1,
            eod_cutoff: 1555,
            max_bars_to_fill: 30,
            rearm: RearmPolicy::NewGap,
        }
    }
}

impl DetectionConfig {
    fn ticks(&self, count: u32) -> f64 {
        count as f64 * self.tick_size
    }

    pub fn locator(&self) -> LiquidityLocator {
        LiquidityLocator {
            mode: self.liquidity_mode,
            lookback: self.lookback,
            strength: self.swing_strength,
            tick_size: self.tick_size,
        }
    }
}

/// Sweep and structure levels carried from the sweep bar onward
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SweepContext {
    pub liquidity: f64,
    /// Lowest low seen since the sweep (frozen once structure confirms)
    pub sweep_low: f64,
    /// Swing high a close must exceed to confirm the structure shift
    pub mss_level: f64,
}

/// Bullish fair value gap, `top > bottom`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GapZone {
    pub top: f64,
    pub bottom: f64,
    pub bar_index: usize,
}

impl GapZone {
    pub fn midpoint(&self) -> f64 {
        (self.top + self.bottom) / 2.0
    }
}

/// Pending entry waiting for a fill
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TradeSetup {
    pub signal_bar: usize,
    pub signal_price: f64,
}

/// Detection phase for the current day
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DayPhase {
    AwaitingSweep,
    Swept(SweepContext),
    StructureConfirmed(SweepContext),
    GapDetected(SweepContext, GapZone),
    EntrySignaled(SweepContext, GapZone, TradeSetup),
    Filled(SweepContext, GapZone),
    Cancelled(SweepContext),
}

impl std::fmt::Display for DayPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DayPhase::AwaitingSweep => write!(f, "AWAITING_SWEEP"),
            DayPhase::Swept(_) => write!(f, "SWEPT"),
            DayPhase::StructureConfirmed(_) => write!(f, "STRUCTURE_CONFIRMED"),
            DayPhase::GapDetected(..) => write!(f, "GAP_DETECTED"),
            DayPhase::EntrySignaled(..) => write!(f, "ENTRY_SIGNALED"),
            DayPhase::Filled(..) => write!(f, "FILLED"),
            DayPhase::Cancelled(_) => write!(f, "CANCELLED"),
        }
    }
}

/// Everything owned by a single trading day
#[derive(Debug, Clone, PartialEq)]
pub struct DayState {
    pub day_id: i32,
    /// Sell-side liquidity level, computed lazily once the daily range is complete
    pub liquidity: Option<f64>,
    pub phase: DayPhase,
    pub trades_today: u32,
    pub eod_processed: bool,
}

impl DayState {
    pub fn new(day_id: i32) -> Self {
        Self {
            day_id,
            liquidity: None,
            phase: DayPhase::AwaitingSweep,
            trades_today: 0,
            eod_processed: false,
        }
    }

    pub fn sweep(&self) -> Option<SweepContext> {
        match self.phase {
            DayPhase::AwaitingSweep => None,
            DayPhase::Swept(ctx)
            | DayPhase::StructureConfirmed(ctx)
            | DayPhase::GapDetected(ctx, _)
            | DayPhase::EntrySignaled(ctx, _, _)
            | DayPhase::Filled(ctx, _)
            | DayPhase::Cancelled(ctx) => Some(ctx),
        }
    }

    pub fn gap(&self) -> Option<GapZone> {
        match self.phase {
            DayPhase::GapDetected(_, gap)
            | DayPhase::EntrySignaled(_, gap, _)
            | DayPhase::Filled(_, gap) => Some(gap),
            _ => None,
        }
    }

    pub fn pending_setup(&self) -> Option<TradeSetup> {
        match self.phase {
            DayPhase::EntrySignaled(_, _, setup) => Some(setup),
            _ => None,
        }
    }

    /// Discard a pending entry. Returns the setup if one was pending.
    pub fn cancel_setup(&mut self, rearm: RearmPolicy) -> Option<TradeSetup> {
        let DayPhase::EntrySignaled(ctx, _, setup) = self.phase else {
            return None;
        };
        self.phase = match rearm {
            RearmPolicy::NewGap => DayPhase::Cancelled(ctx),
            RearmPolicy::NewSweep => DayPhase::AwaitingSweep,
        };
        Some(setup)
    }

    /// Move a pending entry to FILLED and count the trade
    pub fn mark_filled(&mut self) -> Option<(SweepContext, GapZone)> {
        let DayPhase::EntrySignaled(ctx, gap, _) = self.phase else {
            return None;
        };
        self.phase = DayPhase::Filled(ctx, gap);
        self.trades_today += 1;
        Some((ctx, gap))
    }
}

/// The MMBM detection state machine
#[derive(Debug, Clone)]
pub struct DetectionMachine {
    config: DetectionConfig,
    locator: LiquidityLocator,
}

impl DetectionMachine {
    pub fn new(config: DetectionConfig) -> Self {
        let locator = config.locator();
        Self { config, locator }
    }

    pub fn config(&self) -> &DetectionConfig {
        &self.config
    }

    /// Advance the day's phase with the finalized bar at `index`.
    /// Several phases may advance on the same bar.
    pub fn on_bar<S: BarSeries + ?Sized>(
        &self,
        day: &mut DayState,
        series: &S,
        index: usize,
        stamp: SessionStamp,
        range: &DailyRange,
        position_open: bool,
    ) -> Vec<Signal> {
        let mut signals = Vec::new();

        // No prior-day range yet, nothing to measure against
        if !range.complete {
            return signals;
        }

        let level = match day.liquidity {
            Some(level) => level,
            None => {
                let level = self.locator.locate(series, index, range);
                info!("Liquidity level {:.2} ({})", level, self.config.liquidity_mode);
                day.liquidity = Some(level);
                level
            }
        };

        let bar = series.bar(index);

        if let Some(setup) = day.pending_setup() {
            let waited = index.saturating_sub(setup.signal_bar);
            if waited > self.config.max_bars_to_fill {
                day.cancel_setup(self.config.rearm);
                info!("SETUP CANCELLED: no fill after {} bars", waited);
                signals.push(Signal::new(
                    SignalKind::SetupCancelled,
                    index,
                    bar,
                    setup.signal_price,
                    format!("Entry from bar {} not filled within {} bars", setup.signal_bar, self.config.max_bars_to_fill),
                ));
            }
        }

        if let DayPhase::Swept(ctx) = &mut day.phase {
            if bar.low < ctx.sweep_low {
                ctx.sweep_low = bar.low;
                debug!("Sweep low extended to {:.2}", bar.low);
            }
        }

        while let Some((next, signal)) = self.step(day, series, index, stamp, range, level, position_open) {
            day.phase = next;
            signals.extend(signal);
        }

        signals
    }

    #[allow(clippy::too_many_arguments)]
    fn step<S: BarSeries + ?Sized>(
        &self,
        day: &DayState,
        series: &S,
        index: usize,
        stamp: SessionStamp,
        range: &DailyRange,
        level: f64,
        position_open: bool,
    ) -> Option<(DayPhase, Option<Signal>)> {
        let cfg = &self.config;
        let bar = series.bar(index);

        match day.phase {
            DayPhase::AwaitingSweep => {
                let threshold = level - cfg.ticks(cfg.sweep_min_ticks);
                if bar.low > threshold + PRICE_EPSILON {
                    return None;
                }

                let close_ok = match cfg.sweep_close {
                    SweepCloseRule::Any => true,
                    SweepCloseRule::Reclaim => bar.close > level,
                    SweepCloseRule::HoldBelow => bar.close <= level + PRICE_EPSILON,
                };
                if !close_ok {
                    debug!("Sweep of {:.2} rejected by close {:.2}", level, bar.close);
                    return None;
                }

                let mss_level = recent_swing_high(series, index, cfg.swing_strength);
                info!(
                    "STATE: SWEEP {:.2} | low {:.2} | MSS level {:.2}",
                    level, bar.low, mss_level
                );

                let ctx = SweepContext {
                    liquidity: level,
                    sweep_low: bar.low,
                    mss_level,
                };
                let signal = Signal::new(
                    SignalKind::SweepDetected,
                    index,
                    bar,
                    bar.low,
                    format!("SSL {:.2} swept at {:.2}", level, bar.low),
                );
                Some((DayPhase::Swept(ctx), Some(signal)))
            }

            DayPhase::Swept(ctx) => {
                let displaced = bar.body() + PRICE_EPSILON >= cfg.ticks(cfg.displacement_min_ticks);
                if bar.close <= ctx.mss_level || !displaced {
                    return None;
                }

                info!(
                    "STATE: MSS CONFIRMED | close {:.2} > {:.2} | body {:.2}",
                    bar.close,
                    ctx.mss_level,
                    bar.body()
                );
                let signal = Signal::new(
                    SignalKind::StructureConfirmed,
                    index,
                    bar,
                    ctx.mss_level,
                    format!("MSS above {:.2}, sweep low {:.2}", ctx.mss_level, ctx.sweep_low),
                );
                Some((DayPhase::StructureConfirmed(ctx), Some(signal)))
            }

            DayPhase::StructureConfirmed(ctx) | DayPhase::Cancelled(ctx) => {
                let gap = self.find_gap(series, index)?;
                info!(
                    "STATE: FVG {:.2} - {:.2} at bar {}",
                    gap.bottom, gap.top, gap.bar_index
                );
                Some((DayPhase::GapDetected(ctx, gap), None))
            }

            DayPhase::GapDetected(ctx, gap) => {
                if position_open || !self.entry_allowed(day, stamp, range, bar.close) {
                    return None;
                }

                info!(
                    "STATE: ENTRY READY @ {:.2} | FVG {:.2} - {:.2}",
                    bar.close, gap.bottom, gap.top
                );
                let setup = TradeSetup {
                    signal_bar: index,
                    signal_price: bar.close,
                };
                let signal = Signal::new(
                    SignalKind::EntryReady,
                    index,
                    bar,
                    bar.close,
                    format!("Long from FVG {:.2} - {:.2}", gap.bottom, gap.top),
                );
                Some((DayPhase::EntrySignaled(ctx, gap, setup), Some(signal)))
            }

            DayPhase::Filled(ctx, gap) => {
                if position_open {
                    return None;
                }
                debug!("Position closed, FVG {:.2} - {:.2} available again", gap.bottom, gap.top);
                Some((DayPhase::GapDetected(ctx, gap), None))
            }

            DayPhase::EntrySignaled(..) => None,
        }
    }

    /// Bullish gap between the bar two back and the current bar
    fn find_gap<S: BarSeries + ?Sized>(&self, series: &S, index: usize) -> Option<GapZone> {
        let earlier = index.checked_sub(2)?;
        let top = series.low(index);
        let bottom = series.high(earlier);

        let min_gap = self.config.ticks(self.config.fvg_min_ticks);
        if top > bottom && top - bottom + PRICE_EPSILON >= min_gap {
            Some(GapZone {
                top,
                bottom,
                bar_index: index,
            })
        } else {
            None
        }
    }

    fn entry_allowed(&self, day: &DayState, stamp: SessionStamp, range: &DailyRange, close: f64) -> bool {
        let cfg = &self.config;

        if !cfg.trade_window.contains(stamp.hhmm) || !cfg.kill_zone.contains(stamp.hhmm) {
            debug!("Entry blocked: {} outside trade window / {}", stamp.hhmm, cfg.kill_zone);
            return false;
        }
        if day.trades_today >= cfg.max_trades_per_day {
            debug!("Entry blocked: {} trades today", day.trades_today);
            return false;
        }
        if stamp.hhmm >= cfg.eod_cutoff {
            return false;
        }

        match range.is_discount(close, cfg.discount_threshold) {
            Some(true) => true,
            Some(false) => {
                debug!("Entry blocked: close {:.2} not in discount", close);
                false
            }
            None => false,
        }
    }
}
