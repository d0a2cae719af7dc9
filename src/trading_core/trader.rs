//! MMBM strategy context
//!
//! Broker-agnostic owner of all per-day and per-position state, driven through
//! four hooks by a single thread of control:
//! - `on_new_bar`: daily reset, range tracking and detection
//! - `on_bar_close`: end-of-day handling and position exits
//! - `on_fill`: turns a pending entry into an open position
//! - `on_deactivate`: flattens and halts
//!
//! Replay, the parameter sweep and the event runner all drive this type.

use anyhow::Result;
use tracing::{debug, error, info, warn};

use super::bars::BarSeries;
use super::daily_levels::{DailyRange, DailyRangeTracker};
use super::risk::{self, RiskConfig, RiskPlan};
use super::session::SessionClock;
use super::state_machine::{DayState, DetectionMachine};
use crate::execution::config::StrategyConfig;
use crate::execution::order::{Fill, OrderRouter};
use crate::execution::position::{ExitReason, PositionManager, TradeRecord, TradingSummary};
use crate::types::{Signal, SignalKind};

/// Result of delivering a fill to the strategy
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FillOutcome {
    /// Position opened with these levels
    Accepted(RiskPlan),
    /// No pending entry (timed out, cancelled, or never signaled)
    Rejected,
    /// A position is already open
    Refused,
}

pub struct MmbmStrategy {
    config: StrategyConfig,
    clock: SessionClock,
    machine: DetectionMachine,
    risk: RiskConfig,
    range: DailyRangeTracker,
    day: DayState,
    positions: PositionManager,
    halted: bool,
}

impl MmbmStrategy {
    pub fn new(config: StrategyConfig) -> Result<Self> {
        let clock = config.session_clock()?;
        let machine = DetectionMachine::new(config.detection());
        let risk = config.risk();
        let positions = PositionManager::new(config.partial_exit, config.partial_percent, config.point_value);

        Ok(Self {
            config,
            clock,
            machine,
            risk,
            range: DailyRangeTracker::new(),
            day: DayState::new(0),
            positions,
            halted: false,
        })
    }

    pub fn config(&self) -> &StrategyConfig {
        &self.config
    }

    pub fn day(&self) -> &DayState {
        &self.day
    }

    pub fn daily_range(&self) -> &DailyRange {
        self.range.range()
    }

    pub fn positions(&self) -> &PositionManager {
        &self.positions
    }

    pub fn trades(&self) -> &[TradeRecord] {
        self.positions.history()
    }

    pub fn summary(&self) -> TradingSummary {
        self.positions.summary()
    }

    pub fn is_halted(&self) -> bool {
        self.halted
    }

    /// Discard all state, as if nothing had been processed yet
    pub fn reset(&mut self) {
        self.range = DailyRangeTracker::new();
        self.day = DayState::new(0);
        self.positions = PositionManager::new(
            self.config.partial_exit,
            self.config.partial_percent,
            self.config.point_value,
        );
        self.halted = false;
    }

    /// Start trading day `day_id`. No-op when that day is already active.
    pub fn begin_day(&mut self, day_id: i32) -> bool {
        if !self.range.roll_to(day_id) {
            return false;
        }
        self.day = DayState::new(day_id);
        info!("New trading day {}", day_id);
        true
    }

    /// Detection pass for the finalized bar at `index`
    pub fn on_new_bar<S: BarSeries + ?Sized>(&mut self, series: &S, index: usize) -> Vec<Signal> {
        if self.halted || !series.is_closed(index) {
            return Vec::new();
        }

        let bar = series.bar(index);
        let stamp = self.clock.stamp(bar.timestamp);

        // The broker may still hold yesterday's entry order
        let mut signals = Vec::new();
        if let Some(setup) = self.day.pending_setup().filter(|_| stamp.day_id != self.day.day_id) {
            signals.push(Signal::new(
                SignalKind::SetupCancelled,
                index,
                bar,
                setup.signal_price,
                format!("Entry from bar {} dropped at day rollover", setup.signal_bar),
            ));
        }

        self.begin_day(stamp.day_id);
        self.range.observe(bar);

        signals.extend(self.machine.on_bar(
            &mut self.day,
            series,
            index,
            stamp,
            self.range.range(),
            self.positions.is_open(),
        ));
        for signal in &signals {
            info!("SIGNAL {} @ {:.2}: {}", signal.kind, signal.price, signal.message);
        }
        signals
    }

    /// Position management pass for the finalized bar at `index`
    pub fn on_bar_close<S, R>(&mut self, series: &S, index: usize, router: &mut R) -> Result<Option<ExitReason>>
    where
        S: BarSeries + ?Sized,
        R: OrderRouter + ?Sized,
    {
        if self.halted || !series.is_closed(index) {
            return Ok(None);
        }

        let bar = series.bar(index);
        let stamp = self.clock.stamp(bar.timestamp);

        // Missed the cutoff (no bar after it, or a late fill); positions never carry over
        let carried = self
            .positions
            .position()
            .is_some_and(|p| self.clock.stamp(p.entry_time).day_id != stamp.day_id);
        if carried {
            warn!("Position from a prior day still open at {}, flattening", stamp.hhmm);
            self.positions.flatten(ExitReason::EndOfDay, bar, index, router)?;
            return Ok(Some(ExitReason::EndOfDay));
        }

        if stamp.day_id == self.day.day_id && stamp.hhmm >= self.config.eod_cutoff && !self.day.eod_processed {
            if self.config.cancel_working_at_eod && self.day.cancel_setup(self.config.rearm_after_cancel).is_some() {
                router.cancel_working_orders()?;
                info!("EOD: pending entry cancelled at {}", stamp.hhmm);
            }

            let flattened = self
                .positions
                .flatten(ExitReason::EndOfDay, bar, index, router)?
                .is_some();

            // A pending entry can still fill; keep checking until it resolves
            if self.day.pending_setup().is_none() {
                self.day.eod_processed = true;
            }
            if flattened {
                return Ok(Some(ExitReason::EndOfDay));
            }
        }

        self.positions.manage_bar(bar, index, router)
    }

    /// Handle an entry fill reported while bar `index` is the latest
    pub fn on_fill<R: OrderRouter + ?Sized>(&mut self, fill: &Fill, index: usize, router: &R) -> FillOutcome {
        if let Some(existing) = self.positions.position() {
            error!(
                "Fill {} @ {:.2} refused: position of {} already open",
                fill.quantity, fill.price, existing.quantity
            );
            return FillOutcome::Refused;
        }

        if self.halted {
            warn!("Fill @ {:.2} after deactivation, ignoring", fill.price);
            return FillOutcome::Rejected;
        }

        let Some((ctx, gap)) = self.day.mark_filled() else {
            warn!(
                "Late fill @ {:.2} at bar {} rejected: no pending entry ({})",
                fill.price, index, self.day.phase
            );
            return FillOutcome::Rejected;
        };

        let plan = risk::plan(&self.risk, &gap, ctx.sweep_low, self.range.range(), |p| router.round_to_tick(p));
        self.positions.open(plan, fill, index);
        debug!("Trades today: {}/{}", self.day.trades_today, self.config.max_trades_per_day);
        FillOutcome::Accepted(plan)
    }

    /// Strategy stopped: cancel pending entries, flatten and stop emitting signals
    pub fn on_deactivate<S, R>(&mut self, series: &S, router: &mut R) -> Result<Option<TradeRecord>>
    where
        S: BarSeries + ?Sized,
        R: OrderRouter + ?Sized,
    {
        if self.halted {
            return Ok(None);
        }
        self.halted = true;

        if self.day.cancel_setup(self.config.rearm_after_cancel).is_some() {
            router.cancel_working_orders()?;
        }

        let record = match series.len().checked_sub(1) {
            Some(last) => self
                .positions
                .flatten(ExitReason::Deactivated, series.bar(last), last, router)?,
            None => None,
        };
        info!("Strategy deactivated");
        Ok(record)
    }

    pub fn status(&self) -> String {
        let range = self.range.range();
        format!(
            "{} | Range: {:.2}-{:.2} | Position: {:?} | Trades today: {}",
            self.day.phase,
            range.low,
            range.high,
            self.positions.state(),
            self.day.trades_today
        )
    }
}
