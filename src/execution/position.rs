//! Position lifecycle and P&L tracking
//!
//! FLAT → OPEN → (PARTIAL_TAKEN) → CLOSED. Exits are checked once per bar close:
//! stop first, then the partial at TP1, then the final target.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};
use uuid::Uuid;

use super::order::{Fill, OrderRouter};
use crate::trading_core::risk::RiskPlan;
use crate::types::{Bar, PRICE_EPSILON};

/// Why a position (or part of it) was closed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExitReason {
    Stop,
    PartialTarget,
    Target,
    EndOfDay,
    Deactivated,
}

impl std::fmt::Display for ExitReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExitReason::Stop => write!(f, "STOP"),
            ExitReason::PartialTarget => write!(f, "TP1"),
            ExitReason::Target => write!(f, "TP2"),
            ExitReason::EndOfDay => write!(f, "EOD"),
            ExitReason::Deactivated => write!(f, "DEACTIVATED"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PositionState {
    Flat,
    Open,
    PartialTaken,
}

/// Live position with its risk levels
#[derive(Debug, Clone, PartialEq)]
pub struct OpenPosition {
    pub plan: RiskPlan,
    /// Actual fill price (the plan's entry is the zone-derived price)
    pub fill_price: f64,
    pub quantity: u32,
    pub partial_taken: bool,
    pub partial_exit_price: Option<f64>,
    /// Points already booked by partial exits
    pub realized_points: f64,
    pub entry_time: DateTime<Utc>,
    pub entry_bar: usize,
}

/// Completed trade
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeRecord {
    pub id: Uuid,
    pub entry_time: DateTime<Utc>,
    pub exit_time: DateTime<Utc>,
    pub entry_bar: usize,
    pub exit_bar: usize,
    pub fill_price: f64,
    pub planned_entry: f64,
    pub stop: f64,
    pub tp1: f64,
    pub tp2: f64,
    pub quantity: u32,
    pub partial_exit_price: Option<f64>,
    pub exit_price: f64,
    /// Points times contracts, all legs
    pub pnl_points: f64,
    pub reason: ExitReason,
}

/// Partial exit size: percent of `size` rounded up, always leaving at least one contract
pub fn partial_quantity(size: u32, percent: f64) -> u32 {
    let wanted = (size as f64 * percent / 100.0).ceil().max(0.0) as u32;
    wanted.min(size.saturating_sub(1))
}

/// Manages the single strategy position
#[derive(Debug, Clone)]
pub struct PositionManager {
    partial_exit: bool,
    partial_percent: f64,
    point_value: f64,
    position: Option<OpenPosition>,
    history: Vec<TradeRecord>,
}

impl PositionManager {
    pub fn new(partial_exit: bool, partial_percent: f64, point_value: f64) -> Self {
        Self {
            partial_exit,
            partial_percent,
            point_value,
            position: None,
            history: Vec::new(),
        }
    }

    pub fn is_open(&self) -> bool {
        self.position.is_some()
    }

    pub fn position(&self) -> Option<&OpenPosition> {
        self.position.as_ref()
    }

    pub fn state(&self) -> PositionState {
        match &self.position {
            None => PositionState::Flat,
            Some(p) if p.partial_taken => PositionState::PartialTaken,
            Some(_) => PositionState::Open,
        }
    }

    pub fn history(&self) -> &[TradeRecord] {
        &self.history
    }

    /// FLAT → OPEN. Refuses to stack a second position.
    pub fn open(&mut self, plan: RiskPlan, fill: &Fill, bar_index: usize) -> bool {
        if let Some(existing) = &self.position {
            error!(
                "Refusing second position: already long {} @ {:.2}",
                existing.quantity, existing.fill_price
            );
            return false;
        }

        info!(
            "FILLED: {} @ {:.2} | Entry {:.2} | Stop {:.2} | TP1 {:.2} | TP2 {:.2}",
            fill.quantity, fill.price, plan.entry, plan.stop, plan.tp1, plan.tp2
        );
        self.position = Some(OpenPosition {
            plan,
            fill_price: fill.price,
            quantity: fill.quantity,
            partial_taken: false,
            partial_exit_price: None,
            realized_points: 0.0,
            entry_time: fill.timestamp,
            entry_bar: bar_index,
        });
        true
    }

    /// Stop, partial and final target checks for one closed bar
    pub fn manage_bar<R: OrderRouter + ?Sized>(
        &mut self,
        bar: &Bar,
        index: usize,
        router: &mut R,
    ) -> Result<Option<ExitReason>> {
        let Some(pos) = self.position.as_mut() else {
            return Ok(None);
        };

        if bar.low <= pos.plan.stop + PRICE_EPSILON {
            self.flatten(ExitReason::Stop, bar, index, router)?;
            return Ok(Some(ExitReason::Stop));
        }

        let mut exit = None;
        if self.partial_exit && !pos.partial_taken && bar.high + PRICE_EPSILON >= pos.plan.tp1 {
            let size = router.position_size();
            let quantity = partial_quantity(size, self.partial_percent);
            if quantity > 0 {
                router.sell(quantity)?;
                let price = router.last_fill_price().unwrap_or(bar.close);
                pos.realized_points += (price - pos.fill_price) * quantity as f64;
                pos.quantity = pos.quantity.saturating_sub(quantity);
                pos.partial_exit_price = Some(price);
                info!("EXIT TP1: sold {} @ {:.2}, {} remaining", quantity, price, pos.quantity);
                exit = Some(ExitReason::PartialTarget);
            } else {
                debug!("TP1 reached with {} contract(s), nothing to scale out", size);
            }
            pos.partial_taken = true;
        }

        if bar.high + PRICE_EPSILON >= pos.plan.tp2 {
            self.flatten(ExitReason::Target, bar, index, router)?;
            return Ok(Some(ExitReason::Target));
        }

        Ok(exit)
    }

    /// Close whatever is left at market and record the trade
    pub fn flatten<R: OrderRouter + ?Sized>(
        &mut self,
        reason: ExitReason,
        bar: &Bar,
        index: usize,
        router: &mut R,
    ) -> Result<Option<TradeRecord>> {
        let Some(pos) = self.position.take() else {
            return Ok(None);
        };

        router.close_position()?;
        let exit_price = router.last_fill_price().unwrap_or(bar.close);
        let pnl_points = pos.realized_points + (exit_price - pos.fill_price) * pos.quantity as f64;

        let record = TradeRecord {
            id: Uuid::new_v4(),
            entry_time: pos.entry_time,
            exit_time: bar.timestamp,
            entry_bar: pos.entry_bar,
            exit_bar: index,
            fill_price: pos.fill_price,
            planned_entry: pos.plan.entry,
            stop: pos.plan.stop,
            tp1: pos.plan.tp1,
            tp2: pos.plan.tp2,
            quantity: pos.quantity,
            partial_exit_price: pos.partial_exit_price,
            exit_price,
            pnl_points,
            reason,
        };

        info!(
            "EXIT {}: {} @ {:.2} | P&L: {:+.2} pts (${:+.2})",
            reason,
            pos.quantity,
            exit_price,
            pnl_points,
            pnl_points * self.point_value
        );

        self.history.push(record.clone());
        Ok(Some(record))
    }

    pub fn summary(&self) -> TradingSummary {
        TradingSummary::from_trades(&self.history, self.point_value)
    }
}

/// Summary of trading results
#[derive(Debug, Clone, Default, Serialize)]
pub struct TradingSummary {
    pub total_trades: u32,
    pub wins: u32,
    pub losses: u32,
    pub breakevens: u32,
    pub win_rate: f64,
    pub profit_factor: f64,
    pub net_pnl: f64,
    pub avg_win: f64,
    pub avg_loss: f64,
    /// Largest peak-to-trough drop of cumulative points
    pub max_drawdown: f64,
    pub net_dollars: f64,
}

impl TradingSummary {
    pub fn from_trades(trades: &[TradeRecord], point_value: f64) -> Self {
        let mut summary = Self::default();
        let mut gross_profit = 0.0;
        let mut gross_loss = 0.0;
        let mut equity = 0.0_f64;
        let mut peak = 0.0_f64;

        for trade in trades {
            summary.total_trades += 1;
            if trade.pnl_points > PRICE_EPSILON {
                summary.wins += 1;
                gross_profit += trade.pnl_points;
            } else if trade.pnl_points < -PRICE_EPSILON {
                summary.losses += 1;
                gross_loss += trade.pnl_points.abs();
            } else {
                summary.breakevens += 1;
            }

            equity += trade.pnl_points;
            peak = peak.max(equity);
            summary.max_drawdown = summary.max_drawdown.max(peak - equity);
        }

        if summary.total_trades > 0 {
            summary.win_rate = summary.wins as f64 / summary.total_trades as f64 * 100.0;
        }
        summary.profit_factor = if gross_loss > 0.0 {
            gross_profit / gross_loss
        } else if gross_profit > 0.0 {
            f64::INFINITY
        } else {
            0.0
        };
        if summary.wins > 0 {
            summary.avg_win = gross_profit / summary.wins as f64;
        }
        if summary.losses > 0 {
            summary.avg_loss = -(gross_loss / summary.losses as f64);
        }
        summary.net_pnl = gross_profit - gross_loss;
        summary.net_dollars = summary.net_pnl * point_value;
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::sim::SimulatedBroker;
    use crate::types::test_bars::{bar_at, session_start};

    fn plan() -> RiskPlan {
        RiskPlan {
            entry: 104.0,
            stop: 98.0,
            tp1: 105.0,
            tp2: 116.0,
        }
    }

    /// Broker holding `quantity` long filled at 104
    fn filled_broker(quantity: u32) -> (SimulatedBroker, Fill) {
        let ts = session_start();
        let mut broker = SimulatedBroker::new(0.25, 1);
        broker.sync_bar(&bar_at(ts, 104.0, 104.5, 103.5, 104.0));
        broker.buy(quantity).unwrap();
        let fills = broker.sync_bar(&bar_at(ts, 104.0, 104.5, 103.5, 104.0));
        (broker, fills[0])
    }

    #[test]
    fn test_partial_quantity() {
        assert_eq!(partial_quantity(2, 50.0), 1);
        assert_eq!(partial_quantity(3, 50.0), 2);
        // Never the full position
        assert_eq!(partial_quantity(2, 100.0), 1);
        assert_eq!(partial_quantity(1, 50.0), 0);
        assert_eq!(partial_quantity(0, 50.0), 0);
    }

    #[test]
    fn test_refuses_second_position() {
        let (_, fill) = filled_broker(1);
        let mut pm = PositionManager::new(true, 50.0, 20.0);
        assert!(pm.open(plan(), &fill, 3));
        assert!(!pm.open(plan(), &fill, 4));
        assert_eq!(pm.position().unwrap().entry_bar, 3);
    }

    #[test]
    fn test_stop_exit() {
        let (mut broker, fill) = filled_broker(2);
        let mut pm = PositionManager::new(true, 50.0, 20.0);
        pm.open(plan(), &fill, 1);

        let bar = bar_at(session_start(), 100.0, 100.5, 98.0, 98.5);
        broker.sync_bar(&bar);
        let exit = pm.manage_bar(&bar, 2, &mut broker).unwrap();
        assert_eq!(exit, Some(ExitReason::Stop));
        assert_eq!(pm.state(), PositionState::Flat);
        assert_eq!(broker.position_size(), 0);

        let trade = &pm.history()[0];
        assert_eq!(trade.exit_price, 98.5);
        assert_eq!(trade.pnl_points, -11.0);
    }

    #[test]
    fn test_stop_has_priority_over_targets() {
        let (mut broker, fill) = filled_broker(2);
        let mut pm = PositionManager::new(true, 50.0, 20.0);
        pm.open(plan(), &fill, 1);

        // Outside bar touching both the stop and TP2
        let bar = bar_at(session_start(), 104.0, 117.0, 97.0, 110.0);
        assert_eq!(pm.manage_bar(&bar, 2, &mut broker).unwrap(), Some(ExitReason::Stop));
        assert!(pm.history()[0].partial_exit_price.is_none());
    }

    #[test]
    fn test_partial_then_target() {
        let (mut broker, fill) = filled_broker(2);
        let mut pm = PositionManager::new(true, 50.0, 20.0);
        pm.open(plan(), &fill, 1);

        let tp1_bar = bar_at(session_start(), 104.0, 105.25, 103.0, 105.0);
        let exit = pm.manage_bar(&tp1_bar, 2, &mut broker).unwrap();
        assert_eq!(exit, Some(ExitReason::PartialTarget));
        assert_eq!(pm.state(), PositionState::PartialTaken);
        assert_eq!(broker.position_size(), 1);
        assert_eq!(pm.position().unwrap().quantity, 1);

        // Partial fires only once
        assert_eq!(pm.manage_bar(&tp1_bar, 3, &mut broker).unwrap(), None);

        let tp2_bar = bar_at(session_start(), 110.0, 116.0, 109.0, 115.5);
        broker.sync_bar(&tp2_bar);
        let exit = pm.manage_bar(&tp2_bar, 4, &mut broker).unwrap();
        assert_eq!(exit, Some(ExitReason::Target));
        assert_eq!(pm.state(), PositionState::Flat);

        let trade = &pm.history()[0];
        assert_eq!(trade.partial_exit_price, Some(104.0));
        // Partial booked at the mark (104.0), runner at 115.5
        assert_eq!(trade.pnl_points, 0.0 + 11.5);
    }

    #[test]
    fn test_single_contract_skips_partial() {
        let (mut broker, fill) = filled_broker(1);
        let mut pm = PositionManager::new(true, 50.0, 20.0);
        pm.open(plan(), &fill, 1);

        let bar = bar_at(session_start(), 104.0, 105.5, 103.0, 105.0);
        assert_eq!(pm.manage_bar(&bar, 2, &mut broker).unwrap(), None);
        assert_eq!(broker.position_size(), 1);
        assert!(pm.position().unwrap().partial_taken);
    }

    #[test]
    fn test_summary() {
        let mut pm = PositionManager::new(false, 50.0, 20.0);
        for (i, exit_close) in [110.0, 100.0, 112.0].into_iter().enumerate() {
            let (mut broker, fill) = filled_broker(1);
            pm.open(plan(), &fill, i);
            let bar = bar_at(session_start(), exit_close, exit_close, exit_close, exit_close);
            broker.sync_bar(&bar);
            pm.flatten(ExitReason::EndOfDay, &bar, i + 1, &mut broker).unwrap();
        }

        let summary = pm.summary();
        assert_eq!(summary.total_trades, 3);
        assert_eq!(summary.wins, 2);
        assert_eq!(summary.losses, 1);
        assert_eq!(summary.net_pnl, 6.0 - 4.0 + 8.0);
        assert_eq!(summary.max_drawdown, 4.0);
        assert_eq!(summary.profit_factor, 14.0 / 4.0);
        assert_eq!(summary.net_dollars, 200.0);
    }
}
