//! Event-driven strategy runner
//!
//! Bars, fills and deactivation arrive as `StrategyEvent`s and are handled one
//! at a time by a single consumer, so bar processing and fill handling never
//! interleave. Per closed bar the order is fixed:
//! router fills → detection → order reactions → position management.

use anyhow::Result;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::execution::order::{Fill, OrderRouter};
use crate::execution::position::{TradeRecord, TradingSummary};
use crate::trading_core::bars::{BarHistory, BarSeries};
use crate::trading_core::trader::{FillOutcome, MmbmStrategy};
use crate::types::{Bar, Signal, SignalKind};

#[derive(Debug, Clone)]
pub enum StrategyEvent {
    /// Bar update; `closed` marks the bar as finalized
    BarUpdate { bar: Bar, closed: bool },
    /// Entry fill reported by the broker
    Fill(Fill),
    Deactivate,
}

/// Everything a finished run produced
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub bars: usize,
    pub signals: Vec<Signal>,
    pub trades: Vec<TradeRecord>,
    pub summary: TradingSummary,
    pub rejected_fills: usize,
}

pub struct StrategyRunner<R: OrderRouter> {
    strategy: MmbmStrategy,
    router: R,
    history: BarHistory,
    signals: Vec<Signal>,
    rejected_fills: usize,
}

impl<R: OrderRouter> StrategyRunner<R> {
    pub fn new(strategy: MmbmStrategy, router: R) -> Self {
        Self {
            strategy,
            router,
            history: BarHistory::new(),
            signals: Vec::new(),
            rejected_fills: 0,
        }
    }

    pub fn strategy(&self) -> &MmbmStrategy {
        &self.strategy
    }

    pub fn router(&self) -> &R {
        &self.router
    }

    /// Process one event. Returns false once the strategy is deactivated.
    pub fn handle(&mut self, event: StrategyEvent) -> Result<bool> {
        match event {
            StrategyEvent::BarUpdate { bar, closed: false } => {
                self.history.update_forming(bar);
            }
            StrategyEvent::BarUpdate { bar, closed: true } => {
                self.on_closed_bar(bar)?;
            }
            StrategyEvent::Fill(fill) => {
                let index = self.history.len().saturating_sub(1);
                self.apply_fill(&fill, index)?;
            }
            StrategyEvent::Deactivate => {
                self.strategy.on_deactivate(&self.history, &mut self.router)?;
                return Ok(false);
            }
        }
        Ok(!self.strategy.is_halted())
    }

    fn on_closed_bar(&mut self, bar: Bar) -> Result<()> {
        let index = self.history.close(bar);

        let fills = self.router.sync_bar(self.history.bar(index));
        for fill in &fills {
            self.apply_fill(fill, index)?;
        }

        let signals = self.strategy.on_new_bar(&self.history, index);
        for signal in &signals {
            match signal.kind {
                SignalKind::EntryReady => {
                    let contracts = self.strategy.config().contracts;
                    debug!("ORDER: buy {} at market", contracts);
                    self.router.buy(contracts)?;
                }
                SignalKind::SetupCancelled => self.router.cancel_working_orders()?,
                SignalKind::SweepDetected | SignalKind::StructureConfirmed => {}
            }
        }
        self.signals.extend(signals);

        self.strategy.on_bar_close(&self.history, index, &mut self.router)?;
        Ok(())
    }

    /// Deliver a fill; contracts the strategy does not take ownership of are sold back
    fn apply_fill(&mut self, fill: &Fill, index: usize) -> Result<()> {
        match self.strategy.on_fill(fill, index, &self.router) {
            FillOutcome::Accepted(_) => {}
            FillOutcome::Rejected | FillOutcome::Refused => {
                self.rejected_fills += 1;
                warn!("Unwinding {} unowned contract(s)", fill.quantity);
                self.router.sell(fill.quantity)?;
            }
        }
        Ok(())
    }

    /// Consume events until deactivation or until the sender hangs up
    pub async fn run(mut self, mut rx: mpsc::Receiver<StrategyEvent>) -> Result<RunReport> {
        while let Some(event) = rx.recv().await {
            if !self.handle(event)? {
                break;
            }
        }

        if !self.strategy.is_halted() {
            info!("Event channel closed, deactivating");
            self.strategy.on_deactivate(&self.history, &mut self.router)?;
        }
        Ok(self.into_report())
    }

    pub fn into_report(self) -> RunReport {
        RunReport {
            bars: self.history.len(),
            summary: self.strategy.summary(),
            trades: self.strategy.trades().to_vec(),
            signals: self.signals,
            rejected_fills: self.rejected_fills,
        }
    }
}

/// Send every bar as a closed update, then deactivate
pub async fn feed_bars(bars: Vec<Bar>, tx: mpsc::Sender<StrategyEvent>) -> Result<()> {
    for bar in bars {
        tx.send(StrategyEvent::BarUpdate { bar, closed: true }).await?;
    }
    tx.send(StrategyEvent::Deactivate).await?;
    Ok(())
}
