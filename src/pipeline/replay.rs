//! Replay Trading Module
//!
//! Streams historical bars through the same event runner a live feed would use,
//! with the simulated broker standing in for the exchange.

use anyhow::{Context, Result};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tracing::info;

use super::loader;
use super::runner::{feed_bars, RunReport, StrategyEvent, StrategyRunner};
use crate::execution::config::StrategyConfig;
use crate::execution::position::TradeRecord;
use crate::execution::sim::SimulatedBroker;
use crate::trading_core::trader::MmbmStrategy;
use crate::types::{Bar, Signal};

const EVENT_BUFFER: usize = 1024;

/// Replay options beyond the strategy config
#[derive(Debug, Clone, Default)]
pub struct ReplayOptions {
    pub fill_delay_bars: usize,
    pub signals_out: Option<PathBuf>,
    pub trades_out: Option<PathBuf>,
}

/// Run a replay over a bar file and print the results
pub async fn run_replay(bars_path: &Path, config: StrategyConfig, options: ReplayOptions) -> Result<RunReport> {
    info!("=== MMBM REPLAY ===");
    info!(
        "Symbol: {} | Contracts: {} | Stop: {} | RR: {:.1}",
        config.symbol, config.contracts, config.stop_mode, config.rr_multiple
    );

    let bars = loader::load_bars(bars_path)?;
    let point_value = config.point_value;

    let broker = SimulatedBroker::new(config.tick_size, options.fill_delay_bars);
    let runner = StrategyRunner::new(MmbmStrategy::new(config)?, broker);

    let (tx, rx) = mpsc::channel(EVENT_BUFFER);
    let feeder = tokio::spawn(feed_bars(bars, tx));
    let report = runner.run(rx).await?;
    feeder.await.context("Bar feed task failed")??;

    if let Some(path) = &options.signals_out {
        write_signals(path, &report.signals)?;
        info!("Wrote {} signals to {:?}", report.signals.len(), path);
    }
    if let Some(path) = &options.trades_out {
        write_trades(path, &report.trades)?;
        info!("Wrote {} trades to {:?}", report.trades.len(), path);
    }

    print_results(&report, point_value);
    Ok(report)
}

/// Synchronous replay over bars already in memory
pub fn simulate(bars: &[Bar], config: StrategyConfig, fill_delay_bars: usize) -> Result<RunReport> {
    let broker = SimulatedBroker::new(config.tick_size, fill_delay_bars);
    let mut runner = StrategyRunner::new(MmbmStrategy::new(config)?, broker);

    for bar in bars {
        runner.handle(StrategyEvent::BarUpdate {
            bar: bar.clone(),
            closed: true,
        })?;
    }
    runner.handle(StrategyEvent::Deactivate)?;
    Ok(runner.into_report())
}

/// One JSON object per line
pub fn write_signals(path: &Path, signals: &[Signal]) -> Result<()> {
    let file = File::create(path).with_context(|| format!("Failed to create signals file: {:?}", path))?;
    let mut writer = BufWriter::new(file);
    for signal in signals {
        serde_json::to_writer(&mut writer, signal)?;
        writeln!(writer)?;
    }
    writer.flush()?;
    Ok(())
}

pub fn write_trades(path: &Path, trades: &[TradeRecord]) -> Result<()> {
    let mut writer =
        csv::Writer::from_path(path).with_context(|| format!("Failed to create trades file: {:?}", path))?;
    for trade in trades {
        writer.serialize(trade)?;
    }
    writer.flush()?;
    Ok(())
}

fn print_results(report: &RunReport, point_value: f64) {
    let summary = &report.summary;

    println!("\n═══════════════════════════════════════════════════════════");
    println!("                 MMBM REPLAY RESULTS                        ");
    println!("═══════════════════════════════════════════════════════════\n");

    println!("Bars Processed:    {}", report.bars);
    println!("Signals:           {}", report.signals.len());
    println!("Total Trades:      {}", summary.total_trades);
    println!("Wins:              {} ({:.1}%)", summary.wins, summary.win_rate);
    println!("Losses:            {}", summary.losses);
    println!("Breakevens:        {}", summary.breakevens);
    if report.rejected_fills > 0 {
        println!("Rejected Fills:    {}", report.rejected_fills);
    }
    println!();
    println!("Profit Factor:     {:.2}", summary.profit_factor);
    println!("Avg Win:           {:.2} pts", summary.avg_win);
    println!("Avg Loss:          {:.2} pts", summary.avg_loss);
    println!();
    println!("Total P&L:         {:+.2} pts (${:+.2})", summary.net_pnl, summary.net_dollars);
    println!(
        "Max Drawdown:      {:.2} pts (${:.2})",
        summary.max_drawdown,
        summary.max_drawdown * point_value
    );

    if !report.trades.is_empty() {
        println!();
        println!("─── Trades ───");
        for trade in &report.trades {
            println!(
                "{}  {} @ {:.2} → {:.2}  {:>5}  {:+.2} pts",
                trade.entry_time.format("%Y-%m-%d %H:%M"),
                trade.quantity,
                trade.fill_price,
                trade.exit_price,
                trade.reason.to_string(),
                trade.pnl_points
            );
        }
    }

    println!("\n═══════════════════════════════════════════════════════════\n");
}
