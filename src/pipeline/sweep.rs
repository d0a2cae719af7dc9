//! Parameter Sweep Module
//!
//! Runs the replay over a grid of discount thresholds, RR multiples, stop modes
//! and liquidity modes in parallel with Rayon. Bars are loaded once and shared.

use anyhow::{bail, Context, Result};
use rayon::prelude::*;
use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{info, warn};

use super::loader;
use super::replay;
use crate::execution::config::StrategyConfig;
use crate::execution::position::TradingSummary;
use crate::trading_core::liquidity::LiquidityMode;
use crate::trading_core::risk::StopMode;
use crate::types::Bar;

pub const DEFAULT_DISCOUNT_THRESHOLDS: [f64; 4] = [0.3, 0.4, 0.5, 0.6];
pub const DEFAULT_RR_MULTIPLES: [f64; 4] = [1.5, 2.0, 2.5, 3.0];
pub const DEFAULT_STOP_MODES: [StopMode; 4] =
    [StopMode::Fixed, StopMode::BelowSweep, StopMode::BelowGap, StopMode::BelowDailyLow];
pub const DEFAULT_LIQUIDITY_MODES: [LiquidityMode; 3] =
    [LiquidityMode::PriorDayLow, LiquidityMode::SwingLow, LiquidityMode::EqualLows];

/// One point in the parameter grid
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SweepParams {
    pub discount_threshold: f64,
    pub rr_multiple: f64,
    pub stop_mode: StopMode,
    pub liquidity_mode: LiquidityMode,
}

impl SweepParams {
    fn apply(&self, base: &StrategyConfig) -> StrategyConfig {
        StrategyConfig {
            discount_threshold: self.discount_threshold,
            rr_multiple: self.rr_multiple,
            stop_mode: self.stop_mode,
            liquidity_mode: self.liquidity_mode,
            ..base.clone()
        }
    }
}

#[derive(Debug, Clone)]
pub struct SweepResult {
    pub params: SweepParams,
    pub summary: TradingSummary,
}

/// Cartesian product of the value lists
pub fn generate_combinations(
    discount_thresholds: &[f64],
    rr_multiples: &[f64],
    stop_modes: &[StopMode],
    liquidity_modes: &[LiquidityMode],
) -> Vec<SweepParams> {
    let mut combinations = Vec::new();

    for &discount_threshold in discount_thresholds {
        for &rr_multiple in rr_multiples {
            for &stop_mode in stop_modes {
                for &liquidity_mode in liquidity_modes {
                    combinations.push(SweepParams {
                        discount_threshold,
                        rr_multiple,
                        stop_mode,
                        liquidity_mode,
                    });
                }
            }
        }
    }

    combinations
}

/// Evaluate every combination against `bars` in parallel
pub fn sweep_bars(
    bars: &[Bar],
    base: &StrategyConfig,
    combinations: &[SweepParams],
    fill_delay_bars: usize,
) -> Vec<SweepResult> {
    let total = combinations.len();
    let completed = AtomicUsize::new(0);
    let start = std::time::Instant::now();

    let results: Vec<SweepResult> = combinations
        .par_iter()
        .filter_map(|params| {
            let outcome = replay::simulate(bars, params.apply(base), fill_delay_bars);

            let done = completed.fetch_add(1, Ordering::Relaxed) + 1;
            if done % 10 == 0 || done == total {
                let elapsed = start.elapsed().as_secs_f64();
                let rate = done as f64 / elapsed.max(f64::EPSILON);
                eprint!("\r[{}/{}] {:.1}/s       ", done, total, rate);
            }

            match outcome {
                Ok(report) => Some(SweepResult {
                    params: *params,
                    summary: report.summary,
                }),
                Err(e) => {
                    warn!("Combination {:?} failed: {:#}", params, e);
                    None
                }
            }
        })
        .collect();

    eprintln!();
    results
}

/// Load bars, run the default grid and write one CSV row per combination
pub fn run_sweep(bars_path: &Path, base: &StrategyConfig, output: &Path, fill_delay_bars: usize) -> Result<Vec<SweepResult>> {
    let bars = loader::load_bars(bars_path)?;

    let combinations = generate_combinations(
        &DEFAULT_DISCOUNT_THRESHOLDS,
        &DEFAULT_RR_MULTIPLES,
        &DEFAULT_STOP_MODES,
        &DEFAULT_LIQUIDITY_MODES,
    );
    if combinations.is_empty() {
        bail!("Empty parameter grid");
    }

    println!("\nRunning {} parameter combinations in parallel...", combinations.len());
    let start = std::time::Instant::now();
    let results = sweep_bars(&bars, base, &combinations, fill_delay_bars);

    write_results(output, &results)?;
    println!("\nResults written to {:?}", output);

    let mut ranked: Vec<&SweepResult> = results.iter().filter(|r| r.summary.total_trades > 0).collect();
    ranked.sort_by(|a, b| b.summary.net_pnl.total_cmp(&a.summary.net_pnl));

    println!("\n=== SWEEP SUMMARY ===");
    println!("Total combinations: {}", results.len());
    println!("With trades:        {}", ranked.len());
    println!("\nTop 10 by net P&L:");
    for (i, r) in ranked.iter().take(10).enumerate() {
        let p = &r.params;
        let s = &r.summary;
        println!(
            "  {}. P&L={:+.1} PF={:.2} Trades={} WR={:.1}% DD={:.1}",
            i + 1,
            s.net_pnl,
            s.profit_factor,
            s.total_trades,
            s.win_rate,
            s.max_drawdown
        );
        println!(
            "     discount={} rr={} stop={} liquidity={}",
            p.discount_threshold, p.rr_multiple, p.stop_mode, p.liquidity_mode
        );
    }

    if let Some(best) = ranked.first() {
        info!("Best combination: {:?} → {:+.2} pts", best.params, best.summary.net_pnl);
    }
    println!("\nCompleted in {:.1}s", start.elapsed().as_secs_f64());

    Ok(results)
}

fn write_results(path: &Path, results: &[SweepResult]) -> Result<()> {
    let mut file = std::fs::File::create(path).with_context(|| format!("Failed to create sweep output: {:?}", path))?;
    writeln!(
        file,
        "discount_threshold,rr_multiple,stop_mode,liquidity_mode,total_trades,wins,losses,breakevens,win_rate,profit_factor,avg_win,avg_loss,net_pnl,max_drawdown,net_dollars"
    )?;

    for result in results {
        let p = &result.params;
        let s = &result.summary;
        writeln!(
            file,
            "{},{},{},{},{},{},{},{},{:.2},{:.2},{:.2},{:.2},{:.2},{:.2},{:.2}",
            p.discount_threshold,
            p.rr_multiple,
            p.stop_mode,
            p.liquidity_mode,
            s.total_trades,
            s.wins,
            s.losses,
            s.breakevens,
            s.win_rate,
            s.profit_factor,
            s.avg_win,
            s.avg_loss,
            s.net_pnl,
            s.max_drawdown,
            s.net_dollars
        )?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trading_core::session::KillZone;
    use crate::types::test_bars::two_day_session;

    #[test]
    fn test_generate_combinations() {
        let combos = generate_combinations(&[0.4, 0.5], &[2.0], &DEFAULT_STOP_MODES, &[LiquidityMode::PriorDayLow]);
        assert_eq!(combos.len(), 8);
        assert_eq!(combos[0].discount_threshold, 0.4);
        assert_eq!(combos[0].stop_mode, StopMode::Fixed);
        assert_eq!(combos[7].discount_threshold, 0.5);
        assert_eq!(combos[7].stop_mode, StopMode::BelowDailyLow);
    }

    #[test]
    fn test_sweep_discount_gates_entries() {
        let base = StrategyConfig {
            swing_strength: 1,
            trade_start: 930,
            trade_end: 1600,
            kill_zone: KillZone::Any,
            ..Default::default()
        };
        // Entry close 104.75 sits at 0.475 of the 100-110 range
        let combos = generate_combinations(&[0.4, 0.5], &[2.0], &[StopMode::BelowSweep], &[LiquidityMode::PriorDayLow]);
        let mut results = sweep_bars(&two_day_session(), &base, &combos, 1);
        results.sort_by(|a, b| a.params.discount_threshold.total_cmp(&b.params.discount_threshold));

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].summary.total_trades, 0);
        assert_eq!(results[1].summary.total_trades, 1);
    }
}
