use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::info;

use mmbm_strategy::pipeline::{replay, sweep};
use mmbm_strategy::StrategyConfig;

#[derive(Parser, Debug)]
#[command(name = "mmbm")]
#[command(author, version, about = "MMBM strategy replay and parameter sweeps")]
struct Args {
    #[command(subcommand)]
    command: Commands,

    /// Print verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Replay historical bars through the strategy with a simulated broker
    Replay {
        /// Bars file (.csv or .csv.zst)
        #[arg(short, long, env = "MMBM_BARS")]
        bars: PathBuf,

        /// Strategy config JSON; defaults are used when omitted
        #[arg(short, long, env = "MMBM_CONFIG")]
        config: Option<PathBuf>,

        /// Bars between an entry order and its fill
        #[arg(long, default_value = "1", env = "MMBM_FILL_DELAY")]
        fill_delay: usize,

        /// Write signals as JSON lines
        #[arg(long)]
        signals_out: Option<PathBuf>,

        /// Write completed trades as CSV
        #[arg(long)]
        trades_out: Option<PathBuf>,
    },

    /// Run a parallel parameter sweep
    Sweep {
        /// Bars file (.csv or .csv.zst)
        #[arg(short, long, env = "MMBM_BARS")]
        bars: PathBuf,

        /// Base strategy config JSON
        #[arg(short, long, env = "MMBM_CONFIG")]
        config: Option<PathBuf>,

        /// Output CSV
        #[arg(short, long, default_value = "sweep_results.csv")]
        output: PathBuf,

        /// Bars between an entry order and its fill
        #[arg(long, default_value = "1", env = "MMBM_FILL_DELAY")]
        fill_delay: usize,
    },

    /// Print the default strategy config as JSON
    Config,
}

fn load_config(path: Option<&Path>) -> Result<StrategyConfig> {
    match path {
        Some(path) => {
            info!("Loading config from {:?}", path);
            StrategyConfig::from_file(path)
        }
        None => Ok(StrategyConfig::default()),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let args = Args::parse();

    let level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(format!("mmbm_strategy={}", level).parse()?)
                .add_directive(format!("mmbm={}", level).parse()?),
        )
        .init();

    match args.command {
        Commands::Replay {
            bars,
            config,
            fill_delay,
            signals_out,
            trades_out,
        } => {
            let config = load_config(config.as_deref())?;
            let options = replay::ReplayOptions {
                fill_delay_bars: fill_delay,
                signals_out,
                trades_out,
            };
            replay::run_replay(&bars, config, options).await?;
        }
        Commands::Sweep {
            bars,
            config,
            output,
            fill_delay,
        } => {
            let config = load_config(config.as_deref())?;
            sweep::run_sweep(&bars, &config, &output, fill_delay)?;
        }
        Commands::Config => {
            println!("{}", serde_json::to_string_pretty(&StrategyConfig::default())?);
        }
    }

    Ok(())
}
