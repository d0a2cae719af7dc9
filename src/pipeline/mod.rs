//! Drivers for the strategy: bar loading, the event runner, replay and sweeps

pub mod loader;
pub mod runner;
pub mod replay;
pub mod sweep;

pub use runner::{RunReport, StrategyEvent, StrategyRunner};
