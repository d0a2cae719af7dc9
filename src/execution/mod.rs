//! Execution module: configuration, order routing and position lifecycle
//!
//! The strategy talks to brokers only through `OrderRouter`. The simulated
//! broker backs replay and parameter sweeps.

pub mod config;
pub mod order;
pub mod position;
pub mod sim;

pub use config::StrategyConfig;
pub use order::{Fill, OrderRouter};
pub use position::{ExitReason, PositionManager, PositionState, TradeRecord, TradingSummary};
pub use sim::SimulatedBroker;
