// Library crate - MMBM strategy engine and its replay tooling

pub mod types;
pub mod trading_core;
pub mod execution;
pub mod pipeline;

// Re-export commonly used types
pub use types::*;
pub use execution::StrategyConfig;
pub use trading_core::MmbmStrategy;
