//! Trading Core - MMBM detection and decision logic
//!
//! This module contains the strategy components:
//! - Bar series access
//! - Session clock and kill zones
//! - Daily dealing range
//! - Swing and liquidity location
//! - Sweep → structure shift → FVG state machine
//! - Risk planning
//! - Strategy context tying them together

pub mod bars;
pub mod session;
pub mod daily_levels;
pub mod liquidity;
pub mod state_machine;
pub mod risk;
pub mod trader;

// Re-export commonly used types
pub use bars::{BarHistory, BarSeries};
pub use session::{KillZone, SessionClock, SessionStamp, TimeWindow};
pub use daily_levels::{DailyRange, DailyRangeTracker};
pub use liquidity::{LiquidityLocator, LiquidityMode};
pub use state_machine::{DayPhase, DayState, DetectionConfig, DetectionMachine, GapZone, RearmPolicy, SweepCloseRule};
pub use risk::{EntryMode, RiskConfig, RiskPlan, StopMode, TargetMode};
pub use trader::{FillOutcome, MmbmStrategy};
