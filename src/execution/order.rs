//! Order routing interface used by the strategy

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::Bar;

/// Execution report for an entry order
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Fill {
    pub price: f64,
    pub quantity: u32,
    pub timestamp: DateTime<Utc>,
}

/// Broker-side actions the strategy invokes.
///
/// Exits (`sell`, `close_position`) are market orders; implementations update
/// `last_fill_price` when they fill.
pub trait OrderRouter {
    fn buy(&mut self, quantity: u32) -> Result<()>;

    fn sell(&mut self, quantity: u32) -> Result<()>;

    fn close_position(&mut self) -> Result<()>;

    /// Current long position in contracts
    fn position_size(&self) -> u32;

    fn last_fill_price(&self) -> Option<f64>;

    fn round_to_tick(&self, price: f64) -> f64;

    /// Cancel entry orders that have not filled yet
    fn cancel_working_orders(&mut self) -> Result<()> {
        Ok(())
    }

    /// Called as each new bar arrives, returns fills of resting entry orders.
    /// Routers that deliver fills as separate events return nothing.
    fn sync_bar(&mut self, _bar: &Bar) -> Vec<Fill> {
        Vec::new()
    }
}
