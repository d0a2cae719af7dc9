//! Simulated order routing for replay and parameter sweeps
//!
//! Entry orders rest until the open of the bar `fill_delay_bars` bars later.
//! Exit orders fill immediately at the close of the bar being processed.

use anyhow::Result;
use tracing::{debug, warn};

use super::order::{Fill, OrderRouter};
use crate::trading_core::risk::round_to_tick;
use crate::types::Bar;

#[derive(Debug, Clone)]
struct WorkingOrder {
    quantity: u32,
    bars_waited: usize,
}

#[derive(Debug, Clone)]
pub struct SimulatedBroker {
    tick_size: f64,
    fill_delay_bars: usize,
    position: u32,
    last_fill: Option<f64>,
    mark: Option<f64>,
    working: Vec<WorkingOrder>,
}

impl SimulatedBroker {
    pub fn new(tick_size: f64, fill_delay_bars: usize) -> Self {
        Self {
            tick_size,
            fill_delay_bars: fill_delay_bars.max(1),
            position: 0,
            last_fill: None,
            mark: None,
            working: Vec::new(),
        }
    }

    pub fn working_orders(&self) -> usize {
        self.working.len()
    }

    fn exit_at_mark(&mut self, quantity: u32) {
        let Some(price) = self.mark else {
            warn!("Exit requested before any bar, ignoring");
            return;
        };
        if quantity > self.position {
            warn!("Sell {} exceeds position {}, clamping", quantity, self.position);
        }
        self.position -= quantity.min(self.position);
        self.last_fill = Some(price);
        debug!("SIM: sold {} @ {:.2}, position {}", quantity, price, self.position);
    }
}

impl OrderRouter for SimulatedBroker {
    fn buy(&mut self, quantity: u32) -> Result<()> {
        self.working.push(WorkingOrder {
            quantity,
            bars_waited: 0,
        });
        Ok(())
    }

    fn sell(&mut self, quantity: u32) -> Result<()> {
        self.exit_at_mark(quantity);
        Ok(())
    }

    fn close_position(&mut self) -> Result<()> {
        let quantity = self.position;
        if quantity > 0 {
            self.exit_at_mark(quantity);
        }
        Ok(())
    }

    fn position_size(&self) -> u32 {
        self.position
    }

    fn last_fill_price(&self) -> Option<f64> {
        self.last_fill
    }

    fn round_to_tick(&self, price: f64) -> f64 {
        round_to_tick(price, self.tick_size)
    }

    fn cancel_working_orders(&mut self) -> Result<()> {
        if !self.working.is_empty() {
            debug!("SIM: cancelled {} working orders", self.working.len());
            self.working.clear();
        }
        Ok(())
    }

    fn sync_bar(&mut self, bar: &Bar) -> Vec<Fill> {
        let mut fills = Vec::new();
        let delay = self.fill_delay_bars;

        self.working.retain_mut(|order| {
            order.bars_waited += 1;
            if order.bars_waited < delay {
                return true;
            }
            fills.push(Fill {
                price: bar.open,
                quantity: order.quantity,
                timestamp: bar.timestamp,
            });
            false
        });

        for fill in &fills {
            self.position += fill.quantity;
            self.last_fill = Some(fill.price);
            debug!("SIM: bought {} @ {:.2}", fill.quantity, fill.price);
        }

        self.mark = Some(bar.close);
        fills
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::test_bars::{minute_bars, session_start};

    #[test]
    fn test_entry_fills_next_bar_open() {
        let bars = minute_bars(
            session_start(),
            &[(100.0, 101.0, 99.0, 100.5), (100.75, 102.0, 100.5, 101.5)],
        );
        let mut broker = SimulatedBroker::new(0.25, 1);

        assert!(broker.sync_bar(&bars[0]).is_empty());
        broker.buy(2).unwrap();
        assert_eq!(broker.position_size(), 0);

        let fills = broker.sync_bar(&bars[1]);
        assert_eq!(fills.len(), 1);
        assert_eq!(fills[0].price, 100.75);
        assert_eq!(broker.position_size(), 2);

        // Exits fill at the current bar close
        broker.sell(1).unwrap();
        assert_eq!(broker.position_size(), 1);
        assert_eq!(broker.last_fill_price(), Some(101.5));
        broker.close_position().unwrap();
        assert_eq!(broker.position_size(), 0);
    }

    #[test]
    fn test_fill_delay_and_cancel() {
        let bars = minute_bars(
            session_start(),
            &[(100.0, 101.0, 99.0, 100.5), (100.5, 101.0, 99.0, 100.5), (100.5, 101.0, 99.0, 100.5)],
        );
        let mut broker = SimulatedBroker::new(0.25, 3);
        broker.buy(1).unwrap();
        assert!(broker.sync_bar(&bars[0]).is_empty());
        assert!(broker.sync_bar(&bars[1]).is_empty());
        assert_eq!(broker.working_orders(), 1);

        broker.cancel_working_orders().unwrap();
        assert!(broker.sync_bar(&bars[2]).is_empty());
        assert_eq!(broker.position_size(), 0);
    }

    #[test]
    fn test_round_to_tick() {
        let broker = SimulatedBroker::new(0.25, 1);
        assert_eq!(broker.round_to_tick(100.1), 100.0);
        assert_eq!(broker.round_to_tick(100.2), 100.25);
    }
}
