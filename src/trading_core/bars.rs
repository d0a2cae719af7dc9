//! Random-access bar series used by the detection logic

use crate::types::Bar;

/// Read-only access to a bar history, index 0 is the oldest bar
pub trait BarSeries {
    fn len(&self) -> usize;

    fn bar(&self, index: usize) -> &Bar;

    /// Whether the bar at `index` is finalized (false for an in-progress bar)
    fn is_closed(&self, index: usize) -> bool;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn high(&self, index: usize) -> f64 {
        self.bar(index).high
    }

    fn low(&self, index: usize) -> f64 {
        self.bar(index).low
    }
}

/// A slice of historical bars is fully closed
impl BarSeries for [Bar] {
    fn len(&self) -> usize {
        <[Bar]>::len(self)
    }

    fn bar(&self, index: usize) -> &Bar {
        &self[index]
    }

    fn is_closed(&self, index: usize) -> bool {
        index < <[Bar]>::len(self)
    }
}

/// Growable history whose last bar may still be forming
#[derive(Debug, Clone, Default)]
pub struct BarHistory {
    bars: Vec<Bar>,
    last_forming: bool,
}

impl BarHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace or append the in-progress bar
    pub fn update_forming(&mut self, bar: Bar) {
        if self.last_forming {
            if let Some(last) = self.bars.last_mut() {
                *last = bar;
                return;
            }
        }
        self.bars.push(bar);
        self.last_forming = true;
    }

    /// Finalize a bar, replacing the in-progress one if present. Returns its index.
    pub fn close(&mut self, bar: Bar) -> usize {
        if self.last_forming {
            self.bars.pop();
        }
        self.bars.push(bar);
        self.last_forming = false;
        self.bars.len() - 1
    }

    pub fn last(&self) -> Option<&Bar> {
        self.bars.last()
    }

    pub fn clear(&mut self) {
        self.bars.clear();
        self.last_forming = false;
    }
}

impl BarSeries for BarHistory {
    fn len(&self) -> usize {
        self.bars.len()
    }

    fn bar(&self, index: usize) -> &Bar {
        &self.bars[index]
    }

    fn is_closed(&self, index: usize) -> bool {
        index < self.bars.len() && !(self.last_forming && index + 1 == self.bars.len())
    }
}
