use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Price comparisons treat values this close as equal
pub const PRICE_EPSILON: f64 = 1e-9;

/// A single OHLC bar
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    #[serde(default)]
    pub volume: u64,
}

impl Bar {
    /// Absolute candle body size
    pub fn body(&self) -> f64 {
        (self.close - self.open).abs()
    }
}

/// Kind of notification emitted by the detection engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignalKind {
    SweepDetected,
    StructureConfirmed,
    EntryReady,
    /// Pending entry discarded after waiting too long for a fill
    SetupCancelled,
}

impl std::fmt::Display for SignalKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SignalKind::SweepDetected => write!(f, "SWEEP"),
            SignalKind::StructureConfirmed => write!(f, "MSS"),
            SignalKind::EntryReady => write!(f, "ENTRY"),
            SignalKind::SetupCancelled => write!(f, "CANCEL"),
        }
    }
}

/// Signal with a human readable message and a reference price
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    pub kind: SignalKind,
    pub bar_index: usize,
    pub timestamp: DateTime<Utc>,
    pub price: f64,
    pub message: String,
}

impl Signal {
    pub fn new(kind: SignalKind, index: usize, bar: &Bar, price: f64, message: String) -> Self {
        Self {
            kind,
            bar_index: index,
            timestamp: bar.timestamp,
            price,
            message,
        }
    }
}
