//! Bar loading from CSV
//!
//! Columns: `timestamp,open,high,low,close,volume` with RFC3339 timestamps.
//! Files ending in `.zst` are decompressed on the fly.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use tracing::{info, warn};

use crate::types::Bar;

#[derive(Debug, Deserialize)]
struct CsvRow {
    timestamp: String,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    #[serde(default)]
    volume: u64,
}

fn is_zstd(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "zst")
}

/// Load bars from a `.csv` or `.csv.zst` file, oldest first
pub fn load_bars(path: &Path) -> Result<Vec<Bar>> {
    let file = File::open(path).with_context(|| format!("Failed to open bars file: {:?}", path))?;

    let reader: Box<dyn Read> = if is_zstd(path) {
        let decoder = zstd::stream::Decoder::new(file)
            .with_context(|| format!("Failed to create zstd decoder for: {:?}", path))?;
        Box::new(decoder)
    } else {
        Box::new(file)
    };

    let bars = parse_bars(BufReader::new(reader)).with_context(|| format!("Failed to parse bars: {:?}", path))?;
    if bars.is_empty() {
        bail!("No bars found in {:?}", path);
    }

    info!(
        "Loaded {} bars from {:?} ({} → {})",
        bars.len(),
        path,
        bars[0].timestamp,
        bars[bars.len() - 1].timestamp
    );
    Ok(bars)
}

/// Parse CSV bars from any reader
pub fn parse_bars<R: Read>(reader: R) -> Result<Vec<Bar>> {
    let mut csv_reader = csv::Reader::from_reader(reader);
    let mut bars = Vec::new();

    for (line, result) in csv_reader.deserialize().enumerate() {
        let row: CsvRow = result.with_context(|| format!("Failed to parse CSV row {}", line + 1))?;
        let timestamp = DateTime::parse_from_rfc3339(row.timestamp.trim())
            .with_context(|| format!("Failed to parse timestamp: {}", row.timestamp))?
            .with_timezone(&Utc);

        bars.push(Bar {
            timestamp,
            open: row.open,
            high: row.high,
            low: row.low,
            close: row.close,
            volume: row.volume,
        });
    }

    if bars.windows(2).any(|w| w[1].timestamp < w[0].timestamp) {
        warn!("Bars out of order, sorting by timestamp");
        bars.sort_by_key(|b| b.timestamp);
    }

    Ok(bars)
}
