//! Data loading
//!
//! Loads OHLCV history from CSV files, one file per instrument code.
//! Market-data retrieval itself belongs to an external collaborator; the
//! engine only needs an ordered, validated candle sequence.

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::HashMap;
use std::path::Path;
use tracing::{info, warn};

use crate::{Candle, Symbol};

/// Parse the datetime column: RFC 3339, naive datetime, or bare date
fn parse_datetime(s: &str) -> Result<DateTime<Utc>> {
    if let Ok(dt) = s.parse::<DateTime<Utc>>() {
        return Ok(dt);
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Ok(DateTime::<Utc>::from_naive_utc_and_offset(ndt, Utc));
    }
    let date = NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .with_context(|| format!("Failed to parse datetime: {s}"))?;
    let ndt = date
        .and_hms_opt(0, 0, 0)
        .context("Invalid midnight timestamp")?;
    Ok(DateTime::<Utc>::from_naive_utc_and_offset(ndt, Utc))
}

/// Load OHLCV data from a CSV file with columns
/// `datetime,open,high,low,close,volume`.
///
/// Rows that fail candle validation are skipped with a warning; the result
/// is sorted ascending by time.
pub fn load_csv(path: impl AsRef<Path>) -> Result<Vec<Candle>> {
    let mut reader = csv::Reader::from_path(path.as_ref()).context("Failed to open CSV file")?;

    let mut candles = Vec::new();

    for (row_idx, result) in reader.records().enumerate() {
        let record = result.context(format!("Failed to read row {}", row_idx + 1))?;

        let dt_str = record.get(0).context("Missing datetime column")?;
        let datetime = parse_datetime(dt_str)?;

        let open: f64 = record
            .get(1)
            .context("Missing open column")?
            .parse()
            .context("Failed to parse open")?;
        let high: f64 = record
            .get(2)
            .context("Missing high column")?
            .parse()
            .context("Failed to parse high")?;
        let low: f64 = record
            .get(3)
            .context("Missing low column")?
            .parse()
            .context("Failed to parse low")?;
        let close: f64 = record
            .get(4)
            .context("Missing close column")?
            .parse()
            .context("Failed to parse close")?;
        let volume: f64 = record
            .get(5)
            .context("Missing volume column")?
            .parse()
            .context("Failed to parse volume")?;

        match Candle::new(datetime, open, high, low, close, volume) {
            Ok(candle) => candles.push(candle),
            Err(e) => warn!(
                "Skipping invalid candle at {} row {}: {e}",
                path.as_ref().display(),
                row_idx + 1
            ),
        }
    }

    candles.sort_by_key(|c| c.datetime);
    candles.dedup_by_key(|c| c.datetime);

    Ok(candles)
}

/// Load candle history for a basket of instruments from `{code}.csv` files.
///
/// Missing files are skipped with a warning so one absent instrument never
/// blocks the rest of the basket.
pub fn load_basket(
    data_dir: impl AsRef<Path>,
    codes: &[Symbol],
) -> Result<HashMap<Symbol, Vec<Candle>>> {
    let mut data = HashMap::new();

    for code in codes {
        let path = data_dir.as_ref().join(format!("{}.csv", code.as_str()));

        if !path.exists() {
            warn!("Data file not found: {}", path.display());
            continue;
        }

        let candles = load_csv(&path).context(format!("Failed to load data for {code}"))?;

        info!("Loaded {} candles for {}", candles.len(), code);
        data.insert(code.clone(), candles);
    }

    if data.is_empty() {
        anyhow::bail!("No data loaded for any instrument");
    }

    Ok(data)
}
