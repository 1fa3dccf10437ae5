//! Bar CSV loading.
//!
//! Expected header: `timestamp,open,high,low,close,volume` (`date` is accepted
//! for `timestamp`). Timestamps are RFC 3339 or plain `YYYY-MM-DD` dates.
//! Void or insane bars are dropped with a warning; timestamps must be strictly
//! increasing.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, warn};

use stratguard_core::domain::Bar;
use stratguard_core::ErrorKind;

#[derive(Debug, Error)]
pub enum DataError {
    #[error("{path}: no usable bars")]
    Empty { path: PathBuf },
    #[error("{path}: row {row} timestamp {timestamp} is not after the previous bar")]
    Unordered {
        path: PathBuf,
        row: usize,
        timestamp: DateTime<Utc>,
    },
    #[error("{path}: row {row}: bad timestamp '{value}'")]
    BadTimestamp { path: PathBuf, row: usize, value: String },
}

impl DataError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DataError::Empty { .. } => ErrorKind::InsufficientData,
            DataError::Unordered { .. } | DataError::BadTimestamp { .. } => ErrorKind::DegenerateInput,
        }
    }
}

#[derive(Debug, Deserialize)]
struct Row {
    #[serde(alias = "date")]
    timestamp: String,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    #[serde(default)]
    volume: f64,
}

/// Load bars from a CSV file.
pub fn load_bars(path: &Path) -> Result<Vec<Bar>> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .with_context(|| format!("open bar file {}", path.display()))?;

    let mut bars: Vec<Bar> = Vec::new();
    let mut dropped = 0usize;
    for (i, record) in reader.deserialize::<Row>().enumerate() {
        // Header is row 1.
        let row = i + 2;
        let record = record.with_context(|| format!("{}: row {row}", path.display()))?;
        let timestamp = parse_timestamp(&record.timestamp).ok_or_else(|| DataError::BadTimestamp {
            path: path.to_path_buf(),
            row,
            value: record.timestamp.clone(),
        })?;
        let bar = Bar {
            timestamp,
            open: record.open,
            high: record.high,
            low: record.low,
            close: record.close,
            volume: record.volume,
        };
        if !bar.is_sane() {
            warn!(row, %timestamp, "dropping void or inconsistent bar");
            dropped += 1;
            continue;
        }
        if bars.last().is_some_and(|prev| prev.timestamp >= timestamp) {
            return Err(DataError::Unordered {
                path: path.to_path_buf(),
                row,
                timestamp,
            }
            .into());
        }
        bars.push(bar);
    }

    if bars.is_empty() {
        return Err(DataError::Empty { path: path.to_path_buf() }.into());
    }
    debug!(path = %path.display(), bars = bars.len(), dropped, "bars loaded");
    Ok(bars)
}

fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_csv(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn loads_dates_and_rfc3339() {
        let file = write_csv(
            "date,open,high,low,close,volume\n\
             2024-01-02,100,105,99,104,1000\n\
             2024-01-03T00:00:00Z,104,106,103,105,1200\n",
        );
        let bars = load_bars(file.path()).unwrap();
        assert_eq!(bars.len(), 2);
        assert_eq!(bars[0].close, 104.0);
        assert!(bars[0].timestamp < bars[1].timestamp);
    }

    #[test]
    fn drops_insane_bars() {
        let file = write_csv(
            "timestamp,open,high,low,close,volume\n\
             2024-01-02,100,105,99,104,1000\n\
             2024-01-03,100,90,99,104,1000\n\
             2024-01-04,104,106,103,105,1200\n",
        );
        let bars = load_bars(file.path()).unwrap();
        assert_eq!(bars.len(), 2);
    }

    #[test]
    fn rejects_out_of_order_rows() {
        let file = write_csv(
            "timestamp,open,high,low,close,volume\n\
             2024-01-03,100,105,99,104,1000\n\
             2024-01-02,104,106,103,105,1200\n",
        );
        let err = load_bars(file.path()).unwrap_err();
        let data = err.downcast_ref::<DataError>().unwrap();
        assert!(matches!(data, DataError::Unordered { row: 3, .. }));
        assert_eq!(data.kind(), ErrorKind::DegenerateInput);
    }

    #[test]
    fn header_only_is_insufficient_data() {
        let file = write_csv("timestamp,open,high,low,close,volume\n");
        let err = load_bars(file.path()).unwrap_err();
        assert_eq!(err.downcast_ref::<DataError>().unwrap().kind(), ErrorKind::InsufficientData);
    }

    #[test]
    fn bad_timestamp_names_the_row() {
        let file = write_csv("timestamp,open,high,low,close\nyesterday,1,1,1,1\n");
        let err = load_bars(file.path()).unwrap_err();
        assert!(err.to_string().contains("row 2"));
    }
}
