//! Post-processing of a raw result matrix into percentage values.
//!
//! Each row is laid out as `[row dimension cells..., column dimension
//! cells..., metric cells...]` (see [`ResultLayout`]). Percentage aggregators
//! rewrite the first metric cell in place.

use std::collections::HashMap;
use std::ops::Range;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::ReportConfig;
use crate::errors::ReportError;
use crate::types::Aggregator;

/// Joins key cells; never appears in dimension values.
const KEY_SEPARATOR: char = '\u{1f}';

/// Column layout shared by every result post-processor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultLayout {
    /// Encoded row dimension IDs, in result order.
    pub rows: Vec<String>,
    /// Encoded column dimension IDs, following the rows.
    pub cols: Vec<String>,
    /// Number of metric cells after the dimensions.
    pub metrics: usize,
}

impl ResultLayout {
    /// Layout of a query run for `config` returning `metrics` metric cells.
    ///
    /// A split that includes its origin repeats its row dimension right after
    /// itself; that cell names the origin of redistributed rows.
    pub fn for_config(config: &ReportConfig, metrics: usize) -> Self {
        let mut rows = config.rows.clone();
        for split in config.splits.iter().filter(|s| s.include_origin) {
            if let Some(position) = rows.iter().position(|r| *r == split.id) {
                rows.insert(position + 1, split.id.clone());
            }
        }
        Self {
            rows,
            cols: config.cols.clone(),
            metrics,
        }
    }

    /// Number of dimension cells; also the offset of the first metric.
    pub fn dimensions(&self) -> usize {
        self.rows.len() + self.cols.len()
    }

    /// Result position of the dimension with encoded ID `id`.
    pub fn position(&self, id: &str) -> Option<usize> {
        self.rows.iter().chain(self.cols.iter()).position(|d| d == id)
    }

    /// Positions of the column dimension cells.
    pub fn col_range(&self) -> Range<usize> {
        self.rows.len()..self.dimensions()
    }

    /// Positions of the metric cells.
    pub fn metric_range(&self) -> Range<usize> {
        self.dimensions()..self.dimensions() + self.metrics
    }

    /// Fails on the first row too short to hold every dimension and metric.
    pub fn check(&self, rows: &[Vec<Cell>]) -> Result<(), ReportError> {
        let expected = self.dimensions() + self.metrics;
        match rows.iter().position(|row| row.len() < expected) {
            Some(row) => Err(ReportError::ResultShape {
                row,
                len: rows[row].len(),
                expected,
            }),
            None => Ok(()),
        }
    }
}

/// One value of a result row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Cell {
    Null,
    Int(i64),
    Float(f64),
    Time(DateTime<Utc>),
    Text(String),
}

impl Cell {
    /// Text form used for grouping. Null is the empty string.
    pub fn as_string(&self) -> String {
        match self {
            Self::Null => String::new(),
            Self::Int(v) => v.to_string(),
            Self::Float(v) => v.to_string(),
            Self::Time(t) => t.to_rfc3339(),
            Self::Text(s) => s.clone(),
        }
    }

    /// Numeric value; anything non-numeric counts as zero.
    pub fn as_float(&self) -> f64 {
        match self {
            Self::Int(v) => *v as f64,
            Self::Float(v) => *v,
            Self::Null | Self::Time(_) | Self::Text(_) => 0.0,
        }
    }
}

/// Rewrites the metric column of `rows` according to `aggregator`.
///
/// `None` and the non-percentage aggregators leave the rows untouched.
/// Text that names no aggregator is rejected with
/// [`ReportError::UnsupportedAggregator`].
pub fn apply_aggregator(
    aggregator: Option<&str>,
    row_dims: usize,
    col_dims: usize,
    rows: &mut [Vec<Cell>],
) -> Result<(), ReportError> {
    let Some(text) = aggregator.filter(|a| !a.is_empty()) else {
        return Ok(());
    };
    let aggregator: Aggregator = text
        .parse()
        .map_err(|_| ReportError::UnsupportedAggregator(text.to_string()))?;

    let metric = row_dims + col_dims;
    match aggregator {
        Aggregator::PercentTotal => percent_of_total(metric, rows),
        Aggregator::PercentRow => percent_of_group(metric, 0..row_dims, rows),
        Aggregator::PercentCol => percent_of_group(metric, row_dims..metric, rows),
        Aggregator::Total | Aggregator::TotalOverTotal | Aggregator::Count => {}
    }

    debug!(%aggregator, rows = rows.len(), "applied aggregator");
    Ok(())
}

fn percent_of_total(metric: usize, rows: &mut [Vec<Cell>]) {
    let total: f64 = rows
        .iter()
        .filter_map(|row| row.get(metric))
        .map(Cell::as_float)
        .sum();
    if total == 0.0 {
        return;
    }

    for cell in rows.iter_mut().filter_map(|row| row.get_mut(metric)) {
        *cell = Cell::Float(cell.as_float() / total * 100.0);
    }
}

/// Joins the cells at `key` into one grouping key.
pub(crate) fn group_key(row: &[Cell], key: &Range<usize>) -> Option<String> {
    let cells = row.get(key.clone())?;
    let mut joined = String::new();
    for cell in cells {
        joined.push_str(&cell.as_string());
        joined.push(KEY_SEPARATOR);
    }
    Some(joined)
}

fn percent_of_group(metric: usize, key: Range<usize>, rows: &mut [Vec<Cell>]) {
    let mut totals: HashMap<String, f64> = HashMap::new();
    for row in rows.iter() {
        if let (Some(k), Some(value)) = (group_key(row, &key), row.get(metric)) {
            *totals.entry(k).or_default() += value.as_float();
        }
    }

    for row in rows.iter_mut() {
        let Some(total) = group_key(row, &key).and_then(|k| totals.get(&k).copied()) else {
            continue;
        };
        if total == 0.0 {
            continue;
        }
        if let Some(cell) = row.get_mut(metric) {
            *cell = Cell::Float(cell.as_float() / total * 100.0);
        }
    }
}
