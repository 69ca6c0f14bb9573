use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One daily OHLCV row. Timestamps are timezone-naive per spec §4.2.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BarRow {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub adj_close: Option<f64>,
}

/// Ascending-by-date, date-unique series for one asset.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BarSeries {
    pub rows: Vec<BarRow>,
}

impl BarSeries {
    pub fn new(mut rows: Vec<BarRow>) -> Self {
        rows.sort_by_key(|r| r.date);
        rows.dedup_by_key(|r| r.date);
        Self { rows }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.rows.last().map(|r| r.date)
    }

    pub fn closes(&self) -> Vec<f64> {
        self.rows.iter().map(|r| r.close).collect()
    }

    /// Last `n` rows (or fewer if the series is shorter).
    pub fn tail(&self, n: usize) -> &[BarRow] {
        let len = self.rows.len();
        &self.rows[len.saturating_sub(n)..]
    }

    /// Merge `other` into `self`: last-write-wins on duplicate date,
    /// re-sorted ascending (spec §4.2 upsert semantics).
    pub fn upsert(&mut self, other: BarSeries) {
        use std::collections::BTreeMap;
        let mut by_date: BTreeMap<NaiveDate, BarRow> =
            self.rows.drain(..).map(|r| (r.date, r)).collect();
        for row in other.rows {
            by_date.insert(row.date, row);
        }
        self.rows = by_date.into_values().collect();
    }
}
