use crate::domain::bar::{BarRow, BarSeries};
use crate::domain::scope::MarketScope;
use crate::errors::{AppError, Result};
use std::path::{Path, PathBuf};

/// One CSV file per `(scope, asset_id)` under
/// `<data>/parquet/<scope>/bars_daily/<asset>.csv` (spec §4.2 — "any
/// columnar format" is satisfied by CSV; see SPEC_FULL.md §4.2 for why
/// CSV was chosen over introducing a parquet/arrow dependency).
///
/// Scope is mandatory at construction: a store built for US_EU can
/// never write under `africa/`.
#[derive(Debug, Clone)]
pub struct ColumnarBarStore {
    scope: MarketScope,
    root: PathBuf,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BarStoreStats {
    pub symbol_count: usize,
    pub total_rows: usize,
}

fn sanitize_filename(asset_id: &str) -> String {
    asset_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

impl ColumnarBarStore {
    pub fn new(data_dir: impl AsRef<Path>, scope: MarketScope) -> Result<Self> {
        let root = data_dir.as_ref().join("parquet").join(scope.dir_name()).join("bars_daily");
        std::fs::create_dir_all(&root)?;
        Ok(Self { scope, root })
    }

    pub fn scope(&self) -> MarketScope {
        self.scope
    }

    fn path_for(&self, asset_id: &str) -> PathBuf {
        self.root.join(format!("{}.csv", sanitize_filename(asset_id)))
    }

    /// Overwrite the file for `asset_id` with `series`, atomically
    /// (write-to-temp + rename, per spec §5 "Shared Resources").
    pub fn save(&self, asset_id: &str, series: &BarSeries) -> Result<()> {
        let final_path = self.path_for(asset_id);
        let tmp_path = final_path.with_extension("csv.tmp");

        let mut writer = csv::WriterBuilder::new().has_headers(true).from_path(&tmp_path)?;
        for row in &series.rows {
            writer.serialize(row).map_err(csv_err)?;
        }
        writer.flush()?;
        drop(writer);

        std::fs::rename(&tmp_path, &final_path)?;
        Ok(())
    }

    pub fn load(&self, asset_id: &str) -> Result<Option<BarSeries>> {
        let path = self.path_for(asset_id);
        if !path.exists() {
            return Ok(None);
        }
        let mut reader = csv::ReaderBuilder::new().has_headers(true).from_path(&path)?;
        let mut rows = Vec::new();
        for record in reader.deserialize() {
            let row: BarRow = record.map_err(csv_err)?;
            rows.push(row);
        }
        Ok(Some(BarSeries::new(rows)))
    }

    /// Merge `new_series` with whatever is on disk, last-write-wins on
    /// duplicate date, re-sorted, then persist atomically.
    pub fn upsert(&self, asset_id: &str, new_series: BarSeries) -> Result<BarSeries> {
        let mut existing = self.load(asset_id)?.unwrap_or_default();
        existing.upsert(new_series);
        self.save(asset_id, &existing)?;
        Ok(existing)
    }

    pub fn get_last_date(&self, asset_id: &str) -> Result<Option<chrono::NaiveDate>> {
        Ok(self.load(asset_id)?.and_then(|s| s.last_date()))
    }

    pub fn get_bar_count(&self, asset_id: &str) -> Result<usize> {
        Ok(self.load(asset_id)?.map(|s| s.len()).unwrap_or(0))
    }

    pub fn list_symbols(&self) -> Result<Vec<String>> {
        let mut out = Vec::new();
        for entry in std::fs::read_dir(&self.root)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some("csv") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    out.push(stem.to_string());
                }
            }
        }
        out.sort();
        Ok(out)
    }

    pub fn delete_bars(&self, asset_id: &str) -> Result<()> {
        let path = self.path_for(asset_id);
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        Ok(())
    }

    pub fn stats(&self) -> Result<BarStoreStats> {
        let symbols = self.list_symbols()?;
        let mut total_rows = 0usize;
        for symbol in &symbols {
            total_rows += self.get_bar_count(symbol)?;
        }
        Ok(BarStoreStats { symbol_count: symbols.len(), total_rows })
    }
}

fn csv_err(e: csv::Error) -> AppError {
    AppError::Internal(format!("csv error: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn row(y: i32, m: u32, d: u32, close: f64) -> BarRow {
        BarRow {
            date: NaiveDate::from_ymd_opt(y, m, d).unwrap(),
            open: close,
            high: close,
            low: close,
            close,
            volume: 1000.0,
            adj_close: Some(close),
        }
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = ColumnarBarStore::new(dir.path(), MarketScope::UsEu).unwrap();
        let series = BarSeries::new(vec![row(2024, 1, 2, 10.0), row(2024, 1, 3, 11.0)]);
        store.save("AAPL.US", &series).unwrap();

        let loaded = store.load("AAPL.US").unwrap().unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded.rows[0].close, 10.0);
    }

    #[test]
    fn upsert_merges_and_dedupes_by_date() {
        let dir = tempfile::tempdir().unwrap();
        let store = ColumnarBarStore::new(dir.path(), MarketScope::UsEu).unwrap();
        store.save("AAPL.US", &BarSeries::new(vec![row(2024, 1, 2, 10.0)])).unwrap();

        let merged = store
            .upsert("AAPL.US", BarSeries::new(vec![row(2024, 1, 2, 99.0), row(2024, 1, 3, 11.0)]))
            .unwrap();

        assert_eq!(merged.len(), 2);
        assert_eq!(merged.rows[0].close, 99.0);
    }

    #[test]
    fn scope_isolation_uses_distinct_directories() {
        let dir = tempfile::tempdir().unwrap();
        let us_eu = ColumnarBarStore::new(dir.path(), MarketScope::UsEu).unwrap();
        let africa = ColumnarBarStore::new(dir.path(), MarketScope::Africa).unwrap();

        us_eu.save("NPN.JSE", &BarSeries::new(vec![row(2024, 1, 2, 5.0)])).unwrap();
        assert!(africa.load("NPN.JSE").unwrap().is_none());
    }
}
