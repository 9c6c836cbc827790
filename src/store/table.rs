//! The cumulative metadata table.
//!
//! Rows are appended as individual JSON objects under
//! `<analysis>/rows/<uuid v7>.json`. Keys sort by creation time, so
//! insertion order survives, and concurrent appends never touch the same
//! object. [`RowLogTable::export_csv`] renders the log as one CSV file.

use super::ObjectStore;
use crate::config::Namespaces;
use crate::error::GeoRefError;
use crate::pipeline::metadata::{MetadataRow, COLUMNS};
use async_trait::async_trait;
use tracing::info;
use uuid::Uuid;

/// Append-only table of metadata rows.
#[async_trait]
pub trait MetadataTable: Send + Sync {
    /// Append one row, returning where it was stored.
    async fn append(&self, row: &MetadataRow) -> Result<String, GeoRefError>;

    /// Every row, oldest first.
    async fn rows(&self) -> Result<Vec<MetadataRow>, GeoRefError>;
}

/// [`MetadataTable`] kept as one object per row in the object store.
#[derive(Debug, Clone)]
pub struct RowLogTable {
    store: ObjectStore,
    prefix: String,
}

impl RowLogTable {
    /// Rows live under `<analysis_namespace>/rows/`.
    pub fn new(store: ObjectStore, analysis_namespace: &str) -> Self {
        Self {
            store,
            prefix: Namespaces::key(analysis_namespace, "rows"),
        }
    }

    /// Render every row into `table_key` as CSV and return the row count.
    pub async fn export_csv(&self, table_key: &str) -> Result<usize, GeoRefError> {
        let rows = self.rows().await?;
        let csv = render_csv(&rows)?;
        self.store.put(table_key, csv.into_bytes()).await?;
        info!("Exported {} rows to {}", rows.len(), self.store.location(table_key));
        Ok(rows.len())
    }
}

fn table_failed(detail: impl std::fmt::Display) -> GeoRefError {
    GeoRefError::TableFailed {
        detail: detail.to_string(),
    }
}

#[async_trait]
impl MetadataTable for RowLogTable {
    async fn append(&self, row: &MetadataRow) -> Result<String, GeoRefError> {
        let key = Namespaces::key(&self.prefix, &format!("{}.json", Uuid::now_v7()));
        let body = serde_json::to_vec(row).map_err(table_failed)?;
        self.store.put(&key, body).await?;
        Ok(key)
    }

    async fn rows(&self) -> Result<Vec<MetadataRow>, GeoRefError> {
        let mut rows = Vec::new();
        for key in self.store.list(&self.prefix).await? {
            if !key.ends_with(".json") {
                continue;
            }
            let body = self.store.get(&key).await?;
            let row = serde_json::from_slice(&body)
                .map_err(|e| table_failed(format!("{key}: {e}")))?;
            rows.push(row);
        }
        Ok(rows)
    }
}

/// The table as CSV with the fixed header, even when there are no rows.
pub fn render_csv(rows: &[MetadataRow]) -> Result<String, GeoRefError> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());
    writer.write_record(COLUMNS).map_err(table_failed)?;
    for row in rows {
        writer.serialize(row).map_err(table_failed)?;
    }
    let bytes = writer.into_inner().map_err(table_failed)?;
    String::from_utf8(bytes).map_err(table_failed)
}
