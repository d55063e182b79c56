use arrow::datatypes::DataType;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use common::{Error, Result};
use datafusion::common::config::TableParquetOptions;
use datafusion::dataframe::DataFrameWriteOptions;
use datafusion::datasource::listing::ListingTableUrl;
use datafusion::logical_expr::{cast, ident, when};
use datafusion::prelude::*;
use futures::{StreamExt, TryStreamExt};
use object_store::path::Path;
use object_store::{ObjectStore, PutPayload};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::schema::StarTable;
use crate::utils::paths::PathBuilder;

pub const COMMIT_MARKER: &str = "_SUCCESS";

/// Directory value used for a null partition key.
pub const HIVE_DEFAULT_PARTITION: &str = "__HIVE_DEFAULT_PARTITION__";

/// Outcome of one table write.
#[derive(Debug, Clone)]
pub struct TableWriteSummary {
    pub table: StarTable,
    pub location: String,
    pub rows: usize,
}

/// Contents of the `_SUCCESS` object dropped next to a written table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitMarker {
    pub run_id: Uuid,
    pub table: String,
    pub rows: usize,
    pub partition_by: Vec<String>,
    pub unmatched_rows: Option<usize>,
    pub written_at: DateTime<Utc>,
}

#[async_trait]
pub trait TableSink: Send + Sync + 'static {
    /// Replaces whatever was stored for `table` with the rows of `df`.
    async fn write_table(
        &self,
        table: StarTable,
        df: DataFrame,
        unmatched_rows: Option<usize>,
    ) -> Result<TableWriteSummary>;
}

/// Writes tables as hive-partitioned Parquet datasets below an output root.
pub struct ParquetSink {
    ctx: Arc<SessionContext>,
    paths: PathBuilder,
    compression: String,
    run_id: Uuid,
}

impl ParquetSink {
    pub fn new(ctx: Arc<SessionContext>, output_root: &str, compression: &str, run_id: Uuid) -> Self {
        Self {
            ctx,
            paths: PathBuilder::new(output_root),
            compression: compression.to_string(),
            run_id,
        }
    }

    pub fn table_location(&self, table: StarTable) -> String {
        self.paths.build_dir_path(table.as_str())
    }

    fn store_for(&self, location: &str) -> Result<(Arc<dyn ObjectStore>, Path)> {
        let url = ListingTableUrl::parse(location)?;
        let store = self.ctx.runtime_env().object_store(&url)?;
        Ok((store, url.prefix().clone()))
    }

    /// Deletes every object under the table prefix, including the previous
    /// commit marker.
    async fn clear_location(&self, store: &Arc<dyn ObjectStore>, prefix: &Path) -> Result<usize> {
        let existing = store
            .list(Some(prefix))
            .map_ok(|meta| meta.location)
            .boxed();
        let deleted = store.delete_stream(existing).try_collect::<Vec<_>>().await?;
        Ok(deleted.len())
    }

    fn parquet_options(&self, table: StarTable) -> TableParquetOptions {
        let mut options = TableParquetOptions::default();
        options.global.compression = Some(self.compression.clone());
        options
            .key_value_metadata
            .insert("etl.table".to_string(), Some(table.as_str().to_string()));
        options
            .key_value_metadata
            .insert("etl.run_id".to_string(), Some(self.run_id.to_string()));
        options
    }

    /// Hive partition values are rendered as text, so partition columns are
    /// cast to strings before the write. Nulls go to the Hive default
    /// partition.
    fn with_text_partitions(table: StarTable, df: DataFrame) -> Result<DataFrame> {
        let partitions = table.partition_columns();
        if partitions.is_empty() {
            return Ok(df);
        }

        let exprs = table
            .columns()
            .iter()
            .map(|c| -> Result<Expr> {
                if partitions.contains(c) {
                    Ok(when(ident(*c).is_null(), lit(HIVE_DEFAULT_PARTITION))
                        .otherwise(cast(ident(*c), DataType::Utf8))?
                        .alias(*c))
                } else {
                    Ok(ident(*c))
                }
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(df.select(exprs)?)
    }

    async fn write_marker(
        &self,
        store: &Arc<dyn ObjectStore>,
        prefix: &Path,
        table: StarTable,
        rows: usize,
        unmatched_rows: Option<usize>,
    ) -> Result<()> {
        let marker = CommitMarker {
            run_id: self.run_id,
            table: table.as_str().to_string(),
            rows,
            partition_by: table
                .partition_columns()
                .iter()
                .map(|c| c.to_string())
                .collect(),
            unmatched_rows,
            written_at: Utc::now(),
        };
        let body = serde_json::to_vec_pretty(&marker)?;

        store
            .put(&prefix.child(COMMIT_MARKER), PutPayload::from(Bytes::from(body)))
            .await?;
        debug!(table = %table, "Commit marker written");
        Ok(())
    }

    async fn overwrite(
        &self,
        table: StarTable,
        df: DataFrame,
        location: &str,
        unmatched_rows: Option<usize>,
    ) -> Result<usize> {
        let rows = df.clone().count().await?;
        let (store, prefix) = self.store_for(location)?;

        let removed = self.clear_location(&store, &prefix).await?;
        debug!(table = %table, removed, "Cleared previous output");

        let partition_by = table
            .partition_columns()
            .iter()
            .map(|c| c.to_string())
            .collect::<Vec<_>>();
        let options = DataFrameWriteOptions::new().with_partition_by(partition_by);

        Self::with_text_partitions(table, df)?
            .write_parquet(location, options, Some(self.parquet_options(table)))
            .await?;

        self.write_marker(&store, &prefix, table, rows, unmatched_rows)
            .await?;
        Ok(rows)
    }
}

#[async_trait]
impl TableSink for ParquetSink {
    async fn write_table(
        &self,
        table: StarTable,
        df: DataFrame,
        unmatched_rows: Option<usize>,
    ) -> Result<TableWriteSummary> {
        let location = self.table_location(table);
        let rows = self
            .overwrite(table, df, &location, unmatched_rows)
            .await
            .map_err(|e| Error::sink_write(table.as_str(), location.as_str(), e))?;

        info!(table = %table, location = %location, rows, "Table written");
        Ok(TableWriteSummary {
            table,
            location,
            rows,
        })
    }
}
