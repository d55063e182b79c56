use common::Result;
use datafusion::prelude::*;
use std::sync::Arc;
use tracing::info;

use super::dedup::dedup_by_key;
use super::source::SourceReader;
use crate::schema::{SourceKind, StarTable};

/// Dimension tables derived from catalog records.
pub struct CatalogTables {
    pub tracks: DataFrame,
    pub creators: DataFrame,
}

pub struct CatalogProcessor {
    reader: SourceReader,
}

impl CatalogProcessor {
    pub fn new(ctx: Arc<SessionContext>, file_extension: &str) -> Self {
        Self {
            reader: SourceReader::new(ctx, file_extension),
        }
    }

    /// Reads and materializes every catalog record under `location`.
    pub async fn load(&self, location: &str) -> Result<DataFrame> {
        let df = self.reader.read(&SourceKind::Catalog, location).await?;
        self.reader
            .materialize(&SourceKind::Catalog, location, df)
            .await
    }

    pub fn tracks(catalog: DataFrame) -> Result<DataFrame> {
        let projected = catalog.select(vec![
            col("track_id"),
            col("title"),
            col("creator_id"),
            col("year"),
            col("duration"),
        ])?;
        dedup_by_key(projected, StarTable::Tracks.key_column())
    }

    pub fn creators(catalog: DataFrame) -> Result<DataFrame> {
        let projected = catalog.select(vec![
            col("creator_id"),
            col("creator_name").alias("name"),
            col("creator_location").alias("location"),
            col("creator_latitude").alias("latitude"),
            col("creator_longitude").alias("longitude"),
        ])?;
        dedup_by_key(projected, StarTable::Creators.key_column())
    }

    /// Computes both dimensions in memory. Nothing is returned unless the
    /// whole catalog parsed.
    pub async fn transform(&self, location: &str) -> Result<CatalogTables> {
        let catalog = self.load(location).await?;

        let tracks = Self::tracks(catalog.clone())?.cache().await?;
        let creators = Self::creators(catalog)?.cache().await?;

        let track_count = tracks.clone().count().await?;
        let creator_count = creators.clone().count().await?;
        info!(
            tracks = track_count,
            creators = creator_count,
            "Catalog dimensions derived"
        );

        Ok(CatalogTables { tracks, creators })
    }
}
