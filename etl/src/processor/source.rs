use common::{Error, Result};
use datafusion::datasource::listing::ListingTableUrl;
use datafusion::error::DataFusionError;
use datafusion::prelude::*;
use futures::TryStreamExt;
use std::sync::Arc;
use tracing::{debug, info};

use crate::schema::{SourceKind, get_raw_schema, logical_projection};

/// Session used by every stage. Source records are nested several
/// directories below their prefix, so listings descend into subdirectories.
pub fn session_context() -> SessionContext {
    let config = SessionConfig::new().set_bool(
        "datafusion.execution.listing_table_ignore_subdirectory",
        false,
    );
    SessionContext::new_with_config(config)
}

/// Reads line-delimited JSON records below a location into logical columns.
pub struct SourceReader {
    ctx: Arc<SessionContext>,
    file_extension: String,
}

impl SourceReader {
    pub fn new(ctx: Arc<SessionContext>, file_extension: &str) -> Self {
        Self {
            ctx,
            file_extension: file_extension.to_string(),
        }
    }

    /// Fails unless at least one file with the source extension exists under
    /// `location`. A missing prefix must not read as an empty source.
    async fn ensure_files(&self, location: &str) -> Result<()> {
        let url = ListingTableUrl::parse(location).map_err(|e| Error::source_read(location, e))?;
        let store = self
            .ctx
            .runtime_env()
            .object_store(&url)
            .map_err(|e| Error::source_read(location, e))?;

        let mut listing = store.list(Some(url.prefix()));
        while let Some(meta) = listing
            .try_next()
            .await
            .map_err(|e| Error::source_read(location, e.into()))?
        {
            if meta.location.as_ref().ends_with(&self.file_extension) {
                return Ok(());
            }
        }

        Err(Error::source_read(
            location,
            DataFusionError::Execution(format!(
                "no '{}' files found",
                self.file_extension
            )),
        ))
    }

    /// Lazily scans every matching file under `location`, recursively. The raw
    /// schema is declared rather than inferred, so parse failures surface when
    /// the frame is executed.
    pub async fn read(&self, kind: &SourceKind, location: &str) -> Result<DataFrame> {
        self.ensure_files(location).await?;

        let schema = get_raw_schema(kind);
        let options = NdJsonReadOptions::default()
            .schema(schema.as_ref())
            .file_extension(&self.file_extension);

        debug!(source = kind.as_str(), location, "Registering source records");
        let df = self
            .ctx
            .read_json(location, options)
            .await
            .map_err(|e| Error::source_read(location, e))?;

        Ok(df.select(logical_projection(&kind.fields()))?)
    }

    /// Executes `df` into memory. Any failure here is a read or parse failure
    /// of the underlying files.
    pub async fn materialize(
        &self,
        kind: &SourceKind,
        location: &str,
        df: DataFrame,
    ) -> Result<DataFrame> {
        let cached = df
            .cache()
            .await
            .map_err(|e| Error::source_read(location, e))?;
        let rows = cached
            .clone()
            .count()
            .await
            .map_err(|e| Error::source_read(location, e))?;

        info!(source = kind.as_str(), location, rows, "Loaded source records");
        Ok(cached)
    }
}
