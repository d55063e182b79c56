pub mod catalog;
pub mod dedup;
pub mod events;
pub mod playback;
pub mod source;
pub mod time;

use common::{Error, Result};
use common::config::Settings;
use datafusion::prelude::*;
use std::sync::Arc;
use tracing::{Instrument, info, info_span, warn};
use uuid::Uuid;

use crate::schema::StarTable;
use crate::sink::{ParquetSink, TableSink, TableWriteSummary};
use crate::storage::S3Manager;
use crate::utils::paths::PathBuilder;
use catalog::CatalogProcessor;
use events::EventProcessor;
use source::session_context;

/// Owns the session and runs the catalog and event stages against the
/// configured roots. Each instance is one run with its own run id.
pub struct PipelineProcessor {
    pub(crate) ctx: Arc<SessionContext>,
    pub(crate) run_id: Uuid,
    input: PathBuilder,
    catalog_prefix: String,
    events_prefix: String,
    catalog: CatalogProcessor,
    events: EventProcessor,
    sink: Arc<dyn TableSink>,
}

impl PipelineProcessor {
    pub async fn new(settings: &Settings) -> Result<Self> {
        let ctx = Arc::new(session_context());
        let run_id = Uuid::new_v4();

        let s3_manager = S3Manager::new(settings.storage.clone());
        let input = PathBuilder::new(&settings.input.root);
        let output = PathBuilder::new(&settings.output.root);
        s3_manager.register_location(&ctx, input.root()).await?;
        s3_manager.register_location(&ctx, output.root()).await?;

        let sink = Arc::new(ParquetSink::new(
            ctx.clone(),
            output.root(),
            &settings.output.compression,
            run_id,
        ));

        Ok(Self::with_sink(ctx, run_id, settings, sink))
    }

    /// Builds a pipeline writing through `sink`. Object stores for the roots
    /// must already be registered in `ctx`.
    pub fn with_sink(
        ctx: Arc<SessionContext>,
        run_id: Uuid,
        settings: &Settings,
        sink: Arc<dyn TableSink>,
    ) -> Self {
        let extension = &settings.input.file_extension;
        Self {
            catalog: CatalogProcessor::new(ctx.clone(), extension),
            events: EventProcessor::new(ctx.clone(), extension, &settings.transform.timezone),
            ctx,
            run_id,
            input: PathBuilder::new(&settings.input.root),
            catalog_prefix: settings.input.catalog_prefix.clone(),
            events_prefix: settings.input.events_prefix.clone(),
            sink,
        }
    }

    pub fn catalog_location(&self) -> String {
        self.input.build_dir_path(&self.catalog_prefix)
    }

    pub fn events_location(&self) -> String {
        self.input.build_dir_path(&self.events_prefix)
    }

    /// Tracks and Creators. Both tables are computed before either is written.
    pub async fn process_catalog(&self) -> Result<Vec<TableWriteSummary>> {
        let span = info_span!("catalog", run_id = %self.run_id);
        async {
            let location = self.catalog_location();
            info!(location = %location, "Processing catalog");

            let tables = self.catalog.transform(&location).await?;
            let mut written = Vec::new();
            written.push(
                self.sink
                    .write_table(StarTable::Tracks, tables.tracks, None)
                    .await?,
            );
            written.push(
                self.sink
                    .write_table(StarTable::Creators, tables.creators, None)
                    .await?,
            );
            Ok::<_, Error>(written)
        }
        .instrument(span)
        .await
    }

    /// Listeners, TimeBuckets and PlaybackEvents. The catalog is read again
    /// for the fact table join.
    pub async fn process_events(&self) -> Result<Vec<TableWriteSummary>> {
        let span = info_span!("events", run_id = %self.run_id);
        async {
            let events_location = self.events_location();
            let catalog_location = self.catalog_location();
            info!(location = %events_location, "Processing events");

            let tables = self
                .events
                .transform(&events_location, &catalog_location)
                .await?;

            let mut written = Vec::new();
            written.push(
                self.sink
                    .write_table(StarTable::Listeners, tables.listeners, None)
                    .await?,
            );
            written.push(
                self.sink
                    .write_table(StarTable::TimeBuckets, tables.time_buckets, None)
                    .await?,
            );
            written.push(
                self.sink
                    .write_table(
                        StarTable::PlaybackEvents,
                        tables.playback_events,
                        Some(tables.unmatched_events),
                    )
                    .await?,
            );
            Ok::<_, Error>(written)
        }
        .instrument(span)
        .await
    }

    /// Runs both stages concurrently. Each stage runs to completion even when
    /// the other fails, so a failure never interrupts a write in progress.
    /// The catalog error wins when both fail.
    pub async fn process_all(&self) -> Result<Vec<TableWriteSummary>> {
        let (catalog, events) = tokio::join!(self.process_catalog(), self.process_events());

        match (catalog, events) {
            (Ok(mut written), Ok(events)) => {
                written.extend(events);
                Ok(written)
            }
            (Err(e), Ok(_)) | (Ok(_), Err(e)) => Err(e),
            (Err(catalog_err), Err(events_err)) => {
                warn!(error = %events_err, "Event stage failed as well");
                Err(catalog_err)
            }
        }
    }
}
