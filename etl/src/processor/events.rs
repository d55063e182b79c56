use common::Result;
use datafusion::prelude::*;
use std::sync::Arc;
use tracing::{info, warn};

use super::catalog::CatalogProcessor;
use super::dedup::{dedup_by_key, dedup_rows};
use super::playback::{count_unmatched, playback_events};
use super::source::SourceReader;
use super::time::{START_TIME, calendar_columns, start_time};
use crate::schema::{SourceKind, StarTable, event_fields};

/// Only records of this page type are playback events.
pub const PLAYBACK_PAGE: &str = "NextSong";

/// Tables derived from session-log records.
pub struct EventTables {
    pub listeners: DataFrame,
    pub time_buckets: DataFrame,
    pub playback_events: DataFrame,
    /// Playback events that matched no catalog record and were dropped.
    pub unmatched_events: usize,
}

pub struct EventProcessor {
    reader: SourceReader,
    catalog: CatalogProcessor,
    timezone: String,
}

impl EventProcessor {
    pub fn new(ctx: Arc<SessionContext>, file_extension: &str, timezone: &str) -> Self {
        Self {
            reader: SourceReader::new(ctx.clone(), file_extension),
            catalog: CatalogProcessor::new(ctx, file_extension),
            timezone: timezone.to_string(),
        }
    }

    /// Reads session logs under `location`, keeps playback events only and
    /// derives `start_time`. The result is materialized.
    pub async fn load(&self, location: &str) -> Result<DataFrame> {
        let df = self.reader.read(&SourceKind::Events, location).await?;

        let mut exprs: Vec<Expr> = event_fields().iter().map(|f| col(f.logical)).collect();
        exprs.push(start_time(col("raw_timestamp_ms"), &self.timezone).alias(START_TIME));

        let playback = df
            .filter(col("page").eq(lit(PLAYBACK_PAGE)))?
            .select(exprs)?;
        self.reader
            .materialize(&SourceKind::Events, location, playback)
            .await
    }

    pub fn listeners(events: DataFrame) -> Result<DataFrame> {
        let projected = events.select(StarTable::Listeners.select_exprs())?;
        dedup_by_key(projected, StarTable::Listeners.key_column())
    }

    /// One row per distinct `start_time`, ascending.
    pub fn time_buckets(events: DataFrame) -> Result<DataFrame> {
        let instants = dedup_rows(events.select(vec![col(START_TIME)])?)?;

        let mut exprs = vec![col(START_TIME)];
        exprs.extend(calendar_columns(col(START_TIME)));

        Ok(instants
            .select(exprs)?
            .sort(vec![col(START_TIME).sort(true, false)])?)
    }

    /// Derives the listener and time dimensions and the playback fact table.
    /// The catalog is read again from `catalog_location` for the join.
    pub async fn transform(
        &self,
        events_location: &str,
        catalog_location: &str,
    ) -> Result<EventTables> {
        let events = self.load(events_location).await?;
        let catalog = self.catalog.load(catalog_location).await?;

        let listeners = Self::listeners(events.clone())?.cache().await?;
        let time_buckets = Self::time_buckets(events.clone())?.cache().await?;
        let playback = playback_events(events.clone(), catalog.clone())?
            .cache()
            .await?;

        let unmatched_events = count_unmatched(events, catalog).await?;
        if unmatched_events > 0 {
            warn!(
                unmatched = unmatched_events,
                "Playback events without a catalog match were dropped"
            );
        }

        let listener_count = listeners.clone().count().await?;
        let bucket_count = time_buckets.clone().count().await?;
        let playback_count = playback.clone().count().await?;
        info!(
            listeners = listener_count,
            time_buckets = bucket_count,
            playback_events = playback_count,
            "Event tables derived"
        );

        Ok(EventTables {
            listeners,
            time_buckets,
            playback_events: playback,
            unmatched_events,
        })
    }
}
