use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use datafusion::logical_expr::ident;
use datafusion::prelude::*;
use once_cell::sync::Lazy;
use std::sync::Arc;

/// A raw JSON field and the logical column it is renamed to after reading.
#[derive(Debug, Clone)]
pub struct SourceField {
    pub raw: &'static str,
    pub logical: &'static str,
    pub data_type: DataType,
}

impl SourceField {
    fn new(raw: &'static str, logical: &'static str, data_type: DataType) -> Self {
        Self {
            raw,
            logical,
            data_type,
        }
    }
}

pub fn catalog_fields() -> Vec<SourceField> {
    vec![
        SourceField::new("song_id", "track_id", DataType::Utf8),
        SourceField::new("title", "title", DataType::Utf8),
        SourceField::new("artist_id", "creator_id", DataType::Utf8),
        SourceField::new("artist_name", "creator_name", DataType::Utf8),
        SourceField::new("artist_location", "creator_location", DataType::Utf8),
        SourceField::new("artist_latitude", "creator_latitude", DataType::Float64),
        SourceField::new("artist_longitude", "creator_longitude", DataType::Float64),
        SourceField::new("year", "year", DataType::Int32),
        SourceField::new("duration", "duration", DataType::Float64),
    ]
}

pub fn event_fields() -> Vec<SourceField> {
    vec![
        SourceField::new("page", "page", DataType::Utf8),
        SourceField::new("userId", "user_id", DataType::Utf8),
        SourceField::new("firstName", "first_name", DataType::Utf8),
        SourceField::new("lastName", "last_name", DataType::Utf8),
        SourceField::new("gender", "gender", DataType::Utf8),
        SourceField::new("level", "subscription_level", DataType::Utf8),
        SourceField::new("ts", "raw_timestamp_ms", DataType::Int64),
        SourceField::new("song", "track_title", DataType::Utf8),
        SourceField::new("artist", "creator_name", DataType::Utf8),
        SourceField::new("length", "duration", DataType::Float64),
        SourceField::new("sessionId", "session_id", DataType::Int64),
        SourceField::new("itemInSession", "item_in_session", DataType::Int64),
        SourceField::new("location", "location", DataType::Utf8),
        SourceField::new("userAgent", "user_agent", DataType::Utf8),
    ]
}

// Raw source schemas, as found in the JSON files
fn raw_schema(fields: &[SourceField]) -> Schema {
    Schema::new(
        fields
            .iter()
            .map(|f| Field::new(f.raw, f.data_type.clone(), true))
            .collect::<Vec<_>>(),
    )
}

pub fn raw_catalog_schema() -> Schema {
    raw_schema(&catalog_fields())
}

pub fn raw_events_schema() -> Schema {
    raw_schema(&event_fields())
}

/// Projection renaming raw JSON fields to their logical column names.
pub fn logical_projection(fields: &[SourceField]) -> Vec<Expr> {
    fields
        .iter()
        .map(|f| ident(f.raw).alias(f.logical))
        .collect()
}

pub enum SourceKind {
    Catalog,
    Events,
}

impl SourceKind {
    pub fn fields(&self) -> Vec<SourceField> {
        match self {
            SourceKind::Catalog => catalog_fields(),
            SourceKind::Events => event_fields(),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Catalog => "catalog",
            SourceKind::Events => "events",
        }
    }
}

pub fn get_raw_schema(kind: &SourceKind) -> SchemaRef {
    match kind {
        SourceKind::Catalog => Arc::clone(&RAW_CATALOG_SCHEMA),
        SourceKind::Events => Arc::clone(&RAW_EVENTS_SCHEMA),
    }
}

// Lazy-loaded static schemas
static RAW_CATALOG_SCHEMA: Lazy<SchemaRef> = Lazy::new(|| Arc::new(raw_catalog_schema()));
static RAW_EVENTS_SCHEMA: Lazy<SchemaRef> = Lazy::new(|| Arc::new(raw_events_schema()));

/// Output tables of the star schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StarTable {
    Tracks,
    Creators,
    Listeners,
    TimeBuckets,
    PlaybackEvents,
}

impl StarTable {
    pub const ALL: [StarTable; 5] = [
        StarTable::Tracks,
        StarTable::Creators,
        StarTable::Listeners,
        StarTable::TimeBuckets,
        StarTable::PlaybackEvents,
    ];

    /// Directory name under the output root.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tracks => "tracks",
            Self::Creators => "creators",
            Self::Listeners => "listeners",
            Self::TimeBuckets => "time_buckets",
            Self::PlaybackEvents => "playback_events",
        }
    }

    pub fn columns(&self) -> &'static [&'static str] {
        match self {
            Self::Tracks => &["track_id", "title", "creator_id", "year", "duration"],
            Self::Creators => &["creator_id", "name", "location", "latitude", "longitude"],
            Self::Listeners => &[
                "user_id",
                "first_name",
                "last_name",
                "gender",
                "subscription_level",
            ],
            Self::TimeBuckets => &[
                "start_time",
                "hour",
                "day",
                "week_of_year",
                "month",
                "year",
                "weekday",
            ],
            Self::PlaybackEvents => &[
                "event_id",
                "start_time",
                "user_id",
                "subscription_level",
                "track_id",
                "creator_id",
                "session_id",
                "location",
                "user_agent",
                "year",
                "month",
            ],
        }
    }

    pub fn partition_columns(&self) -> &'static [&'static str] {
        match self {
            Self::Tracks => &["year", "creator_id"],
            Self::Creators | Self::Listeners => &[],
            Self::TimeBuckets | Self::PlaybackEvents => &["year", "month"],
        }
    }

    pub fn key_column(&self) -> &'static str {
        match self {
            Self::Tracks => "track_id",
            Self::Creators => "creator_id",
            Self::Listeners => "user_id",
            Self::TimeBuckets => "start_time",
            Self::PlaybackEvents => "event_id",
        }
    }

    /// Projection of the table's columns in their canonical order.
    pub fn select_exprs(&self) -> Vec<Expr> {
        self.columns().iter().map(|c| col(*c)).collect()
    }
}

impl std::fmt::Display for StarTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
