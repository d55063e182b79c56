//! Reconstructs the playback fact table by matching each playback event to
//! catalog records on (title, creator name, duration).

use arrow::datatypes::DataType;
use common::Result;
use datafusion::functions_window::expr_fn::row_number;
use datafusion::logical_expr::{ExprFunctionExt, JoinType, cast};
use datafusion::prelude::*;

use super::dedup::dedup_rows;
use super::time::{START_TIME, month, year};
use crate::schema::StarTable;

const EVENT_KEYS: [&str; 3] = ["track_title", "creator_name", "duration"];
const CATALOG_KEYS: [&str; 3] = ["match_title", "match_creator_name", "match_duration"];

const EVENT_SEQ: &str = "event_seq";

/// Catalog columns needed by the join, with the match keys renamed so they
/// cannot collide with event columns.
fn catalog_keys(catalog: DataFrame) -> Result<DataFrame> {
    Ok(catalog.select(vec![
        col("track_id"),
        col("creator_id"),
        col("title").alias(CATALOG_KEYS[0]),
        col("creator_name").alias(CATALOG_KEYS[1]),
        col("duration").alias(CATALOG_KEYS[2]),
    ])?)
}

fn join_catalog(events: DataFrame, catalog: DataFrame, join_type: JoinType) -> Result<DataFrame> {
    Ok(events.join(catalog_keys(catalog)?, join_type, &EVENT_KEYS, &CATALOG_KEYS, None)?)
}

/// Builds the playback fact table from filtered playback events (carrying
/// `start_time`) and raw catalog records.
///
/// Events without a catalog match are dropped. Equal joined rows are
/// collapsed before `event_id` is assigned, so duplicate catalog records do
/// not multiply an event.
pub fn playback_events(events: DataFrame, catalog: DataFrame) -> Result<DataFrame> {
    let joined = dedup_rows(join_catalog(events, catalog, JoinType::Inner)?)?;

    let seq = row_number()
        .order_by(vec![
            col(START_TIME).sort(true, false),
            col("user_id").sort(true, false),
            col("session_id").sort(true, false),
            col("item_in_session").sort(true, false),
            col("track_id").sort(true, false),
        ])
        .build()?
        .alias(EVENT_SEQ);

    let numbered = joined.select(vec![
        col(START_TIME),
        col("user_id"),
        col("subscription_level"),
        col("track_id"),
        col("creator_id"),
        col("session_id"),
        col("location"),
        col("user_agent"),
        seq,
    ])?;

    let fact = numbered.select(vec![
        cast(col(EVENT_SEQ), DataType::Int64).alias("event_id"),
        col(START_TIME),
        col("user_id"),
        col("subscription_level"),
        col("track_id"),
        col("creator_id"),
        col("session_id"),
        col("location"),
        col("user_agent"),
        year(col(START_TIME)).alias("year"),
        month(col(START_TIME)).alias("month"),
    ])?;

    Ok(fact.select(StarTable::PlaybackEvents.select_exprs())?)
}

/// Number of playback events with no catalog record matching all three keys.
pub async fn count_unmatched(events: DataFrame, catalog: DataFrame) -> Result<usize> {
    Ok(join_catalog(events, catalog, JoinType::LeftAnti)?
        .count()
        .await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processor::catalog::CatalogProcessor;
    use crate::processor::events::EventProcessor;
    use crate::processor::source::session_context;
    use crate::test_util::{EventLine, catalog_line, column_strings, sorted_rows, write_lines};
    use arrow::array::AsArray;
    use arrow::datatypes::{Int64Type, TimestampSecondType};
    use std::sync::Arc;
    use tempfile::TempDir;

    struct Inputs {
        events: DataFrame,
        catalog: DataFrame,
    }

    async fn load(dir: &TempDir, catalog: &[String], events: &[String]) -> Inputs {
        let catalog: Vec<&str> = catalog.iter().map(String::as_str).collect();
        let events: Vec<&str> = events.iter().map(String::as_str).collect();
        write_lines(dir.path(), "song_data/A/B/C/tracks.json", &catalog);
        write_lines(dir.path(), "log_data/2018/11/events.json", &events);

        let ctx = Arc::new(session_context());
        let catalog = CatalogProcessor::new(ctx.clone(), ".json")
            .load(&format!("{}/song_data/", dir.path().display()))
            .await
            .unwrap();
        let events = EventProcessor::new(ctx, ".json", "UTC")
            .load(&format!("{}/log_data/", dir.path().display()))
            .await
            .unwrap();
        Inputs { events, catalog }
    }

    #[tokio::test]
    async fn test_exact_three_key_match() {
        let dir = TempDir::new().unwrap();
        let inputs = load(
            &dir,
            &[catalog_line("T1", "Song A", "C1", "Artist X", 200.0, 2000)],
            &[EventLine::default().render()],
        )
        .await;

        let batches = playback_events(inputs.events, inputs.catalog)
            .unwrap()
            .collect()
            .await
            .unwrap();
        let rows = sorted_rows(&batches);

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["track_id"], "T1");
        assert_eq!(rows[0]["creator_id"], "C1");
        assert_eq!(rows[0]["user_id"], "42");
        assert_eq!(rows[0]["subscription_level"], "free");
        assert_eq!(rows[0]["session_id"], "5");
        assert_eq!(rows[0]["year"], "2001");
        assert_eq!(rows[0]["month"], "9");
        assert_eq!(rows[0]["event_id"], "1");

        let start = batches
            .iter()
            .find(|b| b.num_rows() > 0)
            .unwrap()
            .column_by_name(START_TIME)
            .unwrap()
            .as_primitive::<TimestampSecondType>()
            .value(0);
        assert_eq!(start, 1_000_000_000);

        let columns: Vec<String> = batches[0]
            .schema()
            .fields()
            .iter()
            .map(|f| f.name().clone())
            .collect();
        assert_eq!(columns, StarTable::PlaybackEvents.columns());
    }

    #[tokio::test]
    async fn test_duration_mismatch_drops_event() {
        let dir = TempDir::new().unwrap();
        let inputs = load(
            &dir,
            &[catalog_line("T1", "Song A", "C1", "Artist X", 200.0, 2000)],
            &[EventLine {
                length: 200.01,
                ..Default::default()
            }
            .render()],
        )
        .await;

        let fact = playback_events(inputs.events.clone(), inputs.catalog.clone()).unwrap();
        assert_eq!(fact.count().await.unwrap(), 0);
        assert_eq!(count_unmatched(inputs.events, inputs.catalog).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_catalog_records_do_not_multiply_events() {
        let dir = TempDir::new().unwrap();
        let record = catalog_line("T1", "Song A", "C1", "Artist X", 200.0, 2000);
        let inputs = load(
            &dir,
            &[record.clone(), record],
            &[EventLine::default().render()],
        )
        .await;

        let fact = playback_events(inputs.events, inputs.catalog).unwrap();
        assert_eq!(fact.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_repeated_plays_in_a_session_are_kept() {
        let dir = TempDir::new().unwrap();
        let inputs = load(
            &dir,
            &[catalog_line("T1", "Song A", "C1", "Artist X", 200.0, 2000)],
            &[
                EventLine::default().render(),
                EventLine {
                    item_in_session: 1,
                    ..Default::default()
                }
                .render(),
            ],
        )
        .await;

        let batches = playback_events(inputs.events, inputs.catalog)
            .unwrap()
            .collect()
            .await
            .unwrap();
        let mut ids = column_strings(&batches, "event_id");
        ids.sort();
        assert_eq!(ids, vec!["1", "2"]);
    }

    #[tokio::test]
    async fn test_event_ids_follow_start_time() {
        let dir = TempDir::new().unwrap();
        let inputs = load(
            &dir,
            &[catalog_line("T1", "Song A", "C1", "Artist X", 200.0, 2000)],
            &[
                EventLine {
                    ts: 1_000_000_300_000,
                    ..Default::default()
                }
                .render(),
                EventLine {
                    ts: 1_000_000_100_000,
                    user_id: "7",
                    ..Default::default()
                }
                .render(),
                EventLine {
                    ts: 1_000_000_200_000,
                    ..Default::default()
                }
                .render(),
            ],
        )
        .await;

        let batches = playback_events(inputs.events, inputs.catalog)
            .unwrap()
            .collect()
            .await
            .unwrap();

        let mut pairs = Vec::new();
        for batch in &batches {
            let ids = batch
                .column_by_name("event_id")
                .unwrap()
                .as_primitive::<Int64Type>();
            let starts = batch
                .column_by_name(START_TIME)
                .unwrap()
                .as_primitive::<TimestampSecondType>();
            for row in 0..batch.num_rows() {
                pairs.push((ids.value(row), starts.value(row)));
            }
        }
        pairs.sort();

        assert_eq!(
            pairs,
            vec![
                (1, 1_000_000_100),
                (2, 1_000_000_200),
                (3, 1_000_000_300)
            ]
        );
    }

    #[tokio::test]
    async fn test_null_keys_never_match() {
        let dir = TempDir::new().unwrap();
        let inputs = load(
            &dir,
            &[catalog_line("T1", "Song A", "C1", "Artist X", 200.0, 2000)],
            &[r#"{"page":"NextSong","userId":"42","ts":1000000000000,"artist":"Artist X","length":200.0,"sessionId":5,"itemInSession":0}"#.to_string()],
        )
        .await;

        let fact = playback_events(inputs.events, inputs.catalog).unwrap();
        assert_eq!(fact.count().await.unwrap(), 0);
    }
}
