//! Fixtures and result helpers shared by the test suites.

use arrow::array::RecordBatch;
use arrow::util::display::array_value_to_string;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// Writes `lines` as a line-delimited JSON file at `root/relative`.
pub fn write_lines(root: &Path, relative: &str, lines: &[&str]) {
    let path = root.join(relative);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, lines.join("\n")).unwrap();
}

pub fn column_strings(batches: &[RecordBatch], name: &str) -> Vec<String> {
    let mut values = Vec::new();
    for batch in batches {
        let column = batch
            .column_by_name(name)
            .unwrap_or_else(|| panic!("missing column {}", name));
        for row in 0..batch.num_rows() {
            values.push(array_value_to_string(column, row).unwrap());
        }
    }
    values
}

/// Every row rendered as column name -> display value, sorted for
/// order-independent comparisons.
pub fn sorted_rows(batches: &[RecordBatch]) -> Vec<BTreeMap<String, String>> {
    let mut rows = Vec::new();
    for batch in batches {
        let schema = batch.schema();
        for row in 0..batch.num_rows() {
            let mut values = BTreeMap::new();
            for (idx, field) in schema.fields().iter().enumerate() {
                values.insert(
                    field.name().clone(),
                    array_value_to_string(batch.column(idx), row).unwrap(),
                );
            }
            rows.push(values);
        }
    }
    rows.sort();
    rows
}

pub fn catalog_line(track_id: &str, title: &str, creator_id: &str, creator: &str, duration: f64, year: i32) -> String {
    format!(
        r#"{{"num_songs":1,"artist_id":"{creator_id}","artist_latitude":null,"artist_longitude":null,"artist_location":"","artist_name":"{creator}","song_id":"{track_id}","title":"{title}","duration":{duration:?},"year":{year}}}"#
    )
}

pub struct EventLine<'a> {
    pub page: &'a str,
    pub user_id: &'a str,
    pub level: &'a str,
    pub ts: i64,
    pub song: &'a str,
    pub artist: &'a str,
    pub length: f64,
    pub session_id: i64,
    pub item_in_session: i64,
}

impl Default for EventLine<'_> {
    fn default() -> Self {
        Self {
            page: "NextSong",
            user_id: "42",
            level: "free",
            ts: 1_000_000_000_000,
            song: "Song A",
            artist: "Artist X",
            length: 200.0,
            session_id: 5,
            item_in_session: 0,
        }
    }
}

impl EventLine<'_> {
    pub fn render(&self) -> String {
        format!(
            r#"{{"artist":"{}","auth":"Logged In","firstName":"Ada","gender":"F","itemInSession":{},"lastName":"Lovelace","length":{:?},"level":"{}","location":"London","method":"PUT","page":"{}","registration":1540919166796.0,"sessionId":{},"song":"{}","status":200,"ts":{},"userAgent":"Mozilla/5.0","userId":"{}"}}"#,
            self.artist,
            self.item_in_session,
            self.length,
            self.level,
            self.page,
            self.session_id,
            self.song,
            self.ts,
            self.user_id
        )
    }
}

/// Rows keyed by the display value of `key`; later duplicates overwrite.
pub fn rows_by(batches: &[RecordBatch], key: &str) -> BTreeMap<String, BTreeMap<String, String>> {
    sorted_rows(batches)
        .into_iter()
        .map(|row| (row[key].clone(), row))
        .collect()
}
