//! Timestamp decomposition as native columnar expressions.
//!
//! `start_time` is the event's epoch-millisecond value truncated to whole
//! seconds and typed as a timestamp in the configured timezone. Every
//! calendar part is evaluated in that timezone.

use arrow::datatypes::{DataType, TimeUnit};
use datafusion::functions::expr_fn::date_part;
use datafusion::logical_expr::cast;
use datafusion::prelude::*;

pub const START_TIME: &str = "start_time";

pub fn start_time_type(timezone: &str) -> DataType {
    DataType::Timestamp(TimeUnit::Second, Some(timezone.into()))
}

/// Integer division by 1000 truncates toward zero, dropping sub-second
/// precision before the value is reinterpreted as epoch seconds.
pub fn start_time(raw_timestamp_ms: Expr, timezone: &str) -> Expr {
    cast(raw_timestamp_ms / lit(1000_i64), start_time_type(timezone))
}

fn calendar_part(part: &str, timestamp: Expr) -> Expr {
    cast(date_part(lit(part), timestamp), DataType::Int32)
}

pub fn hour(timestamp: Expr) -> Expr {
    calendar_part("hour", timestamp)
}

pub fn day(timestamp: Expr) -> Expr {
    calendar_part("day", timestamp)
}

/// ISO 8601 week number.
pub fn week_of_year(timestamp: Expr) -> Expr {
    calendar_part("week", timestamp)
}

pub fn month(timestamp: Expr) -> Expr {
    calendar_part("month", timestamp)
}

pub fn year(timestamp: Expr) -> Expr {
    calendar_part("year", timestamp)
}

/// 1 = Sunday through 7 = Saturday.
pub fn weekday(timestamp: Expr) -> Expr {
    calendar_part("dow", timestamp) + lit(1_i32)
}

/// Calendar columns of the time dimension, in table order after `start_time`.
pub fn calendar_columns(timestamp: Expr) -> Vec<Expr> {
    vec![
        hour(timestamp.clone()).alias("hour"),
        day(timestamp.clone()).alias("day"),
        week_of_year(timestamp.clone()).alias("week_of_year"),
        month(timestamp.clone()).alias("month"),
        year(timestamp.clone()).alias("year"),
        weekday(timestamp).alias("weekday"),
    ]
}
