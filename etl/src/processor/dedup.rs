use common::Result;
use datafusion::logical_expr::ident;
use datafusion::prelude::*;

/// Keeps one row per distinct `key`. Which duplicate survives depends on the
/// order rows reach the aggregation, which is not stable across partitions.
pub fn dedup_by_key(df: DataFrame, key: &str) -> Result<DataFrame> {
    let columns: Vec<Expr> = df
        .schema()
        .fields()
        .iter()
        .map(|f| ident(f.name()))
        .collect();

    Ok(df.distinct_on(vec![ident(key)], columns, None)?)
}

/// Collapses rows that are identical in every column.
pub fn dedup_rows(df: DataFrame) -> Result<DataFrame> {
    Ok(df.distinct()?)
}
