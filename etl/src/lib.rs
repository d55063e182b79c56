pub mod processor;
pub mod schema;
pub mod sink;
pub mod storage;
pub mod utils;

#[cfg(test)]
mod test_util;

use common::Result;
use common::config::Settings;
use tracing::info;

use crate::processor::PipelineProcessor;
use crate::sink::TableWriteSummary;

/// Which stages a run executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    All,
    Catalog,
    Events,
}

pub async fn run_etl_pipeline(config_path: &str, stage: Stage) -> Result<Vec<TableWriteSummary>> {
    let settings = Settings::new(config_path)?;
    let pipeline = PipelineProcessor::new(&settings).await?;

    info!(?stage, config = config_path, "Starting ETL run");
    let written = match stage {
        Stage::All => pipeline.process_all().await?,
        Stage::Catalog => pipeline.process_catalog().await?,
        Stage::Events => pipeline.process_events().await?,
    };

    info!(tables = written.len(), "ETL run completed");
    Ok(written)
}
