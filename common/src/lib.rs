use arrow::error::ArrowError;
use datafusion::error::DataFusionError;
use thiserror::Error;
use url::ParseError;

pub mod config;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] ::config::ConfigError),

    #[error("Arrow error: {0}")]
    Arrow(#[from] ArrowError),

    #[error("DataFusion error: {0}")]
    DataFusion(#[from] DataFusionError),

    /// Input location unreachable or records unparsable. Aborts the stage
    /// before any of its tables is written.
    #[error("Failed to read source '{path}': {source}")]
    SourceRead {
        path: String,
        #[source]
        source: DataFusionError,
    },

    /// Destination unwritable after the table was materialized.
    #[error("Failed to write table '{table}' to '{location}': {message}")]
    SinkWrite {
        table: String,
        location: String,
        message: String,
    },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl From<object_store::Error> for Error {
    fn from(err: object_store::Error) -> Self {
        Error::Storage(format!("Object store error: {}", err))
    }
}

impl From<ParseError> for Error {
    fn from(err: ParseError) -> Self {
        Error::InvalidInput(format!("URL parse error: {}", err))
    }
}

impl Error {
    pub fn source_read(path: impl Into<String>, source: DataFusionError) -> Self {
        Error::SourceRead {
            path: path.into(),
            source,
        }
    }

    pub fn sink_write(
        table: impl Into<String>,
        location: impl Into<String>,
        message: impl std::fmt::Display,
    ) -> Self {
        Error::SinkWrite {
            table: table.into(),
            location: location.into(),
            message: message.to_string(),
        }
    }
}
