use arrow::array::timezone::Tz;
use config::{Config, FileFormat};
use serde::Deserialize;
use tracing::debug;

use crate::{Error, Result};

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub input: InputConfig,
    pub output: OutputConfig,
    #[serde(default)]
    pub storage: StorageSettings,
    #[serde(default)]
    pub transform: TransformConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct InputConfig {
    /// Root holding both record collections, e.g. `s3a://udacity-dend/`.
    pub root: String,
    #[serde(default = "default_catalog_prefix")]
    pub catalog_prefix: String,
    #[serde(default = "default_events_prefix")]
    pub events_prefix: String,
    #[serde(default = "default_file_extension")]
    pub file_extension: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct OutputConfig {
    pub root: String,
    #[serde(default = "default_compression")]
    pub compression: String,
}

/// Credentials and endpoint for the object store. Keys left unset fall back
/// to the standard AWS environment chain.
#[derive(Debug, Deserialize, Clone)]
pub struct StorageSettings {
    #[serde(default = "default_s3_region")]
    pub region: String,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub access_key: Option<String>,
    #[serde(default)]
    pub secret_key: Option<String>,
    #[serde(default)]
    pub allow_http: bool,
    #[serde(default = "default_verify_buckets")]
    pub verify_buckets: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TransformConfig {
    /// Timezone used to turn epoch timestamps into wall-clock calendar parts.
    #[serde(default = "default_timezone")]
    pub timezone: String,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            region: default_s3_region(),
            endpoint: None,
            access_key: None,
            secret_key: None,
            allow_http: false,
            verify_buckets: default_verify_buckets(),
        }
    }
}

impl Default for TransformConfig {
    fn default() -> Self {
        Self {
            timezone: default_timezone(),
        }
    }
}

fn default_catalog_prefix() -> String {
    "song_data".to_string()
}

fn default_events_prefix() -> String {
    "log_data".to_string()
}

fn default_file_extension() -> String {
    ".json".to_string()
}

fn default_compression() -> String {
    "snappy".to_string()
}

fn default_s3_region() -> String {
    "us-west-2".to_string()
}

fn default_verify_buckets() -> bool {
    true
}

fn default_timezone() -> String {
    "UTC".to_string()
}

impl Settings {
    pub fn new(path: &str) -> Result<Self> {
        let builder = Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(
                config::Environment::with_prefix("APP")
                    .prefix_separator("_")
                    .separator("__"),
            );

        let settings = Self::from_builder(builder.build()?)?;
        debug!(
            input_root = %settings.input.root,
            output_root = %settings.output.root,
            timezone = %settings.transform.timezone,
            "Loaded ETL settings"
        );
        Ok(settings)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config = Config::builder()
            .add_source(config::File::from_str(content, FileFormat::Toml))
            .build()?;
        Self::from_builder(config)
    }

    fn from_builder(config: Config) -> Result<Self> {
        let settings: Settings = config.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if self.input.root.trim().is_empty() {
            return Err(Error::InvalidInput("input.root must not be empty".into()));
        }
        if self.output.root.trim().is_empty() {
            return Err(Error::InvalidInput("output.root must not be empty".into()));
        }
        if !self.input.file_extension.starts_with('.') {
            return Err(Error::InvalidInput(format!(
                "input.file_extension must start with '.', got '{}'",
                self.input.file_extension
            )));
        }
        self.transform
            .timezone
            .parse::<Tz>()
            .map_err(|e| Error::InvalidInput(format!("transform.timezone: {}", e)))?;
        Ok(())
    }
}
