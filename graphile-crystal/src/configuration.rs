//! Logic for loading configuration in to an object model
use std::num::NonZeroUsize;
use std::str::FromStr;

use displaydoc::Display;
use schemars::gen::SchemaSettings;
use schemars::schema::RootSchema;
use schemars::JsonSchema;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;
use tracing_subscriber::EnvFilter;

/// Configuration error.
#[derive(Debug, Error, Display)]
#[non_exhaustive]
pub enum ConfigurationError {
    /// could not deserialize configuration: {0}
    DeserializeConfigError(#[from] serde_yaml::Error),
    /// {message}: {error}
    InvalidConfiguration {
        message: &'static str,
        error: String,
    },
}

/// The configuration of the execution layer.
///
/// Can be created through `serde::Deserialize` from various formats, or
/// parsed from YAML with [`FromStr`], which also validates it.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct Configuration {
    /// How plans are executed.
    #[serde(default)]
    pub execution: ExecutionConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Configuration {
    /// Checks the constraints serde cannot express.
    pub fn validate(self) -> Result<Self, ConfigurationError> {
        if let Err(err) = EnvFilter::try_new(&self.logging.filter) {
            return Err(ConfigurationError::InvalidConfiguration {
                message: "invalid logging.filter",
                error: err.to_string(),
            });
        }
        Ok(self)
    }
}

impl FromStr for Configuration {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        serde_yaml::from_str::<Configuration>(s)?.validate()
    }
}

/// Execution configuration.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(deny_unknown_fields, default)]
pub struct ExecutionConfig {
    /// The maximum number of entries executed by a single plan call; larger
    /// batches are split. Unlimited when absent.
    pub max_batch_size: Option<NonZeroUsize>,

    /// Log every crystal object as it is constructed.
    pub trace_crystal_objects: bool,
}

/// Log output format.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// Human readable lines.
    #[default]
    Text,
    /// One JSON object per event.
    Json,
}

/// Logging configuration.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(deny_unknown_fields, default)]
pub struct LoggingConfig {
    /// The output format.
    pub format: LogFormat,

    /// An `EnvFilter` directive, e.g. `info,graphile_crystal=debug`.
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::default(),
            filter: default_filter(),
        }
    }
}

fn default_filter() -> String {
    "info".to_string()
}

/// Generate a JSON schema for the configuration.
pub fn generate_config_schema() -> RootSchema {
    let settings = SchemaSettings::draft07().with(|s| {
        s.option_nullable = true;
        s.option_add_null_type = false;
    });
    settings
        .into_generator()
        .into_root_schema_for::<Configuration>()
}
