//! Logging setup.

use tracing_subscriber::fmt;
use tracing_subscriber::EnvFilter;

use crate::configuration::LogFormat;
use crate::configuration::LoggingConfig;
use crate::error::BoxError;

/// Installs a global `fmt` subscriber according to `config`.
///
/// Fails if the filter does not parse or a global subscriber is already set.
pub fn init_tracing(config: &LoggingConfig) -> Result<(), BoxError> {
    let builder = fmt().with_env_filter(EnvFilter::try_new(&config.filter)?);
    match config.format {
        LogFormat::Text => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_filter_is_rejected() {
        let config = LoggingConfig {
            filter: "graphile_crystal=notalevel".to_string(),
            ..Default::default()
        };
        assert!(init_tracing(&config).is_err());
    }
}
