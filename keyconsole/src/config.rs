use checker::CheckTimings;
use checker::config::ValidationError as TimingsError;
use serde::Deserialize;
use std::fs::File;
use url::Url;

#[derive(Deserialize, Clone, Debug, PartialEq)]
pub struct BackendConfig {
    /// Root of the validation API, e.g. `http://127.0.0.1:8000/api`.
    pub base_url: Url,
}

#[derive(Deserialize, Clone, Debug, PartialEq)]
pub struct MetricsConfig {
    pub statsd_host: String,
    pub statsd_port: u16,
}

#[derive(Deserialize, Clone, Debug, PartialEq)]
pub struct LoggingConfig {
    pub sentry_dsn: String,
}

#[derive(Deserialize, Clone, Debug, PartialEq)]
pub struct Config {
    pub backend: BackendConfig,
    #[serde(default)]
    pub timings: CheckTimings,
    pub metrics: Option<MetricsConfig>,
    pub logging: Option<LoggingConfig>,
}

impl Config {
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let file = File::open(path)?;
        let config: Config = serde_yaml::from_reader(file)?;
        config.validate()?;

        Ok(config)
    }

    /// Config for a bare `--base-url` run with nothing else set.
    pub fn with_base_url(base_url: Url) -> Self {
        Config {
            backend: BackendConfig { base_url },
            timings: CheckTimings::default(),
            metrics: None,
            logging: None,
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        let scheme = self.backend.base_url.scheme();
        if scheme != "http" && scheme != "https" {
            return Err(ValidationError::UnsupportedScheme(scheme.to_string()));
        }
        self.timings.validate()?;
        Ok(())
    }
}

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum ValidationError {
    #[error("backend.base_url must be http or https, got {0}")]
    UnsupportedScheme(String),

    #[error("invalid timings: {0}")]
    Timings(#[from] TimingsError),
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("could not load config from file: {0}")]
    LoadError(#[from] std::io::Error),
    #[error("could not parse config: {0}")]
    ParseError(#[from] serde_yaml::Error),
    #[error("invalid config: {0}")]
    Invalid(#[from] ValidationError),
}
