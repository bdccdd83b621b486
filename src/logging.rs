//! Structured logging setup using the tracing crate.
//!
//! `RUST_LOG` takes precedence over the configured level when set.

use serde::{Deserialize, Serialize};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;
use crate::error::{Error, Result};

/// Log output format.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Multi-line human readable output
    Pretty,
    /// Compact single-line output
    #[default]
    Compact,
    /// JSON structured output
    Json,
}

/// Builder for the global subscriber.
#[derive(Debug, Clone)]
pub struct LoggingBuilder {
    config: LoggingConfig,
    ansi: bool,
}

impl LoggingBuilder {
    /// Create a builder from configuration.
    pub fn from_config(config: LoggingConfig) -> Self {
        Self { config, ansi: true }
    }

    /// Enable or disable ANSI colors.
    pub fn with_ansi(mut self, enabled: bool) -> Self {
        self.ansi = enabled;
        self
    }

    fn build_filter(&self) -> Result<EnvFilter> {
        if let Ok(filter) = EnvFilter::try_from_default_env() {
            return Ok(filter);
        }
        EnvFilter::try_new(&self.config.level)
            .map_err(|e| Error::invalid_config("logging.level", e.to_string()))
    }

    /// Install the global subscriber.
    pub fn init(self) -> Result<()> {
        let env_filter = self.build_filter()?;
        let registry = tracing_subscriber::registry().with(env_filter);

        let installed = match self.config.format {
            LogFormat::Pretty => registry
                .with(tracing_subscriber::fmt::layer().pretty().with_ansi(self.ansi))
                .try_init(),
            LogFormat::Compact => registry
                .with(tracing_subscriber::fmt::layer().compact().with_ansi(self.ansi))
                .try_init(),
            LogFormat::Json => registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_current_span(true)
                        .with_span_list(false),
                )
                .try_init(),
        };
        installed.map_err(|e| Error::Config(e.to_string()))
    }
}

/// Install the global subscriber described by `config`.
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    LoggingBuilder::from_config(config.clone()).init()
}
