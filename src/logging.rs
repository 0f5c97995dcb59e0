//! Structured Logging
//!
//! Builds the `tracing` subscriber used by the CLI. Logs go to stderr so
//! stdout stays free for JSON reports. `RUST_LOG` takes precedence over the
//! configured level.

use anyhow::{anyhow, Result};
use std::str::FromStr;
use tracing::{Level, Subscriber};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;

/// Output format for log lines
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "compact" => Ok(LogFormat::Compact),
            "pretty" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            other => Err(anyhow!("Unknown log format: {}", other)),
        }
    }
}

/// Level filter: `--verbose` forces debug, otherwise the configured level
pub fn build_filter(config: &LoggingConfig, verbose: bool) -> Result<EnvFilter> {
    let level = if verbose {
        Level::DEBUG
    } else {
        config
            .level
            .to_lowercase()
            .parse::<Level>()
            .map_err(|e| anyhow!("Failed to parse log level '{}': {}", config.level, e))?
    };

    Ok(EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy())
}

/// Subscriber writing to `writer` in the configured format
pub fn subscriber<W>(
    config: &LoggingConfig,
    verbose: bool,
    writer: W,
) -> Result<Box<dyn Subscriber + Send + Sync>>
where
    W: for<'a> MakeWriter<'a> + Send + Sync + 'static,
{
    let filter = build_filter(config, verbose)?;
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_target(false);

    Ok(match config.format.parse::<LogFormat>()? {
        LogFormat::Compact => Box::new(builder.compact().finish()),
        LogFormat::Pretty => Box::new(builder.pretty().finish()),
        LogFormat::Json => Box::new(builder.json().finish()),
    })
}

/// Install the global subscriber, logging to stderr
pub fn init(config: &LoggingConfig, verbose: bool) -> Result<()> {
    let subscriber = subscriber(config, verbose, std::io::stderr)?;
    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| anyhow!("Failed to install log subscriber: {}", e))
}
