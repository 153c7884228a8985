//! Tracing setup shared by the Lanwatch binaries.
//!
//! Verbosity follows `RUST_LOG` (default `info`), the output layout follows
//! `RUST_LOG_FORMAT`: `json` for one JSON object per line, anything else for
//! compact human-readable lines.

use std::env::var;
use std::str::FromStr;

use tracing::level_filters::LevelFilter;
use tracing_subscriber::{Layer, filter::EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Environment variable selecting the output layout
pub const FORMAT_ENV: &str = "RUST_LOG_FORMAT";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

impl FromStr for LogFormat {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_ascii_lowercase().as_str() {
            "json" => LogFormat::Json,
            _ => LogFormat::Compact,
        })
    }
}

impl LogFormat {
    /// Layout requested through `RUST_LOG_FORMAT`, compact when unset
    pub fn from_env() -> Self {
        var(FORMAT_ENV).ok().and_then(|v| v.parse().ok()).unwrap_or_default()
    }
}

/// Install the global subscriber at `info` unless `RUST_LOG` says otherwise
pub fn init() {
    init_with(LevelFilter::INFO, LogFormat::from_env());
}

/// Install the global subscriber.
///
/// A second call, or a call after another subscriber was installed, is ignored.
pub fn init_with(level: LevelFilter, format: LogFormat) {
    let env_filter = EnvFilter::builder().with_default_directive(level.into()).from_env_lossy();

    let log_layer = match format {
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .with_current_span(false)
            .with_filter(env_filter)
            .boxed(),
        LogFormat::Compact => tracing_subscriber::fmt::layer()
            .compact()
            .with_target(false)
            .with_filter(env_filter)
            .boxed(),
    };

    if tracing_subscriber::registry().with(log_layer).try_init().is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}
