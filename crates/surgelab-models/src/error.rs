//! Error taxonomy.
//!
//! Per-tick problems (`TickError`) are recovered locally: the offending tick
//! is skipped with a diagnostic and the stream continues. Configuration
//! problems (`ConfigError`) are fatal at pipeline construction.

use std::path::PathBuf;

use thiserror::Error;

/// A tick that cannot be admitted into the pipeline.
#[derive(Debug, Error)]
pub enum TickError {
    #[error("non-finite {field} for {symbol} at {ts}")]
    NonFinite {
        symbol: String,
        ts: i64,
        field: &'static str,
    },

    #[error("non-positive price {price} for {symbol} at {ts}")]
    NonPositivePrice { symbol: String, ts: i64, price: f64 },

    #[error("negative volume {volume} for {symbol} at {ts}")]
    NegativeVolume { symbol: String, ts: i64, volume: f64 },

    #[error("timestamp regression for {symbol}: {ts} after {prev_ts}")]
    TimestampRegression {
        symbol: String,
        ts: i64,
        prev_ts: i64,
    },
}

/// A configuration that cannot produce a pipeline.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid config value for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },

    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

impl ConfigError {
    pub fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            key,
            reason: reason.into(),
        }
    }
}
