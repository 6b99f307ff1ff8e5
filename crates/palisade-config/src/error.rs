//! Configuration error types

use std::path::PathBuf;
use thiserror::Error;

/// Typed failures for single-file reads and validation.
///
/// The layered [`ConfigLoader`](crate::ConfigLoader) wraps these in
/// `anyhow` context instead.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid TOML in {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    /// A setting is out of range.
    #[error("invalid setting {setting}: {reason}")]
    Invalid {
        setting: &'static str,
        reason: String,
    },

    /// No home directory to derive the per-user config location from.
    #[error("no home directory for per-user configuration")]
    NoHomeDirectory,
}
