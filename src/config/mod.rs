//! Application configuration and constants.
//!
//! This module provides:
//! - Configuration constants (environment variable names, defaults, limits)
//! - Handler settings and the refresh policy derived from them
//! - JSON and directive-file loading, environment overrides
//! - CLI option types and parsing

mod constants;
mod directive;
mod duration;
mod env;
mod types;

use std::path::Path;

// Re-export all constants
pub use constants::*;
pub use directive::{parse_directives, BLOCK_NAME};
pub use duration::parse_duration;
pub use env::{apply_env_overrides, apply_overrides_from};
pub use types::{
    Cli, Command, Credentials, GeoIpSettings, LogFormat, LogLevel, RefreshConfig,
};

use crate::error_handling::GeoIpError;

/// Parses settings from configuration text.
///
/// Text starting with `{` is read as JSON, anything else as a directive block.
pub fn parse_settings(input: &str) -> Result<GeoIpSettings, GeoIpError> {
    if input.trim_start().starts_with('{') {
        serde_json::from_str(input)
            .map_err(|e| GeoIpError::ConfigInvalid(format!("invalid JSON settings: {e}")))
    } else {
        parse_directives(input)
    }
}

/// Reads and parses a configuration file.
pub async fn load_settings(path: &Path) -> Result<GeoIpSettings, GeoIpError> {
    let content = tokio::fs::read_to_string(path).await.map_err(|e| {
        GeoIpError::ConfigInvalid(format!("cannot read {}: {e}", path.display()))
    })?;
    parse_settings(&content)
}
