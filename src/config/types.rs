//! Configuration types and CLI options.
//!
//! This module defines the handler settings, the refresh policy derived from
//! them, and the command-line options of the binary.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use serde::Deserialize;

use crate::config::constants::{DEFAULT_BODY_TEMPLATE, DEFAULT_LISTEN_ADDR, DOWNLOAD_RETRY_WINDOW};
use crate::config::duration::deserialize_duration;
use crate::error_handling::GeoIpError;

/// Logging level for the application.
///
/// Controls the verbosity of log output, from most restrictive (Error) to most
/// verbose (Trace).
#[derive(Clone, Debug, ValueEnum)]
pub enum LogLevel {
    /// Only error messages
    Error,
    /// Error and warning messages
    Warn,
    /// Error, warning, and informational messages
    Info,
    /// All messages except trace
    Debug,
    /// All messages including trace
    Trace,
}

impl From<LogLevel> for log::LevelFilter {
    fn from(l: LogLevel) -> Self {
        match l {
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

/// Log output format.
///
/// Controls how log messages are formatted:
/// - `Plain`: Human-readable format with colors (default)
/// - `Json`: Structured JSON format for machine parsing
#[derive(Clone, Debug, ValueEnum)]
pub enum LogFormat {
    /// Human-readable format with colors (default)
    Plain,
    /// Structured JSON format for machine parsing
    Json,
}

/// Settings of one GeoIP handler instance.
///
/// Field names follow the JSON configuration surface; the older names
/// (`db_path`, `api_key`, `download_frequency`, `reload_frequency`,
/// `override_country_code`) are accepted as aliases.
///
/// # Examples
///
/// ```
/// use geoip_region::config::GeoIpSettings;
///
/// let settings: GeoIpSettings = serde_json::from_str(
///     r#"{"db_path": "GeoLite2-Country.mmdb", "trust_header": "X-Real-IP", "reload_interval": "24h"}"#,
/// ).unwrap();
/// assert_eq!(settings.trust_header.as_deref(), Some("X-Real-IP"));
/// ```
#[derive(Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GeoIpSettings {
    /// Path of the MaxMind `.mmdb` file
    #[serde(alias = "db_path")]
    pub database_path: PathBuf,

    /// Header to trust instead of the transport peer address
    pub trust_header: Option<String>,

    /// MaxMind account used for downloads
    pub account_id: u32,

    /// MaxMind license key used for downloads
    #[serde(alias = "api_key")]
    pub license_key: String,

    /// How often to download a fresh database (0 disables)
    #[serde(alias = "download_frequency", deserialize_with = "deserialize_duration")]
    pub download_interval: Duration,

    /// How often to re-read the database file from disk (0 disables)
    #[serde(alias = "reload_frequency", deserialize_with = "deserialize_duration")]
    pub reload_interval: Duration,

    /// Country code published when nothing better is known
    #[serde(alias = "override_country_code")]
    pub override_code: Option<String>,
}

impl fmt::Debug for GeoIpSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeoIpSettings")
            .field("database_path", &self.database_path)
            .field("trust_header", &self.trust_header)
            .field("account_id", &self.account_id)
            .field("license_key", &redact(&self.license_key))
            .field("download_interval", &self.download_interval)
            .field("reload_interval", &self.reload_interval)
            .field("override_code", &self.override_code)
            .finish()
    }
}

impl GeoIpSettings {
    /// Normalizes optional strings and checks required fields.
    ///
    /// Empty `trust_header` / `override_code` values mean "not configured".
    pub fn validate(mut self) -> Result<Self, GeoIpError> {
        if self.database_path.as_os_str().is_empty() {
            return Err(GeoIpError::ConfigInvalid(
                "database_path is required".to_string(),
            ));
        }
        self.trust_header = non_empty(self.trust_header);
        self.override_code = non_empty(self.override_code);
        self.license_key = self.license_key.trim().to_string();
        Ok(self)
    }

    /// Key under which handler instances share one database state.
    pub fn pool_key(&self) -> String {
        self.database_path.to_string_lossy().into_owned()
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn redact(secret: &str) -> &'static str {
    if secret.is_empty() {
        ""
    } else {
        "<redacted>"
    }
}

/// MaxMind account credentials.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub account_id: u32,
    pub license_key: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("account_id", &self.account_id)
            .field("license_key", &redact(&self.license_key))
            .finish()
    }
}

/// Background refresh policy of a database state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshConfig {
    /// Load once, never refresh.
    None,
    /// Re-read the file from disk every `interval`.
    ReloadOnly { interval: Duration },
    /// Download a fresh file every `interval`, then re-read it.
    DownloadAndReload {
        interval: Duration,
        credentials: Credentials,
        retry_for: Duration,
    },
}

impl RefreshConfig {
    /// Selects the refresh policy.
    ///
    /// Downloading needs an account, a license key and a positive interval;
    /// otherwise a positive reload interval selects disk reloads; otherwise
    /// the database is loaded once.
    pub fn from_settings(settings: &GeoIpSettings) -> Self {
        if settings.account_id > 0
            && !settings.license_key.is_empty()
            && !settings.download_interval.is_zero()
        {
            RefreshConfig::DownloadAndReload {
                interval: settings.download_interval,
                credentials: Credentials {
                    account_id: settings.account_id,
                    license_key: settings.license_key.clone(),
                },
                retry_for: DOWNLOAD_RETRY_WINDOW,
            }
        } else if !settings.reload_interval.is_zero() {
            RefreshConfig::ReloadOnly {
                interval: settings.reload_interval,
            }
        } else {
            RefreshConfig::None
        }
    }

    /// Tick interval of the scheduler, if one runs.
    pub fn interval(&self) -> Option<Duration> {
        match self {
            RefreshConfig::None => None,
            RefreshConfig::ReloadOnly { interval } => Some(*interval),
            RefreshConfig::DownloadAndReload { interval, .. } => Some(*interval),
        }
    }

    /// Stable name of the policy for status output.
    pub fn mode(&self) -> &'static str {
        match self {
            RefreshConfig::None => "none",
            RefreshConfig::ReloadOnly { .. } => "reload",
            RefreshConfig::DownloadAndReload { .. } => "download",
        }
    }
}

/// Command-line options of the `geoip_region` binary.
///
/// # Examples
///
/// ```bash
/// # Serve on the default address with a JSON configuration
/// geoip_region --config geoip.json
///
/// # Directive-style configuration, custom body
/// geoip_region --config Geofile --body "country={geoip.country_code}"
///
/// # One-shot resolution without starting a server
/// geoip_region --config geoip.json lookup 202.36.75.151 "[2400:bd00::1]:3000"
/// ```
#[derive(Debug, Parser)]
#[command(
    name = "geoip_region",
    about = "Resolves client addresses to country codes using a MaxMind database."
)]
pub struct Cli {
    /// Configuration file (`.json` for JSON, anything else for a `geo_ip { ... }` block)
    #[arg(long, value_parser)]
    pub config: PathBuf,

    /// Address to listen on
    #[arg(long, default_value = DEFAULT_LISTEN_ADDR)]
    pub listen: String,

    /// Response body; `{geoip.country_code}` is substituted per request
    #[arg(long, default_value = DEFAULT_BODY_TEMPLATE)]
    pub body: String,

    /// Log level: error|warn|info|debug|trace
    #[arg(long, value_enum, default_value_t = LogLevel::Info)]
    pub log_level: LogLevel,

    /// Log format: plain|json
    #[arg(long, value_enum, default_value_t = LogFormat::Plain)]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Optional subcommands; without one the binary serves HTTP.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Resolve the given addresses once and print their country codes
    Lookup {
        /// Addresses, optionally with a port (`1.2.3.4:80`, `[::1]:80`)
        #[arg(required = true)]
        addresses: Vec<String>,
    },
}
