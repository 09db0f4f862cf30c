//! Error type definitions.
//!
//! This module defines the error taxonomy used throughout the crate, plus the
//! refresh events counted by [`super::RefreshStats`].

use std::net::IpAddr;
use std::path::PathBuf;

use log::SetLoggerError;
use strum_macros::EnumIter as EnumIterMacro;
use thiserror::Error;

/// Error types for initialization failures.
#[derive(Error, Debug)]
#[allow(clippy::enum_variant_names)] // All variants end with "Error" by convention
pub enum InitializationError {
    /// Error initializing the logger.
    #[error("Logger initialization error: {0}")]
    LoggerError(#[from] SetLoggerError),

    /// Error initializing the HTTP client used for downloads.
    #[error("HTTP client initialization error: {0}")]
    HttpClientError(#[from] reqwest::Error),
}

/// Errors raised while provisioning, refreshing or querying a GeoIP database.
///
/// A missing database file and a lookup against an empty slot are not errors;
/// they surface as [`crate::geoip::ReloadOutcome::Absent`] and
/// [`crate::geoip::Lookup::NoDatabase`].
#[derive(Error, Debug)]
pub enum GeoIpError {
    /// Malformed settings (durations, account numbers, header names, ...).
    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),

    /// The database file exists but could not be read or parsed.
    #[error("cannot open database file {}: {source:#}", path.display())]
    DatabaseOpenFailed {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    /// Downloading a fresh copy of the database failed.
    #[error("downloading edition {edition} failed: {source:#}")]
    FetchFailed {
        edition: String,
        #[source]
        source: anyhow::Error,
    },

    /// The client address could not be parsed as an IP address.
    #[error("cannot parse client address {0:?}")]
    AddressUnparseable(String),

    /// The loaded database reported an error for this address.
    #[error("cannot look up {address}: {source:#}")]
    LookupFailed {
        address: IpAddr,
        #[source]
        source: anyhow::Error,
    },
}

impl GeoIpError {
    pub(crate) fn open_failed(path: impl Into<PathBuf>, source: impl Into<anyhow::Error>) -> Self {
        GeoIpError::DatabaseOpenFailed {
            path: path.into(),
            source: source.into(),
        }
    }

    pub(crate) fn fetch_failed(edition: &str, source: impl Into<anyhow::Error>) -> Self {
        GeoIpError::FetchFailed {
            edition: edition.to_string(),
            source: source.into(),
        }
    }
}

/// Outcomes of background and synchronous refresh attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIterMacro)]
pub enum RefreshEvent {
    /// A new handle was opened and swapped in.
    ReloadSucceeded,
    /// The file existed but could not be opened; the previous handle stays.
    ReloadFailed,
    /// The file did not exist at reload time.
    DatabaseAbsent,
    /// The fetcher persisted a fresh file.
    DownloadSucceeded,
    /// The fetcher failed; a reload was attempted anyway.
    DownloadFailed,
}

impl std::fmt::Display for RefreshEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl RefreshEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            RefreshEvent::ReloadSucceeded => "reload_succeeded",
            RefreshEvent::ReloadFailed => "reload_failed",
            RefreshEvent::DatabaseAbsent => "database_absent",
            RefreshEvent::DownloadSucceeded => "download_succeeded",
            RefreshEvent::DownloadFailed => "download_failed",
        }
    }
}
