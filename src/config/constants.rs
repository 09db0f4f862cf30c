//! Configuration constants.
//!
//! This module defines the constants shared by configuration loading, the
//! refresh machinery and the request resolver.

use std::time::Duration;

// Environment overrides (non-empty values win over the configuration file)
/// Overrides `account_id`
pub const ACCOUNT_ID_ENV: &str = "GEOIP_ACCOUNT_ID";
/// Overrides `license_key`
pub const LICENSE_KEY_ENV: &str = "GEOIP_API_KEY";
/// Overrides `override_code`
pub const OVERRIDE_CODE_ENV: &str = "GEOIP_OVERRIDE_COUNTRY_CODE";

// Download settings
/// MaxMind download base URL
pub const MAXMIND_DOWNLOAD_BASE: &str = "https://download.maxmind.com";
/// File extension stripped from the database file name to obtain the edition
pub const DATABASE_EXTENSION: &str = ".mmdb";
/// Lock file created next to the database while a download is in progress
pub const LOCK_FILE_NAME: &str = ".geoipupdate.lock";
/// Total time a single download may spend retrying
pub const DOWNLOAD_RETRY_WINDOW: Duration = Duration::from_secs(5 * 60);
/// A lock file older than this is assumed to be left over from a crashed process
pub const STALE_LOCK_AGE: Duration = Duration::from_secs(60 * 60);
/// Per-request timeout for the download itself (large files)
pub const DOWNLOAD_REQUEST_TIMEOUT: Duration = Duration::from_secs(300);
/// Download backoff grows as `2^attempt * DOWNLOAD_RETRY_FACTOR_MS` (1s, 2s, 4s, ...)
pub const DOWNLOAD_RETRY_FACTOR_MS: u64 = 500;
/// Backoff never grows beyond this
pub const DOWNLOAD_RETRY_MAX_DELAY: Duration = Duration::from_secs(60);
/// Maximum GeoIP download size in bytes (100MB)
/// A country database is a few MB; city databases reach ~70MB
pub const MAX_GEOIP_DOWNLOAD_SIZE: usize = 100 * 1024 * 1024;

// Request resolution
/// Name of the published request variable
pub const COUNTRY_CODE_VARIABLE: &str = "geoip.country_code";
/// Published when no database is loaded
pub const SENTINEL_COUNTRY_CODE: &str = "--";

// Host adapter defaults
/// Default listen address of the CLI server
pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:8080";
/// Default response body of the CLI server
pub const DEFAULT_BODY_TEMPLATE: &str = "Hello from {geoip.country_code}";
