//! Database download capability and its MaxMind implementation.

use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use reqwest::StatusCode;
use tokio_retry::strategy::ExponentialBackoff;
use tokio_retry::RetryIf;

use super::extract::database_bytes;
use crate::config::{
    Credentials, DATABASE_EXTENSION, DOWNLOAD_REQUEST_TIMEOUT, DOWNLOAD_RETRY_FACTOR_MS,
    DOWNLOAD_RETRY_MAX_DELAY, LOCK_FILE_NAME, MAXMIND_DOWNLOAD_BASE, MAX_GEOIP_DOWNLOAD_SIZE,
    STALE_LOCK_AGE,
};
use crate::error_handling::{GeoIpError, InitializationError};

/// Everything needed for one download-and-persist cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    /// Edition identifier, e.g. `GeoLite2-Country`
    pub edition: String,
    /// Final location of the database file
    pub destination: PathBuf,
    /// Directory holding the database (temporary files are created here)
    pub directory: PathBuf,
    /// Lock file guarding concurrent downloads into `directory`
    pub lock_file: PathBuf,
    pub credentials: Credentials,
    /// Upper bound on the time spent retrying
    pub retry_for: Duration,
}

impl FetchRequest {
    /// Derives edition, directory and lock file from the database path.
    pub fn for_database(path: &Path, credentials: Credentials, retry_for: Duration) -> Self {
        let directory = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        FetchRequest {
            edition: edition_from_path(path),
            destination: path.to_path_buf(),
            lock_file: directory.join(LOCK_FILE_NAME),
            directory,
            credentials,
            retry_for,
        }
    }
}

/// Edition identifier of a database path: its file name without `.mmdb`.
pub fn edition_from_path(path: &Path) -> String {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    match file_name.strip_suffix(DATABASE_EXTENSION) {
        Some(edition) => edition.to_string(),
        None => file_name,
    }
}

/// Downloads a database edition and persists it at the requested path.
///
/// Implementations own their retry policy and must stay within
/// [`FetchRequest::retry_for`].
#[async_trait]
pub trait DatabaseFetcher: Send + Sync {
    async fn fetch(&self, request: &FetchRequest) -> Result<(), GeoIpError>;
}

enum DownloadError {
    /// Worth retrying: transport failures, 5xx, 429
    Transient(anyhow::Error),
    /// Retrying cannot help: bad credentials, unknown edition, oversized body
    Permanent(anyhow::Error),
}

impl DownloadError {
    fn is_transient(&self) -> bool {
        matches!(self, DownloadError::Transient(_))
    }

    fn into_inner(self) -> anyhow::Error {
        match self {
            DownloadError::Transient(e) | DownloadError::Permanent(e) => e,
        }
    }
}

/// Downloads editions from the MaxMind permalink service.
///
/// `GET <base>/geoip/databases/<edition>/download?suffix=tar.gz` with HTTP
/// basic auth; the archive is unpacked and written over the destination
/// through a temporary file in the same directory.
pub struct MaxMindFetcher {
    client: reqwest::Client,
    base_url: String,
    backoff_factor_ms: u64,
}

impl MaxMindFetcher {
    /// Fetcher against the public MaxMind endpoint.
    pub fn new() -> Result<Self, InitializationError> {
        Self::with_base_url(MAXMIND_DOWNLOAD_BASE)
    }

    /// Fetcher against another endpoint (mirrors, tests).
    pub fn with_base_url(base_url: &str) -> Result<Self, InitializationError> {
        let client = reqwest::Client::builder()
            .timeout(DOWNLOAD_REQUEST_TIMEOUT)
            .build()?;
        Ok(MaxMindFetcher {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            backoff_factor_ms: DOWNLOAD_RETRY_FACTOR_MS,
        })
    }

    /// Scales the backoff between attempts.
    pub fn with_backoff_factor_ms(mut self, factor_ms: u64) -> Self {
        self.backoff_factor_ms = factor_ms.max(1);
        self
    }

    fn download_url(&self, edition: &str) -> String {
        format!(
            "{}/geoip/databases/{}/download?suffix=tar.gz",
            self.base_url, edition
        )
    }

    async fn download(&self, url: &str, credentials: &Credentials) -> Result<Vec<u8>, DownloadError> {
        let response = self
            .client
            .get(url)
            .basic_auth(credentials.account_id, Some(&credentials.license_key))
            .send()
            .await
            .map_err(|e| DownloadError::Transient(e.into()))?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response
                .text()
                .await
                .unwrap_or_else(|_| "No error details".to_string());
            let err = anyhow!("MaxMind responded {}: {}", status, error_body.trim());
            return Err(
                if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
                    DownloadError::Transient(err)
                } else {
                    DownloadError::Permanent(err)
                },
            );
        }

        if let Some(content_length) = response.content_length() {
            if content_length > MAX_GEOIP_DOWNLOAD_SIZE as u64 {
                return Err(DownloadError::Permanent(anyhow!(
                    "GeoIP database too large: {} bytes (max: {} bytes)",
                    content_length,
                    MAX_GEOIP_DOWNLOAD_SIZE
                )));
            }
        }

        let downloaded_bytes = response
            .bytes()
            .await
            .map_err(|e| DownloadError::Transient(e.into()))?;

        if downloaded_bytes.len() > MAX_GEOIP_DOWNLOAD_SIZE {
            return Err(DownloadError::Permanent(anyhow!(
                "GeoIP database too large: {} bytes (max: {} bytes)",
                downloaded_bytes.len(),
                MAX_GEOIP_DOWNLOAD_SIZE
            )));
        }

        Ok(downloaded_bytes.to_vec())
    }
}

#[async_trait]
impl DatabaseFetcher for MaxMindFetcher {
    async fn fetch(&self, request: &FetchRequest) -> Result<(), GeoIpError> {
        let edition = request.edition.as_str();
        let _lock =
            LockFile::acquire(&request.lock_file).map_err(|e| GeoIpError::fetch_failed(edition, e))?;

        let url = self.download_url(edition);
        let strategy = ExponentialBackoff::from_millis(2)
            .factor(self.backoff_factor_ms)
            .max_delay(DOWNLOAD_RETRY_MAX_DELAY);

        let mut attempts = 0u32;
        let attempt = || {
            attempts += 1;
            let attempt_no = attempts;
            let url = url.as_str();
            async move {
                let result = self.download(url, &request.credentials).await;
                if let Err(DownloadError::Transient(e)) = &result {
                    log::warn!(
                        "Download of {} failed (attempt {}), retrying: {:#}",
                        edition,
                        attempt_no,
                        e
                    );
                }
                result
            }
        };

        let body = match tokio::time::timeout(
            request.retry_for,
            RetryIf::spawn(strategy, attempt, DownloadError::is_transient),
        )
        .await
        {
            Ok(Ok(body)) => body,
            Ok(Err(e)) => return Err(GeoIpError::fetch_failed(edition, e.into_inner())),
            Err(_) => {
                return Err(GeoIpError::fetch_failed(
                    edition,
                    anyhow!("no successful download within {:?}", request.retry_for),
                ))
            }
        };

        let db_bytes =
            database_bytes(body, edition).map_err(|e| GeoIpError::fetch_failed(edition, e))?;
        persist(db_bytes, request)
            .await
            .map_err(|e| GeoIpError::fetch_failed(edition, e))?;

        log::info!(
            "Stored {} at {}",
            edition,
            request.destination.display()
        );
        Ok(())
    }
}

/// Writes the database through a temporary file and renames it into place.
async fn persist(db_bytes: Vec<u8>, request: &FetchRequest) -> anyhow::Result<()> {
    let directory = request.directory.clone();
    let destination = request.destination.clone();

    tokio::task::spawn_blocking(move || -> anyhow::Result<()> {
        std::fs::create_dir_all(&directory)
            .with_context(|| format!("Failed to create directory {:?}", directory))?;
        let mut temp = tempfile::NamedTempFile::new_in(&directory)
            .with_context(|| format!("Failed to create temporary file in {:?}", directory))?;
        temp.write_all(&db_bytes)
            .context("Failed to write downloaded database")?;
        temp.as_file()
            .sync_all()
            .context("Failed to flush downloaded database")?;
        temp.persist(&destination)
            .map_err(|e| e.error)
            .with_context(|| format!("Failed to move database into {:?}", destination))?;
        Ok(())
    })
    .await
    .context("Persist task panicked")?
}

/// Exclusive marker file held for the duration of a download.
struct LockFile {
    path: PathBuf,
}

impl LockFile {
    fn acquire(path: &Path) -> anyhow::Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {:?}", parent))?;
        }

        match Self::create(path) {
            Err(e) if e.kind() == ErrorKind::AlreadyExists && Self::is_stale(path) => {
                log::warn!("Removing stale lock file {}", path.display());
                std::fs::remove_file(path)
                    .with_context(|| format!("Failed to remove stale lock {:?}", path))?;
                Self::create(path).with_context(|| format!("Failed to create lock {:?}", path))
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Err(anyhow!(
                "lock file {} is held by another update",
                path.display()
            )),
            other => other.with_context(|| format!("Failed to create lock {:?}", path)),
        }
    }

    fn create(path: &Path) -> std::io::Result<Self> {
        let mut file = OpenOptions::new().write(true).create_new(true).open(path)?;
        writeln!(file, "{}", std::process::id())?;
        Ok(LockFile {
            path: path.to_path_buf(),
        })
    }

    fn is_stale(path: &Path) -> bool {
        std::fs::metadata(path)
            .and_then(|m| m.modified())
            .ok()
            .and_then(|modified| modified.elapsed().ok())
            .is_some_and(|age| age > STALE_LOCK_AGE)
    }
}

impl Drop for LockFile {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            log::warn!("Failed to remove lock file {}: {}", self.path.display(), e);
        }
    }
}
