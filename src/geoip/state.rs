//! Shared database state: the current handle plus its refresh machinery.
//!
//! A [`SharedState`] owns one slot holding the open database for one path.
//! Readers clone the slot's `Arc` and query it without holding any lock;
//! reloads open the new handle first, swap it in under a short write lock and
//! drop the superseded handle afterwards. Reloads are serialized by a separate
//! async mutex, so at most one open is in flight per state.

use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockWriteGuard};

use tokio_util::sync::CancellationToken;

use super::fetch::{DatabaseFetcher, FetchRequest};
use super::pool::PoolMember;
use super::reader::{DatabaseHandle, DatabaseReader};
use super::scheduler::{self, RefreshAction};
use super::types::{DatabaseStatus, Lookup, ReloadOutcome, StatusReport};
use crate::config::RefreshConfig;
use crate::error_handling::{GeoIpError, RefreshEvent, RefreshStats};

type Slot = Option<Arc<dyn DatabaseHandle>>;

/// The database for one path, shared by every handler configured with it.
pub struct SharedState {
    path: PathBuf,
    refresh: RefreshConfig,
    reader: Arc<dyn DatabaseReader>,
    fetcher: Arc<dyn DatabaseFetcher>,
    fetch_request: Option<FetchRequest>,
    handle: RwLock<Slot>,
    swap: tokio::sync::Mutex<()>,
    cancel: CancellationToken,
    scheduler_started: AtomicBool,
    closed: AtomicBool,
    stats: RefreshStats,
}

impl SharedState {
    /// Builds a state, performs the initial load and starts its scheduler.
    ///
    /// - `DownloadAndReload`: starts the scheduler, then downloads and reloads
    ///   once before returning.
    /// - `ReloadOnly`: starts the scheduler, then reloads once.
    /// - `None`: reloads once.
    ///
    /// A missing file is not an error; the state starts unloaded. A file that
    /// exists but cannot be opened fails provisioning, and the half-built
    /// state is shut down so no ticker outlives it.
    pub async fn provision(
        path: impl Into<PathBuf>,
        refresh: RefreshConfig,
        reader: Arc<dyn DatabaseReader>,
        fetcher: Arc<dyn DatabaseFetcher>,
    ) -> Result<Arc<Self>, GeoIpError> {
        let path = path.into();
        if refresh.interval().is_some_and(|i| i.is_zero()) {
            return Err(GeoIpError::ConfigInvalid(
                "refresh interval must be positive".to_string(),
            ));
        }

        let fetch_request = match &refresh {
            RefreshConfig::DownloadAndReload {
                credentials,
                retry_for,
                ..
            } => Some(FetchRequest::for_database(
                &path,
                credentials.clone(),
                *retry_for,
            )),
            _ => None,
        };

        let state = Arc::new(SharedState {
            path,
            refresh,
            reader,
            fetcher,
            fetch_request,
            handle: RwLock::new(None),
            swap: tokio::sync::Mutex::new(()),
            cancel: CancellationToken::new(),
            scheduler_started: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            stats: RefreshStats::new(),
        });

        if let Err(e) = state.initial_load().await {
            state.shutdown();
            return Err(e);
        }
        Ok(state)
    }

    async fn initial_load(self: &Arc<Self>) -> Result<(), GeoIpError> {
        match self.refresh.clone() {
            RefreshConfig::DownloadAndReload { interval, .. } => {
                self.start_scheduler(RefreshAction::DownloadAndReload, interval);
                // The download cycle ends with a reload of its own
                self.download_and_reload().await?;
            }
            RefreshConfig::ReloadOnly { interval } => {
                self.start_scheduler(RefreshAction::Reload, interval);
                self.reload_from_disk().await?;
            }
            RefreshConfig::None => {
                self.reload_from_disk().await?;
            }
        }
        Ok(())
    }

    fn start_scheduler(self: &Arc<Self>, action: RefreshAction, interval: std::time::Duration) {
        if self
            .scheduler_started
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            log::warn!(
                "Refresh scheduler for {} already running",
                self.path.display()
            );
            return;
        }

        // The task only holds a weak reference; dropping the state ends it
        // even without an explicit shutdown
        let _task = scheduler::spawn(
            Arc::downgrade(self),
            action,
            interval,
            self.cancel.child_token(),
        );
    }

    /// Re-reads the database file and swaps the new handle in.
    ///
    /// A missing file leaves the state unchanged. On an open error the
    /// previous handle stays in place.
    pub async fn reload_from_disk(&self) -> Result<ReloadOutcome, GeoIpError> {
        let _serialized = self.swap.lock().await;
        if self.is_closed() {
            return Ok(ReloadOutcome::Closed);
        }

        log::info!("Reloading GeoIP database {}", self.path.display());
        match tokio::fs::try_exists(&self.path).await {
            Ok(true) => {}
            Ok(false) => {
                log::warn!(
                    "GeoIP database {} does not exist",
                    self.path.display()
                );
                self.stats.record(RefreshEvent::DatabaseAbsent);
                return Ok(ReloadOutcome::Absent);
            }
            Err(e) => {
                self.stats.record(RefreshEvent::ReloadFailed);
                return Err(GeoIpError::open_failed(&self.path, e));
            }
        }

        let reader = Arc::clone(&self.reader);
        let path = self.path.clone();
        let opened = tokio::task::spawn_blocking(move || reader.open(&path))
            .await
            .map_err(|e| GeoIpError::open_failed(&self.path, e))
            .and_then(|result| result);

        let handle = match opened {
            Ok(handle) => handle,
            Err(e) => {
                self.stats.record(RefreshEvent::ReloadFailed);
                return Err(e);
            }
        };
        let metadata = handle.metadata();

        let installed = {
            let mut slot = self.write_slot();
            // Checked under the slot lock so a racing shutdown always wins
            if self.is_closed() {
                None
            } else {
                Some(slot.replace(handle))
            }
        };
        let Some(previous) = installed else {
            return Ok(ReloadOutcome::Closed);
        };

        if previous.is_some() {
            log::info!("Closing previous GeoIP database {}", self.path.display());
        }
        drop(previous);

        self.stats.record(RefreshEvent::ReloadSucceeded);
        log::info!(
            "Loaded GeoIP database {} (epoch: {}, format: {}.{})",
            self.path.display(),
            metadata.build_epoch,
            metadata.binary_format_major_version,
            metadata.binary_format_minor_version
        );
        Ok(ReloadOutcome::Loaded(metadata))
    }

    /// Downloads a fresh copy (when configured), then reloads from disk.
    ///
    /// Download errors are logged and counted but never returned: the reload
    /// runs regardless, so a previously stored file keeps serving. Only the
    /// reload result is returned.
    pub async fn download_and_reload(&self) -> Result<ReloadOutcome, GeoIpError> {
        if self.is_closed() {
            return Ok(ReloadOutcome::Closed);
        }

        match &self.fetch_request {
            Some(request) => {
                log::info!("Downloading GeoIP edition {}", request.edition);
                match self.fetcher.fetch(request).await {
                    Ok(()) => {
                        self.stats.record(RefreshEvent::DownloadSucceeded);
                        log::info!("Finished downloading GeoIP edition {}", request.edition);
                    }
                    Err(e) => {
                        self.stats.record(RefreshEvent::DownloadFailed);
                        log::error!("{:#}; reloading the stored file instead", e);
                    }
                }
            }
            None => log::debug!(
                "No download configured for {}, reloading only",
                self.path.display()
            ),
        }

        self.reload_from_disk().await
    }

    /// Looks `address` up in the current database.
    pub fn lookup(&self, address: IpAddr) -> Result<Lookup, GeoIpError> {
        let Some(handle) = self.current() else {
            return Ok(Lookup::NoDatabase);
        };
        Ok(match handle.lookup(address)? {
            Some(record) => Lookup::Found(record),
            None => Lookup::NotFound,
        })
    }

    /// Snapshot of the current handle; it stays open while the caller holds it.
    pub fn current(&self) -> Option<Arc<dyn DatabaseHandle>> {
        self.handle
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn status(&self) -> StatusReport {
        let database = if self.is_closed() {
            DatabaseStatus::Closed
        } else {
            match self.current() {
                Some(handle) => DatabaseStatus::Loaded {
                    metadata: handle.metadata(),
                },
                None => DatabaseStatus::Unloaded,
            }
        };

        StatusReport {
            path: self.path.clone(),
            refresh: self.refresh.mode(),
            database,
            events: self.stats.snapshot(),
        }
    }

    /// Logs the load state: info when nothing is loaded, debug otherwise.
    pub fn log_status(&self) {
        match self.status().database {
            DatabaseStatus::Loaded { metadata } => log::debug!(
                "GeoIP database {} loaded (type: {}, epoch: {}, format: {}.{})",
                self.path.display(),
                metadata.database_type,
                metadata.build_epoch,
                metadata.binary_format_major_version,
                metadata.binary_format_minor_version
            ),
            DatabaseStatus::Unloaded => log::info!(
                "No GeoIP database loaded from {}",
                self.path.display()
            ),
            DatabaseStatus::Closed => {
                log::info!("GeoIP database state {} is closed", self.path.display())
            }
        }
    }

    /// Stops the scheduler and closes the current handle. Idempotent.
    ///
    /// Does not wait for the scheduler task to exit.
    pub fn shutdown(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.cancel.cancel();
        let previous = self.write_slot().take();
        if previous.is_some() {
            log::info!("Closing GeoIP database {}", self.path.display());
        }
        drop(previous);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn refresh(&self) -> &RefreshConfig {
        &self.refresh
    }

    pub fn stats(&self) -> &RefreshStats {
        &self.stats
    }

    /// Whether a refresh scheduler was started for this state.
    pub fn has_scheduler(&self) -> bool {
        self.scheduler_started.load(Ordering::SeqCst)
    }

    /// Token cancelled by [`SharedState::shutdown`].
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    fn write_slot(&self) -> RwLockWriteGuard<'_, Slot> {
        self.handle.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl PoolMember for SharedState {
    fn shutdown(&self) {
        SharedState::shutdown(self);
    }
}

impl Drop for SharedState {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
