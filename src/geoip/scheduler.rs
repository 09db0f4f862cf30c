//! Periodic background refresh of a shared database state.

use std::sync::Weak;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::state::SharedState;

/// What one scheduler tick does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshAction {
    /// Re-read the file from disk.
    Reload,
    /// Download a fresh file, then re-read it.
    DownloadAndReload,
}

/// Starts the refresh loop for `state`.
///
/// The first tick fires one `interval` after start. A failed tick is logged
/// and the loop continues. The loop ends when `cancel` fires (also while an
/// action is in flight) or once the state has been dropped.
pub(crate) fn spawn(
    state: Weak<SharedState>,
    action: RefreshAction,
    interval: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        log::info!(
            "Starting GeoIP refresh ticker ({:?}) every {}",
            action,
            format_interval(interval)
        );

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let Some(state) = state.upgrade() else {
                break;
            };

            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                result = run(&state, action) => result,
            };

            if let Err(e) = result {
                log::error!(
                    "GeoIP refresh of {} failed: {:#}",
                    state.path().display(),
                    e
                );
            }
        }

        log::info!("Stopped GeoIP refresh ticker");
    })
}

async fn run(
    state: &SharedState,
    action: RefreshAction,
) -> Result<super::ReloadOutcome, crate::error_handling::GeoIpError> {
    match action {
        RefreshAction::Reload => state.reload_from_disk().await,
        RefreshAction::DownloadAndReload => state.download_and_reload().await,
    }
}

/// Formats whole-second intervals as `1h30m0s`-style text.
fn format_interval(interval: Duration) -> String {
    let secs = interval.as_secs();
    if secs == 0 {
        return format!("{}ms", interval.as_millis());
    }
    let (h, m, s) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    match (h, m) {
        (0, 0) => format!("{s}s"),
        (0, _) => format!("{m}m{s}s"),
        _ => format!("{h}h{m}m{s}s"),
    }
}
