//! Process-level initialization.
//!
//! This module provides functions to set up what the binary needs before any
//! handler is provisioned:
//! - Logging (plain or JSON)
//! - The instance pool all handlers share
//! - Environment defaults from `.env` files

mod logger;

use std::sync::Arc;

pub use logger::init_logger_with;

use crate::geoip::{InstancePool, SharedState};

/// Creates the pool shared by every handler of this process.
pub fn init_pool() -> Arc<InstancePool<SharedState>> {
    Arc::new(InstancePool::new())
}

/// Loads `.env` from the working directory, then from next to the executable.
///
/// Variables already set in the environment win. Missing files are ignored.
pub fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }
    let beside_exe = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join(".env")));
    if let Some(path) = beside_exe {
        let _ = dotenvy::from_path(path);
    }
}
