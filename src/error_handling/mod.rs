//! Error handling and refresh statistics.
//!
//! This module provides:
//! - The [`GeoIpError`] taxonomy shared by provisioning, refresh and lookup
//! - Initialization errors for process-level setup
//! - Thread-safe refresh counters consumed by the status endpoint
//!
//! Propagation policy: errors from the background scheduler are logged and
//! counted, errors at initial provisioning abort that handler, and during a
//! request only [`GeoIpError::LookupFailed`] is propagated.

mod stats;
mod types;

// Re-export public API
pub use stats::RefreshStats;
pub use types::{GeoIpError, InitializationError, RefreshEvent};
