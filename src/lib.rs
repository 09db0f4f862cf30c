//! geoip_region library: per-request country resolution
//!
//! This library resolves each request's client address to an ISO country code
//! using a MaxMind database that is refreshed in the background, either by
//! re-reading the file from disk or by downloading a fresh edition. Handlers
//! configured with the same database path share one database state and one
//! refresh loop.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use axum::http::HeaderMap;
//! use geoip_region::config::GeoIpSettings;
//! use geoip_region::handler::{GeoIpHandler, ProvisionContext, Provisioner, RequestHandler};
//! use geoip_region::initialization::init_pool;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let ctx = ProvisionContext::maxmind(init_pool())?;
//! let settings = GeoIpSettings {
//!     database_path: "GeoLite2-Country.mmdb".into(),
//!     reload_interval: std::time::Duration::from_secs(24 * 60 * 60),
//!     ..Default::default()
//! };
//!
//! let handler = GeoIpHandler::provision(settings, &ctx).await?;
//! let peer = "202.36.75.151:443".parse().ok();
//! let variables = handler.handle(&HeaderMap::new(), peer)?;
//! println!("{:?}", variables.get("geoip.country_code"));
//! # Ok(())
//! # }
//! ```
//!
//! # Requirements
//!
//! Provisioning spawns the refresh loop on the current Tokio runtime; call it
//! from within an async context.

pub mod config;
pub mod error_handling;
pub mod geoip;
pub mod handler;
pub mod initialization;
pub mod resolver;
pub mod server;

// Re-export public API
pub use config::{GeoIpSettings, RefreshConfig};
pub use error_handling::{GeoIpError, InitializationError};
pub use geoip::{InstancePool, SharedState};
pub use handler::{GeoIpHandler, ProvisionContext};
