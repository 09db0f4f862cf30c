//! Per-request country resolution.
//!
//! This module provides:
//! - Candidate address selection (trusted header or transport peer)
//! - Port stripping and address parsing
//! - The request-context [`Variables`] the result is published into

mod address;
mod variables;

use std::net::SocketAddr;

use axum::http::{HeaderMap, HeaderName};

pub use address::{candidate_address, parse_client_ip, strip_port};
pub use variables::Variables;

use crate::config::SENTINEL_COUNTRY_CODE;
use crate::error_handling::GeoIpError;
use crate::geoip::{Lookup, SharedState};

/// What a request resolved to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// No usable address; the request proceeds without a country code.
    Skipped,
    /// The country code to publish.
    Published(String),
}

/// Resolves requests against a shared database state.
#[derive(Debug, Clone, Default)]
pub struct RequestResolver {
    trust_header: Option<HeaderName>,
    override_code: Option<String>,
}

impl RequestResolver {
    pub fn new(trust_header: Option<HeaderName>, override_code: Option<String>) -> Self {
        RequestResolver {
            trust_header,
            override_code,
        }
    }

    /// Resolves the country code for one request.
    ///
    /// Without a loaded database the sentinel `--` is published, or the
    /// override code when one is configured. A loaded database without a
    /// matching country also yields the override when configured. Only a
    /// reader error is returned as an error.
    pub fn resolve(
        &self,
        state: &SharedState,
        headers: &HeaderMap,
        peer: Option<SocketAddr>,
    ) -> Result<Resolution, GeoIpError> {
        let Some(candidate) = candidate_address(headers, self.trust_header.as_ref(), peer) else {
            log::debug!("No client address available, skipping GeoIP lookup");
            return Ok(Resolution::Skipped);
        };

        let address = match parse_client_ip(&candidate) {
            Ok(address) => address,
            Err(e) => {
                log::debug!("{}, skipping GeoIP lookup", e);
                return Ok(Resolution::Skipped);
            }
        };

        let code = match state.lookup(address)? {
            Lookup::NoDatabase => {
                log::debug!("No GeoIP database loaded, publishing fallback for {}", address);
                self.fallback(SENTINEL_COUNTRY_CODE)
            }
            Lookup::NotFound => self.fallback(""),
            Lookup::Found(record) if !record.has_country() => self.fallback(&record.country_code),
            Lookup::Found(record) => record.country_code,
        };

        log::debug!("Resolved {} to {:?}", address, code);
        Ok(Resolution::Published(code))
    }

    fn fallback(&self, default: &str) -> String {
        self.override_code
            .clone()
            .unwrap_or_else(|| default.to_string())
    }
}
