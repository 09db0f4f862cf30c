//! Client address extraction and parsing.

use std::net::{IpAddr, SocketAddr};

use axum::http::{HeaderMap, HeaderName};

use crate::error_handling::GeoIpError;

/// Picks the text to resolve for a request.
///
/// A configured trust header wins when present with a non-empty UTF-8 value;
/// of a comma-separated list only the first entry is used. Otherwise the
/// transport peer address is used.
pub fn candidate_address(
    headers: &HeaderMap,
    trust_header: Option<&HeaderName>,
    peer: Option<SocketAddr>,
) -> Option<String> {
    let from_header = trust_header
        .and_then(|name| headers.get(name))
        .and_then(|value| match value.to_str() {
            Ok(text) => Some(text),
            Err(_) => {
                log::debug!("Ignoring non-UTF-8 trusted header value");
                None
            }
        })
        .and_then(|text| text.split(',').next())
        .map(str::trim)
        .filter(|text| !text.is_empty());

    match from_header {
        Some(text) => Some(text.to_string()),
        None => peer.map(|addr| addr.to_string()),
    }
}

/// Removes a `:port` suffix.
///
/// Handles `host:port` and `[v6]:port`; a bare IPv6 address (several colons,
/// no brackets) or a value without a port is returned unchanged, minus any
/// brackets.
pub fn strip_port(candidate: &str) -> &str {
    if let Some(rest) = candidate.strip_prefix('[') {
        return match rest.find(']') {
            Some(end) => &rest[..end],
            None => candidate,
        };
    }
    match candidate.rsplit_once(':') {
        Some((host, _port)) if !host.contains(':') => host,
        _ => candidate,
    }
}

/// Parses a candidate address, with or without a port.
pub fn parse_client_ip(candidate: &str) -> Result<IpAddr, GeoIpError> {
    let candidate = candidate.trim();
    if let Ok(socket) = candidate.parse::<SocketAddr>() {
        return Ok(socket.ip());
    }
    strip_port(candidate)
        .parse::<IpAddr>()
        .map_err(|_| GeoIpError::AddressUnparseable(candidate.to_string()))
}
