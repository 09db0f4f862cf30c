//! Per-request resolution through a provisioned handler.

mod helpers;

use std::net::SocketAddr;
use std::path::Path;

use axum::http::{HeaderMap, HeaderValue};
use geoip_region::config::{GeoIpSettings, COUNTRY_CODE_VARIABLE, OVERRIDE_CODE_ENV};
use geoip_region::handler::{GeoIpHandler, Provisioner, RequestHandler};
use geoip_region::GeoIpError;
use tempfile::TempDir;

use helpers::{test_context, write_database, FakeReader, ScriptedFetcher, NZ_ADDRESS};

const DATABASE: &str = "epoch 1700000000\n\
    202.36.75.151 NZ 2186224\n\
    198.51.100.9 A1 0\n\
    fail 203.0.113.66\n";

async fn handler(path: &Path, trust_header: Option<&str>, override_code: Option<&str>) -> GeoIpHandler {
    let settings = GeoIpSettings {
        database_path: path.to_path_buf(),
        trust_header: trust_header.map(str::to_string),
        override_code: override_code.map(str::to_string),
        ..Default::default()
    };
    let ctx = test_context(FakeReader::new(), ScriptedFetcher::failing());
    GeoIpHandler::provision(settings, &ctx).await.expect("provision")
}

fn peer(text: &str) -> Option<SocketAddr> {
    Some(text.parse().expect("valid socket address"))
}

fn code(handler: &GeoIpHandler, headers: &HeaderMap, peer: Option<SocketAddr>) -> Option<String> {
    handler
        .handle(headers, peer)
        .expect("resolution")
        .get(COUNTRY_CODE_VARIABLE)
        .map(str::to_string)
}

#[tokio::test]
async fn test_missing_database_publishes_sentinel() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let path = temp_dir.path().join("GeoLite2-Country.mmdb");
    let handler = handler(&path, None, None).await;

    let resolved = code(&handler, &HeaderMap::new(), peer("202.36.75.151:443"));
    assert_eq!(resolved.as_deref(), Some("--"));
}

#[tokio::test]
async fn test_missing_database_publishes_override() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let path = temp_dir.path().join("GeoLite2-Country.mmdb");
    let handler = handler(&path, None, Some("AU")).await;

    let resolved = code(&handler, &HeaderMap::new(), peer("202.36.75.151:443"));
    assert_eq!(resolved.as_deref(), Some("AU"));
}

#[tokio::test]
async fn test_peer_address_resolves_known_record() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let path = write_database(temp_dir.path(), "GeoLite2-Country.mmdb", DATABASE);
    let handler = handler(&path, None, Some("AU")).await;

    // A matching record wins over the override
    let resolved = code(&handler, &HeaderMap::new(), peer("202.36.75.151:51234"));
    assert_eq!(resolved.as_deref(), Some("NZ"));
}

#[tokio::test]
async fn test_trusted_header_without_port_is_used_as_host() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let path = write_database(temp_dir.path(), "GeoLite2-Country.mmdb", DATABASE);
    let handler = handler(&path, Some("X-Real-IP"), None).await;

    let mut headers = HeaderMap::new();
    headers.insert("x-real-ip", HeaderValue::from_static(NZ_ADDRESS));
    let resolved = code(&handler, &headers, peer("10.1.2.3:40000"));
    assert_eq!(resolved.as_deref(), Some("NZ"));

    headers.insert("x-real-ip", HeaderValue::from_static("202.36.75.151:8443"));
    let resolved = code(&handler, &headers, peer("10.1.2.3:40000"));
    assert_eq!(resolved.as_deref(), Some("NZ"));
}

#[tokio::test]
async fn test_absent_trusted_header_falls_back_to_peer() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let path = write_database(temp_dir.path(), "GeoLite2-Country.mmdb", DATABASE);
    let handler = handler(&path, Some("X-Real-IP"), None).await;

    let resolved = code(&handler, &HeaderMap::new(), peer("202.36.75.151:443"));
    assert_eq!(resolved.as_deref(), Some("NZ"));
}

#[tokio::test]
async fn test_unparseable_address_skips_lookup() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let path = write_database(temp_dir.path(), "GeoLite2-Country.mmdb", DATABASE);
    let handler = handler(&path, Some("X-Real-IP"), Some("AU")).await;

    let mut headers = HeaderMap::new();
    headers.insert("x-real-ip", HeaderValue::from_static("unknown"));
    let variables = handler.handle(&headers, peer("202.36.75.151:443")).unwrap();
    assert!(variables.is_empty());

    // No address at all behaves the same
    let variables = handler.handle(&HeaderMap::new(), None).unwrap();
    assert!(variables.is_empty());
}

#[tokio::test]
async fn test_no_match_publishes_override_or_empty() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let path = write_database(temp_dir.path(), "GeoLite2-Country.mmdb", DATABASE);

    let plain = handler(&path, None, None).await;
    assert_eq!(code(&plain, &HeaderMap::new(), peer("192.0.2.1:80")).as_deref(), Some(""));

    let with_override = handler(&path, None, Some("AU")).await;
    assert_eq!(
        code(&with_override, &HeaderMap::new(), peer("192.0.2.1:80")).as_deref(),
        Some("AU")
    );
    // An entry without a country id counts as no match
    assert_eq!(
        code(&with_override, &HeaderMap::new(), peer("198.51.100.9:80")).as_deref(),
        Some("AU")
    );
    assert_eq!(
        code(&plain, &HeaderMap::new(), peer("198.51.100.9:80")).as_deref(),
        Some("A1")
    );
}

#[tokio::test]
async fn test_reader_error_propagates() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let path = write_database(temp_dir.path(), "GeoLite2-Country.mmdb", DATABASE);
    let handler = handler(&path, None, Some("AU")).await;

    let result = handler.handle(&HeaderMap::new(), peer("203.0.113.66:80"));
    assert!(matches!(result, Err(GeoIpError::LookupFailed { .. })));
}

#[tokio::test]
async fn test_ipv6_peer_with_port() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let path = write_database(
        temp_dir.path(),
        "GeoLite2-Country.mmdb",
        "2400:bd00::1 NZ 2186224\n",
    );
    let handler = handler(&path, None, None).await;

    let resolved = code(&handler, &HeaderMap::new(), peer("[2400:bd00::1]:3000"));
    assert_eq!(resolved.as_deref(), Some("NZ"));
}

#[tokio::test]
async fn test_environment_override_code() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let path = temp_dir.path().join("GeoLite2-Country.mmdb");
    let ctx = test_context(FakeReader::new(), ScriptedFetcher::failing())
        .with_env(|name| (name == OVERRIDE_CODE_ENV).then(|| "NZ".to_string()));

    let settings = GeoIpSettings {
        database_path: path,
        override_code: Some("AU".to_string()),
        ..Default::default()
    };
    let handler = GeoIpHandler::provision(settings, &ctx).await.unwrap();

    assert_eq!(handler.settings().override_code.as_deref(), Some("NZ"));
    let resolved = code(&handler, &HeaderMap::new(), peer("202.36.75.151:443"));
    assert_eq!(resolved.as_deref(), Some("NZ"));
}
