//! Handlers sharing one database state per path through the instance pool.

mod helpers;

use std::sync::Arc;
use std::time::Duration;

use geoip_region::config::GeoIpSettings;
use geoip_region::handler::{GeoIpHandler, Provisioner};
use tempfile::TempDir;

use helpers::{test_context, write_database, FakeReader, ScriptedFetcher, NZ_DATABASE};

fn settings_for(path: &std::path::Path) -> GeoIpSettings {
    GeoIpSettings {
        database_path: path.to_path_buf(),
        reload_interval: Duration::from_secs(3600),
        ..Default::default()
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_provision_shares_one_state() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let path = write_database(temp_dir.path(), "GeoLite2-Country.mmdb", NZ_DATABASE);
    let reader = FakeReader::new();
    let counters = reader.counters.clone();
    let ctx = Arc::new(test_context(reader, ScriptedFetcher::failing()));

    let mut tasks = Vec::new();
    for _ in 0..2 {
        let ctx = Arc::clone(&ctx);
        let settings = settings_for(&path);
        tasks.push(tokio::spawn(async move {
            GeoIpHandler::provision(settings, &ctx).await
        }));
    }
    let mut handlers = Vec::new();
    for task in tasks {
        handlers.push(task.await.unwrap().expect("provision"));
    }

    // One provision ran: one open, one scheduler
    assert_eq!(counters.opens(), 1);
    assert!(Arc::ptr_eq(handlers[0].state(), handlers[1].state()));
    assert!(handlers[0].state().has_scheduler());
    let key = path.to_string_lossy().into_owned();
    assert_eq!(ctx.pool.ref_count(&key), 2);

    let state = Arc::clone(handlers[0].state());
    let second = handlers.pop().unwrap();
    let mut first = handlers.pop().unwrap();

    first.cleanup();
    // Cleanup is idempotent; Drop after cleanup does not release again
    first.cleanup();
    drop(first);
    assert_eq!(ctx.pool.ref_count(&key), 1);
    assert!(!state.is_closed());
    assert_eq!(counters.closes(), 0);

    drop(second);
    assert!(state.is_closed());
    assert!(ctx.pool.is_empty());
    assert_eq!(counters.closes(), 1);
}

#[tokio::test]
async fn test_distinct_paths_get_distinct_states() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let country = write_database(temp_dir.path(), "GeoLite2-Country.mmdb", NZ_DATABASE);
    let city = write_database(temp_dir.path(), "GeoLite2-City.mmdb", NZ_DATABASE);
    let reader = FakeReader::new();
    let counters = reader.counters.clone();
    let ctx = test_context(reader, ScriptedFetcher::failing());

    let a = GeoIpHandler::provision(settings_for(&country), &ctx).await.unwrap();
    let b = GeoIpHandler::provision(settings_for(&city), &ctx).await.unwrap();

    assert!(!Arc::ptr_eq(a.state(), b.state()));
    assert_eq!(counters.opens(), 2);
    assert_eq!(ctx.pool.len(), 2);

    drop(a);
    assert!(!b.state().is_closed());
    assert_eq!(ctx.pool.len(), 1);
}

#[tokio::test]
async fn test_failed_provision_leaves_pool_empty() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let path = write_database(temp_dir.path(), "GeoLite2-Country.mmdb", "not a database\n");
    let ctx = test_context(FakeReader::new(), ScriptedFetcher::failing());

    let result = GeoIpHandler::provision(settings_for(&path), &ctx).await;
    assert!(result.is_err());
    assert!(ctx.pool.is_empty());

    // Fixing the file makes the next provision succeed
    std::fs::write(&path, NZ_DATABASE).unwrap();
    let handler = GeoIpHandler::provision(settings_for(&path), &ctx).await.unwrap();
    assert!(handler.state().status().database.is_loaded());
}

#[tokio::test]
async fn test_invalid_trust_header_is_config_error() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let path = write_database(temp_dir.path(), "GeoLite2-Country.mmdb", NZ_DATABASE);
    let ctx = test_context(FakeReader::new(), ScriptedFetcher::failing());

    let settings = GeoIpSettings {
        trust_header: Some("X Real IP".to_string()),
        ..settings_for(&path)
    };
    let result = GeoIpHandler::provision(settings, &ctx).await;
    assert!(matches!(result, Err(geoip_region::GeoIpError::ConfigInvalid(_))));
    assert!(ctx.pool.is_empty());
}
