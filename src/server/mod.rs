//! HTTP host adapter.
//!
//! Provides two endpoints:
//! - `/status` - JSON status of the database state and refresh counters
//! - everything else - the configured body template with request variables
//!   substituted (e.g. `Hello from {geoip.country_code}`)
//!
//! Every request passes through the GeoIP middleware first.

mod handlers;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::routing::get;
use axum::{middleware, Router};

use crate::handler::GeoIpHandler;
use handlers::{geoip_middleware, status_handler, template_handler};

#[derive(Clone)]
pub(crate) struct AppState {
    handler: Arc<GeoIpHandler>,
    body_template: Arc<str>,
}

/// Builds the router for one handler.
pub fn router(handler: Arc<GeoIpHandler>, body_template: &str) -> Router {
    let state = AppState {
        handler,
        body_template: Arc::from(body_template),
    };

    Router::new()
        .route("/status", get(status_handler))
        .fallback(template_handler)
        .layer(middleware::from_fn_with_state(state.clone(), geoip_middleware))
        .with_state(state)
}

/// Serves `app` on `listen` until Ctrl-C.
///
/// Connections carry their peer address, which the middleware uses when no
/// trusted header applies.
pub async fn serve(listen: &str, app: Router) -> Result<(), anyhow::Error> {
    let listener = tokio::net::TcpListener::bind(listen)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to bind GeoIP server to {}: {}", listen, e))?;

    let local = listener.local_addr()?;
    log::info!("GeoIP server listening on http://{}/", local);
    log::info!("  - Status: http://{}/status", local);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .map_err(|e| anyhow::anyhow!("GeoIP server error: {}", e))?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        log::warn!("Cannot listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
    log::info!("Shutting down GeoIP server");
}
