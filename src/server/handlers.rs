//! Request handlers of the host adapter.

use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Json, Response},
};

use super::AppState;
use crate::geoip::StatusReport;
use crate::handler::RequestHandler;
use crate::resolver::Variables;

/// Resolves the request and stores its [`Variables`] in the extensions.
///
/// A lookup failure answers 500; an unusable address passes through with
/// empty variables.
pub(crate) async fn geoip_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);

    match state.handler.handle(request.headers(), peer) {
        Ok(variables) => {
            request.extensions_mut().insert(variables);
            next.run(request).await
        }
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, format!("{e}\n")).into_response(),
    }
}

/// Answers with the body template, placeholders substituted.
pub(crate) async fn template_handler(State(state): State<AppState>, request: Request) -> String {
    request
        .extensions()
        .get::<Variables>()
        .cloned()
        .unwrap_or_default()
        .render(&state.body_template)
}

/// JSON status of the shared database state.
pub(crate) async fn status_handler(State(state): State<AppState>) -> Json<StatusReport> {
    Json(state.handler.state().status())
}
