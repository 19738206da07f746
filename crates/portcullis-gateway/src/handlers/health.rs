//! Health check endpoint.
//!
//! Answered on every host, before the gate, so load balancers can probe
//! any name the gateway serves.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use portcullis_auth::IdentityProvider;

use crate::state::GatewayState;

/// Health check handler.
///
/// Returns the configured reply with status 200.
///
/// # Example
///
/// ```text
/// GET /healthz/ping
///
/// Response: 200 OK
/// ok
/// ```
pub fn health<P: IdentityProvider>(state: &GatewayState<P>) -> Response {
    (StatusCode::OK, state.config.health_reply.clone()).into_response()
}
