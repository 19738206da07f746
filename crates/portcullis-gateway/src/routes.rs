//! Router configuration.
//!
//! This module sets up the Axum router with all routes and middleware.

use std::sync::Arc;

use axum::middleware;
use axum::routing::get;
use axum::Router;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use portcullis_auth::IdentityProvider;

use crate::handlers::{federate, gate, login, not_found};
use crate::state::GatewayState;

/// Create the gateway router with all routes and middleware.
///
/// # Routes
///
/// ## Any host
/// - `GET <health path>` - Health check
///
/// ## Gateway host
/// - `GET /launch?next=` - Start a login
/// - `GET /oidc` - Identity provider callback
/// - `GET /logout` - Drop the session
/// - `GET /federate?next=` - Hand the login to another gateway
/// - `GET /federate/verify?token=` - Open a federation token
///
/// ## Registry hosts
/// - `/v2/`, `/v2/auth`, `/v2/<resource>` - Docker token gateway
///
/// ## Every other host
/// - Authentication gate, then dispatch to the backend
pub fn create_router<P>(state: GatewayState<P>) -> Router
where
    P: IdentityProvider + 'static,
{
    let request_timeout = state.config.request_timeout();
    let state = Arc::new(state);

    Router::new()
        .route("/launch", get(login::launch::<P>))
        .route("/oidc", get(login::callback::<P>))
        .route("/logout", get(login::logout::<P>))
        .route("/federate", get(federate::federate::<P>))
        .route("/federate/verify", get(federate::verify::<P>))
        .fallback(not_found::<P>)
        // Host routing runs for every request, matched or not
        .layer(middleware::from_fn_with_state(
            Arc::clone(&state),
            gate::route_by_host::<P>,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(request_timeout))
        .with_state(state)
}
