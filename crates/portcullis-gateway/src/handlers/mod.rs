//! HTTP request handlers.
//!
//! [`gate`] is the middleware every request passes; the others serve the
//! gateway's own host, except [`docker`], which serves registry hosts.

pub mod docker;
pub mod federate;
pub mod gate;
pub mod health;
pub mod login;

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use portcullis_auth::IdentityProvider;

use crate::pages;
use crate::state::GatewayState;

/// Fallback for unknown paths on the gateway's own host.
pub async fn not_found<P>(State(state): State<Arc<GatewayState<P>>>) -> Response
where
    P: IdentityProvider + 'static,
{
    (
        StatusCode::NOT_FOUND,
        pages::error_body(StatusCode::NOT_FOUND, "Not Found", state.config.contact()),
    )
        .into_response()
}
