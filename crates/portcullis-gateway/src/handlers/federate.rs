//! Federation handoff endpoints.
//!
//! `/federate` turns a sealed callback URL into a redirect carrying a sealed
//! user; `/federate/verify` opens such a token.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::{header, HeaderMap, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;

use portcullis_auth::{append_token, IdentityProvider};

use super::gate;
use crate::cookies;
use crate::error::GateError;
use crate::pages;
use crate::state::GatewayState;

/// Query parameters of `/federate`.
#[derive(Debug, Default, Deserialize)]
pub struct FederateParams {
    /// Access token sealing the callback URL.
    pub next: Option<String>,
}

/// Query parameters of `/federate/verify`.
#[derive(Debug, Default, Deserialize)]
pub struct VerifyParams {
    /// Secret token sealing the user.
    pub token: Option<String>,
}

/// Hand the current login to another gateway.
pub async fn federate<P>(
    State(state): State<Arc<GatewayState<P>>>,
    Query(params): Query<FederateParams>,
    uri: Uri,
    headers: HeaderMap,
) -> Response
where
    P: IdentityProvider + 'static,
{
    handoff(&state, params, &uri, &headers).unwrap_or_else(|e| e.render(state.config.contact()))
}

fn handoff<P: IdentityProvider>(
    state: &GatewayState<P>,
    params: FederateParams,
    uri: &Uri,
    headers: &HeaderMap,
) -> Result<Response, GateError> {
    let target = state
        .federation
        .decode_access(params.next.as_deref().unwrap_or_default())?;

    let user = cookies::load_session(&state.sessions, headers)
        .and_then(|session| session.user().map(ToString::to_string));
    let Some(user) = user else {
        return Ok(gate::unauthenticated(state, &state.config.host, uri, headers));
    };

    let token = state.federation.encode_secret(&user)?;
    tracing::info!(user = %user, "Federated login handed off");

    Ok((
        StatusCode::FOUND,
        pages::no_cache_headers(),
        [(header::LOCATION, append_token(&target, &token))],
    )
        .into_response())
}

/// Open a secret token and answer with the user it carries.
pub async fn verify<P>(
    State(state): State<Arc<GatewayState<P>>>,
    Query(params): Query<VerifyParams>,
) -> Response
where
    P: IdentityProvider + 'static,
{
    match state
        .federation
        .decode_secret(params.token.as_deref().unwrap_or_default())
    {
        Ok(user) => (StatusCode::OK, pages::no_cache_headers(), user).into_response(),
        Err(e) => GateError::from(e).render(state.config.contact()),
    }
}
