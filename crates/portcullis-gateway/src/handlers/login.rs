//! Login endpoints on the gateway's own host.
//!
//! - `GET /launch?next=<url>` starts a login
//! - `GET /oidc` is the identity provider callback
//! - `GET /logout` drops the session cookie

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum_extra::extract::CookieJar;
use serde::Deserialize;

use portcullis_auth::{IdentityProvider, Session};

use crate::cookies;
use crate::error::GateError;
use crate::pages;
use crate::state::GatewayState;

/// Query parameters of `/launch`.
#[derive(Debug, Default, Deserialize)]
pub struct LaunchParams {
    /// Where to send the browser once logged in.
    pub next: Option<String>,
}

/// Query parameters of the `/oidc` callback.
#[derive(Debug, Default, Deserialize)]
pub struct CallbackParams {
    /// Authorization code.
    pub code: Option<String>,
    /// Echo of the state sent with the authorization request.
    pub state: Option<String>,
    /// Provider error code.
    pub error: Option<String>,
    /// Provider error description.
    pub error_description: Option<String>,
}

/// Start a login.
///
/// Stores a fresh CSRF state and the destination in the session cookie and
/// sends the browser to the identity provider.
pub async fn launch<P>(
    State(state): State<Arc<GatewayState<P>>>,
    Query(params): Query<LaunchParams>,
) -> Response
where
    P: IdentityProvider + 'static,
{
    start(&state, params.next.filter(|next| !next.is_empty()))
        .unwrap_or_else(|e| e.render(state.config.contact()))
}

fn start<P: IdentityProvider>(
    state: &GatewayState<P>,
    next: Option<String>,
) -> Result<Response, GateError> {
    let session = Session::pending(next)?;
    let Some(csrf) = session.state.as_deref() else {
        return Err(GateError::Internal("pending session without state".to_string()));
    };
    let location = state.idp.authorization_url(csrf);
    let value = state.sessions.encode(&session)?;

    let jar = CookieJar::new().add(cookies::session_cookie(state.sessions.config(), value));
    Ok((jar, pages::redirect_page(StatusCode::OK, &location)).into_response())
}

/// Identity provider callback.
pub async fn callback<P>(
    State(state): State<Arc<GatewayState<P>>>,
    Query(params): Query<CallbackParams>,
    headers: HeaderMap,
) -> Response
where
    P: IdentityProvider + 'static,
{
    finish(&state, params, &headers)
        .await
        .unwrap_or_else(|e| e.render(state.config.contact()))
}

async fn finish<P: IdentityProvider>(
    state: &GatewayState<P>,
    params: CallbackParams,
    headers: &HeaderMap,
) -> Result<Response, GateError> {
    if let Some(code) = params.error {
        let (status, text) = GateError::from_provider_code(&code);
        tracing::info!(error = %code, status = %status, "Identity provider returned an error");
        let plain = state.config.error_plain;
        let text = if plain {
            params.error_description.unwrap_or_default()
        } else {
            text.to_string()
        };
        return Err(GateError::Provider { status, text, plain });
    }

    let Some(query_state) = params.state.filter(|s| !s.is_empty()) else {
        return Err(GateError::BadRequest);
    };
    let Some(mut session) = cookies::load_session(&state.sessions, headers) else {
        return Err(GateError::BadRequest);
    };
    if session.state.as_deref() != Some(query_state.as_str()) {
        tracing::info!("Login callback state does not match the session");
        return Err(GateError::InvalidBrowserState);
    }

    let code = params.code.unwrap_or_default();
    let user = state.idp.exchange(&code, &query_state).await?;
    tracing::info!(user = %user, "User logged in");

    session.authenticate(user);
    let value = state.sessions.encode(&session)?;
    let location = session
        .next
        .filter(|next| !next.is_empty())
        .unwrap_or_else(|| format!("https://{}/", state.config.host));

    let jar = CookieJar::new().add(cookies::session_cookie(state.sessions.config(), value));
    Ok((
        StatusCode::FOUND,
        jar,
        pages::no_cache_headers(),
        [(header::LOCATION, location)],
    )
        .into_response())
}

/// Drop the session cookie.
pub async fn logout<P>(State(state): State<Arc<GatewayState<P>>>) -> Response
where
    P: IdentityProvider + 'static,
{
    let jar = CookieJar::new().add(cookies::expired_cookie(state.sessions.config()));
    (StatusCode::OK, jar, pages::no_cache_headers()).into_response()
}
