//! The authentication gate.
//!
//! Every request passes through [`route_by_host`]. Requests for the gateway's
//! own host continue to its routes; everything else is a proxied request and
//! goes through, in order:
//!
//! 1. the Docker registry gateway, for registry hosts
//! 2. the strict-mode check of the rewrite engine
//! 3. the allowlist, which dispatches without a user
//! 4. a basic-auth user token, which dispatches with the identity header
//! 5. the session cookie, which dispatches with the identity header
//! 6. otherwise, the login redirect

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::{header, HeaderMap, HeaderValue, Uri};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use url::form_urlencoded;

use portcullis_auth::{IdentityProvider, Session};
use portcullis_core::{strip_port, Allowlist};

use super::health;
use crate::cookies;
use crate::error::GateError;
use crate::pages;
use crate::proxy::ProxyError;
use crate::state::GatewayState;

/// Host-based routing middleware.
pub async fn route_by_host<P>(
    State(state): State<Arc<GatewayState<P>>>,
    req: Request,
    next: Next,
) -> Response
where
    P: IdentityProvider + 'static,
{
    if req.uri().path() == state.config.health_path {
        return health::health(&state);
    }

    let host = request_host(&req);
    if strip_port(&host) == state.config.host {
        return next.run(req).await;
    }

    handle(&state, &host, req).await
}

/// Gate and dispatch a request for a proxied host.
pub async fn handle<P>(state: &GatewayState<P>, host: &str, mut req: Request) -> Response
where
    P: IdentityProvider,
{
    let contact = state.config.contact();
    req.headers_mut().remove(&state.user_header);

    if let Some(upstream) = state.docker.upstream(host, req.uri().path()) {
        return state
            .docker
            .handle(upstream, host, state.sessions.codecs(), req)
            .await
            .unwrap_or_else(|e| e.render(contact));
    }

    if !state.rewrite.allowed(strip_port(host)) {
        tracing::debug!(host, "Host rejected by strict rewrite rules");
        return GateError::Unconfigured(state.config.not_found_message.clone()).render(contact);
    }

    if state.allowlist.is_allowed(host) {
        return dispatch(state, host, req).await;
    }

    let token_user = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| state.tokens.authenticate(v))
        .map(ToString::to_string);
    if let Some(user) = token_user {
        req.headers_mut().remove(header::AUTHORIZATION);
        tracing::debug!(host, user = %user, "Admitted by user token");
        return dispatch_as(state, host, &user, req).await;
    }

    let user = cookies::load_session(&state.sessions, req.headers())
        .filter(Session::is_authenticated)
        .and_then(|session| session.user);
    let Some(user) = user else {
        return unauthenticated(state, host, req.uri(), req.headers());
    };

    dispatch_as(state, host, &user, req).await
}

/// Dispatch with the identity header set to `user`.
async fn dispatch_as<P>(
    state: &GatewayState<P>,
    host: &str,
    user: &str,
    mut req: Request,
) -> Response
where
    P: IdentityProvider,
{
    match HeaderValue::from_str(user) {
        Ok(value) => {
            req.headers_mut().insert(state.user_header.clone(), value);
        }
        Err(_) => {
            tracing::warn!(host, "User is not a valid header value");
            return GateError::BadRequest.render(state.config.contact());
        }
    }

    dispatch(state, host, req).await
}

/// The response to a request that needs a login.
///
/// Scripts (`X-Requested-With: XMLHttpRequest`) get the bare status; browsers
/// get a page that sends them to `/launch` with the original URL as `next`.
pub fn unauthenticated<P>(
    state: &GatewayState<P>,
    host: &str,
    uri: &Uri,
    headers: &HeaderMap,
) -> Response
where
    P: IdentityProvider,
{
    let status = state.config.auth_required_status();
    if is_xhr(headers) {
        return (status, pages::no_cache_headers()).into_response();
    }

    let path = uri.path_and_query().map_or("/", |pq| pq.as_str());
    let original = format!("https://{host}{path}");
    let next: String = form_urlencoded::byte_serialize(original.as_bytes()).collect();
    let launch = format!("https://{}/launch?next={next}", state.config.host);

    tracing::debug!(host, "Redirecting to login");
    pages::redirect_page(status, &launch)
}

async fn dispatch<P>(state: &GatewayState<P>, host: &str, req: Request) -> Response
where
    P: IdentityProvider,
{
    let result = state.rewrite.resolve_authority(host);
    match state.dispatch.dispatch(req, &result).await {
        Ok(response) => response,
        Err(ProxyError::Unconfigured(key)) => {
            tracing::debug!(host, backend = %key, "No backend for host");
            GateError::Unconfigured(state.config.not_found_message.clone())
                .render(state.config.contact())
        }
        Err(e) => GateError::from(e).render(state.config.contact()),
    }
}

/// The authority the request was made to: `Host`, or the URI authority for
/// HTTP/2 requests.
fn request_host(req: &Request) -> String {
    req.headers()
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .map(ToString::to_string)
        .or_else(|| req.uri().authority().map(ToString::to_string))
        .unwrap_or_default()
}

fn is_xhr(headers: &HeaderMap) -> bool {
    headers
        .get("x-requested-with")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.eq_ignore_ascii_case("XMLHttpRequest"))
}

#[cfg(test)]
mod tests {
    use axum::body::Body;

    use super::*;

    #[test]
    fn host_from_header_or_authority() {
        let req = Request::builder()
            .uri("/x")
            .header(header::HOST, "app.example.net:8443")
            .body(Body::empty())
            .unwrap();
        assert_eq!(request_host(&req), "app.example.net:8443");

        let req = Request::builder()
            .uri("https://h2.example.net/x")
            .body(Body::empty())
            .unwrap();
        assert_eq!(request_host(&req), "h2.example.net");

        let req = Request::builder().uri("/x").body(Body::empty()).unwrap();
        assert_eq!(request_host(&req), "");
    }

    #[test]
    fn xhr_detection() {
        let mut headers = HeaderMap::new();
        assert!(!is_xhr(&headers));
        headers.insert("x-requested-with", HeaderValue::from_static("XMLHttpRequest"));
        assert!(is_xhr(&headers));
    }
}
