//! Gateway error types and responses.
//!
//! Request-level failures are answered with fixed, minimal bodies: either a
//! `"<code> - <text>"` error page or, where clients depend on it, the raw
//! error text.

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use portcullis_auth::{AuthError, CodecError};
use portcullis_core::CoreError;

use crate::pages;
use crate::proxy::ProxyError;

/// A failed request, rendered as a plain-text response.
#[derive(Debug, Error)]
pub enum GateError {
    /// A required parameter or cookie is missing.
    #[error("bad request")]
    BadRequest,

    /// The OIDC callback state does not match the session.
    #[error("Invalid Browser State")]
    InvalidBrowserState,

    /// The identity provider rejected the authorization code.
    #[error("{0}")]
    Exchange(String),

    /// A sealed token or cookie could not be opened or sealed.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// The identity provider redirected back with an error.
    #[error("{text}")]
    Provider {
        /// Mapped status.
        status: StatusCode,
        /// Status text or raw error description.
        text: String,
        /// Answer with the text alone instead of an error page.
        plain: bool,
    },

    /// No proxy is configured or learnable for the host.
    #[error("{0}")]
    Unconfigured(String),

    /// The upstream answered with something that could not be decoded.
    #[error("malformed upstream response")]
    UpstreamMalformed,

    /// The backend could not be reached.
    #[error("bad gateway: {0}")]
    BadGateway(String),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl GateError {
    /// Map an OIDC `error` parameter to a status and its text.
    #[must_use]
    pub fn from_provider_code(code: &str) -> (StatusCode, &'static str) {
        let status = match code {
            "invalid_request" => StatusCode::BAD_REQUEST,
            "access_denied" => StatusCode::FORBIDDEN,
            "invalid_resource" => StatusCode::NOT_FOUND,
            "unsupported_response_type" => StatusCode::NOT_IMPLEMENTED,
            "temporarily_unavailable" => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, status.canonical_reason().unwrap_or("Error"))
    }

    /// Get the HTTP status code for this error.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest => StatusCode::BAD_REQUEST,
            Self::InvalidBrowserState => StatusCode::FORBIDDEN,
            Self::Exchange(_) => StatusCode::UNAUTHORIZED,
            Self::Codec(CodecError::NoCodecs | CodecError::Encode(_)) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            Self::Codec(_) => StatusCode::FORBIDDEN,
            Self::Provider { status, .. } => *status,
            Self::Unconfigured(_) => StatusCode::NOT_FOUND,
            Self::UpstreamMalformed | Self::BadGateway(_) => StatusCode::BAD_GATEWAY,
        }
    }

    /// Get the error code string for this error.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::BadRequest => "bad_request",
            Self::InvalidBrowserState => "invalid_state",
            Self::Exchange(_) => "exchange_failed",
            Self::Codec(_) => "codec",
            Self::Provider { .. } => "provider_error",
            Self::Unconfigured(_) => "unconfigured",
            Self::UpstreamMalformed => "upstream_malformed",
            Self::BadGateway(_) => "bad_gateway",
            Self::Internal(_) => "internal_error",
        }
    }

    /// Render the error, appending `contact` to error pages.
    #[must_use]
    pub fn render(self, contact: Option<&str>) -> Response {
        let status = self.status_code();
        let body = match &self {
            Self::BadRequest => pages::error_body(status, "Bad Request", contact),
            Self::Provider {
                text, plain: false, ..
            } => pages::error_body(status, text, contact),
            Self::Unconfigured(message) => pages::error_body(status, message, contact),
            Self::BadGateway(detail) => {
                tracing::warn!(error = %detail, "Backend request failed");
                pages::error_body(status, "Bad Gateway", contact)
            }
            Self::Internal(detail) => {
                tracing::error!(error = %detail, "Internal error");
                pages::error_body(status, "Internal Server Error", contact)
            }
            Self::UpstreamMalformed => String::new(),
            Self::InvalidBrowserState
            | Self::Exchange(_)
            | Self::Codec(_)
            | Self::Provider { plain: true, .. } => self.to_string(),
        };

        let mut response = (status, body).into_response();
        response.headers_mut().insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/plain; charset=utf-8"),
        );
        response
    }
}

impl IntoResponse for GateError {
    fn into_response(self) -> Response {
        self.render(None)
    }
}

impl From<AuthError> for GateError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::Exchange(msg) => Self::Exchange(msg),
            AuthError::Codec(codec) => Self::Codec(codec),
            other => Self::Internal(other.to_string()),
        }
    }
}

impl From<ProxyError> for GateError {
    fn from(err: ProxyError) -> Self {
        match err {
            ProxyError::Transport(msg) => Self::BadGateway(msg),
            other => Self::Internal(other.to_string()),
        }
    }
}

/// Errors raised while setting up or refreshing the gateway.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Rewrite rules, allowlist or site registry failure.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Key or identity provider failure.
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// Proxy construction failure.
    #[error(transparent)]
    Proxy(#[from] ProxyError),

    /// A setting is unusable.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}
