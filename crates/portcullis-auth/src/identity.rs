//! The identity provider seam.

use async_trait::async_trait;

use crate::error::Result;

/// An external identity provider driving the authorization-code flow.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// The URL the browser is sent to in order to log in. `state` comes back
    /// unchanged on the callback.
    fn authorization_url(&self, state: &str) -> String;

    /// Exchange an authorization code for the verified user identity.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Exchange` with a client-presentable message if the
    /// code is rejected or the provider cannot be reached.
    async fn exchange(&self, code: &str, state: &str) -> Result<String>;
}

/// A mock identity provider for testing.
///
/// Codes of the form `user:<identity>` exchange to `<identity>`; anything
/// else fails the way a provider rejecting the code would.
#[cfg(any(test, feature = "test-utils"))]
#[derive(Debug, Clone)]
pub struct MockIdentityProvider {
    /// Base of the authorization URL.
    pub auth_url: String,
}

#[cfg(any(test, feature = "test-utils"))]
impl Default for MockIdentityProvider {
    fn default() -> Self {
        Self {
            auth_url: "https://idp.example.com/authorize".to_string(),
        }
    }
}

#[cfg(any(test, feature = "test-utils"))]
#[async_trait]
impl IdentityProvider for MockIdentityProvider {
    fn authorization_url(&self, state: &str) -> String {
        format!("{}?state={state}", self.auth_url)
    }

    async fn exchange(&self, code: &str, _state: &str) -> Result<String> {
        code.strip_prefix("user:")
            .filter(|user| !user.is_empty())
            .map(ToString::to_string)
            .ok_or_else(|| {
                crate::AuthError::Exchange("oauth2: invalid authorization code".to_string())
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_exchange() {
        let idp = MockIdentityProvider::default();
        assert_eq!(
            idp.exchange("user:cloud@user.com", "s").await.unwrap(),
            "cloud@user.com"
        );

        let err = idp.exchange("bogus", "s").await.unwrap_err();
        assert_eq!(err.to_string(), "oauth2: invalid authorization code");
        assert_eq!(err.http_status_code(), 401);
    }

    #[test]
    fn mock_authorization_url() {
        let idp = MockIdentityProvider::default();
        assert_eq!(
            idp.authorization_url("abc"),
            "https://idp.example.com/authorize?state=abc"
        );
    }
}
