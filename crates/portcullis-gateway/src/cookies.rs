//! Session cookie construction.

use axum::http::HeaderMap;
use axum_extra::extract::cookie::{Cookie, SameSite};
use axum_extra::extract::CookieJar;

use portcullis_auth::{Session, SessionConfig, SessionStore};

/// Build the `Set-Cookie` value for a sealed session.
#[must_use]
pub fn session_cookie(config: &SessionConfig, value: String) -> Cookie<'static> {
    Cookie::build((config.cookie_name.clone(), value))
        .domain(config.cookie_domain.clone())
        .path("/")
        .http_only(true)
        .secure(true)
        .same_site(SameSite::None)
        .max_age(time::Duration::seconds(config.max_age_seconds))
        .build()
}

/// A cookie that deletes the session.
#[must_use]
pub fn expired_cookie(config: &SessionConfig) -> Cookie<'static> {
    Cookie::build((config.cookie_name.clone(), ""))
        .domain(config.cookie_domain.clone())
        .path("/")
        .http_only(true)
        .secure(true)
        .same_site(SameSite::None)
        .max_age(time::Duration::ZERO)
        .build()
}

/// Read the session from request headers, if any valid one is present.
#[must_use]
pub fn load_session(store: &SessionStore, headers: &HeaderMap) -> Option<Session> {
    let jar = CookieJar::from_headers(headers);
    store.load(jar.get(&store.config().cookie_name).map(Cookie::value))
}

#[cfg(test)]
mod tests {
    use axum::http::{header, HeaderValue};
    use portcullis_auth::{CodecSet, SigningKey};

    use super::*;

    fn store() -> SessionStore {
        let key = SigningKey::generate().unwrap();
        SessionStore::new(
            SessionConfig::default(),
            CodecSet::from_key(&key, 3600).unwrap(),
        )
    }

    #[test]
    fn cookie_attributes() {
        let cookie = session_cookie(&SessionConfig::default(), "v".to_string());
        let rendered = cookie.to_string();
        assert!(rendered.starts_with("portcullis=v"));
        assert!(rendered.contains("HttpOnly"));
        assert!(rendered.contains("Secure"));
        assert!(rendered.contains("SameSite=None"));
        assert!(rendered.contains("Domain="));
        assert!(rendered.contains("example.net"));
        assert!(rendered.contains("Max-Age=21600"));
    }

    #[test]
    fn expired_cookie_has_zero_age() {
        let rendered = expired_cookie(&SessionConfig::default()).to_string();
        assert!(rendered.contains("Max-Age=0"));
    }

    #[test]
    fn load_from_headers() {
        let store = store();
        let mut session = Session::default();
        session.authenticate("cloud@user.com");
        let value = store.encode(&session).unwrap();

        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_str(&format!("other=1; portcullis={value}")).unwrap(),
        );
        assert_eq!(
            load_session(&store, &headers).and_then(|s| s.user),
            Some("cloud@user.com".to_string())
        );
        assert!(load_session(&store, &HeaderMap::new()).is_none());
    }
}
