//! Small response bodies: the script redirect and error pages.

use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};

/// A page that sends the browser to `location` with `window.location.replace`.
///
/// Used instead of a 3xx so the status code can signal "authentication
/// required" to scripts while browsers still follow the redirect.
#[must_use]
pub fn js_redirect(location: &str) -> String {
    format!(
        "\n<script type=\"text/javascript\">\nwindow.location.replace(\"{}\");\n</script>\n",
        escape_js(location)
    )
}

fn escape_js(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '<' => out.push_str("\\u003c"),
            '>' => out.push_str("\\u003e"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            c => out.push(c),
        }
    }
    out
}

/// `"<code> - <text>"`, plus a contact line when configured.
#[must_use]
pub fn error_body(status: StatusCode, text: &str, contact: Option<&str>) -> String {
    let mut body = format!("{} - {text}", status.as_u16());
    if let Some(email) = contact {
        body.push_str("\n\nContact: ");
        body.push_str(email);
    }
    body
}

/// Headers that keep browsers and proxies from caching a response.
#[must_use]
pub fn no_cache_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static("no-cache, no-store, must-revalidate"),
    );
    headers.insert(header::PRAGMA, HeaderValue::from_static("no-cache"));
    headers.insert(header::EXPIRES, HeaderValue::from_static("0"));
    headers
}

/// An uncached HTML page carrying a script redirect.
#[must_use]
pub fn redirect_page(status: StatusCode, location: &str) -> Response {
    (
        status,
        no_cache_headers(),
        [(header::CONTENT_TYPE, "text/html; charset=utf-8")],
        js_redirect(location),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redirect_body_is_exact() {
        assert_eq!(
            js_redirect("https://gate.example.net/launch?next=https%3A%2F%2Fgithub.com%2Ftest%3Fa%3D1"),
            "\n<script type=\"text/javascript\">\nwindow.location.replace(\"https://gate.example.net/launch?next=https%3A%2F%2Fgithub.com%2Ftest%3Fa%3D1\");\n</script>\n"
        );
    }

    #[test]
    fn redirect_target_cannot_break_out() {
        let body = js_redirect("https://x/\");alert(1);</script>");
        assert_eq!(
            body,
            "\n<script type=\"text/javascript\">\nwindow.location.replace(\"https://x/\\\");alert(1);\\u003c/script\\u003e\");\n</script>\n"
        );
        assert_eq!(body.matches("</script>").count(), 1);
    }

    #[test]
    fn error_body_format() {
        assert_eq!(
            error_body(StatusCode::NOT_FOUND, "Not Found", None),
            "404 - Not Found"
        );
        assert_eq!(
            error_body(StatusCode::BAD_REQUEST, "Bad Request", Some("ops@example.net")),
            "400 - Bad Request\n\nContact: ops@example.net"
        );
    }

    #[test]
    fn redirect_page_is_uncached() {
        let response = redirect_page(StatusCode::IM_A_TEAPOT, "https://x/");
        assert_eq!(response.status(), StatusCode::IM_A_TEAPOT);
        assert_eq!(
            response.headers()[header::CACHE_CONTROL],
            "no-cache, no-store, must-revalidate"
        );
    }
}
