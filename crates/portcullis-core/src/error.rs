//! Common error types for portcullis.
//!
//! Configuration problems (bad CSV, bad source URL) and refresh problems
//! (fetch or decode failures) share one enum so callers can decide whether
//! an error is fatal at startup or merely logged during a refresh.

use thiserror::Error;

/// A result type using `CoreError`.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Errors raised by the rewrite engine and the document sources.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A CSV rule element did not contain `=`.
    #[error("missing equals assignment in: {0}")]
    MissingAssignment(String),

    /// A document source URL could not be used.
    #[error("invalid source URL {url}: {reason}")]
    InvalidSource {
        /// The offending URL.
        url: String,
        /// Why it was rejected.
        reason: String,
    },

    /// Fetching a document failed.
    #[error("fetch failed: {0}")]
    Fetch(String),

    /// A fetched document was not the expected JSON shape.
    #[error("decode failed: {0}")]
    Decode(String),
}

impl CoreError {
    /// Returns `true` if this error happened while refreshing and the
    /// previous state can be kept.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Fetch(_) | Self::Decode(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_errors() {
        assert!(CoreError::Fetch("timeout".into()).is_transient());
        assert!(CoreError::Decode("eof".into()).is_transient());
        assert!(!CoreError::MissingAssignment("foo".into()).is_transient());
    }

    #[test]
    fn missing_assignment_message() {
        let err = CoreError::MissingAssignment("foo".into());
        assert_eq!(err.to_string(), "missing equals assignment in: foo");
    }
}
