//! Error taxonomy shared by every layer of the crate.
//!
//! Every failure carries enough structure to reproduce it in a test: the
//! offending field path and received value for schema failures, the message
//! index and call id for history violations, the HTTP status and body for
//! remote failures, and the item index for fan-out failures.

use crate::history::HistoryError;
use crate::schema::SchemaError;
use std::time::Duration;

/// Coarse classification of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Model output did not match the declared schema.
    Validation,
    /// The caller submitted something the crate refuses to send.
    Usage,
    /// Network, rate-limit or service failure.
    Remote,
    /// Missing or invalid settings, detected before any remote call.
    Config,
    /// Local filesystem or serialization failure.
    Io,
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    History(#[from] HistoryError),

    #[error("API HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("request failed: {0}")]
    Transport(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("failed to decode response: {0}")]
    Decode(String),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("configuration error: {key}: {reason}")]
    Config { key: String, reason: String },

    #[error("model was still calling tools after {limit} round(s)")]
    ToolRounds { limit: u32 },

    #[error("item {index} failed: {source}")]
    Item {
        index: usize,
        #[source]
        source: Box<Error>,
    },

    #[error("operation cancelled")]
    Cancelled,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub fn config(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::Config {
            key: key.into(),
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Schema(_) => ErrorKind::Validation,
            Error::History(_) | Error::ToolRounds { .. } | Error::Cancelled => ErrorKind::Usage,
            Error::Http { .. }
            | Error::Transport(_)
            | Error::Api(_)
            | Error::Decode(_)
            | Error::Timeout(_) => ErrorKind::Remote,
            Error::Config { .. } => ErrorKind::Config,
            Error::Io(_) | Error::Json(_) => ErrorKind::Io,
            Error::Item { source, .. } => source.kind(),
        }
    }

    /// Whether retrying the same request could succeed (429, 5xx, network
    /// failures, timeouts). Validation and usage errors never are.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Http { status, .. } => matches!(status, 429 | 500 | 502 | 503 | 504),
            Error::Transport(_) | Error::Timeout(_) => true,
            Error::Item { source, .. } => source.is_transient(),
            _ => false,
        }
    }

    /// The innermost error, looking through fan-out wrappers.
    pub fn root(&self) -> &Error {
        match self {
            Error::Item { source, .. } => source.root(),
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_statuses() {
        for status in [429, 500, 502, 503, 504] {
            let err = Error::Http {
                status,
                body: String::new(),
            };
            assert!(err.is_transient(), "{status} should be transient");
        }
        for status in [400, 401, 403, 404, 422] {
            let err = Error::Http {
                status,
                body: String::new(),
            };
            assert!(!err.is_transient(), "{status} should be permanent");
        }
    }

    #[test]
    fn item_wrapper_keeps_classification() {
        let err = Error::Item {
            index: 3,
            source: Box::new(Error::Timeout(Duration::from_secs(1))),
        };
        assert_eq!(err.kind(), ErrorKind::Remote);
        assert!(err.is_transient());
        assert!(matches!(err.root(), Error::Timeout(_)));
        assert!(err.to_string().starts_with("item 3 failed"));
    }

    #[test]
    fn history_errors_are_usage_errors() {
        let err = Error::from(HistoryError::Empty);
        assert_eq!(err.kind(), ErrorKind::Usage);
        assert!(!err.is_transient());
    }

    #[test]
    fn config_error_names_key() {
        let err = Error::config("OPENAI_API_KEY", "not set");
        assert_eq!(err.kind(), ErrorKind::Config);
        assert!(err.to_string().contains("OPENAI_API_KEY"));
    }
}
