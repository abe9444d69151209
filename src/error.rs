//! Error types for the conversation engine.

use thiserror::Error;

use crate::conversation::ThreadId;

/// Engine error type.
#[derive(Error, Debug)]
pub enum Error {
    /// HTTP request failed before a response status was available.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Invalid service URL.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The service answered with a non-success status.
    #[error("API error ({status}): {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Response body, or a placeholder if it could not be read.
        message: String,
    },

    /// A configured handshake or idle timeout elapsed.
    #[error("Timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// The thread is not known to the registry.
    #[error("Unknown thread: {0}")]
    UnknownThread(ThreadId),

    /// Refused to send a blank message.
    #[error("Message is empty")]
    EmptyMessage,

    /// `start` was called on a session that already left `idle`.
    #[error("Session already started")]
    AlreadyStarted,

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Whether retrying the same request could plausibly succeed.
    ///
    /// Rate limiting (`429`) and server errors are retriable; every other
    /// `4xx` is a client error. Nothing in the engine retries on its own,
    /// this only feeds the logs.
    #[must_use]
    pub fn is_retriable(&self) -> bool {
        match self {
            Self::Api { status, .. } => *status == 429 || *status >= 500,
            Self::Http(e) => e.is_timeout() || e.is_connect(),
            Self::Timeout(_) => true,
            _ => false,
        }
    }
}

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    fn api(status: u16) -> Error {
        Error::Api {
            status,
            message: String::new(),
        }
    }

    #[test]
    fn test_client_errors_are_not_retriable() {
        assert!(!api(400).is_retriable());
        assert!(!api(404).is_retriable());
        assert!(!api(422).is_retriable());
    }

    #[test]
    fn test_rate_limit_and_server_errors_are_retriable() {
        assert!(api(429).is_retriable());
        assert!(api(500).is_retriable());
        assert!(api(503).is_retriable());
    }

    #[test]
    fn test_display() {
        assert_eq!(api(404).to_string(), "API error (404): ");
        assert_eq!(
            Error::UnknownThread(ThreadId::from("t9")).to_string(),
            "Unknown thread: t9"
        );
    }
}
