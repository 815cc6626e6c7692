//! Error types for iotdash-core.
//!
//! Library code returns [`Error`] from every fallible adapter and client
//! call. The [`SyncStore`](crate::SyncStore) boundary is where these errors
//! stop: each one is converted into an error-severity log entry and never
//! surfaces to the presentation layer as a `Result`.
//!
//! | Error Type | Typical source |
//! |------------|----------------|
//! | [`Error::NotConnected`] | Mutation or subscribe without an open session |
//! | [`Error::Timeout`] | Connect probe exceeded its deadline |
//! | [`Error::Http`] | Transport failure talking to the remote store |
//! | [`Error::Api`] | Remote store rejected the request (rules, auth) |
//! | [`Error::Remote`] | In-memory store failure injection |
//! | [`Error::InvalidConfig`] | Bad connection or simulation parameters |

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur while talking to the remote device tree.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Operation attempted without an open connection handle.
    #[error("Database not initialized")]
    NotConnected,

    /// Operation timed out.
    #[error("Operation '{operation}' timed out after {duration:?}")]
    Timeout {
        /// The operation that timed out.
        operation: String,
        /// The timeout duration.
        duration: Duration,
    },

    /// HTTP transport error.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The remote store answered with an error status.
    #[error("Remote store error ({status}): {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Error message reported by the store.
        message: String,
    },

    /// The remote store reported a failure that is not tied to HTTP.
    #[error("{0}")]
    Remote(String),

    /// The live feed failed or was closed by the remote side.
    #[error("Stream error: {0}")]
    Stream(String),

    /// Data from the remote store could not be interpreted.
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// JSON encoding or decoding failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A model value was rejected.
    #[error(transparent)]
    Parse(#[from] iotdash_types::ParseError),

    /// Invalid configuration provided.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Operation was cancelled.
    #[error("Operation cancelled")]
    Cancelled,
}

impl Error {
    /// Create a timeout error with operation context.
    pub fn timeout(operation: impl Into<String>, duration: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            duration,
        }
    }

    /// Create a configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig(message.into())
    }

    /// Create a remote failure.
    pub fn remote(message: impl Into<String>) -> Self {
        Self::Remote(message.into())
    }

    /// Returns `true` for errors caused by the remote side refusing access.
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, Error::Api { status: 401 | 403, .. })
    }
}

/// Result type alias using iotdash-core's Error type.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::NotConnected;
        assert_eq!(err.to_string(), "Database not initialized");

        let err = Error::timeout("probe", Duration::from_secs(10));
        assert!(err.to_string().contains("probe"));
        assert!(err.to_string().contains("10s"));

        let err = Error::Api {
            status: 401,
            message: "Permission denied".to_string(),
        };
        assert!(err.to_string().contains("401"));
        assert!(err.to_string().contains("Permission denied"));
        assert!(err.is_auth_failure());

        let err = Error::remote("write rejected");
        assert_eq!(err.to_string(), "write rejected");
        assert!(!err.is_auth_failure());
    }

    #[test]
    fn test_parse_error_conversion() {
        let parse = iotdash_types::ParseError::UnknownKind("relay".to_string());
        let err: Error = parse.into();
        assert!(matches!(err, Error::Parse(_)));
        assert!(err.to_string().contains("relay"));
    }

    #[test]
    fn test_json_error_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::Json(_)));
    }
}
