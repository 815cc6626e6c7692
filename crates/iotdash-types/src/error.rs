//! Error types for the iotdash device model.

use thiserror::Error;

/// Errors that can occur when parsing or validating device model values.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ParseError {
    /// A device key is empty or contains characters the remote tree rejects.
    #[error("Invalid device key '{key}': {reason}")]
    InvalidKey {
        /// The offending key (after normalization).
        key: String,
        /// Why the key was rejected.
        reason: String,
    },

    /// A device kind string did not name a known kind.
    #[error("Unknown device kind: {0}")]
    UnknownKind(String),

    /// A value failed a model constraint.
    #[error("Invalid value: {0}")]
    InvalidValue(String),
}

/// Result type alias using iotdash-types' ParseError type.
pub type ParseResult<T> = std::result::Result<T, ParseError>;
