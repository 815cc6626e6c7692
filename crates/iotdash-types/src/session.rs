//! Session-level types: connection configuration and activity log entries.

use core::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::{ParseError, ParseResult};

/// Tree path used when the user does not choose one.
pub const DEFAULT_TREE_PATH: &str = "iot/monitoring";

/// Location and credentials of the remote device tree.
///
/// Created when a session connects and dropped when it disconnects.
#[derive(Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ConnectionConfig {
    /// Opaque credential passed to the remote store.
    pub endpoint_key: String,
    /// Base URL of the remote store (e.g. `https://project.firebaseio.com`).
    pub endpoint_url: String,
    /// Slash-separated path of the device tree root.
    pub tree_path: String,
}

impl ConnectionConfig {
    /// Create a configuration for `endpoint_url` using the default tree path.
    pub fn new(endpoint_url: impl Into<String>, endpoint_key: impl Into<String>) -> Self {
        Self {
            endpoint_key: endpoint_key.into(),
            endpoint_url: endpoint_url.into(),
            tree_path: DEFAULT_TREE_PATH.to_string(),
        }
    }

    /// Set the tree path.
    #[must_use]
    pub fn with_tree_path(mut self, tree_path: impl Into<String>) -> Self {
        self.tree_path = tree_path.into();
        self
    }

    /// The tree path without leading or trailing slashes.
    ///
    /// ```
    /// use iotdash_types::ConnectionConfig;
    ///
    /// let config = ConnectionConfig::new("https://x.firebaseio.com", "")
    ///     .with_tree_path("/iot/monitoring/");
    /// assert_eq!(config.normalized_path(), "iot/monitoring");
    /// ```
    #[must_use]
    pub fn normalized_path(&self) -> String {
        self.tree_path
            .split('/')
            .filter(|segment| !segment.is_empty())
            .collect::<Vec<_>>()
            .join("/")
    }

    /// The endpoint URL without a trailing slash.
    #[must_use]
    pub fn base_url(&self) -> &str {
        self.endpoint_url.trim_end_matches('/')
    }

    /// Check that the configuration can be used to open a connection.
    pub fn validate(&self) -> ParseResult<()> {
        let url = self.endpoint_url.trim();
        if url.is_empty() {
            return Err(ParseError::InvalidValue(
                "endpoint URL cannot be empty".to_string(),
            ));
        }
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(ParseError::InvalidValue(format!(
                "endpoint URL must start with http:// or https://, got: {}",
                url
            )));
        }
        Ok(())
    }
}

impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("endpoint_url", &self.endpoint_url)
            .field("tree_path", &self.tree_path)
            .field(
                "endpoint_key",
                &if self.endpoint_key.is_empty() { "" } else { "<redacted>" },
            )
            .finish()
    }
}

/// Severity of an activity log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Severity {
    /// Routine progress.
    #[default]
    Info,
    /// An operation completed.
    Success,
    /// An operation failed.
    Error,
    /// Something unexpected that did not fail.
    Warning,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Info => write!(f, "info"),
            Severity::Success => write!(f, "success"),
            Severity::Error => write!(f, "error"),
            Severity::Warning => write!(f, "warning"),
        }
    }
}

/// One line of the session activity log.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct LogEntry {
    /// Unique identifier.
    pub id: Uuid,
    /// When the entry was recorded.
    #[cfg_attr(feature = "serde", serde(with = "time::serde::rfc3339"))]
    pub timestamp: OffsetDateTime,
    /// Human-readable message.
    pub message: String,
    /// Severity.
    pub severity: Severity,
}

impl LogEntry {
    /// Create an entry stamped with a fresh id and the current time.
    pub fn new(message: impl Into<String>, severity: Severity) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: OffsetDateTime::now_utc(),
            message: message.into(),
            severity,
        }
    }
}
