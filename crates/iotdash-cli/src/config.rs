//! Configuration file management.
//!
//! Settings live in `<config_dir>/iotdash/config.toml`:
//!
//! ```toml
//! [connection]
//! endpoint_url = "https://my-project.firebaseio.com"
//! endpoint_key = ""
//! tree_path = "iot/monitoring"
//!
//! [simulation]
//! min = 10.0
//! max = 90.0
//! duration_secs = 60
//! ```
//!
//! Command-line flags override file values.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use iotdash_types::{ConnectionConfig, DEFAULT_TREE_PATH};

/// CLI configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Remote store settings.
    pub connection: ConnectionSection,
    /// Default simulation parameters.
    pub simulation: SimulationSection,
}

impl Config {
    /// Load configuration from the default path, or defaults if the file
    /// does not exist.
    pub fn load_default() -> Result<Self, ConfigError> {
        let path = default_config_path();
        if path.exists() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Read {
            path: path.as_ref().to_path_buf(),
            source: e,
        })?;
        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.as_ref().to_path_buf(),
            source: e,
        })
    }

    /// Save configuration to a file, creating parent directories.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self).map_err(ConfigError::Serialize)?;

        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::Write {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        std::fs::write(path.as_ref(), content).map_err(|e| ConfigError::Write {
            path: path.as_ref().to_path_buf(),
            source: e,
        })
    }

    /// Validate the configuration and return every problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = self.connection.validate();
        errors.extend(self.simulation.validate());

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }
}

/// `[connection]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionSection {
    /// Base URL of the remote store.
    pub endpoint_url: Option<String>,
    /// Credential sent with every request.
    pub endpoint_key: Option<String>,
    /// Path of the device tree.
    pub tree_path: String,
}

impl Default for ConnectionSection {
    fn default() -> Self {
        Self {
            endpoint_url: None,
            endpoint_key: None,
            tree_path: DEFAULT_TREE_PATH.to_string(),
        }
    }
}

impl ConnectionSection {
    /// Validate connection settings.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if let Some(url) = &self.endpoint_url {
            let probe = ConnectionConfig::new(url.as_str(), "");
            if let Err(e) = probe.validate() {
                errors.push(ValidationError {
                    field: "connection.endpoint_url".to_string(),
                    message: e.to_string(),
                });
            }
        }
        if self.tree_path.split('/').all(str::is_empty) {
            errors.push(ValidationError {
                field: "connection.tree_path".to_string(),
                message: "tree path cannot be empty".to_string(),
            });
        }

        errors
    }
}

/// `[simulation]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationSection {
    /// Lower bound of simulated values.
    pub min: f64,
    /// Upper bound of simulated values.
    pub max: f64,
    /// Run length in seconds.
    pub duration_secs: u64,
}

impl Default for SimulationSection {
    fn default() -> Self {
        Self {
            min: 0.0,
            max: 100.0,
            duration_secs: 60,
        }
    }
}

impl SimulationSection {
    /// Validate simulation defaults.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if !self.min.is_finite() || !self.max.is_finite() {
            errors.push(ValidationError {
                field: "simulation".to_string(),
                message: "min and max must be finite numbers".to_string(),
            });
        } else if self.min > self.max {
            errors.push(ValidationError {
                field: "simulation.min".to_string(),
                message: format!("min ({}) is greater than max ({})", self.min, self.max),
            });
        }
        if self.duration_secs == 0 {
            errors.push(ValidationError {
                field: "simulation.duration_secs".to_string(),
                message: "duration must be at least 1 second".to_string(),
            });
        }

        errors
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("Failed to serialize config: {0}")]
    Serialize(toml::ser::Error),
    #[error("Failed to write config file {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Configuration validation failed:\n{}", format_validation_errors(.0))]
    Validation(Vec<ValidationError>),
}

/// A single validation error with context.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationError {
    /// The field path (e.g., `connection.endpoint_url`).
    pub field: String,
    /// Description of the validation failure.
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

fn format_validation_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| format!("  - {}", e))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Default configuration file path.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("iotdash")
        .join("config.toml")
}

/// Build the session configuration from flags, falling back to the file.
///
/// Returns `None` when no endpoint URL is known.
pub fn resolve_connection(
    url: Option<String>,
    key: Option<String>,
    path: Option<String>,
    config: &Config,
) -> Option<ConnectionConfig> {
    let url = url.or_else(|| config.connection.endpoint_url.clone())?;
    let key = key
        .or_else(|| config.connection.endpoint_key.clone())
        .unwrap_or_default();
    let path = path.unwrap_or_else(|| config.connection.tree_path.clone());
    Some(ConnectionConfig::new(url, key).with_tree_path(path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.connection.tree_path, "iot/monitoring");
        assert!(config.connection.endpoint_url.is_none());
        assert_eq!(config.simulation.duration_secs, 60);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_save_and_load() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config_path = temp_dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.connection.endpoint_url = Some("https://demo.firebaseio.com".to_string());
        config.connection.endpoint_key = Some("secret".to_string());
        config.simulation.min = 10.0;
        config.simulation.max = 20.0;

        config.save(&config_path).unwrap();
        let loaded = Config::load(&config_path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_config_partial_toml() {
        let toml = r#"
            [connection]
            endpoint_url = "https://demo.firebaseio.com"
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.connection.tree_path, "iot/monitoring");
        assert_eq!(config.simulation, SimulationSection::default());
    }

    #[test]
    fn test_config_load_nonexistent() {
        let result = Config::load("/nonexistent/path/config.toml");
        assert!(matches!(result, Err(ConfigError::Read { .. })));
    }

    #[test]
    fn test_config_load_invalid_toml() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config_path = temp_dir.path().join("invalid.toml");
        std::fs::write(&config_path, "this is not valid { toml").unwrap();

        let result = Config::load(&config_path);
        assert!(matches!(result, Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_validation_collects_all_errors() {
        let mut config = Config::default();
        config.connection.endpoint_url = Some("ftp://demo".to_string());
        config.connection.tree_path = "/".to_string();
        config.simulation.min = 50.0;
        config.simulation.max = 10.0;
        config.simulation.duration_secs = 0;

        let Err(ConfigError::Validation(errors)) = config.validate() else {
            panic!("expected validation errors");
        };
        let fields: Vec<&str> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(
            fields,
            vec![
                "connection.endpoint_url",
                "connection.tree_path",
                "simulation.min",
                "simulation.duration_secs",
            ]
        );

        let message = ConfigError::Validation(errors).to_string();
        assert!(message.contains("  - simulation.min"));
    }

    #[test]
    fn test_resolve_connection_prefers_flags() {
        let mut config = Config::default();
        config.connection.endpoint_url = Some("https://file.firebaseio.com".to_string());
        config.connection.endpoint_key = Some("file-key".to_string());

        let resolved = resolve_connection(
            Some("https://flag.firebaseio.com".to_string()),
            None,
            Some("home/devices".to_string()),
            &config,
        )
        .unwrap();
        assert_eq!(resolved.endpoint_url, "https://flag.firebaseio.com");
        assert_eq!(resolved.endpoint_key, "file-key");
        assert_eq!(resolved.tree_path, "home/devices");
    }

    #[test]
    fn test_resolve_connection_requires_url() {
        assert!(resolve_connection(None, None, None, &Config::default()).is_none());
    }
}
