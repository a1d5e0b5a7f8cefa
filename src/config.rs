//! YAML configuration for the object service.
//!
//! One file describes the storage backend, the write policy, the search
//! compiler and the readiness probe:
//!
//! ```yaml
//! version: "1.0"
//! name: "bookshelf"
//!
//! store:
//!   backend:
//!     kind: redb
//!     path: "/data/objgate.redb"
//!   compression:
//!     codec: zstd
//!     level: 3
//!   # either a list or the compact "db/coll;db2/coll2" form
//!   immutable_collections:
//!     - "bookshelf/archive"
//!
//! compiler:
//!   operator_prefix: "$"
//!   matching: unanchored
//!
//! health:
//!   database: "_healthcheckdatabase_"
//!   collection: "_healthcheckcollection_"
//!   degraded_after_ms: 1000
//!   timeout_ms: 2000
//! ```

use std::fs;
use std::path::Path;
use std::time::Duration;

use query::CompilerConfig;
use serde::{Deserialize, Serialize};
use store::StoreConfig;
use thiserror::Error;

/// Errors that can occur when loading YAML configuration files
#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    #[error("failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("unsupported config version: {0}")]
    UnsupportedVersion(String),
}

/// Top-level configuration of an [`ObjectService`](crate::ObjectService).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ServiceConfig {
    /// Configuration format version
    #[serde(default = "default_version")]
    pub version: String,

    /// Optional configuration name/description
    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub compiler: CompilerConfig,

    #[serde(default)]
    pub health: HealthConfig,
}

impl ServiceConfig {
    /// Load a YAML configuration file from the given path
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigLoadError> {
        let content = fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse YAML configuration from a string
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigLoadError> {
        let config: ServiceConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_store(mut self, store: StoreConfig) -> Self {
        self.store = store;
        self
    }

    pub fn with_compiler(mut self, compiler: CompilerConfig) -> Self {
        self.compiler = compiler;
        self
    }

    pub fn with_health(mut self, health: HealthConfig) -> Self {
        self.health = health;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigLoadError> {
        match self.version.as_str() {
            "1.0" | "1" => Ok(()),
            v => Err(ConfigLoadError::UnsupportedVersion(v.to_string())),
        }?;

        self.compiler
            .validate()
            .map_err(|e| ConfigLoadError::Validation(format!("compiler: {e}")))?;
        self.store
            .compression
            .validate()
            .map_err(|e| ConfigLoadError::Validation(format!("store.compression: {e}")))?;
        self.health.validate()?;
        Ok(())
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            version: default_version(),
            name: None,
            store: StoreConfig::default(),
            compiler: CompilerConfig::default(),
            health: HealthConfig::default(),
        }
    }
}

/// Readiness probe settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthConfig {
    #[serde(default = "default_health_database")]
    pub database: String,

    #[serde(default = "default_health_collection")]
    pub collection: String,

    /// Probes slower than this report `Degraded`.
    #[serde(default = "default_degraded_after_ms")]
    pub degraded_after_ms: u64,

    /// Probes slower than this report `Unhealthy`.
    #[serde(default = "default_health_timeout_ms")]
    pub timeout_ms: u64,
}

impl HealthConfig {
    pub fn degraded_after(&self) -> Duration {
        Duration::from_millis(self.degraded_after_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    fn validate(&self) -> Result<(), ConfigLoadError> {
        store::validate_name("database", &self.database)
            .and_then(|_| store::validate_name("collection", &self.collection))
            .map_err(|e| ConfigLoadError::Validation(format!("health: {e}")))?;
        if self.degraded_after_ms >= self.timeout_ms {
            return Err(ConfigLoadError::Validation(
                "health.degraded_after_ms must be below health.timeout_ms".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            database: default_health_database(),
            collection: default_health_collection(),
            degraded_after_ms: default_degraded_after_ms(),
            timeout_ms: default_health_timeout_ms(),
        }
    }
}

fn default_version() -> String {
    "1.0".to_string()
}
fn default_health_database() -> String {
    "_healthcheckdatabase_".to_string()
}
fn default_health_collection() -> String {
    "_healthcheckcollection_".to_string()
}
fn default_degraded_after_ms() -> u64 {
    1000
}
fn default_health_timeout_ms() -> u64 {
    2000
}

#[cfg(test)]
mod tests {
    use super::*;
    use query::MatchMode;
    use std::io::Write;
    use store::{BackendConfig, CompressionCodec};
    use tempfile::NamedTempFile;

    #[test]
    fn test_load_valid_yaml() {
        let yaml = r#"
version: "1.0"
name: "bookshelf"
store:
  backend:
    kind: in_memory
  compression:
    codec: none
  immutable_collections: "bookshelf/archive;audit/log"
compiler:
  matching: anchored
"#;

        let config = ServiceConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.name.as_deref(), Some("bookshelf"));
        assert_eq!(config.store.backend, BackendConfig::InMemory);
        assert_eq!(config.store.compression.codec, CompressionCodec::None);
        assert!(config.store.immutable_collections.contains("audit", "log"));
        assert_eq!(config.compiler.matching, MatchMode::Anchored);
        assert_eq!(config.compiler.operator_prefix, "$");
        assert_eq!(config.health, HealthConfig::default());
    }

    #[test]
    fn test_load_from_file() {
        let yaml = r#"
version: "1.0"
store:
  backend:
    kind: redb
    path: "/tmp/objgate-test.redb"
  immutable_collections:
    - "db/frozen"
"#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(yaml.as_bytes()).unwrap();

        let config = ServiceConfig::from_file(temp_file.path()).unwrap();
        assert_eq!(
            config.store.backend,
            BackendConfig::redb("/tmp/objgate-test.redb")
        );
        assert!(config.store.immutable_collections.contains("db", "frozen"));
    }

    #[test]
    fn test_default_config() {
        let config = ServiceConfig::default();
        assert_eq!(config.version, "1.0");
        assert!(config.name.is_none());
        assert!(config.validate().is_ok());
        assert_eq!(config.health.degraded_after(), Duration::from_secs(1));
    }

    #[test]
    fn test_empty_yaml_uses_defaults() {
        let config = ServiceConfig::from_yaml("{}").unwrap();
        assert_eq!(config, ServiceConfig::default());
    }

    #[test]
    fn test_version_validation() {
        let err = ServiceConfig::from_yaml("version: \"2.0\"").unwrap_err();
        assert!(matches!(err, ConfigLoadError::UnsupportedVersion(v) if v == "2.0"));
    }

    #[test]
    fn test_compiler_validation() {
        let yaml = r#"
compiler:
  operator_prefix: "a.b"
"#;
        let err = ServiceConfig::from_yaml(yaml).unwrap_err();
        assert!(err.to_string().contains("compiler"));
    }

    #[test]
    fn test_health_validation() {
        let yaml = r#"
health:
  degraded_after_ms: 3000
  timeout_ms: 2000
"#;
        let err = ServiceConfig::from_yaml(yaml).unwrap_err();
        assert!(err.to_string().contains("degraded_after_ms"));

        let err = ServiceConfig::from_yaml("health:\n  collection: \"a/b\"").unwrap_err();
        assert!(err.to_string().contains("health"));
    }

    #[test]
    fn test_bad_immutable_entry_is_a_parse_error() {
        let yaml = r#"
store:
  immutable_collections: ["nocollection"]
"#;
        assert!(matches!(
            ServiceConfig::from_yaml(yaml),
            Err(ConfigLoadError::YamlParse(_))
        ));
    }
}
