//! Configuration for the search-string compiler.
//!
//! The defaults reproduce the reference behavior: `$`-prefixed operator keys
//! and unanchored type sniffing.
//!
//! ```rust
//! use query::{CompilerConfig, MatchMode};
//!
//! let config = CompilerConfig::default();
//! assert_eq!(config.operator_prefix, "$");
//! assert_eq!(config.matching, MatchMode::Unanchored);
//! ```

use serde::{Deserialize, Serialize};

use crate::error::QueryError;

/// Operator prefix used by MongoDB-style filter documents.
pub const DEFAULT_OPERATOR_PREFIX: &str = "$";

/// How raw values are sniffed for numbers and booleans.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMode {
    /// Pattern may match anywhere inside the value (`5x` looks numeric,
    /// `truest` looks boolean).
    #[default]
    Unanchored,
    /// Pattern must match the whole value.
    Anchored,
}

/// Settings for [`QueryCompiler`](crate::QueryCompiler).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompilerConfig {
    /// Prefix prepended to canonical operator tags when rendering
    /// (`$` turns `gte` into `$gte`).
    #[serde(default = "default_operator_prefix")]
    pub operator_prefix: String,

    /// Type sniffing strategy.
    #[serde(default)]
    pub matching: MatchMode,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            operator_prefix: default_operator_prefix(),
            matching: MatchMode::default(),
        }
    }
}

impl CompilerConfig {
    pub fn with_operator_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.operator_prefix = prefix.into();
        self
    }

    pub fn with_matching(mut self, matching: MatchMode) -> Self {
        self.matching = matching;
        self
    }

    /// Reject prefixes that would produce keys a filter evaluator reads as
    /// field paths.
    pub fn validate(&self) -> Result<(), QueryError> {
        if self.operator_prefix.chars().any(char::is_whitespace) {
            return Err(QueryError::InvalidConfig(
                "operator_prefix must not contain whitespace".into(),
            ));
        }
        if self.operator_prefix.contains('.') {
            return Err(QueryError::InvalidConfig(
                "operator_prefix must not contain '.'".into(),
            ));
        }
        Ok(())
    }
}

fn default_operator_prefix() -> String {
    DEFAULT_OPERATOR_PREFIX.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(CompilerConfig::default().validate().is_ok());
    }

    #[test]
    fn empty_prefix_is_allowed() {
        let cfg = CompilerConfig::default().with_operator_prefix("");
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn prefix_with_whitespace_is_rejected() {
        let cfg = CompilerConfig::default().with_operator_prefix("$ ");
        assert!(matches!(cfg.validate(), Err(QueryError::InvalidConfig(_))));
    }

    #[test]
    fn prefix_with_dot_is_rejected() {
        let cfg = CompilerConfig::default().with_operator_prefix("op.");
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn deserializes_with_defaults() {
        let cfg: CompilerConfig = serde_json::from_str(r#"{"matching":"anchored"}"#).unwrap();
        assert_eq!(cfg.operator_prefix, "$");
        assert_eq!(cfg.matching, MatchMode::Anchored);
    }
}
