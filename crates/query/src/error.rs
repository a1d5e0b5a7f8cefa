use thiserror::Error;

/// Errors raised while configuring a [`QueryCompiler`](crate::QueryCompiler).
///
/// Compiling a search string never fails; only an invalid configuration does.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum QueryError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}
