use thiserror::Error;

/// Errors surfaced by the document store.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Backend error: {0}")]
    Backend(String),
    #[error("Codec error: {0}")]
    Codec(String),
    #[error("Invalid document: {0}")]
    InvalidDocument(String),
    #[error("Invalid filter: {0}")]
    InvalidFilter(String),
    #[error("Invalid pipeline: {0}")]
    InvalidPipeline(String),
    #[error("Invalid name: {0}")]
    InvalidName(String),
    #[error("Object '{id}' already exists in collection '{collection}'")]
    DuplicateId { id: String, collection: String },
    #[error("Collection {collection} in database {database} is immutable")]
    ImmutableCollection { database: String, collection: String },
}

impl StoreError {
    pub fn backend<E: std::fmt::Display>(err: E) -> Self {
        Self::Backend(err.to_string())
    }

    /// Whether the caller, not the store, is at fault.
    pub fn is_client_error(&self) -> bool {
        !matches!(self, StoreError::Backend(_) | StoreError::Codec(_))
    }
}

impl From<std::io::Error> for StoreError {
    fn from(e: std::io::Error) -> Self {
        StoreError::Codec(e.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Codec(e.to_string())
    }
}
