use thiserror::Error;

/// Errors that can occur when interacting with the saga store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The underlying storage backend failed.
    #[error("Storage backend error: {0}")]
    Backend(String),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for saga store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
