//! Store error type.

use thiserror::Error;

/// Result alias for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors raised by the document store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying `SQLite` failure.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Connection pool exhausted or broken.
    #[error("connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    /// Document could not be serialized.
    #[error("document serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Document is not a JSON object.
    #[error("document must be a JSON object, got {0}")]
    NotADocument(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_a_document_names_the_type() {
        let err = StoreError::NotADocument("array");
        assert!(err.to_string().contains("array"));
    }
}
