use thiserror::Error;

/// Unified error type for canopy store operations
#[derive(Debug, Error)]
pub enum CanopyError {
    /// The requested page does not exist or has been soft-deleted.
    #[error("Page not found")]
    PageNotFound,

    /// The requested block does not exist or has been soft-deleted.
    #[error("Block not found")]
    BlockNotFound,

    /// A reference id (anchor sibling or target parent) did not resolve to a
    /// live row in the target scope.
    #[error("Reference '{0}' not found in target scope")]
    ReferenceNotFound(String),

    /// A move would make a node an ancestor of itself.
    #[error("Cannot move a node under itself or one of its descendants")]
    CyclicMove,

    /// A uniqueness or integrity constraint was violated at the persistence
    /// layer.
    #[error("Constraint conflict: {0}")]
    Conflict(String),

    /// Block properties could not be serialized or deserialized.
    #[error("Invalid block properties: {0}")]
    Properties(#[from] serde_json::Error),

    /// Any other database failure.
    #[error("Database error: {0}")]
    Database(rusqlite::Error),
}

impl From<rusqlite::Error> for CanopyError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(code, msg)
                if code.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                CanopyError::Conflict(msg.clone().unwrap_or_else(|| code.to_string()))
            }
            _ => CanopyError::Database(err),
        }
    }
}

/// Result type alias for canopy store operations
pub type Result<T> = std::result::Result<T, CanopyError>;
