use thiserror::Error;

/// Core error types for Stackway document handling
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Invalid document type: {0}")]
    InvalidDocumentType(String),

    #[error("Invalid infrastructure target: {0}")]
    InvalidTarget(String),

    #[error("Invalid capacity value: {0}")]
    InvalidCapacity(String),

    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("JSON serialization error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Invalid document: {message}")]
    InvalidDocument { message: String },
}

impl CoreError {
    /// Create a new InvalidDocumentType error
    pub fn invalid_document_type(doc_type: impl Into<String>) -> Self {
        Self::InvalidDocumentType(doc_type.into())
    }

    /// Create a new InvalidTarget error
    pub fn invalid_target(target: impl Into<String>) -> Self {
        Self::InvalidTarget(target.into())
    }

    /// Create a new InvalidCapacity error
    pub fn invalid_capacity(value: impl Into<String>) -> Self {
        Self::InvalidCapacity(value.into())
    }

    /// Create a new InvalidTimestamp error
    pub fn invalid_timestamp(value: impl Into<String>) -> Self {
        Self::InvalidTimestamp(value.into())
    }

    /// Create a new InvalidDocument error
    pub fn invalid_document(message: impl Into<String>) -> Self {
        Self::InvalidDocument {
            message: message.into(),
        }
    }
}

/// Convenience result type for core operations
pub type Result<T> = std::result::Result<T, CoreError>;
