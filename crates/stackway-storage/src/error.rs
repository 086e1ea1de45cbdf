//! Error types for the document store abstraction layer.

use std::fmt;

/// Errors that can occur during document store operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The requested document was not found.
    #[error("Document not found: {doc_type}/{name}")]
    NotFound {
        /// The type of document that was not found.
        doc_type: String,
        /// The name of the document that was not found.
        name: String,
    },

    /// A version conflict occurred during a conditional write.
    #[error("Version conflict on {doc_type}/{name}: expected {expected}, found {actual}")]
    VersionConflict {
        doc_type: String,
        name: String,
        expected: String,
        actual: String,
    },

    /// The document body could not be (de)serialized.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The storage backend is temporarily unavailable.
    #[error("Storage unavailable: {message}")]
    Unavailable {
        /// Description of the outage.
        message: String,
    },

    /// An internal storage error occurred.
    #[error("Internal storage error: {message}")]
    Internal { message: String },
}

impl StorageError {
    /// Creates a new `NotFound` error.
    #[must_use]
    pub fn not_found(doc_type: impl Into<String>, name: impl Into<String>) -> Self {
        Self::NotFound {
            doc_type: doc_type.into(),
            name: name.into(),
        }
    }

    /// Creates a new `VersionConflict` error.
    #[must_use]
    pub fn version_conflict(
        doc_type: impl Into<String>,
        name: impl Into<String>,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        Self::VersionConflict {
            doc_type: doc_type.into(),
            name: name.into(),
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// Creates a new `Unavailable` error.
    #[must_use]
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }

    /// Creates a new `Internal` error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns `true` if this is a not found error.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Returns `true` if this is a version conflict error.
    #[must_use]
    pub fn is_version_conflict(&self) -> bool {
        matches!(self, Self::VersionConflict { .. })
    }

    /// Returns `true` if retrying the operation may succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable { .. })
    }

    /// Returns the error category for logging/monitoring purposes.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::NotFound { .. } => ErrorCategory::NotFound,
            Self::VersionConflict { .. } => ErrorCategory::Conflict,
            Self::Serialization(_) => ErrorCategory::Serialization,
            Self::Unavailable { .. } => ErrorCategory::Infrastructure,
            Self::Internal { .. } => ErrorCategory::Internal,
        }
    }
}

/// Categories of storage errors for logging and monitoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    NotFound,
    Conflict,
    Serialization,
    Infrastructure,
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "not_found"),
            Self::Conflict => write!(f, "conflict"),
            Self::Serialization => write!(f, "serialization"),
            Self::Infrastructure => write!(f, "infrastructure"),
            Self::Internal => write!(f, "internal"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = StorageError::not_found("service", "web");
        assert_eq!(err.to_string(), "Document not found: service/web");

        let err = StorageError::version_conflict("stack_instance", "demo", "1", "2");
        assert_eq!(
            err.to_string(),
            "Version conflict on stack_instance/demo: expected 1, found 2"
        );
    }

    #[test]
    fn test_error_predicates() {
        assert!(StorageError::not_found("service", "web").is_not_found());
        assert!(StorageError::version_conflict("t", "n", "1", "2").is_version_conflict());
        assert!(StorageError::unavailable("connection refused").is_transient());
        assert!(!StorageError::internal("bug").is_transient());
    }

    #[test]
    fn test_error_category() {
        assert_eq!(
            StorageError::not_found("service", "web").category(),
            ErrorCategory::NotFound
        );
        assert_eq!(
            StorageError::version_conflict("t", "n", "1", "2").category(),
            ErrorCategory::Conflict
        );
        assert_eq!(
            StorageError::unavailable("down").category(),
            ErrorCategory::Infrastructure
        );
        assert_eq!(ErrorCategory::Conflict.to_string(), "conflict");
    }
}
