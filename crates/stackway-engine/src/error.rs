use stackway_channel::ChannelError;
use stackway_storage::StorageError;
use thiserror::Error;

/// Why constraint solving rejected a SAT/SIT pair. The reason strings are
/// part of the API surface; agents and clients match on them.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolutionError {
    #[error(
        "The given SIT cannot satisfy the SAT: there is an unsatisfied service with no infrastructure target"
    )]
    UnsatisfiedService,

    #[error(
        "The given SIT cannot satisfy the SAT: there is an unsatisfied service with an unresolved service dependency"
    )]
    UnresolvedServiceDependency,

    #[error(
        "The given SIT cannot satisfy the SAT: there are services that need to share zones but cannot"
    )]
    ZoneConflict,

    #[error("The given SIT cannot satisfy the SAT: service dependency cycle")]
    DependencyCycle,

    #[error("The requested infrastructure target '{target}' is not part of the SIT")]
    UnknownTarget { target: String },

    #[error("Requirement '{requirement}' of service '{service}' is not usable: {message}")]
    InvalidRequirement {
        service: String,
        requirement: String,
        message: String,
    },

    #[error("Replica expansion exceeded the restart budget of {budget}")]
    RestartBudgetExhausted { budget: u32 },
}

/// Engine-level error taxonomy. Storage and channel errors fold into it at
/// the crate boundary so callers see one surface.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Document not found: {doc_type}/{name}")]
    NotFound { doc_type: String, name: String },

    #[error("Validation error: {message}")]
    Validation { message: String },

    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    #[error("Concurrent write lost on stack instance '{name}'")]
    Conflict { name: String },

    #[error("Transient failure: {message}")]
    Transient { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl EngineError {
    /// Create a new NotFound error
    pub fn not_found(doc_type: impl Into<String>, name: impl Into<String>) -> Self {
        Self::NotFound {
            doc_type: doc_type.into(),
            name: name.into(),
        }
    }

    /// Create a new Validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Create a new Conflict error
    pub fn conflict(name: impl Into<String>) -> Self {
        Self::Conflict { name: name.into() }
    }

    /// Create a new Transient error
    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient {
            message: message.into(),
        }
    }

    /// Create a new Internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// HTTP status the REST surface maps this error to.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::NotFound { .. } => 404,
            Self::Validation { .. } => 400,
            Self::Resolution(_) => 422,
            Self::Conflict { .. } => 409,
            Self::Transient { .. } => 503,
            Self::Internal { .. } => 500,
        }
    }

    /// Check if this error is a client error (4xx category)
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.http_status())
    }
}

impl From<StorageError> for EngineError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound { doc_type, name } => Self::NotFound { doc_type, name },
            StorageError::VersionConflict { name, .. } => Self::Conflict { name },
            StorageError::Unavailable { message } => Self::Transient { message },
            StorageError::Serialization(e) => Self::Internal {
                message: e.to_string(),
            },
            StorageError::Internal { message } => Self::Internal { message },
        }
    }
}

impl From<ChannelError> for EngineError {
    fn from(err: ChannelError) -> Self {
        if err.is_transient() {
            Self::Transient {
                message: err.to_string(),
            }
        } else {
            Self::Internal {
                message: err.to_string(),
            }
        }
    }
}

/// Convenience result type for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;
