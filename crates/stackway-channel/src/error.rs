use thiserror::Error;

/// Errors that can occur on the message channel.
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("Message serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Malformed message on {topic}: {message}")]
    Malformed { topic: String, message: String },

    #[error("Channel unavailable: {message}")]
    Unavailable { message: String },

    #[error("Channel closed: {topic}")]
    Closed { topic: String },
}

impl ChannelError {
    /// Creates a new `Malformed` error.
    pub fn malformed(topic: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Malformed {
            topic: topic.into(),
            message: message.into(),
        }
    }

    /// Creates a new `Unavailable` error.
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }

    /// Creates a new `Closed` error.
    pub fn closed(topic: impl Into<String>) -> Self {
        Self::Closed {
            topic: topic.into(),
        }
    }

    /// Returns `true` if retrying the operation may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable { .. })
    }
}

/// Convenience result type for channel operations
pub type Result<T> = std::result::Result<T, ChannelError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ChannelError::malformed("worker", "missing payload");
        assert_eq!(err.to_string(), "Malformed message on worker: missing payload");

        let err = ChannelError::closed("status");
        assert_eq!(err.to_string(), "Channel closed: status");
    }

    #[test]
    fn test_transient_classification() {
        assert!(ChannelError::unavailable("redis down").is_transient());
        assert!(!ChannelError::closed("worker").is_transient());
    }
}
