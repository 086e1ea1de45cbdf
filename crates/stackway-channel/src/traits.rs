//! The message channel contract between the control plane and its agents.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::MessageEnvelope;

/// A typed FIFO queue per logical topic.
///
/// The control plane publishes agent jobs and polls agent status reports
/// through this trait; the concrete transport (in-memory for tests and
/// single-node runs, an external broker in production) is injected once at
/// startup. Implementations must preserve per-topic FIFO order and be
/// thread-safe (`Send + Sync`).
#[async_trait]
pub trait MessageChannel: Send + Sync {
    /// Publishes an envelope onto its topic.
    ///
    /// # Errors
    ///
    /// Returns `ChannelError::Unavailable` when the transport is down;
    /// callers treat that as transient.
    async fn publish(&self, envelope: MessageEnvelope) -> Result<()>;

    /// Removes and returns the oldest envelope on a topic, or `None` if the
    /// topic is empty. Never blocks.
    async fn try_poll(&self, topic: &str) -> Result<Option<MessageEnvelope>>;

    /// Waits for and returns the oldest envelope on a topic.
    async fn recv(&self, topic: &str) -> Result<MessageEnvelope>;

    /// Returns the name of this channel backend for logging/debugging.
    fn backend_name(&self) -> &'static str;
}

// Ensure the trait stays object-safe; handles are shared as trait objects.
#[cfg(test)]
mod tests {
    use super::*;

    fn _assert_channel_object_safe(_: &dyn MessageChannel) {}
}
