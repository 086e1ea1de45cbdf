//! Message channel contract for the Stackway control plane.
//!
//! Defines the JSON envelope format, the agent job and status report
//! payloads, the [`MessageChannel`] trait, and the in-memory FIFO adapter.

pub mod error;
pub mod memory;
pub mod traits;
pub mod types;

pub use error::{ChannelError, Result};
pub use memory::InMemoryChannel;
pub use traits::MessageChannel;
pub use types::{
    AgentJob, AgentStatusReport, IdempotencyKey, MessageEnvelope, MessageSubtype, STATUS_TOPIC,
    WORKER_TOPIC,
};
