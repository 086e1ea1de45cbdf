use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use stackway_core::{ProvisioningStatus, ServiceBinding, StackAction, StackInstance};

use crate::error::{ChannelError, Result};

/// Topic the control plane publishes agent jobs on.
pub const WORKER_TOPIC: &str = "worker";

/// Topic agents publish status reports on.
pub const STATUS_TOPIC: &str = "status";

/// Message subtype carried by every envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageSubtype {
    CreateStack,
    UpdateStack,
    DeleteStack,
    GetDocument,
    PostDocument,
    CollectDocument,
    AgentStatus,
}

impl From<StackAction> for MessageSubtype {
    fn from(action: StackAction) -> Self {
        match action {
            StackAction::Create => MessageSubtype::CreateStack,
            StackAction::Update => MessageSubtype::UpdateStack,
            StackAction::Delete => MessageSubtype::DeleteStack,
        }
    }
}

/// JSON envelope exchanged over the message channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageEnvelope {
    /// Logical topic this message belongs to.
    pub channel: String,
    pub subtype: MessageSubtype,
    pub payload: Value,
    /// Topic the handler should publish its reply on, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub return_channel: Option<String>,
}

impl MessageEnvelope {
    /// Wraps an agent job for the worker topic.
    pub fn job(job: &AgentJob) -> Result<Self> {
        Ok(Self {
            channel: WORKER_TOPIC.to_string(),
            subtype: job.action.into(),
            payload: serde_json::to_value(job)?,
            return_channel: Some(STATUS_TOPIC.to_string()),
        })
    }

    /// Wraps an agent status report for the status topic.
    pub fn status(report: &AgentStatusReport) -> Result<Self> {
        Ok(Self {
            channel: STATUS_TOPIC.to_string(),
            subtype: MessageSubtype::AgentStatus,
            payload: serde_json::to_value(report)?,
            return_channel: None,
        })
    }

    /// Decodes the payload as an agent job.
    pub fn decode_job(&self) -> Result<AgentJob> {
        serde_json::from_value(self.payload.clone())
            .map_err(|e| ChannelError::malformed(&self.channel, e.to_string()))
    }

    /// Decodes the payload as an agent status report.
    pub fn decode_status(&self) -> Result<AgentStatusReport> {
        serde_json::from_value(self.payload.clone())
            .map_err(|e| ChannelError::malformed(&self.channel, e.to_string()))
    }
}

/// Idempotency key attached to every emitted job. Agents use it to
/// deduplicate redelivered work.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IdempotencyKey {
    pub stack_instance: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,
    pub action: StackAction,
    pub sequence: u64,
}

impl fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}/{}",
            self.stack_instance,
            self.service.as_deref().unwrap_or("*"),
            self.action,
            self.sequence
        )
    }
}

/// One unit of provisioning work handed to an agent.
///
/// Per-service jobs carry the service binding; whole-instance jobs (update
/// snapshots, forced bulk deletes) carry the instance snapshot instead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentJob {
    pub stack_instance: String,
    pub action: StackAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub binding: Option<ServiceBinding>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<StackInstance>,
    pub idempotency: IdempotencyKey,
}

impl AgentJob {
    /// Per-service job carrying the full binding.
    pub fn for_service(
        stack_instance: impl Into<String>,
        service: impl Into<String>,
        action: StackAction,
        binding: ServiceBinding,
        sequence: u64,
    ) -> Self {
        let stack_instance = stack_instance.into();
        let service = service.into();
        Self {
            idempotency: IdempotencyKey {
                stack_instance: stack_instance.clone(),
                service: Some(service.clone()),
                action,
                sequence,
            },
            stack_instance,
            action,
            service: Some(service),
            binding: Some(binding),
            snapshot: None,
        }
    }

    /// Whole-instance job carrying a snapshot.
    pub fn for_instance(instance: &StackInstance, action: StackAction, sequence: u64) -> Self {
        Self {
            idempotency: IdempotencyKey {
                stack_instance: instance.name.clone(),
                service: None,
                action,
                sequence,
            },
            stack_instance: instance.name.clone(),
            action,
            service: None,
            binding: None,
            snapshot: Some(instance.clone()),
        }
    }
}

/// Status report an agent publishes after working on one functional
/// requirement of one service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentStatusReport {
    pub stack_instance: String,
    pub service: String,
    pub functional_requirement: String,
    pub status: ProvisioningStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// The action of the job this report answers; delete reports drive
    /// binding removal.
    pub action: StackAction,
}
