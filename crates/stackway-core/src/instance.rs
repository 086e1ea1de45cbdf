use crate::document::{DocumentMeta, ParameterMap};
use crate::target::InfrastructureTarget;
use crate::template::StackStage;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Provisioning status of one functional requirement, one service binding, or
/// a whole instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProvisioningStatus {
    InProgress,
    Ready,
    Failed,
}

impl fmt::Display for ProvisioningStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProvisioningStatus::InProgress => write!(f, "in_progress"),
            ProvisioningStatus::Ready => write!(f, "ready"),
            ProvisioningStatus::Failed => write!(f, "failed"),
        }
    }
}

impl ProvisioningStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ProvisioningStatus::InProgress)
    }
}

/// Status of one functional requirement within a service binding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionalRequirementStatus {
    pub functional_requirement: String,
    pub status: ProvisioningStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl FunctionalRequirementStatus {
    pub fn in_progress(functional_requirement: impl Into<String>) -> Self {
        Self {
            functional_requirement: functional_requirement.into(),
            status: ProvisioningStatus::InProgress,
            error_message: None,
        }
    }
}

/// The binding of one service to one infrastructure target, with the merged
/// provisioning parameters and the per-functional-requirement status list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceBinding {
    pub infrastructure_target: InfrastructureTarget,
    pub provisioning_parameters: ParameterMap,
    /// Opaque secret references; kept apart from provisioning parameters so
    /// they never leak into logs or plain documents downstream.
    #[serde(default, skip_serializing_if = "ParameterMap::is_empty")]
    pub secrets: ParameterMap,
    /// Names of services this binding depends on, recorded from `service`
    /// requirements during resolution. Drives delete ordering.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
    pub status: Vec<FunctionalRequirementStatus>,
}

impl ServiceBinding {
    /// Aggregate status: `failed` dominates, then any `in_progress`, else
    /// `ready`. A binding with no functional requirements is `ready`.
    pub fn rollup(&self) -> ProvisioningStatus {
        let mut in_progress = false;
        for fr in &self.status {
            match fr.status {
                ProvisioningStatus::Failed => return ProvisioningStatus::Failed,
                ProvisioningStatus::InProgress => in_progress = true,
                ProvisioningStatus::Ready => {}
            }
        }
        if in_progress {
            ProvisioningStatus::InProgress
        } else {
            ProvisioningStatus::Ready
        }
    }

    pub fn status_mut(&mut self, functional_requirement: &str) -> Option<&mut FunctionalRequirementStatus> {
        self.status
            .iter_mut()
            .find(|fr| fr.functional_requirement == functional_requirement)
    }

    /// Structural equality ignoring provisioning progress.
    pub fn same_shape(&self, other: &ServiceBinding) -> bool {
        self.infrastructure_target == other.infrastructure_target
            && self.provisioning_parameters == other.provisioning_parameters
            && self.secrets == other.secrets
            && self.depends_on == other.depends_on
    }
}

/// A bound, persistent record of which target each service runs on, plus
/// per-functional-requirement provisioning status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StackInstance {
    pub name: String,
    pub stack_application_template: String,
    pub stack_infrastructure_template: String,
    pub services: IndexMap<String, ServiceBinding>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub tags: IndexMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stages: Vec<StackStage>,
    /// Monotonic counter feeding job idempotency keys; persisted so
    /// redelivered jobs keep their original sequence.
    #[serde(default)]
    pub job_sequence: u64,
    #[serde(default)]
    pub meta: DocumentMeta,
}

impl StackInstance {
    pub fn new(
        name: impl Into<String>,
        stack_application_template: impl Into<String>,
        stack_infrastructure_template: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            stack_application_template: stack_application_template.into(),
            stack_infrastructure_template: stack_infrastructure_template.into(),
            services: IndexMap::new(),
            tags: IndexMap::new(),
            stages: Vec::new(),
            job_sequence: 0,
            meta: DocumentMeta::new(),
        }
    }

    /// Aggregate status over all service bindings, by the same rule bindings
    /// use over their functional requirements.
    pub fn rollup(&self) -> ProvisioningStatus {
        let mut in_progress = false;
        for binding in self.services.values() {
            match binding.rollup() {
                ProvisioningStatus::Failed => return ProvisioningStatus::Failed,
                ProvisioningStatus::InProgress => in_progress = true,
                ProvisioningStatus::Ready => {}
            }
        }
        if in_progress {
            ProvisioningStatus::InProgress
        } else {
            ProvisioningStatus::Ready
        }
    }

    pub fn binding(&self, service: &str) -> Option<&ServiceBinding> {
        self.services.get(service)
    }

    pub fn binding_mut(&mut self, service: &str) -> Option<&mut ServiceBinding> {
        self.services.get_mut(service)
    }

    pub fn next_job_sequence(&mut self) -> u64 {
        let sequence = self.job_sequence;
        self.job_sequence += 1;
        sequence
    }

    /// Structural equality ignoring provisioning progress, job sequencing,
    /// and write metadata. Used to detect no-op re-submissions.
    pub fn same_shape(&self, other: &StackInstance) -> bool {
        self.name == other.name
            && self.stack_application_template == other.stack_application_template
            && self.stack_infrastructure_template == other.stack_infrastructure_template
            && self.tags == other.tags
            && self.services.len() == other.services.len()
            && self.services.iter().all(|(name, binding)| {
                other
                    .services
                    .get(name)
                    .is_some_and(|b| binding.same_shape(b))
            })
    }
}
