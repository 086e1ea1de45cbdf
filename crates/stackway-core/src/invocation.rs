use crate::document::ParameterMap;
use crate::target::InfrastructureTarget;
use crate::template::StackStage;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The action a stack request or agent job performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StackAction {
    Create,
    Update,
    Delete,
}

impl fmt::Display for StackAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StackAction::Create => write!(f, "create"),
            StackAction::Update => write!(f, "update"),
            StackAction::Delete => write!(f, "delete"),
        }
    }
}

/// Request body for creating a stack instance. Every map defaults to empty so
/// callers only spell out what they use.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StackInstanceInvocation {
    pub stack_instance_name: String,
    pub stack_infrastructure_template: String,
    pub stack_application_template: String,
    #[serde(default)]
    pub params: ParameterMap,
    /// Per-service replica counts; overrides a service's `count`
    /// non-functional requirement before solving.
    #[serde(default)]
    pub replicas: IndexMap<String, u64>,
    #[serde(default)]
    pub secrets: ParameterMap,
    /// Per-service parameter overlays applied after the global merge.
    #[serde(default)]
    pub service_params: IndexMap<String, ParameterMap>,
    #[serde(default)]
    pub service_secrets: IndexMap<String, ParameterMap>,
    /// Optional explicit subset of the SAT's services to instantiate.
    #[serde(default)]
    pub services: Vec<String>,
    #[serde(default)]
    pub stages: Vec<StackStage>,
    #[serde(default)]
    pub tags: IndexMap<String, String>,
    /// When set, every service binds to this target and the solver is
    /// bypassed after an existence check.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub infrastructure_target: Option<InfrastructureTarget>,
}

impl StackInstanceInvocation {
    pub fn new(
        stack_instance_name: impl Into<String>,
        stack_infrastructure_template: impl Into<String>,
        stack_application_template: impl Into<String>,
    ) -> Self {
        Self {
            stack_instance_name: stack_instance_name.into(),
            stack_infrastructure_template: stack_infrastructure_template.into(),
            stack_application_template: stack_application_template.into(),
            params: ParameterMap::new(),
            replicas: IndexMap::new(),
            secrets: ParameterMap::new(),
            service_params: IndexMap::new(),
            service_secrets: IndexMap::new(),
            services: Vec::new(),
            stages: Vec::new(),
            tags: IndexMap::new(),
            infrastructure_target: None,
        }
    }
}

/// Request body for updating a stack instance: an invocation plus a switch to
/// suppress job emission (dry update of the persisted document only).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StackInstanceUpdate {
    #[serde(flatten)]
    pub invocation: StackInstanceInvocation,
    #[serde(default)]
    pub disable_invocation: bool,
}

impl From<StackInstanceInvocation> for StackInstanceUpdate {
    fn from(invocation: StackInstanceInvocation) -> Self {
        Self {
            invocation,
            disable_invocation: false,
        }
    }
}
