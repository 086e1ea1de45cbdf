pub mod capacity;
pub mod document;
pub mod error;
pub mod instance;
pub mod invocation;
pub mod target;
pub mod template;
pub mod time;

pub use capacity::CapacityValue;
pub use document::{
    CapabilityMap, DocumentMeta, DocumentType, FunctionalRequirement,
    InfrastructureBaseDocument, ParameterMap, Service,
};
pub use error::{CoreError, Result};
pub use instance::{
    FunctionalRequirementStatus, ProvisioningStatus, ServiceBinding, StackInstance,
};
pub use invocation::{StackAction, StackInstanceInvocation, StackInstanceUpdate};
pub use target::InfrastructureTarget;
pub use template::{StackApplicationTemplate, StackInfrastructureTemplate, StackStage};
pub use time::{Timestamp, now_utc};
