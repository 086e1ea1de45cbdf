//! Status reduction: folds agent reports into per-service and whole-instance
//! readiness, and retires delete-completed bindings.

use std::sync::Arc;
use tracing::{info, warn};

use stackway_channel::AgentStatusReport;
use stackway_core::{ProvisioningStatus, StackAction};
use stackway_storage::DocumentGateway;

use crate::error::Result;
use crate::locks::LockTable;
use crate::persist;

/// What applying one status report did to the instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReducedOutcome {
    /// The report updated a functional requirement; the instance now rolls
    /// up to the given status.
    Updated(ProvisioningStatus),
    /// A delete job finished for one service; its binding was removed.
    BindingRemoved,
    /// The last binding drained away and the instance document was removed.
    InstanceRemoved,
    /// The report referenced an unknown instance, service, or requirement
    /// and was dropped.
    Ignored,
}

pub struct StatusReducer {
    gateway: DocumentGateway,
    locks: Arc<LockTable>,
}

impl StatusReducer {
    pub fn new(gateway: DocumentGateway, locks: Arc<LockTable>) -> Self {
        Self { gateway, locks }
    }

    /// Applies one inbound report under the per-instance lock. Reports for
    /// documents that no longer exist (e.g. after a forced delete) are
    /// dropped with a warning; agents retry on their own schedule.
    pub async fn apply(&self, report: &AgentStatusReport) -> Result<ReducedOutcome> {
        let _guard = self.locks.lock(&report.stack_instance).await;

        let Some(versioned) = self.gateway.stack_instance(&report.stack_instance).await? else {
            warn!(instance = %report.stack_instance, "status report for unknown instance");
            return Ok(ReducedOutcome::Ignored);
        };
        let mut instance = versioned.value;
        let version = versioned.version_id;

        let Some(binding) = instance.binding_mut(&report.service) else {
            warn!(
                instance = %report.stack_instance,
                service = %report.service,
                "status report for unknown service"
            );
            return Ok(ReducedOutcome::Ignored);
        };
        let Some(fr_status) = binding.status_mut(&report.functional_requirement) else {
            warn!(
                instance = %report.stack_instance,
                service = %report.service,
                functional_requirement = %report.functional_requirement,
                "status report for unknown functional requirement"
            );
            return Ok(ReducedOutcome::Ignored);
        };

        fr_status.status = report.status;
        fr_status.error_message = report.error_message.clone();

        let service_status = binding.rollup();
        info!(
            instance = %report.stack_instance,
            service = %report.service,
            functional_requirement = %report.functional_requirement,
            status = %report.status,
            service_status = %service_status,
            "applied status report"
        );

        if report.action == StackAction::Delete && service_status == ProvisioningStatus::Ready {
            instance.services.shift_remove(&report.service);
            if instance.services.is_empty() {
                self.gateway
                    .delete_stack_instance(&report.stack_instance)
                    .await?;
                info!(instance = %report.stack_instance, "all services deleted, instance removed");
                return Ok(ReducedOutcome::InstanceRemoved);
            }
            instance.meta.update_timestamp();
            persist::write_instance(&self.gateway, &instance, Some(&version)).await?;
            return Ok(ReducedOutcome::BindingRemoved);
        }

        instance.meta.update_timestamp();
        persist::write_instance(&self.gateway, &instance, Some(&version)).await?;
        Ok(ReducedOutcome::Updated(instance.rollup()))
    }
}
