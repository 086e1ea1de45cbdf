//! Builds a StackInstance document from a solver resolution plus the
//! invocation's parameters, secrets, and tags.

use tracing::debug;

use stackway_core::{
    DocumentMeta, FunctionalRequirementStatus, ParameterMap, ServiceBinding, StackInstance,
    StackInstanceInvocation, StackApplicationTemplate, StackInfrastructureTemplate,
};
use stackway_storage::DocumentGateway;

use crate::error::{EngineError, Result};
use crate::solver::Resolution;

/// Inserts every entry of `src` into `dest`, overriding existing keys.
fn overlay(dest: &mut ParameterMap, src: &ParameterMap) {
    for (key, value) in src {
        dest.insert(key.clone(), value.clone());
    }
}

pub struct InstanceBuilder {
    gateway: DocumentGateway,
}

impl InstanceBuilder {
    pub fn new(gateway: DocumentGateway) -> Self {
        Self { gateway }
    }

    /// Materializes the instance. For every service the chosen target is the
    /// lexicographically smallest candidate; provisioning parameters merge
    /// target capabilities, service params, functional requirement params,
    /// and user params in that precedence, with per-service overlays applied
    /// last. Kept services of `existing` retain their status lists.
    pub async fn build(
        &self,
        invocation: &StackInstanceInvocation,
        sat: &StackApplicationTemplate,
        sit: &StackInfrastructureTemplate,
        resolution: &Resolution,
        existing: Option<&StackInstance>,
    ) -> Result<StackInstance> {
        let mut instance = StackInstance::new(
            &invocation.stack_instance_name,
            &sat.name,
            &sit.name,
        );
        instance.tags = invocation.tags.clone();
        instance.stages = if invocation.stages.is_empty() {
            sat.stages.clone()
        } else {
            invocation.stages.clone()
        };
        if let Some(existing) = existing {
            instance.job_sequence = existing.job_sequence;
        }
        instance.meta = DocumentMeta::new().with_description(format!(
            "resolved from SAT '{}' and SIT '{}'",
            sat.name, sit.name
        ));

        for (name, service) in &resolution.services {
            let target_name = resolution.chosen_target(name).ok_or_else(|| {
                EngineError::internal(format!("no candidate target for service '{name}'"))
            })?;
            let capabilities = sit
                .infrastructure_capabilities
                .get(target_name)
                .ok_or_else(|| {
                    EngineError::internal(format!(
                        "target '{target_name}' has no capability map in SIT '{}'",
                        sit.name
                    ))
                })?;

            let mut parameters = capabilities.clone();
            overlay(&mut parameters, &service.params);
            for fr_name in &service.functional_requirements {
                let fr = self.gateway.functional_requirement(fr_name).await?;
                overlay(&mut parameters, &fr.params);
            }
            overlay(&mut parameters, &invocation.params);
            if let Some(service_params) = invocation.service_params.get(name) {
                overlay(&mut parameters, service_params);
            }

            let mut secrets = invocation.secrets.clone();
            if let Some(service_secrets) = invocation.service_secrets.get(name) {
                overlay(&mut secrets, service_secrets);
            }

            let status = match existing.and_then(|e| e.binding(name)) {
                // A kept service keeps its per-requirement progress, as long
                // as the catalog's requirement list is unchanged.
                Some(previous) if status_matches(previous, &service.functional_requirements) => {
                    previous.status.clone()
                }
                _ => service
                    .functional_requirements
                    .iter()
                    .map(|fr| FunctionalRequirementStatus::in_progress(fr.clone()))
                    .collect(),
            };

            debug!(service = %name, target = %target_name, "bound service");
            instance.services.insert(
                name.clone(),
                ServiceBinding {
                    infrastructure_target: target_name.parse().map_err(|_| {
                        EngineError::internal(format!("malformed target name '{target_name}'"))
                    })?,
                    provisioning_parameters: parameters,
                    secrets,
                    depends_on: resolution.depends_on(name),
                    status,
                },
            );
        }

        Ok(instance)
    }
}

fn status_matches(binding: &ServiceBinding, functional_requirements: &[String]) -> bool {
    binding.status.len() == functional_requirements.len()
        && binding
            .status
            .iter()
            .zip(functional_requirements)
            .all(|(status, fr)| &status.functional_requirement == fr)
}
