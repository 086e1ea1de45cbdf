//! Stack lifecycle orchestration: create, update, and delete entry points.
//!
//! Every entry point runs under the per-instance lock: load documents,
//! refresh capabilities, solve, build, persist, then emit jobs. Job emission
//! runs on a detached task that is awaited, so a caller dropping its request
//! mid-flight cannot leave a persisted instance without its jobs.

use indexmap::IndexMap;
use serde_json::json;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{info, instrument};

use stackway_core::{
    ProvisioningStatus, Service, StackInstance, StackInstanceInvocation, StackInstanceUpdate,
};
use stackway_storage::DocumentGateway;

use crate::builder::InstanceBuilder;
use crate::capability::{CapabilityResolver, RefreshPolicy};
use crate::dispatcher::JobDispatcher;
use crate::error::{EngineError, ResolutionError, Result};
use crate::locks::LockTable;
use crate::persist;
use crate::solver::{Resolution, SolverInput, solve};

pub struct StackManager {
    gateway: DocumentGateway,
    resolver: CapabilityResolver,
    builder: InstanceBuilder,
    dispatcher: Arc<JobDispatcher>,
    locks: Arc<LockTable>,
    max_solver_restarts: u32,
}

impl StackManager {
    pub fn new(
        gateway: DocumentGateway,
        resolver: CapabilityResolver,
        dispatcher: Arc<JobDispatcher>,
        locks: Arc<LockTable>,
        max_solver_restarts: u32,
    ) -> Self {
        Self {
            builder: InstanceBuilder::new(gateway.clone()),
            gateway,
            resolver,
            dispatcher,
            locks,
            max_solver_restarts,
        }
    }

    /// Resolves an invocation into a materialized instance. Failures here
    /// leave no persisted state beyond the SIT capability refresh.
    async fn resolve(
        &self,
        invocation: &StackInstanceInvocation,
        existing: Option<&StackInstance>,
    ) -> Result<StackInstance> {
        let sat = self
            .gateway
            .application_template(&invocation.stack_application_template)
            .await?;
        let mut sit = self
            .gateway
            .infrastructure_template(&invocation.stack_infrastructure_template)
            .await?;
        self.resolver.refresh(&mut sit, RefreshPolicy::Force).await?;

        let selected: Vec<String> = if invocation.services.is_empty() {
            sat.services.clone()
        } else {
            for name in &invocation.services {
                if !sat.services.contains(name) {
                    return Err(EngineError::validation(format!(
                        "service '{name}' is not part of SAT '{}'",
                        sat.name
                    )));
                }
            }
            invocation.services.clone()
        };

        let mut services: IndexMap<String, Service> = IndexMap::new();
        for name in &selected {
            let mut service = self.gateway.service(name).await?;
            if let Some(count) = invocation.replicas.get(name) {
                service
                    .non_functional_requirements
                    .insert("count".to_string(), json!(count));
            }
            services.insert(name.clone(), service);
        }

        let resolution = match &invocation.infrastructure_target {
            Some(target) => {
                if !sit.contains_target(target) {
                    return Err(ResolutionError::UnknownTarget {
                        target: target.to_string(),
                    }
                    .into());
                }
                Resolution::pinned(services, &target.to_string())
            }
            None => solve(
                SolverInput {
                    services,
                    extra_functional_requirements: sat.extra_functional_requirements.clone(),
                    capabilities: sit.infrastructure_capabilities.clone(),
                },
                self.max_solver_restarts,
            )?,
        };

        self.builder
            .build(invocation, &sat, &sit, &resolution, existing)
            .await
    }

    /// Awaits a spawned emission task, folding panics into internal errors.
    async fn join_emission<T>(&self, handle: JoinHandle<Result<T>>) -> Result<T> {
        handle
            .await
            .map_err(|err| EngineError::internal(format!("job emission task failed: {err}")))?
    }

    /// Creates a stack instance: resolve, persist, emit one `create` job per
    /// service. Re-submitting an invocation whose resolution matches the
    /// persisted instance is a no-op.
    #[instrument(skip_all, fields(instance = %invocation.stack_instance_name))]
    pub async fn create(&self, invocation: &StackInstanceInvocation) -> Result<StackInstance> {
        let name = &invocation.stack_instance_name;
        let _guard = self.locks.lock(name).await;

        let existing = self.gateway.stack_instance(name).await?;
        let mut instance = self
            .resolve(invocation, existing.as_ref().map(|v| &v.value))
            .await?;

        if let Some(existing) = &existing
            && existing.value.same_shape(&instance)
        {
            info!("create re-submission matches persisted instance, no-op");
            return Ok(existing.value.clone());
        }

        let version = persist::write_instance(
            &self.gateway,
            &instance,
            existing.as_ref().map(|v| v.version_id.as_str()),
        )
        .await?;

        let dispatcher = Arc::clone(&self.dispatcher);
        let mut for_jobs = instance.clone();
        let (jobs, job_sequence) = self
            .join_emission(tokio::spawn(async move {
                let jobs = dispatcher.dispatch_create(&mut for_jobs).await?;
                Ok((jobs, for_jobs.job_sequence))
            }))
            .await?;

        instance.job_sequence = job_sequence;
        persist::write_instance(&self.gateway, &instance, Some(&version)).await?;
        info!(services = instance.services.len(), jobs, "created stack instance");
        Ok(instance)
    }

    /// Updates a stack instance: re-resolve against the new SAT, keep the
    /// status lists of surviving services, emit per-service `delete` jobs for
    /// removed services, then a single `update` job with the new snapshot.
    #[instrument(skip_all, fields(instance = %update.invocation.stack_instance_name))]
    pub async fn update(&self, update: &StackInstanceUpdate) -> Result<StackInstance> {
        let invocation = &update.invocation;
        let name = &invocation.stack_instance_name;
        let _guard = self.locks.lock(name).await;

        let existing = self
            .gateway
            .stack_instance(name)
            .await?
            .ok_or_else(|| EngineError::not_found("stack_instance", name))?;

        let mut instance = self.resolve(invocation, Some(&existing.value)).await?;
        let to_be_deleted: Vec<String> = existing
            .value
            .services
            .keys()
            .filter(|service| !instance.services.contains_key(*service))
            .cloned()
            .collect();

        let version = persist::write_instance(
            &self.gateway,
            &instance,
            Some(existing.version_id.as_str()),
        )
        .await?;

        if !update.disable_invocation {
            let dispatcher = Arc::clone(&self.dispatcher);
            // The old instance still holds the bindings of the services being
            // removed; it lends its shape to the delete jobs while the new
            // instance's counter numbers them.
            let mut delete_view = existing.value.clone();
            delete_view.job_sequence = instance.job_sequence;
            let mut snapshot = instance.clone();
            let removed = to_be_deleted.clone();
            let job_sequence = self
                .join_emission(tokio::spawn(async move {
                    dispatcher
                        .dispatch_service_deletes(&mut delete_view, &removed)
                        .await?;
                    snapshot.job_sequence = delete_view.job_sequence;
                    dispatcher.dispatch_update(&mut snapshot).await?;
                    Ok(snapshot.job_sequence)
                }))
                .await?;

            instance.job_sequence = job_sequence;
            persist::write_instance(&self.gateway, &instance, Some(&version)).await?;
        }

        info!(
            deleted = to_be_deleted.len(),
            services = instance.services.len(),
            "updated stack instance"
        );
        Ok(instance)
    }

    /// Deletes a stack instance. Forced deletion emits one bulk job and
    /// removes the document immediately; otherwise per-service jobs go out
    /// and the status reducer removes the document once every service
    /// reports its delete complete.
    #[instrument(skip_all, fields(instance = %name, force))]
    pub async fn delete(&self, name: &str, force: bool) -> Result<()> {
        let _guard = self.locks.lock(name).await;

        let existing = self
            .gateway
            .stack_instance(name)
            .await?
            .ok_or_else(|| EngineError::not_found("stack_instance", name))?;
        let mut instance = existing.value;

        if force {
            let dispatcher = Arc::clone(&self.dispatcher);
            let mut for_jobs = instance.clone();
            self.join_emission(tokio::spawn(async move {
                dispatcher.dispatch_bulk_delete(&mut for_jobs).await
            }))
            .await?;
            self.gateway.delete_stack_instance(name).await?;
            info!("force-deleted stack instance");
            return Ok(());
        }

        // Delete progress is tracked through the same status lists, so they
        // start over from in_progress.
        for binding in instance.services.values_mut() {
            for fr_status in &mut binding.status {
                fr_status.status = ProvisioningStatus::InProgress;
                fr_status.error_message = None;
            }
        }

        let services: Vec<String> = instance.services.keys().cloned().collect();
        let dispatcher = Arc::clone(&self.dispatcher);
        let mut for_jobs = instance.clone();
        let (jobs, job_sequence) = self
            .join_emission(tokio::spawn(async move {
                let jobs = dispatcher
                    .dispatch_service_deletes(&mut for_jobs, &services)
                    .await?;
                Ok((jobs, for_jobs.job_sequence))
            }))
            .await?;

        instance.job_sequence = job_sequence;
        instance.meta.update_timestamp();
        persist::write_instance(&self.gateway, &instance, Some(&existing.version_id)).await?;
        info!(jobs, "deleting stack instance service by service");
        Ok(())
    }
}
