//! Job dispatch: the only component that touches the message channel.
//!
//! Outbound, it turns a resolved instance into per-service agent jobs with
//! idempotency keys. Inbound, it drains agent status reports into the status
//! reducer. It re-emits a job only when no acknowledgement arrives within the
//! inactivity window and the instance is still in a non-terminal state.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{info, warn};

use stackway_channel::{
    AgentJob, IdempotencyKey, MessageChannel, MessageEnvelope, STATUS_TOPIC,
};
use stackway_core::{ProvisioningStatus, StackAction, StackInstance};
use stackway_storage::DocumentGateway;

use crate::error::{EngineError, Result};
use crate::reducer::StatusReducer;

struct PendingJob {
    job: AgentJob,
    emitted_at: Instant,
}

pub struct JobDispatcher {
    channel: Arc<dyn MessageChannel>,
    pending: Mutex<HashMap<IdempotencyKey, PendingJob>>,
    inactivity_window: Duration,
    ordered_delete: bool,
}

impl JobDispatcher {
    pub fn new(
        channel: Arc<dyn MessageChannel>,
        inactivity_window: Duration,
        ordered_delete: bool,
    ) -> Self {
        Self {
            channel,
            pending: Mutex::new(HashMap::new()),
            inactivity_window,
            ordered_delete,
        }
    }

    async fn emit(&self, job: AgentJob) -> Result<()> {
        let envelope = MessageEnvelope::job(&job)?;
        self.channel.publish(envelope).await?;
        info!(key = %job.idempotency, action = %job.action, "emitted job");
        let mut pending = self.pending.lock().await;
        pending.insert(
            job.idempotency.clone(),
            PendingJob {
                job,
                emitted_at: Instant::now(),
            },
        );
        Ok(())
    }

    /// Emits one `create` job per service binding. Returns the job count.
    pub async fn dispatch_create(&self, instance: &mut StackInstance) -> Result<usize> {
        let names: Vec<String> = instance.services.keys().cloned().collect();
        for name in &names {
            let sequence = instance.next_job_sequence();
            let binding = instance
                .binding(name)
                .cloned()
                .ok_or_else(|| EngineError::internal(format!("missing binding for '{name}'")))?;
            let job = AgentJob::for_service(
                &instance.name,
                name,
                StackAction::Create,
                binding,
                sequence,
            );
            self.emit(job).await?;
        }
        Ok(names.len())
    }

    /// Emits a single `update` job carrying the instance snapshot.
    pub async fn dispatch_update(&self, snapshot: &mut StackInstance) -> Result<()> {
        let sequence = snapshot.next_job_sequence();
        let job = AgentJob::for_instance(snapshot, StackAction::Update, sequence);
        self.emit(job).await
    }

    /// Emits per-service `delete` jobs, dependents before dependencies when
    /// ordered deletion is on. Returns the job count.
    pub async fn dispatch_service_deletes(
        &self,
        instance: &mut StackInstance,
        services: &[String],
    ) -> Result<usize> {
        let ordered = if self.ordered_delete {
            delete_order(instance, services)
        } else {
            services.to_vec()
        };
        for name in &ordered {
            let sequence = instance.next_job_sequence();
            let binding = instance
                .binding(name)
                .cloned()
                .ok_or_else(|| EngineError::internal(format!("missing binding for '{name}'")))?;
            let job = AgentJob::for_service(
                &instance.name,
                name,
                StackAction::Delete,
                binding,
                sequence,
            );
            self.emit(job).await?;
        }
        Ok(ordered.len())
    }

    /// Emits a single bulk `delete` job carrying the whole instance.
    pub async fn dispatch_bulk_delete(&self, instance: &mut StackInstance) -> Result<()> {
        let sequence = instance.next_job_sequence();
        let job = AgentJob::for_instance(instance, StackAction::Delete, sequence);
        self.emit(job).await
    }

    /// Drops pending entries matching an agent's report: the per-service jobs
    /// for `(instance, service)` plus any whole-instance jobs for `instance`.
    /// Returns how many entries were acknowledged.
    pub async fn acknowledge(&self, instance: &str, service: &str) -> usize {
        let mut pending = self.pending.lock().await;
        let before = pending.len();
        pending.retain(|key, _| {
            !(key.stack_instance == instance
                && (key.service.is_none() || key.service.as_deref() == Some(service)))
        });
        before - pending.len()
    }

    /// Number of unacknowledged jobs. Test and monitoring helper.
    pub async fn pending_count(&self) -> usize {
        self.pending.lock().await.len()
    }

    /// Re-emits unacknowledged jobs older than the inactivity window, as long
    /// as their instance still exists and is non-terminal. Pending entries
    /// whose instance is gone or settled are dropped.
    pub async fn redeliver_stale(&self, gateway: &DocumentGateway) -> Result<usize> {
        let stale: Vec<AgentJob> = {
            let pending = self.pending.lock().await;
            pending
                .values()
                .filter(|entry| entry.emitted_at.elapsed() >= self.inactivity_window)
                .map(|entry| entry.job.clone())
                .collect()
        };

        let mut redelivered = 0;
        for job in stale {
            let still_running = gateway
                .stack_instance(&job.stack_instance)
                .await?
                .is_some_and(|versioned| {
                    versioned.value.rollup() == ProvisioningStatus::InProgress
                });
            if still_running {
                warn!(key = %job.idempotency, "no acknowledgement inside window, re-emitting");
                self.emit(job).await?;
                redelivered += 1;
            } else {
                self.pending.lock().await.remove(&job.idempotency);
            }
        }
        Ok(redelivered)
    }

    /// Applies one already-received status envelope: reduce, then
    /// acknowledge. Malformed envelopes and reducer errors are logged, not
    /// propagated, so one bad agent cannot stall the loop.
    pub async fn handle_status_envelope(
        &self,
        reducer: &StatusReducer,
        envelope: MessageEnvelope,
    ) {
        let report = match envelope.decode_status() {
            Ok(report) => report,
            Err(err) => {
                warn!(error = %err, "discarding malformed status message");
                return;
            }
        };
        if let Err(err) = reducer.apply(&report).await {
            warn!(
                instance = %report.stack_instance,
                service = %report.service,
                error = %err,
                "failed to apply status report"
            );
            return;
        }
        self.acknowledge(&report.stack_instance, &report.service)
            .await;
    }

    /// Drains one queued status message if present. Returns whether a
    /// message was handled.
    pub async fn pump_inbound_once(&self, reducer: &StatusReducer) -> Result<bool> {
        match self.channel.try_poll(STATUS_TOPIC).await? {
            Some(envelope) => {
                self.handle_status_envelope(reducer, envelope).await;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Blocking inbound loop: consumes the status topic forever. Transient
    /// channel failures back off and retry.
    pub async fn run_inbound(&self, reducer: &StatusReducer) -> Result<()> {
        loop {
            match self.channel.recv(STATUS_TOPIC).await {
                Ok(envelope) => self.handle_status_envelope(reducer, envelope).await,
                Err(err) if err.is_transient() => {
                    warn!(error = %err, "status channel unavailable, backing off");
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
                Err(err) => return Err(err.into()),
            }
        }
    }
}

/// Orders `services` so dependents come before their dependencies: a
/// depth-first walk along `depends_on` edges emits dependencies first, and
/// the reversed post-order is the delete order. Cycles were rejected at
/// resolution time; the visited set guards regardless.
fn delete_order(instance: &StackInstance, services: &[String]) -> Vec<String> {
    fn visit(
        name: &str,
        instance: &StackInstance,
        scope: &HashSet<&str>,
        visited: &mut HashSet<String>,
        order: &mut Vec<String>,
    ) {
        if !scope.contains(name) || visited.contains(name) {
            return;
        }
        visited.insert(name.to_string());
        if let Some(binding) = instance.binding(name) {
            for dependency in &binding.depends_on {
                visit(dependency, instance, scope, visited, order);
            }
        }
        order.push(name.to_string());
    }

    let scope: HashSet<&str> = services.iter().map(String::as_str).collect();
    let mut visited = HashSet::new();
    let mut order = Vec::with_capacity(services.len());
    for name in services {
        visit(name, instance, &scope, &mut visited, &mut order);
    }
    order.reverse();
    order
}

#[cfg(test)]
mod tests {
    use super::*;
    use stackway_channel::{InMemoryChannel, MessageSubtype, WORKER_TOPIC};
    use stackway_core::{FunctionalRequirementStatus, ParameterMap, ServiceBinding};

    fn binding(target: &str, depends_on: Vec<String>) -> ServiceBinding {
        ServiceBinding {
            infrastructure_target: target.parse().unwrap(),
            provisioning_parameters: ParameterMap::new(),
            secrets: ParameterMap::new(),
            depends_on,
            status: vec![FunctionalRequirementStatus::in_progress("nginx")],
        }
    }

    fn instance_with(services: Vec<(&str, Vec<String>)>) -> StackInstance {
        let mut instance = StackInstance::new("demo", "web", "prod");
        for (name, deps) in services {
            instance
                .services
                .insert(name.to_string(), binding("aws.eu.z1", deps));
        }
        instance
    }

    fn dispatcher(channel: Arc<InMemoryChannel>) -> JobDispatcher {
        JobDispatcher::new(channel, Duration::from_secs(120), true)
    }

    #[tokio::test]
    async fn test_create_emits_one_job_per_service() {
        let channel = Arc::new(InMemoryChannel::new());
        let dispatcher = dispatcher(Arc::clone(&channel));
        let mut instance = instance_with(vec![("web", vec![]), ("db", vec![])]);

        let count = dispatcher.dispatch_create(&mut instance).await.unwrap();
        assert_eq!(count, 2);
        assert_eq!(channel.depth(WORKER_TOPIC).await, 2);
        assert_eq!(instance.job_sequence, 2);
        assert_eq!(dispatcher.pending_count().await, 2);

        let first = channel.try_poll(WORKER_TOPIC).await.unwrap().unwrap();
        assert_eq!(first.subtype, MessageSubtype::CreateStack);
        let job = first.decode_job().unwrap();
        assert_eq!(job.service.as_deref(), Some("web"));
        assert_eq!(job.idempotency.sequence, 0);
        assert!(job.binding.is_some());
    }

    #[tokio::test]
    async fn test_delete_order_dependents_first() {
        let channel = Arc::new(InMemoryChannel::new());
        let dispatcher = dispatcher(Arc::clone(&channel));
        // app depends on db; app must be deleted first.
        let mut instance = instance_with(vec![
            ("db", vec![]),
            ("app", vec!["db".to_string()]),
        ]);
        let services: Vec<String> = instance.services.keys().cloned().collect();

        dispatcher
            .dispatch_service_deletes(&mut instance, &services)
            .await
            .unwrap();

        let first = channel.try_poll(WORKER_TOPIC).await.unwrap().unwrap();
        let second = channel.try_poll(WORKER_TOPIC).await.unwrap().unwrap();
        assert_eq!(first.decode_job().unwrap().service.as_deref(), Some("app"));
        assert_eq!(second.decode_job().unwrap().service.as_deref(), Some("db"));
    }

    #[tokio::test]
    async fn test_unordered_delete_keeps_given_order() {
        let channel = Arc::new(InMemoryChannel::new());
        let dispatcher = JobDispatcher::new(
            Arc::clone(&channel) as Arc<dyn MessageChannel>,
            Duration::from_secs(120),
            false,
        );
        let mut instance = instance_with(vec![
            ("db", vec![]),
            ("app", vec!["db".to_string()]),
        ]);
        let services: Vec<String> = instance.services.keys().cloned().collect();

        dispatcher
            .dispatch_service_deletes(&mut instance, &services)
            .await
            .unwrap();

        let first = channel.try_poll(WORKER_TOPIC).await.unwrap().unwrap();
        assert_eq!(first.decode_job().unwrap().service.as_deref(), Some("db"));
    }

    #[tokio::test]
    async fn test_delete_order_chain() {
        // a -> b -> c: delete a, then b, then c.
        let instance = instance_with(vec![
            ("c", vec![]),
            ("b", vec!["c".to_string()]),
            ("a", vec!["b".to_string()]),
        ]);
        let services: Vec<String> = instance.services.keys().cloned().collect();
        let order = delete_order(&instance, &services);
        assert_eq!(order, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_delete_order_ignores_out_of_scope_dependencies() {
        let instance = instance_with(vec![("app", vec!["db".to_string()])]);
        let order = delete_order(&instance, &["app".to_string()]);
        assert_eq!(order, vec!["app"]);
    }

    #[tokio::test]
    async fn test_acknowledge_clears_pending() {
        let channel = Arc::new(InMemoryChannel::new());
        let dispatcher = dispatcher(Arc::clone(&channel));
        let mut instance = instance_with(vec![("web", vec![]), ("db", vec![])]);
        dispatcher.dispatch_create(&mut instance).await.unwrap();

        let acked = dispatcher.acknowledge("demo", "web").await;
        assert_eq!(acked, 1);
        assert_eq!(dispatcher.pending_count().await, 1);

        // Unknown pairs acknowledge nothing.
        assert_eq!(dispatcher.acknowledge("demo", "ghost").await, 0);
    }

    #[tokio::test]
    async fn test_acknowledge_covers_instance_level_jobs() {
        let channel = Arc::new(InMemoryChannel::new());
        let dispatcher = dispatcher(Arc::clone(&channel));
        let mut instance = instance_with(vec![("web", vec![])]);
        dispatcher.dispatch_update(&mut instance).await.unwrap();
        assert_eq!(dispatcher.pending_count().await, 1);

        dispatcher.acknowledge("demo", "web").await;
        assert_eq!(dispatcher.pending_count().await, 0);
    }

    #[tokio::test]
    async fn test_redeliver_stale_requires_running_instance() {
        let channel = Arc::new(InMemoryChannel::new());
        // Zero window: everything pending is immediately stale.
        let dispatcher = JobDispatcher::new(Arc::clone(&channel) as Arc<dyn MessageChannel>, Duration::ZERO, true);
        let gateway = DocumentGateway::new(Arc::new(stackway_db_memory::InMemoryStore::new()));

        let mut instance = instance_with(vec![("web", vec![])]);
        gateway.write_stack_instance(&instance, None).await.unwrap();
        dispatcher.dispatch_create(&mut instance).await.unwrap();
        while channel.try_poll(WORKER_TOPIC).await.unwrap().is_some() {}

        let redelivered = dispatcher.redeliver_stale(&gateway).await.unwrap();
        assert_eq!(redelivered, 1);
        assert_eq!(channel.depth(WORKER_TOPIC).await, 1);
        // The redelivered job keeps its original idempotency key.
        let job = channel
            .try_poll(WORKER_TOPIC)
            .await
            .unwrap()
            .unwrap()
            .decode_job()
            .unwrap();
        assert_eq!(job.idempotency.sequence, 0);
    }

    #[tokio::test]
    async fn test_redeliver_drops_jobs_for_deleted_instance() {
        let channel = Arc::new(InMemoryChannel::new());
        let dispatcher = JobDispatcher::new(Arc::clone(&channel) as Arc<dyn MessageChannel>, Duration::ZERO, true);
        let gateway = DocumentGateway::new(Arc::new(stackway_db_memory::InMemoryStore::new()));

        let mut instance = instance_with(vec![("web", vec![])]);
        dispatcher.dispatch_create(&mut instance).await.unwrap();
        while channel.try_poll(WORKER_TOPIC).await.unwrap().is_some() {}

        // Instance never persisted: pending entry is discarded, not re-sent.
        let redelivered = dispatcher.redeliver_stale(&gateway).await.unwrap();
        assert_eq!(redelivered, 0);
        assert_eq!(dispatcher.pending_count().await, 0);
        assert_eq!(channel.depth(WORKER_TOPIC).await, 0);
    }
}
