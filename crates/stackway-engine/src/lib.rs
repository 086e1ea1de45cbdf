//! Stack resolution and lifecycle engine for the Stackway control plane.
//!
//! The engine binds SAT services to SIT targets through the constraint
//! solver, materializes stack instances, dispatches per-service provisioning
//! jobs to agents over the message channel, and folds agent status reports
//! back into instance state.

pub mod builder;
pub mod capability;
pub mod dispatcher;
pub mod error;
pub mod locks;
pub mod manager;
mod persist;
pub mod reducer;
pub mod solver;

pub use builder::InstanceBuilder;
pub use capability::{CapabilityResolver, CapabilityRule, NameContainsRule, RefreshPolicy, default_rules};
pub use dispatcher::JobDispatcher;
pub use error::{EngineError, ResolutionError, Result};
pub use locks::LockTable;
pub use manager::StackManager;
pub use reducer::{ReducedOutcome, StatusReducer};
pub use solver::{Resolution, SolverInput, solve};

use std::sync::Arc;
use std::time::Duration;

use stackway_channel::MessageChannel;
use stackway_core::StackInstance;
use stackway_storage::{DocumentGateway, DocumentStore};

/// Tuning knobs for the engine, mapped from the deployment's settings.
#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub max_solver_restarts: u32,
    pub capability_ttl_secs: u64,
    pub ordered_delete: bool,
    pub inactivity_window: Duration,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            max_solver_restarts: 32,
            capability_ttl_secs: 300,
            ordered_delete: true,
            inactivity_window: Duration::from_secs(120),
        }
    }
}

/// The wired engine: manager, dispatcher, and reducer sharing one gateway,
/// one channel handle, and one per-instance lock table. Collaborator handles
/// are injected once at startup; nothing here is ambient global state.
pub struct StackEngine {
    gateway: DocumentGateway,
    manager: StackManager,
    dispatcher: Arc<JobDispatcher>,
    reducer: Arc<StatusReducer>,
}

impl StackEngine {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        channel: Arc<dyn MessageChannel>,
        options: EngineOptions,
    ) -> Self {
        let gateway = DocumentGateway::new(store);
        let locks = Arc::new(LockTable::new());
        let dispatcher = Arc::new(JobDispatcher::new(
            channel,
            options.inactivity_window,
            options.ordered_delete,
        ));
        let resolver = CapabilityResolver::new(gateway.clone(), options.capability_ttl_secs);
        let manager = StackManager::new(
            gateway.clone(),
            resolver,
            Arc::clone(&dispatcher),
            Arc::clone(&locks),
            options.max_solver_restarts,
        );
        let reducer = Arc::new(StatusReducer::new(gateway.clone(), locks));
        Self {
            gateway,
            manager,
            dispatcher,
            reducer,
        }
    }

    pub fn gateway(&self) -> &DocumentGateway {
        &self.gateway
    }

    pub fn manager(&self) -> &StackManager {
        &self.manager
    }

    pub fn dispatcher(&self) -> &Arc<JobDispatcher> {
        &self.dispatcher
    }

    pub fn reducer(&self) -> &Arc<StatusReducer> {
        &self.reducer
    }

    /// Fetches a stack instance, or `None` if absent.
    pub async fn get_stack_instance(&self, name: &str) -> Result<Option<StackInstance>> {
        Ok(self
            .gateway
            .stack_instance(name)
            .await?
            .map(|versioned| versioned.value))
    }

    /// Lists stack instances whose name contains the filter.
    pub async fn list_stack_instances(&self, name_filter: &str) -> Result<Vec<StackInstance>> {
        Ok(self.gateway.stack_instances(name_filter).await?)
    }
}
