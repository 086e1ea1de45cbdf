//! Worker process hosting the Stackway engine.
//!
//! Builds the document store and message channel handles once, wires the
//! engine around them, and runs the background loops: the inbound status
//! consumer and the redelivery sweep. The external REST layer calls into the
//! engine through [`Worker::engine`].

use std::sync::Arc;
use std::time::Duration;

use tokio::time::interval;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use stackway_channel::{InMemoryChannel, MessageChannel};
use stackway_config::Settings;
use stackway_db_memory::InMemoryStore;
use stackway_engine::{EngineOptions, StackEngine};
use stackway_storage::DocumentStore;

/// Initializes the global tracing subscriber. `RUST_LOG` overrides the
/// configured level.
pub fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.to_string()));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Maps the deployment settings onto the engine's tuning knobs.
pub fn engine_options(settings: &Settings) -> EngineOptions {
    EngineOptions {
        max_solver_restarts: settings.engine.max_solver_restarts,
        capability_ttl_secs: settings.engine.capability_ttl_secs,
        ordered_delete: settings.engine.ordered_delete,
        inactivity_window: Duration::from_secs(settings.engine.inactivity_window_secs),
    }
}

pub struct Worker {
    engine: Arc<StackEngine>,
    settings: Settings,
}

impl Worker {
    /// Wires a worker from settings. Only the in-memory backends ship
    /// in-tree; anything else in the settings is rejected here rather than
    /// failing obscurely later.
    pub fn from_settings(settings: Settings) -> anyhow::Result<Self> {
        if settings.channel.backend != "memory" {
            anyhow::bail!(
                "unsupported channel backend '{}' (only 'memory' ships in-tree)",
                settings.channel.backend
            );
        }
        let store: Arc<dyn DocumentStore> = Arc::new(InMemoryStore::new());
        let channel: Arc<dyn MessageChannel> = Arc::new(InMemoryChannel::new());
        let engine = Arc::new(StackEngine::new(store, channel, engine_options(&settings)));
        Ok(Self { engine, settings })
    }

    pub fn engine(&self) -> &Arc<StackEngine> {
        &self.engine
    }

    /// Runs the background loops until ctrl-c.
    pub async fn run(&self) -> anyhow::Result<()> {
        let inbound_engine = Arc::clone(&self.engine);
        let inbound = tokio::spawn(async move {
            let reducer = Arc::clone(inbound_engine.reducer());
            if let Err(err) = inbound_engine.dispatcher().run_inbound(&reducer).await {
                error!(error = %err, "inbound status loop terminated");
            }
        });

        let sweep_engine = Arc::clone(&self.engine);
        let sweep_interval = Duration::from_millis(self.settings.channel.sweep_interval_ms);
        let sweep = tokio::spawn(async move {
            let mut ticker = interval(sweep_interval);
            loop {
                ticker.tick().await;
                match sweep_engine
                    .dispatcher()
                    .redeliver_stale(sweep_engine.gateway())
                    .await
                {
                    Ok(redelivered) if redelivered > 0 => {
                        info!(redelivered, "re-emitted unacknowledged jobs");
                    }
                    Ok(_) => {}
                    Err(err) => error!(error = %err, "redelivery sweep failed"),
                }
            }
        });

        info!("worker started");
        tokio::signal::ctrl_c().await?;
        info!("shutdown signal received");
        inbound.abort();
        sweep.abort();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_options_from_settings() {
        let mut settings = Settings::default();
        settings.engine.inactivity_window_secs = 30;
        settings.engine.ordered_delete = false;
        let options = engine_options(&settings);
        assert_eq!(options.inactivity_window, Duration::from_secs(30));
        assert!(!options.ordered_delete);
        assert_eq!(options.max_solver_restarts, 32);
    }

    #[test]
    fn test_unsupported_channel_backend_rejected() {
        let mut settings = Settings::default();
        settings.channel.backend = "redis".to_string();
        assert!(Worker::from_settings(settings).is_err());
    }

    #[test]
    fn test_worker_wires_from_default_settings() {
        let worker = Worker::from_settings(Settings::default()).unwrap();
        let _engine = worker.engine();
    }
}
