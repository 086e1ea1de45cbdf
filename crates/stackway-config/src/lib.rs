//! Runtime settings for the Stackway control plane.
//!
//! Settings load from an optional `stackway.toml` file with
//! `STACKWAY__`-prefixed environment variable overrides, e.g.
//! `STACKWAY__ENGINE__INACTIVITY_WINDOW_SECS=60`.

use serde::{Deserialize, Serialize};

/// Error type for settings loading and validation.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Settings build error: {0}")]
    Build(#[from] config::ConfigError),

    #[error("Settings validation error: {0}")]
    Validation(String),
}

/// Top-level settings tree.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    #[serde(default)]
    pub engine: EngineSettings,
    #[serde(default)]
    pub channel: ChannelSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
}

/// Settings governing resolution and job dispatch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineSettings {
    /// Upper bound on replica-expansion restarts of the constraint solver.
    #[serde(default = "default_max_solver_restarts")]
    pub max_solver_restarts: u32,
    /// Age in seconds after which a SIT's cached capability maps are rebuilt
    /// under the `Auto` refresh policy.
    #[serde(default = "default_capability_ttl_secs")]
    pub capability_ttl_secs: u64,
    /// Emit per-service delete jobs dependents-before-dependencies.
    #[serde(default = "default_true")]
    pub ordered_delete: bool,
    /// Seconds without an acknowledgement before an outbound job is
    /// re-emitted.
    #[serde(default = "default_inactivity_window_secs")]
    pub inactivity_window_secs: u64,
}

fn default_max_solver_restarts() -> u32 {
    32
}

fn default_capability_ttl_secs() -> u64 {
    300
}

fn default_inactivity_window_secs() -> u64 {
    120
}

fn default_true() -> bool {
    true
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            max_solver_restarts: default_max_solver_restarts(),
            capability_ttl_secs: default_capability_ttl_secs(),
            ordered_delete: true,
            inactivity_window_secs: default_inactivity_window_secs(),
        }
    }
}

/// Settings for the message channel transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelSettings {
    /// Channel backend name; only `memory` ships in-tree.
    #[serde(default = "default_channel_backend")]
    pub backend: String,
    /// Interval in milliseconds between redelivery sweeps.
    #[serde(default = "default_sweep_interval_ms")]
    pub sweep_interval_ms: u64,
}

fn default_channel_backend() -> String {
    "memory".to_string()
}

fn default_sweep_interval_ms() -> u64 {
    5_000
}

impl Default for ChannelSettings {
    fn default() -> Self {
        Self {
            backend: default_channel_backend(),
            sweep_interval_ms: default_sweep_interval_ms(),
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Settings {
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.engine.max_solver_restarts == 0 {
            return Err(SettingsError::Validation(
                "engine.max_solver_restarts must be > 0".into(),
            ));
        }
        if self.engine.inactivity_window_secs == 0 {
            return Err(SettingsError::Validation(
                "engine.inactivity_window_secs must be > 0".into(),
            ));
        }
        if self.channel.sweep_interval_ms == 0 {
            return Err(SettingsError::Validation(
                "channel.sweep_interval_ms must be > 0".into(),
            ));
        }
        let level = self.logging.level.to_ascii_lowercase();
        let valid_levels = ["trace", "debug", "info", "warn", "error", "off"];
        if !valid_levels.contains(&level.as_str()) {
            return Err(SettingsError::Validation(format!(
                "logging.level must be one of {valid_levels:?}"
            )));
        }
        Ok(())
    }
}

pub mod loader {
    use super::{Settings, SettingsError};
    use config::{Config, Environment, File};
    use std::path::PathBuf;

    /// Loads settings from an optional file path plus environment overrides.
    ///
    /// With no path, a root-level `stackway.toml` is used when present.
    pub fn load_settings(path: Option<&str>) -> Result<Settings, SettingsError> {
        let mut builder = Config::builder();
        match path {
            Some(p) => {
                let pathbuf = PathBuf::from(p);
                if pathbuf.exists() {
                    builder = builder.add_source(File::from(pathbuf));
                }
            }
            None => {
                let default_path = PathBuf::from("stackway.toml");
                if default_path.exists() {
                    builder = builder.add_source(File::from(default_path));
                }
            }
        }
        builder = builder.add_source(
            Environment::with_prefix("STACKWAY")
                .try_parsing(true)
                .separator("__"),
        );
        let merged: Settings = builder.build()?.try_deserialize()?;
        merged.validate()?;
        Ok(merged)
    }
}
