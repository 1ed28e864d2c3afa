//! # vmforge-config: layered configuration loading
//!
//! Hierarchical configuration, lowest to highest precedence:
//! 1. Built-in defaults
//! 2. `~/.config/vmforge/config.toml` (user defaults)
//! 3. `vmforge.toml` (project config, git-tracked)
//! 4. `vmforge.local.toml` (gitignored local overrides)
//! 5. `VMFORGE_*` environment variables

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

mod error;
mod loader;
mod paths;

pub use error::ConfigError;
pub use loader::ConfigLoader;
pub use paths::Paths;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VmforgeConfig {
    pub database: DatabaseConfig,
    pub snapshot: SnapshotConfig,
    pub provisioning: ProvisioningConfig,
    pub projection: ProjectionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { url: "postgres://localhost/vmforge".to_string(), max_connections: 20 }
    }
}

/// Controls the aggregate runtime's snapshotting and concurrency retry
/// behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapshotConfig {
    /// Events-since-last-snapshot threshold before the runtime writes a
    /// new one.
    pub threshold: u64,
    /// How many times `execute` retries a command after a concurrency
    /// conflict before surfacing the failure.
    pub max_retries: u32,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self { threshold: 100, max_retries: 3 }
    }
}

/// Controls the provisioning orchestrator's timing policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvisioningConfig {
    /// Requests stuck in PROVISIONING past this age become eligible for
    /// `resume_stalled`.
    pub stall_threshold_secs: u64,
    /// Budget for one `create_vm` call, covering every stage.
    pub outer_budget_secs: u64,
}

impl Default for ProvisioningConfig {
    fn default() -> Self {
        Self { stall_threshold_secs: 15 * 60, outer_budget_secs: 300 }
    }
}

/// Controls the projection engine's polling cadence and dead-letter
/// retry policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectionConfig {
    pub batch_size: i64,
    pub poll_interval_ms: u64,
    /// Backoff delay, in milliseconds, before each dead-letter retry
    /// attempt. Its length is the retry attempt count.
    pub dead_letter_backoff_ms: Vec<u64>,
}

impl Default for ProjectionConfig {
    fn default() -> Self {
        Self { batch_size: 200, poll_interval_ms: 250, dead_letter_backoff_ms: vec![100, 400, 1600] }
    }
}

impl VmforgeConfig {
    pub fn load() -> anyhow::Result<Self> {
        ConfigLoader::new().load()
    }

    pub fn load_from_dir(project_dir: impl AsRef<Path>) -> anyhow::Result<Self> {
        ConfigLoader::new().with_project_dir(project_dir).load()
    }
}
