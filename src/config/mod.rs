//! Configuration module for pumpflow
//!
//! [`EngineConfig`] holds the knobs the orchestrator reads at
//! construction: worker thread naming, polling cadence while waiting for
//! completion, the default loop bound, event channel capacity and the
//! default log filter. It is stored as pretty JSON.
//!
//! # Example
//!
//! ```ignore
//! use pumpflow::config::EngineConfig;
//!
//! let config = EngineConfig::load_or_default("pumpflow.json");
//! config.save("pumpflow.json")?;
//! ```

use crate::error::{FlowError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default prefix for worker thread names
pub const DEFAULT_WORKER_PREFIX: &str = "pumpflow";

/// Default interval between `is_finished` polls, in milliseconds
pub const DEFAULT_FINISH_POLL_MS: u64 = 5;

/// Default number of passes for a loop wrapper built from config
pub const DEFAULT_LOOP_BOUND: usize = 10;

/// Default capacity of the pipeline event channel
pub const DEFAULT_EVENT_CAPACITY: usize = 1024;

/// Default `EnvFilter` directive used by the binary
pub const DEFAULT_LOG_FILTER: &str = "info,pumpflow=debug";

/// Engine-wide settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Config format version for future compatibility
    pub version: u32,

    /// Worker threads are named `<prefix>-<element>`
    pub worker_name_prefix: String,

    /// How often the orchestrator re-checks `is_finished`
    pub finish_poll_interval_ms: u64,

    pub default_loop_bound: usize,

    /// Bounded capacity of the pipeline event channel
    pub event_channel_capacity: usize,

    pub log_filter: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            version: 1,
            worker_name_prefix: DEFAULT_WORKER_PREFIX.to_string(),
            finish_poll_interval_ms: DEFAULT_FINISH_POLL_MS,
            default_loop_bound: DEFAULT_LOOP_BOUND,
            event_channel_capacity: DEFAULT_EVENT_CAPACITY,
            log_filter: DEFAULT_LOG_FILTER.to_string(),
        }
    }
}

impl EngineConfig {
    pub fn finish_poll_interval(&self) -> Duration {
        Duration::from_millis(self.finish_poll_interval_ms.max(1))
    }

    /// Load a config file from disk
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            FlowError::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;

        serde_json::from_str(&content).map_err(|e| {
            FlowError::Config(format!("Failed to parse config file {:?}: {}", path, e))
        })
    }

    /// Load a config file, returning defaults if any error occurs
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(err) => {
                tracing::debug!("Using default engine config: {}", err);
                Self::default()
            }
        }
    }

    /// Save config file to disk as JSON
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                FlowError::Config(format!("Failed to create config directory: {}", e))
            })?;
        }

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| FlowError::Config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, content).map_err(|e| {
            FlowError::Config(format!("Failed to write config file {:?}: {}", path, e))
        })
    }
}
