use std::env;
use std::fs;
use std::path::PathBuf;

use serde::Deserialize;
use thiserror::Error;

use crate::engine::EngineKind;

pub const CONFIG_ENV: &str = "SURFACE_BRIDGE_CONFIG";

const DEFAULT_COMMAND_BUFFER_CAPACITY: usize = 256;
const DEFAULT_MAX_PENDING_JOBS: usize = 1000;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read bridge config: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// What happens when a caller breaks a surface invariant (wrong thread,
/// stale handle, duplicate id).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationPolicy {
    /// Log and abort the process.
    Abort,
    /// Log and return the error to the caller.
    Report,
}

impl Default for ViolationPolicy {
    fn default() -> Self {
        if cfg!(debug_assertions) {
            Self::Report
        } else {
            Self::Abort
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub engine: EngineKind,
    pub violation_policy: ViolationPolicy,
    pub command_buffer_capacity: usize,
    pub max_pending_jobs: usize,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            engine: EngineKind::default(),
            violation_policy: ViolationPolicy::default(),
            command_buffer_capacity: DEFAULT_COMMAND_BUFFER_CAPACITY,
            max_pending_jobs: DEFAULT_MAX_PENDING_JOBS,
        }
    }
}

impl BridgeConfig {
    /// Read `config_path` when it exists; defaults otherwise.
    pub fn load(config_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        match config_path {
            Some(path) if path.exists() => {
                let contents = fs::read_to_string(path)?;
                Ok(serde_yaml::from_str(&contents)?)
            }
            _ => Ok(Self::default()),
        }
    }

    /// Load from the file named by `SURFACE_BRIDGE_CONFIG`, if set.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::load(env::var_os(CONFIG_ENV).map(PathBuf::from))
    }

    pub fn with_engine(mut self, engine: EngineKind) -> Self {
        self.engine = engine;
        self
    }

    pub fn with_violation_policy(mut self, policy: ViolationPolicy) -> Self {
        self.violation_policy = policy;
        self
    }
}
