use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// The recognized configuration options from spec §6, loaded from a YAML
/// file with field defaults (mirrors `RuntimeConfig` in the source).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub enabled: bool,
    pub dev_mode: bool,
    pub module_home: Option<String>,
    pub preload_api_jars: Vec<String>,
    pub audit_enabled: bool,
    pub audit_queue_size: usize,
    pub runtime: RuntimeSettings,
    pub host_governance_enabled: bool,
    pub host_check_permissions: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            enabled: true,
            dev_mode: false,
            module_home: None,
            preload_api_jars: Vec::new(),
            audit_enabled: true,
            audit_queue_size: 1000,
            runtime: RuntimeSettings::default(),
            host_governance_enabled: true,
            host_check_permissions: true,
        }
    }
}

/// The `runtime.*` subsection of the configuration table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeSettings {
    pub max_history_snapshots: usize,
    pub force_cleanup_delay_seconds: u64,
    pub dying_check_interval_seconds: u64,
    pub default_timeout_ms: u64,
    pub bulkhead_max_concurrent: usize,
    pub bulkhead_acquire_timeout_ms: u64,
    pub global_max_threads: usize,
    pub max_threads_per_module: usize,
    pub default_threads_per_module: usize,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        RuntimeSettings {
            max_history_snapshots: 3,
            force_cleanup_delay_seconds: 30,
            dying_check_interval_seconds: 5,
            default_timeout_ms: 5000,
            bulkhead_max_concurrent: 32,
            bulkhead_acquire_timeout_ms: 1000,
            global_max_threads: 256,
            max_threads_per_module: 16,
            default_threads_per_module: 4,
        }
    }
}

impl Settings {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            source: e,
        })?;
        serde_yaml::from_str(&content).map_err(|e| ConfigError::YamlParse {
            path: path.display().to_string(),
            source: e,
        })
    }
}
