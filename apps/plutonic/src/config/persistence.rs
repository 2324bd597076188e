//! State persistence configuration.

use serde::{Deserialize, Serialize};

/// Where order and position state is saved between runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// Save on shutdown and reload on startup.
    #[serde(default)]
    pub enabled: bool,
    /// JSON state file.
    #[serde(default = "default_state_path")]
    pub path: String,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            path: default_state_path(),
        }
    }
}

fn default_state_path() -> String {
    "data/plutonic-state.json".to_string()
}
