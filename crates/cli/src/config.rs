use std::path::Path;

use handoff_core::{Role, RoleRegistry};
use orchestrator::CoordinatorConfig;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{debug, warn};

pub const DEFAULT_CONFIG_PATH: &str = ".handoff/config.toml";

/// Settings read from `.handoff/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HandoffConfig {
    #[serde(default)]
    pub coordinator: CoordinatorConfig,
    /// Extra roles; a role reusing a standard id replaces it.
    #[serde(default)]
    pub roles: Vec<Role>,
}

impl HandoffConfig {
    /// Read config from `path`, falling back to defaults
    pub async fn read(path: &Path) -> Self {
        if !path.exists() {
            debug!(path = %path.display(), "Config file does not exist, using defaults");
            return Self::default();
        }

        match fs::read_to_string(path).await {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => {
                    debug!(path = %path.display(), "Config loaded successfully");
                    config
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Failed to parse config, using defaults");
                    Self::default()
                }
            },
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to read config file, using defaults");
                Self::default()
            }
        }
    }

    pub fn registry(&self) -> handoff_core::Result<RoleRegistry> {
        RoleRegistry::extend_standard(self.roles.clone())
    }
}
