//! Composer configuration

use serde::{Deserialize, Serialize};

/// Default directory persisted entrypoint scripts are mounted at
pub const DEFAULT_SCRIPT_ROOT: &str = "/metrics_operator";

/// Default name of the volume carrying persisted entrypoint scripts
pub const DEFAULT_ENTRYPOINT_VOLUME: &str = "entrypoints";

/// Default command that keeps a container alive
pub const DEFAULT_IDLE_COMMAND: &str = "sleep infinity";

/// Default interpreter for entrypoint scripts
pub const DEFAULT_SHELL: &str = "/bin/bash";

/// Settings that shape rendered scripts and the persistence artifact
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ComposeConfig {
    /// Directory persisted scripts are mounted at
    pub script_root: String,
    /// Name of the volume that mounts persisted scripts
    pub entrypoint_volume: String,
    /// Command used by idle workers and interactive mode
    pub idle_command: String,
    /// Interpreter used to launch scripts
    pub shell: String,
}

impl Default for ComposeConfig {
    fn default() -> Self {
        Self {
            script_root: DEFAULT_SCRIPT_ROOT.to_string(),
            entrypoint_volume: DEFAULT_ENTRYPOINT_VOLUME.to_string(),
            idle_command: DEFAULT_IDLE_COMMAND.to_string(),
            shell: DEFAULT_SHELL.to_string(),
        }
    }
}

impl ComposeConfig {
    /// Override the script mount directory
    pub fn with_script_root(mut self, root: impl Into<String>) -> Self {
        self.script_root = root.into();
        self
    }

    /// Override the entrypoint volume name
    pub fn with_entrypoint_volume(mut self, name: impl Into<String>) -> Self {
        self.entrypoint_volume = name.into();
        self
    }

    /// Override the idle command
    pub fn with_idle_command(mut self, command: impl Into<String>) -> Self {
        self.idle_command = command.into();
        self
    }

    /// Path of a persisted script with artifact key `key`
    pub fn script_path(&self, key: &str) -> String {
        format!("{}/{}.sh", self.script_root.trim_end_matches('/'), key)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = ComposeConfig::default();
        assert_eq!(config.script_root, "/metrics_operator");
        assert_eq!(config.entrypoint_volume, "entrypoints");
        assert_eq!(config.script_path("entrypoint-0"), "/metrics_operator/entrypoint-0.sh");
    }

    #[test]
    fn partial_config_fills_defaults() {
        let config: ComposeConfig = serde_json::from_str(r#"{"scriptRoot": "/scripts/"}"#).unwrap();
        assert_eq!(config.script_path("app-entrypoint"), "/scripts/app-entrypoint.sh");
        assert_eq!(config.idle_command, "sleep infinity");
    }
}
