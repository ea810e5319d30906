//! Read-only context handed to plugins during Phase 1

use metricset_common::crd::Application;

use crate::config::ComposeConfig;

/// What a plugin may see of the MetricSet while assembling containers
#[derive(Clone, Copy, Debug)]
pub struct AssemblyContext<'a> {
    /// MetricSet name
    pub set_name: &'a str,
    /// Declared pod count
    pub pods: u32,
    /// Declared application, if any
    pub application: Option<&'a Application>,
    /// Composer settings
    pub config: &'a ComposeConfig,
}

impl<'a> AssemblyContext<'a> {
    /// Application command, or empty
    pub fn application_command(&self) -> &'a str {
        self.application.map(|a| a.command.as_str()).unwrap_or_default()
    }

    /// Replicas for a worker group beside a single launcher
    pub fn worker_replicas(&self) -> u32 {
        self.pods.saturating_sub(1).max(1)
    }

    /// Hostname of replica `index` in job group `group`, as resolvable
    /// inside the job's headless service
    pub fn hostname(&self, group: &str, index: u32) -> String {
        format!("{set}-{group}-0-{index}.{set}", set = self.set_name)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn context(config: &ComposeConfig, pods: u32) -> AssemblyContext<'_> {
        AssemblyContext {
            set_name: "pennant",
            pods,
            application: None,
            config,
        }
    }

    #[test]
    fn worker_replicas_never_zero() {
        let config = ComposeConfig::default();
        assert_eq!(context(&config, 1).worker_replicas(), 1);
        assert_eq!(context(&config, 4).worker_replicas(), 3);
    }

    #[test]
    fn hostname_format() {
        let config = ComposeConfig::default();
        assert_eq!(
            context(&config, 2).hostname("worker", 1),
            "pennant-worker-0-1.pennant"
        );
    }

    #[test]
    fn missing_application_has_empty_command() {
        let config = ComposeConfig::default();
        assert_eq!(context(&config, 1).application_command(), "");
    }
}
