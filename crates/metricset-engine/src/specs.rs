//! Container, volume, and job group specs produced by plugins
//!
//! These are plain data handed to the manifest builder. Plugins create them
//! in Phase 1; addons mutate them in place during Phase 2.

use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use serde::{Deserialize, Serialize};

// =============================================================================
// Job groups
// =============================================================================

/// A named set of containers that run together as one replica unit
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct JobGroup {
    /// Job group name (e.g. "launcher", "worker")
    pub name: String,
    /// Number of replicas
    pub replicas: u32,
    /// Containers in the group must see each other's processes
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub share_process_namespace: bool,
}

impl JobGroup {
    /// Create a job group
    pub fn new(name: impl Into<String>, replicas: u32) -> Self {
        Self {
            name: name.into(),
            replicas,
            share_process_namespace: false,
        }
    }
}

// =============================================================================
// Command and entrypoint script
// =============================================================================

/// The measured invocation of a container.
///
/// `launcher` is a fixed prefix such as `mpirun --hostfile ./hostlist.txt`;
/// addons wrap `invocation` only, so instrumentation lands inside the
/// launcher rather than around it.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Command {
    /// Launcher prefix, kept outside any wrapping
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub launcher: Option<String>,
    /// The (possibly wrapped) invocation
    pub invocation: String,
}

impl Command {
    /// Create a command with no launcher
    pub fn new(invocation: impl Into<String>) -> Self {
        Self {
            launcher: None,
            invocation: invocation.into(),
        }
    }

    /// Set the launcher prefix (ignored when empty)
    pub fn with_launcher(mut self, launcher: impl Into<String>) -> Self {
        let launcher = launcher.into();
        self.launcher = (!launcher.trim().is_empty()).then_some(launcher);
        self
    }

    /// Surround the current invocation with `prefix` and `suffix`.
    ///
    /// Wraps nest: the most recent wrap is outermost.
    pub fn wrap(&mut self, prefix: &str, suffix: &str) {
        let mut wrapped = String::new();
        for part in [prefix.trim(), self.invocation.trim(), suffix.trim()] {
            if part.is_empty() {
                continue;
            }
            if !wrapped.is_empty() {
                wrapped.push(' ');
            }
            wrapped.push_str(part);
        }
        self.invocation = wrapped;
    }

    /// The full command line: launcher followed by invocation
    pub fn render(&self) -> String {
        match &self.launcher {
            Some(launcher) => format!("{} {}", launcher.trim(), self.invocation),
            None => self.invocation.clone(),
        }
    }
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.render())
    }
}

/// Unrendered entrypoint script of one container.
///
/// Fragments are append-only: Pre fragments contributed by the plugin that
/// assembled the container come first, followed by addon fragments in
/// declared addon order.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EntrypointScript {
    /// Explicit script name; anonymous scripts are numbered by the composer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Setup fragments, in contribution order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pre: Vec<String>,
    /// The measured command
    pub command: Command,
    /// Teardown fragments, in contribution order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub post: Vec<String>,
}

impl EntrypointScript {
    /// Create an anonymous script around a command
    pub fn new(command: Command) -> Self {
        Self {
            command,
            ..Default::default()
        }
    }

    /// Give the script an explicit name
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Append a setup fragment
    pub fn with_pre(mut self, fragment: impl Into<String>) -> Self {
        self.pre.push(fragment.into());
        self
    }

    /// Append a teardown fragment
    pub fn with_post(mut self, fragment: impl Into<String>) -> Self {
        self.post.push(fragment.into());
        self
    }
}

// =============================================================================
// Container
// =============================================================================

/// Resource requests and limits, passed through verbatim
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Resources {
    /// Resource limits (cpu, memory, ...)
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub limits: BTreeMap<String, IntOrString>,
    /// Resource requests
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub requests: BTreeMap<String, IntOrString>,
}

/// Security attributes of a container
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SecurityAttributes {
    /// Run privileged
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub privileged: bool,
    /// Linux capabilities to add, deduplicated, in insertion order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub capabilities: Vec<String>,
}

impl SecurityAttributes {
    /// Add a capability unless already present
    pub fn add_capability(&mut self, capability: &str) {
        if !self.capabilities.iter().any(|c| c == capability) {
            self.capabilities.push(capability.to_string());
        }
    }
}

/// Which declaration contributed a container
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum Contributor {
    /// The MetricSet's declared application
    Application,
    /// `spec.metrics[index]`
    Metric(usize),
    /// `spec.addons[index]`
    Addon(usize),
}

/// A container contributed by a plugin
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ContainerSpec {
    /// Container name, unique within its job group
    pub name: String,
    /// Job group this container runs in
    pub job_group: String,
    /// Container image
    pub image: String,
    /// Working directory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<String>,
    /// Image pull secret
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pull_secret: Option<String>,
    /// Resource requests and limits
    #[serde(default)]
    pub resources: Resources,
    /// Security attributes
    #[serde(default)]
    pub security: SecurityAttributes,
    /// Entrypoint script fragments
    pub script: EntrypointScript,
    /// The script is written to a config artifact and mounted back, rather
    /// than passed inline to the shell
    pub persist_script: bool,
    /// Support container owned by an addon; not customized in Phase 2
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub standalone: bool,
    /// Set by the composer after assembly
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contributor: Option<Contributor>,
}

impl ContainerSpec {
    /// Create a container whose script is persisted
    pub fn new(
        name: impl Into<String>,
        job_group: impl Into<String>,
        image: impl Into<String>,
        script: EntrypointScript,
    ) -> Self {
        Self {
            name: name.into(),
            job_group: job_group.into(),
            image: image.into(),
            working_dir: None,
            pull_secret: None,
            resources: Resources::default(),
            security: SecurityAttributes::default(),
            script,
            persist_script: true,
            standalone: false,
            contributor: None,
        }
    }

    /// Set the working directory (ignored when empty)
    pub fn with_working_dir(mut self, dir: impl Into<String>) -> Self {
        let dir = dir.into();
        self.working_dir = (!dir.is_empty()).then_some(dir);
        self
    }

    /// Pass the script inline instead of persisting it
    pub fn inline(mut self) -> Self {
        self.persist_script = false;
        self
    }

    /// Mark as an addon support container
    pub fn standalone(mut self) -> Self {
        self.standalone = true;
        self
    }
}

// =============================================================================
// Volumes
// =============================================================================

/// The underlying volume definition
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum VolumeSource {
    /// Scratch space living as long as the pod
    EmptyDir,
    /// Existing config map, projecting `items` (key -> relative path)
    #[serde(rename_all = "camelCase")]
    ConfigMap {
        /// Config map name
        name: String,
        /// Key to path projections
        items: BTreeMap<String, String>,
    },
    /// Existing persistent volume claim
    #[serde(rename_all = "camelCase")]
    PersistentVolumeClaim {
        /// Claim name
        claim_name: String,
    },
    /// Existing secret
    #[serde(rename_all = "camelCase")]
    Secret {
        /// Secret name
        secret_name: String,
    },
    /// Path on the node
    HostPath {
        /// Host path
        path: String,
    },
}

/// A volume contributed by a plugin
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct VolumeSpec {
    /// Volume name, unique across the composition
    pub name: String,
    /// Volume definition
    pub source: VolumeSource,
    /// Mount path inside containers
    pub path: String,
    /// Mount read-only
    pub read_only: bool,
    /// Mount into containers; false means declared only
    pub mount: bool,
}

impl VolumeSpec {
    /// Create a mounted, writable volume
    pub fn new(name: impl Into<String>, source: VolumeSource, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source,
            path: path.into(),
            read_only: false,
            mount: true,
        }
    }

    /// Set read-only
    pub fn read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    /// Declare the volume on the pod without mounting it into containers
    pub fn declared_only(mut self) -> Self {
        self.mount = false;
        self
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn command_render_keeps_launcher_outside_wraps() {
        let mut command =
            Command::new("pennant /opt/test.pnt").with_launcher("mpirun --hostfile ./hostlist.txt");
        command.wrap("hpcrun -e IO", "");
        assert_eq!(
            command.render(),
            "mpirun --hostfile ./hostlist.txt hpcrun -e IO pennant /opt/test.pnt"
        );
    }

    #[test]
    fn wraps_nest_last_outermost() {
        let mut command = Command::new("app");
        command.wrap("first", "");
        command.wrap("second", "--end");
        assert_eq!(command.render(), "second first app --end");
    }

    #[test]
    fn empty_launcher_is_dropped() {
        let command = Command::new("lmp").with_launcher("  ");
        assert!(command.launcher.is_none());
        assert_eq!(command.to_string(), "lmp");
    }

    #[test]
    fn capabilities_are_deduplicated() {
        let mut security = SecurityAttributes::default();
        security.add_capability("SYS_PTRACE");
        security.add_capability("SYS_ADMIN");
        security.add_capability("SYS_PTRACE");
        assert_eq!(security.capabilities, vec!["SYS_PTRACE", "SYS_ADMIN"]);
    }

    #[test]
    fn volume_source_serializes_camel_case() {
        let volume = VolumeSpec::new(
            "data",
            VolumeSource::PersistentVolumeClaim {
                claim_name: "data-pvc".to_string(),
            },
            "/data",
        );
        let json = serde_json::to_value(&volume).unwrap();
        assert_eq!(
            json["source"]["persistentVolumeClaim"]["claimName"],
            "data-pvc"
        );
        assert_eq!(json["readOnly"], false);
    }
}
