//! Plugin capability model
//!
//! Every plugin implements [`Plugin`] (option parsing, validation, option
//! export). Base metrics additionally implement [`Metric`] and contribute
//! their own containers; addons implement [`Addon`] and customize the
//! containers contributed by others. [`PluginInstance`] is the closed,
//! tagged union the registry hands out.

use serde::Serialize;

use metricset_common::crd::OptionBag;
use metricset_common::{Error, Result, DEFAULT_JOB_GROUP};

use crate::assembly::AssemblyContext;
use crate::options::{OptionReader, OptionWriter};
use crate::specs::{ContainerSpec, JobGroup, VolumeSpec};

// =============================================================================
// Descriptor
// =============================================================================

/// Plugin family, used for discovery
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Family {
    /// Simulations and benchmarks that are the workload
    Simulation,
    /// Performance monitors and tracers
    Performance,
    /// Volumes
    Storage,
    /// Network benchmarks
    Network,
    /// Application containers
    Application,
}

impl Family {
    /// Lowercase family name
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Simulation => "simulation",
            Self::Performance => "performance",
            Self::Storage => "storage",
            Self::Network => "network",
            Self::Application => "application",
        }
    }
}

impl std::fmt::Display for Family {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Family {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "simulation" => Ok(Self::Simulation),
            "performance" => Ok(Self::Performance),
            "storage" => Ok(Self::Storage),
            "network" => Ok(Self::Network),
            "application" => Ok(Self::Application),
            other => Err(format!("unknown plugin family '{other}'")),
        }
    }
}

/// Which capability variant a plugin implements
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PluginKind {
    /// Contributes its own containers
    Metric,
    /// Customizes containers contributed by others
    Addon,
}

impl PluginKind {
    /// Lowercase kind name
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Metric => "metric",
            Self::Addon => "addon",
        }
    }

    /// Article-prefixed name for messages
    pub fn describe(&self) -> &'static str {
        match self {
            Self::Metric => "a metric",
            Self::Addon => "an addon",
        }
    }
}

/// Immutable registration data of a plugin
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginDescriptor {
    /// Globally unique identifier
    pub identifier: String,
    /// One-line human summary
    pub summary: String,
    /// Discovery family
    pub family: Family,
    /// Capability variant
    pub kind: PluginKind,
    /// Default container image
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    /// Upstream project
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl PluginDescriptor {
    /// Describe a metric
    pub fn metric(identifier: &str, family: Family, summary: &str) -> Self {
        Self::new(identifier, family, PluginKind::Metric, summary)
    }

    /// Describe an addon
    pub fn addon(identifier: &str, family: Family, summary: &str) -> Self {
        Self::new(identifier, family, PluginKind::Addon, summary)
    }

    fn new(identifier: &str, family: Family, kind: PluginKind, summary: &str) -> Self {
        Self {
            identifier: identifier.to_string(),
            summary: summary.to_string(),
            family,
            kind,
            image: None,
            url: None,
        }
    }

    /// Set the default image
    pub fn with_image(mut self, image: &str) -> Self {
        self.image = Some(image.to_string());
        self
    }

    /// Set the upstream project URL
    pub fn with_url(mut self, url: &str) -> Self {
        self.url = Some(url.to_string());
        self
    }

    /// Default image, or empty
    pub fn default_image(&self) -> &str {
        self.image.as_deref().unwrap_or_default()
    }
}

// =============================================================================
// Shared contract
// =============================================================================

/// Contract shared by metrics and addons
pub trait Plugin: Send + Sync + std::fmt::Debug {
    /// Registration data
    fn descriptor(&self) -> &PluginDescriptor;

    /// Registry identifier
    fn identifier(&self) -> &str {
        &self.descriptor().identifier
    }

    /// Parse a declaration's options into typed fields.
    ///
    /// Absent keys take their documented default and unknown keys are
    /// ignored; only a value that cannot be parsed is an error.
    fn set_options(&mut self, options: &OptionBag) -> Result<()>;

    /// Check cross-field preconditions, naming the offending field on failure
    fn validate(&self) -> Result<()>;

    /// Export current configuration in the shape `set_options` accepts
    fn options(&self) -> OptionBag;
}

// =============================================================================
// Metrics
// =============================================================================

/// How a metric relates to the job
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    /// The metric is the workload (launcher/worker split)
    Workload,
    /// The metric observes the application's process from its own container
    Monitor,
}

/// A base metric contributing its own containers
pub trait Metric: Plugin {
    /// Workload or monitor
    fn kind(&self) -> MetricKind;

    /// Whether the MetricSet must declare an application
    fn requires_application(&self) -> bool {
        self.kind() == MetricKind::Monitor
    }

    /// Job groups this metric's containers run in
    fn job_groups(&self, ctx: &AssemblyContext<'_>) -> Vec<JobGroup> {
        vec![JobGroup::new(DEFAULT_JOB_GROUP, ctx.pods)]
    }

    /// Primary containers of the metric
    fn assemble_containers(&self, ctx: &AssemblyContext<'_>) -> Result<Vec<ContainerSpec>>;

    /// Volumes the metric needs
    fn assemble_volumes(&self) -> Vec<VolumeSpec> {
        Vec::new()
    }
}

// =============================================================================
// Addons
// =============================================================================

/// Job group and container restriction of an addon
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AddonScope {
    /// Job group to customize; empty means every job group
    pub target: String,
    /// Container whose command is wrapped; empty means every container
    pub container_target: String,
}

impl AddonScope {
    /// Read `target` and `containerTarget`
    pub fn read(reader: &OptionReader<'_>) -> Self {
        Self {
            target: reader.string_or("target", ""),
            container_target: reader.string_or("containerTarget", ""),
        }
    }

    /// Export `target` and `containerTarget`
    pub fn write(&self, writer: OptionWriter) -> OptionWriter {
        writer
            .string("target", &self.target)
            .string("containerTarget", &self.container_target)
    }

    /// True if the addon applies to job group `name`
    pub fn targets_group(&self, name: &str) -> bool {
        self.target.is_empty() || self.target == name
    }

    /// True if the addon rewrites the command of container `name`
    pub fn targets_container(&self, name: &str) -> bool {
        self.container_target.is_empty() || self.container_target == name
    }
}

/// An addon customizing containers contributed by others
pub trait Addon: Plugin {
    /// Job group and container restriction
    fn scope(&self) -> &AddonScope;

    /// Support containers for one targeted job group (e.g. a container that
    /// populates a shared volume). Runs in Phase 1.
    fn assemble_containers(
        &self,
        _group: &JobGroup,
        _ctx: &AssemblyContext<'_>,
    ) -> Result<Vec<ContainerSpec>> {
        Ok(Vec::new())
    }

    /// Volumes the addon itself needs
    fn assemble_volumes(&self) -> Vec<VolumeSpec> {
        Vec::new()
    }

    /// Setup fragment appended to every container of a targeted job group
    fn setup_fragment(&self, _group: &JobGroup) -> Option<String> {
        None
    }

    /// Rewrite the command of a targeted container
    fn wrap_command(&self, _container: &mut ContainerSpec) {}

    /// Customize the full container set in place. Runs in Phase 2.
    ///
    /// The default appends [`Addon::setup_fragment`] to every non-standalone
    /// container of each targeted job group and applies
    /// [`Addon::wrap_command`] to the containers matching `containerTarget`.
    fn customize_entrypoints(
        &self,
        containers: &mut [ContainerSpec],
        groups: &[JobGroup],
    ) -> Result<()> {
        customize_scoped(self, containers, groups);
        Ok(())
    }
}

/// Scoped customization shared by addons that only add setup and wrap commands
pub fn customize_scoped<A: Addon + ?Sized>(
    addon: &A,
    containers: &mut [ContainerSpec],
    groups: &[JobGroup],
) {
    let scope = addon.scope();
    for group in groups.iter().filter(|g| scope.targets_group(&g.name)) {
        let setup = addon.setup_fragment(group);
        for container in containers
            .iter_mut()
            .filter(|c| c.job_group == group.name && !c.standalone)
        {
            if let Some(fragment) = &setup {
                container.script.pre.push(fragment.clone());
            }
            if scope.targets_container(&container.name) {
                addon.wrap_command(container);
            }
        }
    }
}

/// Shared state embedded by addons: descriptor plus scope
#[derive(Clone, Debug)]
pub struct AddonBase {
    /// Registration data
    pub descriptor: PluginDescriptor,
    /// Parsed `target` / `containerTarget`
    pub scope: AddonScope,
}

impl AddonBase {
    /// Wrap a descriptor with an unrestricted scope
    pub fn new(descriptor: PluginDescriptor) -> Self {
        Self {
            descriptor,
            scope: AddonScope::default(),
        }
    }
}

// =============================================================================
// Instances
// =============================================================================

/// A fresh plugin instance, tagged by capability variant
#[derive(Debug)]
pub enum PluginInstance {
    /// Base metric
    Metric(Box<dyn Metric>),
    /// Addon
    Addon(Box<dyn Addon>),
}

impl PluginInstance {
    /// Registration data
    pub fn descriptor(&self) -> &PluginDescriptor {
        match self {
            Self::Metric(m) => m.descriptor(),
            Self::Addon(a) => a.descriptor(),
        }
    }

    /// Capability variant
    pub fn kind(&self) -> PluginKind {
        match self {
            Self::Metric(_) => PluginKind::Metric,
            Self::Addon(_) => PluginKind::Addon,
        }
    }

    /// Parse options
    pub fn set_options(&mut self, options: &OptionBag) -> Result<()> {
        match self {
            Self::Metric(m) => m.set_options(options),
            Self::Addon(a) => a.set_options(options),
        }
    }

    /// Validate
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::Metric(m) => m.validate(),
            Self::Addon(a) => a.validate(),
        }
    }

    /// Export options
    pub fn options(&self) -> OptionBag {
        match self {
            Self::Metric(m) => m.options(),
            Self::Addon(a) => a.options(),
        }
    }

    /// Unwrap a metric, or fail with `WrongKind`
    pub fn into_metric(self) -> Result<Box<dyn Metric>> {
        match self {
            Self::Metric(m) => Ok(m),
            other => Err(other.wrong_kind(PluginKind::Metric)),
        }
    }

    /// Unwrap an addon, or fail with `WrongKind`
    pub fn into_addon(self) -> Result<Box<dyn Addon>> {
        match self {
            Self::Addon(a) => Ok(a),
            other => Err(other.wrong_kind(PluginKind::Addon)),
        }
    }

    fn wrong_kind(&self, expected: PluginKind) -> Error {
        Error::WrongKind {
            identifier: self.descriptor().identifier.clone(),
            expected: expected.describe(),
            actual: self.kind().describe(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::specs::{Command, EntrypointScript};

    #[derive(Debug)]
    struct Wrapper {
        base: AddonBase,
    }

    impl Plugin for Wrapper {
        fn descriptor(&self) -> &PluginDescriptor {
            &self.base.descriptor
        }
        fn set_options(&mut self, options: &OptionBag) -> Result<()> {
            self.base.scope = AddonScope::read(&OptionReader::new(self.identifier(), options));
            Ok(())
        }
        fn validate(&self) -> Result<()> {
            Ok(())
        }
        fn options(&self) -> OptionBag {
            self.base.scope.write(OptionWriter::new()).finish()
        }
    }

    impl Addon for Wrapper {
        fn scope(&self) -> &AddonScope {
            &self.base.scope
        }
        fn setup_fragment(&self, group: &JobGroup) -> Option<String> {
            Some(format!("echo setup {}", group.name))
        }
        fn wrap_command(&self, container: &mut ContainerSpec) {
            container.script.command.wrap("strace", "");
        }
    }

    fn container(name: &str, group: &str) -> ContainerSpec {
        ContainerSpec::new(name, group, "image", EntrypointScript::new(Command::new("run")))
    }

    fn wrapper(options: OptionBag) -> Wrapper {
        let mut w = Wrapper {
            base: AddonBase::new(PluginDescriptor::addon("wrapper", Family::Performance, "test")),
        };
        w.set_options(&options).unwrap();
        w
    }

    #[test]
    fn scope_defaults_to_everything() {
        let scope = AddonScope::default();
        assert!(scope.targets_group("launcher"));
        assert!(scope.targets_container("anything"));
    }

    #[test]
    fn scoped_customization_respects_target_and_container_target() {
        let addon = wrapper(
            OptionBag::new()
                .with("target", "launcher")
                .with("containerTarget", "app"),
        );
        let groups = vec![JobGroup::new("launcher", 1), JobGroup::new("worker", 1)];
        let mut containers = vec![
            container("app", "launcher"),
            container("sidecar", "launcher"),
            container("app", "worker"),
        ];

        addon.customize_entrypoints(&mut containers, &groups).unwrap();

        assert_eq!(containers[0].script.pre, vec!["echo setup launcher"]);
        assert_eq!(containers[0].script.command.render(), "strace run");
        assert_eq!(containers[1].script.pre, vec!["echo setup launcher"]);
        assert_eq!(containers[1].script.command.render(), "run");
        assert!(containers[2].script.pre.is_empty());
        assert_eq!(containers[2].script.command.render(), "run");
    }

    #[test]
    fn standalone_containers_are_skipped() {
        let addon = wrapper(OptionBag::new());
        let groups = vec![JobGroup::new("m", 1)];
        let mut containers = vec![container("helper", "m").standalone()];
        addon.customize_entrypoints(&mut containers, &groups).unwrap();
        assert!(containers[0].script.pre.is_empty());
        assert_eq!(containers[0].script.command.render(), "run");
    }

    #[test]
    fn family_parses_case_insensitively() {
        assert_eq!("Storage".parse::<Family>().unwrap(), Family::Storage);
        assert!("quantum".parse::<Family>().is_err());
    }
}
