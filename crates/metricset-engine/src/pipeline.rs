//! Two-phase composition pipeline
//!
//! 1. Every declaration is resolved, configured and validated before anything
//!    is assembled, so a bad option never produces partial output.
//! 2. Phase 1: metrics assemble their containers and volumes in declared
//!    order, then addons contribute their own support containers and volumes.
//! 3. Phase 2: addons customize the full container set in declared order.
//!    An addon may only rename or move containers it contributed.
//! 4. Scripts are rendered and persisted scripts get their artifact keys.

use std::collections::BTreeSet;

use tracing::{debug, info, warn};

use metricset_common::crd::{Application, MetricSet, MetricSetSpec, OptionBag};
use metricset_common::{Error, Result, APPLICATION_CONTAINER, DEFAULT_JOB_GROUP};

use crate::assembly::AssemblyContext;
use crate::capability::{Addon, Metric, MetricKind, PluginInstance, PluginKind};
use crate::compiled::{CompiledContainer, CompiledMetricSet, Launch, ResolvedPlugin};
use crate::config::ComposeConfig;
use crate::registry::Registry;
use crate::script::ScriptRenderer;
use crate::specs::{
    Command, ContainerSpec, Contributor, EntrypointScript, JobGroup, VolumeSource, VolumeSpec,
};

/// Capability granted to monitors so they can trace the application
const TRACE_CAPABILITY: &str = "SYS_PTRACE";

/// Composes MetricSets against a registry
#[derive(Debug, Clone)]
pub struct Composer<'a> {
    registry: &'a Registry,
    config: ComposeConfig,
}

/// Configured plugins of one composition run
struct Resolved {
    metrics: Vec<Box<dyn Metric>>,
    addons: Vec<Box<dyn Addon>>,
}

impl Resolved {
    fn contributor_name(&self, contributor: Option<Contributor>) -> String {
        match contributor {
            Some(Contributor::Metric(i)) => self.metrics[i].identifier().to_string(),
            Some(Contributor::Addon(i)) => self.addons[i].identifier().to_string(),
            Some(Contributor::Application) | None => "application".to_string(),
        }
    }

    fn summary(&self) -> Vec<ResolvedPlugin> {
        let metrics = self.metrics.iter().map(|m| ResolvedPlugin {
            identifier: m.identifier().to_string(),
            kind: PluginKind::Metric,
            options: m.options(),
        });
        let addons = self.addons.iter().map(|a| ResolvedPlugin {
            identifier: a.identifier().to_string(),
            kind: PluginKind::Addon,
            options: a.options(),
        });
        metrics.chain(addons).collect()
    }
}

/// Intermediate state between the phases
#[derive(Default)]
struct Assembly {
    groups: Vec<JobGroup>,
    containers: Vec<ContainerSpec>,
    volumes: Vec<VolumeSpec>,
}

impl Assembly {
    /// Add a job group, or merge it into an existing one of the same name
    fn merge_group(&mut self, group: JobGroup) {
        match self.groups.iter_mut().find(|g| g.name == group.name) {
            Some(existing) => {
                existing.share_process_namespace |= group.share_process_namespace;
            }
            None => self.groups.push(group),
        }
    }

    fn group(&self, name: &str) -> Option<&JobGroup> {
        self.groups.iter().find(|g| g.name == name)
    }
}

impl<'a> Composer<'a> {
    /// Create a composer with default settings
    pub fn new(registry: &'a Registry) -> Self {
        Self {
            registry,
            config: ComposeConfig::default(),
        }
    }

    /// Override settings
    pub fn with_config(mut self, config: ComposeConfig) -> Self {
        self.config = config;
        self
    }

    /// Active settings
    pub fn config(&self) -> &ComposeConfig {
        &self.config
    }

    /// Compose a MetricSet resource
    pub fn compose(&self, set: &MetricSet) -> Result<CompiledMetricSet> {
        let name = set
            .metadata
            .name
            .as_deref()
            .filter(|n| !n.is_empty())
            .ok_or(Error::MissingName)?;
        self.compose_spec(name, &set.spec)
    }

    /// Compose a declaration named `name`.
    ///
    /// Identical input yields identical output. Any error means nothing was
    /// produced.
    pub fn compose_spec(&self, name: &str, spec: &MetricSetSpec) -> Result<CompiledMetricSet> {
        info!(
            metricset = %name,
            metrics = spec.metrics.len(),
            addons = spec.addons.len(),
            "composing metric set"
        );

        if spec.metrics.is_empty() {
            return Err(Error::NoMetrics);
        }

        let resolved = self.resolve(spec)?;
        let ctx = AssemblyContext {
            set_name: name,
            pods: spec.pods.max(1),
            application: spec.application.as_ref(),
            config: &self.config,
        };

        let mut assembly = self.assemble(&resolved, &ctx)?;
        check_unique(&assembly.containers, &assembly.volumes)?;

        self.customize(&resolved, &mut assembly)?;
        check_unique(&assembly.containers, &assembly.volumes)?;

        let compiled = self.render(name, spec, &resolved, assembly)?;
        info!(
            metricset = %name,
            job_groups = compiled.job_groups.len(),
            containers = compiled.containers.len(),
            volumes = compiled.volumes.len(),
            "composed metric set"
        );
        Ok(compiled)
    }

    // =========================================================================
    // Resolution
    // =========================================================================

    fn resolve(&self, spec: &MetricSetSpec) -> Result<Resolved> {
        let metrics = spec
            .metrics
            .iter()
            .map(|m| self.configure(&m.name, &m.options, PluginKind::Metric)?.into_metric())
            .collect::<Result<Vec<_>>>()?;
        let addons = spec
            .addons
            .iter()
            .map(|a| self.configure(&a.name, &a.options, PluginKind::Addon)?.into_addon())
            .collect::<Result<Vec<_>>>()?;
        Ok(Resolved { metrics, addons })
    }

    fn configure(
        &self,
        identifier: &str,
        options: &OptionBag,
        expected: PluginKind,
    ) -> Result<PluginInstance> {
        let mut instance = self.registry.resolve(identifier).inspect_err(|_| {
            warn!(plugin = %identifier, "unknown plugin");
        })?;
        if instance.kind() != expected {
            return Err(Error::WrongKind {
                identifier: identifier.to_string(),
                expected: expected.describe(),
                actual: instance.kind().describe(),
            });
        }
        instance.set_options(options)?;
        instance.validate().inspect_err(|e| {
            warn!(plugin = %identifier, error = %e, "plugin validation failed");
        })?;
        debug!(plugin = %identifier, kind = ?expected, "configured plugin");
        Ok(instance)
    }

    // =========================================================================
    // Phase 1
    // =========================================================================

    fn assemble(&self, resolved: &Resolved, ctx: &AssemblyContext<'_>) -> Result<Assembly> {
        let mut assembly = Assembly::default();
        let mut has_monitor = false;

        for (index, metric) in resolved.metrics.iter().enumerate() {
            let monitor = metric.kind() == MetricKind::Monitor;
            if metric.requires_application() && complete_application(ctx).is_none() {
                return Err(Error::MissingApplication {
                    plugin: metric.identifier().to_string(),
                });
            }

            if monitor {
                let mut group = JobGroup::new(DEFAULT_JOB_GROUP, ctx.pods);
                group.share_process_namespace = true;
                assembly.merge_group(group);
            } else {
                for group in metric.job_groups(ctx) {
                    assembly.merge_group(group);
                }
            }

            for mut container in metric.assemble_containers(ctx)? {
                container.contributor = Some(Contributor::Metric(index));
                if monitor {
                    container.job_group = DEFAULT_JOB_GROUP.to_string();
                    container.security.add_capability(TRACE_CAPABILITY);
                }
                if assembly.group(&container.job_group).is_none() {
                    return Err(Error::UnknownJobGroup {
                        plugin: metric.identifier().to_string(),
                        job_group: container.job_group,
                    });
                }
                assembly.containers.push(container);
            }
            assembly.volumes.extend(metric.assemble_volumes());
            has_monitor |= monitor;
            debug!(plugin = %metric.identifier(), ?monitor, "assembled metric");
        }

        if has_monitor {
            if let Some(application) = complete_application(ctx) {
                assembly.containers.push(application_container(application));
            }
        }

        for (index, addon) in resolved.addons.iter().enumerate() {
            let scope = addon.scope();
            if !scope.target.is_empty() && assembly.group(&scope.target).is_none() {
                return Err(Error::UnknownJobGroup {
                    plugin: addon.identifier().to_string(),
                    job_group: scope.target.clone(),
                });
            }

            let mut contributed = Vec::new();
            for group in assembly.groups.iter().filter(|g| scope.targets_group(&g.name)) {
                for mut container in addon.assemble_containers(group, ctx)? {
                    container.contributor = Some(Contributor::Addon(index));
                    container.job_group = group.name.clone();
                    contributed.push(container);
                }
            }
            assembly.containers.extend(contributed);
            assembly.volumes.extend(addon.assemble_volumes());
            debug!(plugin = %addon.identifier(), "assembled addon");
        }

        Ok(assembly)
    }

    // =========================================================================
    // Phase 2
    // =========================================================================

    fn customize(&self, resolved: &Resolved, assembly: &mut Assembly) -> Result<()> {
        for (index, addon) in resolved.addons.iter().enumerate() {
            let owner = Some(Contributor::Addon(index));
            let before: Vec<(String, String, Option<Contributor>)> = assembly
                .containers
                .iter()
                .map(|c| (c.name.clone(), c.job_group.clone(), c.contributor))
                .collect();

            addon.customize_entrypoints(&mut assembly.containers, &assembly.groups)?;

            for (container, (name, job_group, contributor)) in
                assembly.containers.iter().zip(before)
            {
                let moved = container.name != name
                    || container.job_group != job_group
                    || container.contributor != contributor;
                if moved && contributor != owner {
                    warn!(
                        plugin = %addon.identifier(),
                        container = %name,
                        job_group = %job_group,
                        "addon modified a container it does not own"
                    );
                    return Err(Error::ForeignContainerModified {
                        plugin: addon.identifier().to_string(),
                        job_group,
                        container: name,
                    });
                }
                if assembly.group(&container.job_group).is_none() {
                    return Err(Error::UnknownJobGroup {
                        plugin: addon.identifier().to_string(),
                        job_group: container.job_group.clone(),
                    });
                }
            }
            debug!(plugin = %addon.identifier(), "customized entrypoints");
        }
        Ok(())
    }

    // =========================================================================
    // Rendering
    // =========================================================================

    fn render(
        &self,
        name: &str,
        spec: &MetricSetSpec,
        resolved: &Resolved,
        assembly: Assembly,
    ) -> Result<CompiledMetricSet> {
        let renderer =
            ScriptRenderer::new(name, &self.config).interactive(spec.logging.interactive);
        let mut anonymous = 0usize;
        let mut keys = BTreeSet::new();
        let Assembly {
            groups,
            containers: assembled,
            volumes,
        } = assembly;
        let mut containers = Vec::with_capacity(assembled.len());

        for container in assembled {
            let group = groups.iter().find(|g| g.name == container.job_group).ok_or_else(|| {
                Error::UnknownJobGroup {
                    plugin: resolved.contributor_name(container.contributor),
                    job_group: container.job_group.clone(),
                }
            })?;
            let script = renderer.render(&container, group)?;

            let launch = if container.persist_script {
                let key = match &container.script.name {
                    Some(script_name) => format!("{script_name}-entrypoint"),
                    None => {
                        let key = format!("entrypoint-{anonymous}");
                        anonymous += 1;
                        key
                    }
                };
                if !keys.insert(key.clone()) {
                    return Err(Error::DuplicateScript { key });
                }
                let path = self.config.script_path(&key);
                Launch::Persisted { key, path }
            } else {
                Launch::Inline
            };

            let command = match &launch {
                Launch::Persisted { path, .. } => vec![self.config.shell.clone(), path.clone()],
                Launch::Inline => vec![self.config.shell.clone(), "-c".to_string(), script.clone()],
            };
            debug!(
                container = %container.name,
                job_group = %container.job_group,
                persisted = container.persist_script,
                "rendered entrypoint"
            );
            containers.push(CompiledContainer {
                spec: container,
                script,
                launch,
                command,
            });
        }

        let entrypoint_volume = (!keys.is_empty()).then(|| {
            let items = keys
                .iter()
                .map(|key| (key.clone(), format!("{key}.sh")))
                .collect();
            VolumeSpec::new(
                &self.config.entrypoint_volume,
                VolumeSource::ConfigMap {
                    name: name.to_string(),
                    items,
                },
                &self.config.script_root,
            )
            .read_only(true)
        });
        if let Some(volume) = &entrypoint_volume {
            if volumes.iter().any(|v| v.name == volume.name) {
                return Err(Error::DuplicateVolume {
                    name: volume.name.clone(),
                });
            }
        }

        Ok(CompiledMetricSet {
            name: name.to_string(),
            job_groups: groups,
            containers,
            volumes,
            entrypoint_volume,
            resolved: resolved.summary(),
        })
    }
}

/// The declared application, when it has both an image and a command
fn complete_application<'a>(ctx: &AssemblyContext<'a>) -> Option<&'a Application> {
    ctx.application.filter(|a| a.is_complete())
}

/// Inline container running the declared application beside its monitors
fn application_container(application: &Application) -> ContainerSpec {
    let script = EntrypointScript::new(Command::new(application.entrypoint()));
    let mut container =
        ContainerSpec::new(APPLICATION_CONTAINER, DEFAULT_JOB_GROUP, &application.image, script)
            .inline();
    container.working_dir = application.working_dir.clone().filter(|d| !d.is_empty());
    container.pull_secret = application.pull_secret.clone().filter(|s| !s.is_empty());
    container.contributor = Some(Contributor::Application);
    container
}

/// Container names are unique per job group; volume names are unique
fn check_unique(containers: &[ContainerSpec], volumes: &[VolumeSpec]) -> Result<()> {
    let mut seen = BTreeSet::new();
    for c in containers {
        if !seen.insert((c.job_group.as_str(), c.name.as_str())) {
            return Err(Error::DuplicateContainer {
                job_group: c.job_group.clone(),
                container: c.name.clone(),
            });
        }
    }
    let mut seen = BTreeSet::new();
    for v in volumes {
        if !seen.insert(v.name.as_str()) {
            return Err(Error::DuplicateVolume {
                name: v.name.clone(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use metricset_common::crd::MetricSpec;

    fn pennant_spec() -> MetricSetSpec {
        MetricSetSpec {
            pods: 2,
            metrics: vec![MetricSpec::new("app-pennant")],
            ..Default::default()
        }
    }

    #[test]
    fn merge_group_ors_process_sharing() {
        let mut assembly = Assembly::default();
        assembly.merge_group(JobGroup::new("m", 2));
        let mut shared = JobGroup::new("m", 5);
        shared.share_process_namespace = true;
        assembly.merge_group(shared);
        assert_eq!(assembly.groups.len(), 1);
        assert_eq!(assembly.groups[0].replicas, 2);
        assert!(assembly.groups[0].share_process_namespace);
    }

    #[test]
    fn duplicate_containers_are_rejected() {
        let script = EntrypointScript::new(Command::new("run"));
        let containers = vec![
            ContainerSpec::new("app", "m", "a", script.clone()),
            ContainerSpec::new("app", "m", "b", script),
        ];
        assert!(matches!(
            check_unique(&containers, &[]),
            Err(Error::DuplicateContainer { .. })
        ));
    }

    #[test]
    fn same_name_in_different_groups_is_fine() {
        let script = EntrypointScript::new(Command::new("run"));
        let containers = vec![
            ContainerSpec::new("app", "launcher", "a", script.clone()),
            ContainerSpec::new("app", "worker", "a", script),
        ];
        check_unique(&containers, &[]).unwrap();
    }

    #[test]
    fn anonymous_scripts_are_numbered_in_order() {
        let compiled = Composer::new(Registry::builtin())
            .compose_spec("pennant", &pennant_spec())
            .unwrap();
        let keys: Vec<_> = compiled
            .containers
            .iter()
            .filter_map(|c| c.script_key())
            .collect();
        assert_eq!(keys, vec!["entrypoint-0", "entrypoint-1"]);
        assert_eq!(
            compiled.containers[0].command,
            vec!["/bin/bash", "/metrics_operator/entrypoint-0.sh"]
        );
    }

    #[test]
    fn entrypoint_volume_projects_every_key() {
        let compiled = Composer::new(Registry::builtin())
            .compose_spec("pennant", &pennant_spec())
            .unwrap();
        let volume = compiled.entrypoint_volume.as_ref().unwrap();
        assert_eq!(volume.name, "entrypoints");
        assert_eq!(volume.path, "/metrics_operator");
        assert!(volume.read_only);
        match &volume.source {
            VolumeSource::ConfigMap { name, items } => {
                assert_eq!(name, "pennant");
                assert_eq!(items["entrypoint-0"], "entrypoint-0.sh");
                assert_eq!(items.len(), 2);
            }
            other => panic!("unexpected source {other:?}"),
        }
    }

    #[test]
    fn custom_config_changes_paths() {
        let config = ComposeConfig::default()
            .with_script_root("/scripts")
            .with_entrypoint_volume("scripts");
        let compiled = Composer::new(Registry::builtin())
            .with_config(config)
            .compose_spec("pennant", &pennant_spec())
            .unwrap();
        assert_eq!(
            compiled.containers[0].launch,
            Launch::Persisted {
                key: "entrypoint-0".to_string(),
                path: "/scripts/entrypoint-0.sh".to_string()
            }
        );
        assert_eq!(compiled.entrypoint_volume.unwrap().name, "scripts");
    }
}
