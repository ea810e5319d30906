//! Composed MetricSet output types
//!
//! Plain data for the manifest builder: job groups, containers with their
//! rendered scripts and launch commands, volumes, and the config map that
//! carries persisted scripts.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::ConfigMap;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde::Serialize;

use metricset_common::crd::OptionBag;

use crate::capability::PluginKind;
use crate::specs::{ContainerSpec, JobGroup, VolumeSpec};

/// Label carrying the owning MetricSet's name
pub const METRICSET_LABEL: &str = "metricset.flux-framework.org/name";

/// How a container's script reaches it
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Launch {
    /// Stored in the entrypoint config map under `key`, mounted at `path`
    Persisted {
        /// Config map key
        key: String,
        /// Mounted script path
        path: String,
    },
    /// Passed to the shell with `-c`
    Inline,
}

/// A container with its final script
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompiledContainer {
    /// The customized container
    pub spec: ContainerSpec,
    /// Rendered entrypoint script
    pub script: String,
    /// How the script is delivered
    pub launch: Launch,
    /// Container command (argv)
    pub command: Vec<String>,
}

impl CompiledContainer {
    /// Config map key of a persisted script
    pub fn script_key(&self) -> Option<&str> {
        match &self.launch {
            Launch::Persisted { key, .. } => Some(key),
            Launch::Inline => None,
        }
    }
}

/// A resolved declaration with its effective options
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedPlugin {
    /// Registry identifier
    pub identifier: String,
    /// Metric or addon
    pub kind: PluginKind,
    /// Options after defaults were applied
    pub options: OptionBag,
}

/// Complete composition output of one MetricSet
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompiledMetricSet {
    /// MetricSet name
    pub name: String,
    /// Job groups, in first-contribution order
    pub job_groups: Vec<JobGroup>,
    /// Containers, in contribution order
    pub containers: Vec<CompiledContainer>,
    /// Volumes contributed by plugins
    pub volumes: Vec<VolumeSpec>,
    /// Config map volume mounting persisted scripts (absent when every script
    /// is inline)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entrypoint_volume: Option<VolumeSpec>,
    /// Declarations in the order they were applied
    pub resolved: Vec<ResolvedPlugin>,
}

impl CompiledMetricSet {
    /// Containers of one job group
    pub fn containers_in<'a>(
        &'a self,
        job_group: &'a str,
    ) -> impl Iterator<Item = &'a CompiledContainer> + 'a {
        self.containers
            .iter()
            .filter(move |c| c.spec.job_group == job_group)
    }

    /// Container `name` of job group `job_group`
    pub fn container(&self, job_group: &str, name: &str) -> Option<&CompiledContainer> {
        self.containers
            .iter()
            .find(|c| c.spec.job_group == job_group && c.spec.name == name)
    }

    /// Job group by name
    pub fn job_group(&self, name: &str) -> Option<&JobGroup> {
        self.job_groups.iter().find(|g| g.name == name)
    }

    /// Config map data: key to script for every persisted container
    pub fn entrypoint_data(&self) -> BTreeMap<String, String> {
        self.containers
            .iter()
            .filter_map(|c| c.script_key().map(|k| (k.to_string(), c.script.clone())))
            .collect()
    }

    /// Plugin volumes followed by the entrypoint volume
    pub fn all_volumes(&self) -> impl Iterator<Item = &VolumeSpec> {
        self.volumes.iter().chain(self.entrypoint_volume.iter())
    }

    /// Volumes that are mounted into containers, excluding declared-only ones
    pub fn mounted_volumes(&self) -> impl Iterator<Item = &VolumeSpec> {
        self.all_volumes().filter(|v| v.mount)
    }

    /// The config map the collaborator must create before the job.
    ///
    /// `None` when no script is persisted.
    pub fn to_config_map(&self, namespace: &str) -> Option<ConfigMap> {
        let data = self.entrypoint_data();
        if data.is_empty() {
            return None;
        }
        Some(ConfigMap {
            metadata: ObjectMeta {
                name: Some(self.name.clone()),
                namespace: Some(namespace.to_string()),
                labels: Some(BTreeMap::from([(
                    METRICSET_LABEL.to_string(),
                    self.name.clone(),
                )])),
                ..Default::default()
            },
            data: Some(data),
            ..Default::default()
        })
    }
}
