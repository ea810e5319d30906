//! MetricSet composition engine
//!
//! Turns a declared `MetricSet` (application plus ordered metric and addon
//! declarations) into job groups, containers, volumes, and entrypoint scripts:
//!
//! - [`registry`] maps identifiers to fresh plugin instances
//! - [`capability`] is the contract metrics and addons implement
//! - [`pipeline`] runs resolution, Phase 1 assembly, Phase 2 customization
//!   and rendering
//! - [`script`] renders scripts with the log marker protocol
//!
//! The engine performs no I/O. Callers create the entrypoint config map and
//! translate [`CompiledMetricSet`] into pod templates.

pub mod assembly;
pub mod capability;
pub mod compiled;
pub mod config;
pub mod options;
pub mod pipeline;
pub mod plugins;
pub mod registry;
pub mod script;
pub mod specs;

pub use assembly::AssemblyContext;
pub use capability::{
    customize_scoped, Addon, AddonBase, AddonScope, Family, Metric, MetricKind, Plugin,
    PluginDescriptor, PluginInstance, PluginKind,
};
pub use compiled::{CompiledContainer, CompiledMetricSet, Launch, ResolvedPlugin};
pub use config::ComposeConfig;
pub use pipeline::Composer;
pub use registry::{PluginFactory, Registry, RegistryBuilder};
pub use specs::{
    Command, ContainerSpec, Contributor, EntrypointScript, JobGroup, Resources,
    SecurityAttributes, VolumeSource, VolumeSpec,
};
