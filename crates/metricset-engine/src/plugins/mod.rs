//! Built-in metrics and addons

pub mod application;
pub mod hpctoolkit;
pub mod launcher;
pub mod sysstat;
pub mod volumes;

use crate::capability::PluginInstance;
use crate::registry::RegistryBuilder;

pub use application::ApplicationAddon;
pub use hpctoolkit::HpcToolkit;
pub use launcher::LauncherWorker;
pub use sysstat::PidStat;
pub use volumes::VolumeAddon;

/// Register every built-in plugin
pub fn register_builtins(builder: RegistryBuilder) -> RegistryBuilder {
    builder
        // metrics
        .register(|| PluginInstance::Metric(Box::new(LauncherWorker::pennant())))
        .register(|| PluginInstance::Metric(Box::new(LauncherWorker::lammps())))
        .register(|| PluginInstance::Metric(Box::<PidStat>::default()))
        // addons
        .register(|| PluginInstance::Addon(Box::<ApplicationAddon>::default()))
        .register(|| PluginInstance::Addon(Box::<HpcToolkit>::default()))
        .register(|| PluginInstance::Addon(Box::new(VolumeAddon::config_map())))
        .register(|| PluginInstance::Addon(Box::new(VolumeAddon::secret())))
        .register(|| PluginInstance::Addon(Box::new(VolumeAddon::persistent_volume_claim())))
        .register(|| PluginInstance::Addon(Box::new(VolumeAddon::host_path())))
        .register(|| PluginInstance::Addon(Box::new(VolumeAddon::empty_dir())))
}
