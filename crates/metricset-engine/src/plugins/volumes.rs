//! Volume addons
//!
//! Each addon exposes one existing (or scratch) volume to every container of
//! the composition. They never touch entrypoint scripts.

use std::collections::BTreeMap;

use metricset_common::crd::OptionBag;
use metricset_common::{Error, Result};

use crate::capability::{Addon, AddonBase, AddonScope, Family, Plugin, PluginDescriptor};
use crate::options::{OptionReader, OptionWriter};
use crate::specs::{VolumeSource, VolumeSpec};

/// Source-specific options of a volume addon
#[derive(Clone, Debug, PartialEq, Eq)]
enum SourceOptions {
    ConfigMap {
        config_map_name: String,
        items: BTreeMap<String, String>,
    },
    Secret {
        secret_name: String,
    },
    PersistentVolumeClaim {
        claim_name: String,
    },
    HostPath {
        host_path: String,
    },
    EmptyDir,
}

impl SourceOptions {
    fn read(&self, reader: &OptionReader<'_>) -> Self {
        match self {
            Self::ConfigMap { .. } => Self::ConfigMap {
                config_map_name: reader.string_or("configMapName", ""),
                items: reader.string_map("items"),
            },
            Self::Secret { .. } => Self::Secret {
                secret_name: reader.string_or("secretName", ""),
            },
            Self::PersistentVolumeClaim { .. } => Self::PersistentVolumeClaim {
                claim_name: reader.string_or("claimName", ""),
            },
            Self::HostPath { .. } => Self::HostPath {
                host_path: reader.string_or("hostPath", ""),
            },
            Self::EmptyDir => Self::EmptyDir,
        }
    }

    fn write(&self, writer: OptionWriter) -> OptionWriter {
        match self {
            Self::ConfigMap {
                config_map_name,
                items,
            } => writer
                .string("configMapName", config_map_name)
                .string_map("items", items),
            Self::Secret { secret_name } => writer.string("secretName", secret_name),
            Self::PersistentVolumeClaim { claim_name } => writer.string("claimName", claim_name),
            Self::HostPath { host_path } => writer.string("hostPath", host_path),
            Self::EmptyDir => writer,
        }
    }

    /// The required source reference, as (option key, value)
    fn reference(&self) -> Option<(&'static str, &str)> {
        match self {
            Self::ConfigMap {
                config_map_name, ..
            } => Some(("configMapName", config_map_name)),
            Self::Secret { secret_name } => Some(("secretName", secret_name)),
            Self::PersistentVolumeClaim { claim_name } => Some(("claimName", claim_name)),
            Self::HostPath { host_path } => Some(("hostPath", host_path)),
            Self::EmptyDir => None,
        }
    }

    fn to_source(&self) -> VolumeSource {
        match self {
            Self::ConfigMap {
                config_map_name,
                items,
            } => VolumeSource::ConfigMap {
                name: config_map_name.clone(),
                items: items.clone(),
            },
            Self::Secret { secret_name } => VolumeSource::Secret {
                secret_name: secret_name.clone(),
            },
            Self::PersistentVolumeClaim { claim_name } => VolumeSource::PersistentVolumeClaim {
                claim_name: claim_name.clone(),
            },
            Self::HostPath { host_path } => VolumeSource::HostPath {
                path: host_path.clone(),
            },
            Self::EmptyDir => VolumeSource::EmptyDir,
        }
    }
}

/// An addon that mounts one volume at `path`
#[derive(Clone, Debug)]
pub struct VolumeAddon {
    base: AddonBase,
    name: String,
    path: String,
    read_only: bool,
    declare_only: bool,
    source: SourceOptions,
}

impl VolumeAddon {
    fn new(identifier: &str, summary: &str, source: SourceOptions) -> Self {
        Self {
            base: AddonBase::new(PluginDescriptor::addon(identifier, Family::Storage, summary)),
            name: String::new(),
            path: String::new(),
            read_only: false,
            declare_only: false,
            source,
        }
    }

    /// `volume-cm`: an existing config map
    pub fn config_map() -> Self {
        Self::new(
            "volume-cm",
            "config map volume type",
            SourceOptions::ConfigMap {
                config_map_name: String::new(),
                items: BTreeMap::new(),
            },
        )
    }

    /// `volume-secret`: an existing secret
    pub fn secret() -> Self {
        Self::new(
            "volume-secret",
            "secret volume type",
            SourceOptions::Secret {
                secret_name: String::new(),
            },
        )
    }

    /// `volume-pvc`: an existing persistent volume claim
    pub fn persistent_volume_claim() -> Self {
        Self::new(
            "volume-pvc",
            "persistent volume claim volume type",
            SourceOptions::PersistentVolumeClaim {
                claim_name: String::new(),
            },
        )
    }

    /// `volume-hostpath`: a path on the node
    pub fn host_path() -> Self {
        Self::new(
            "volume-hostpath",
            "host path volume type",
            SourceOptions::HostPath {
                host_path: String::new(),
            },
        )
    }

    /// `volume-empty`: pod-lifetime scratch space
    pub fn empty_dir() -> Self {
        Self::new("volume-empty", "empty volume type", SourceOptions::EmptyDir)
    }
}

impl Plugin for VolumeAddon {
    fn descriptor(&self) -> &PluginDescriptor {
        &self.base.descriptor
    }

    fn set_options(&mut self, options: &OptionBag) -> Result<()> {
        let reader = OptionReader::new(&self.base.descriptor.identifier, options);
        self.name = reader.string_or("name", "");
        self.path = reader.string_or("path", "");
        self.read_only = reader.flag("readOnly");
        self.declare_only = reader.flag("declareOnly");
        self.source = self.source.read(&reader);
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        let id = self.identifier();
        if self.name.is_empty() {
            return Err(Error::validation(id, "name", "volume addons require a 'name'"));
        }
        if self.path.is_empty() {
            return Err(Error::validation(
                id,
                "path",
                "volume addons require a 'path' for the container mount",
            ));
        }
        if let Some((key, value)) = self.source.reference() {
            if value.is_empty() {
                return Err(Error::validation(id, key, format!("'{key}' is required")));
            }
        }
        Ok(())
    }

    fn options(&self) -> OptionBag {
        let writer = OptionWriter::new()
            .string("name", &self.name)
            .string("path", &self.path)
            .flag("readOnly", self.read_only)
            .flag("declareOnly", self.declare_only);
        self.source.write(writer).finish()
    }
}

impl Addon for VolumeAddon {
    fn scope(&self) -> &AddonScope {
        &self.base.scope
    }

    fn assemble_volumes(&self) -> Vec<VolumeSpec> {
        let volume =
            VolumeSpec::new(&self.name, self.source.to_source(), &self.path).read_only(self.read_only);
        if self.declare_only {
            vec![volume.declared_only()]
        } else {
            vec![volume]
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;

    fn configured(mut addon: VolumeAddon, options: OptionBag) -> VolumeAddon {
        addon.set_options(&options).unwrap();
        addon
    }

    #[test]
    fn config_map_volume_with_items() {
        let addon = configured(
            VolumeAddon::config_map(),
            OptionBag::new()
                .with("name", "inputs")
                .with("path", "/data/inputs")
                .with("configMapName", "pennant-inputs")
                .with("readOnly", "yes")
                .with_map("items", [("sedov", "sedov.pnt")]),
        );
        addon.validate().unwrap();

        let volumes = addon.assemble_volumes();
        assert_eq!(volumes.len(), 1);
        assert_eq!(volumes[0].name, "inputs");
        assert_eq!(volumes[0].path, "/data/inputs");
        assert!(volumes[0].read_only);
        match &volumes[0].source {
            VolumeSource::ConfigMap { name, items } => {
                assert_eq!(name, "pennant-inputs");
                assert_eq!(items["sedov"], "sedov.pnt");
            }
            other => panic!("unexpected source {other:?}"),
        }
    }

    #[test]
    fn declare_only_volume_is_not_mounted() {
        let base = OptionBag::new().with("name", "scratch").with("path", "/scratch");
        let mounted = configured(VolumeAddon::empty_dir(), base.clone());
        assert!(mounted.assemble_volumes()[0].mount);

        let declared = configured(VolumeAddon::empty_dir(), base.with("declareOnly", "true"));
        let volumes = declared.assemble_volumes();
        assert!(!volumes[0].mount);
        assert_eq!(volumes[0].path, "/scratch");
        assert_eq!(
            declared.options().options.get("declareOnly"),
            Some(&IntOrString::String("true".to_string()))
        );
    }

    #[test]
    fn missing_reference_names_field() {
        let addon = configured(
            VolumeAddon::persistent_volume_claim(),
            OptionBag::new().with("name", "data").with("path", "/data"),
        );
        match addon.validate() {
            Err(Error::Validation { plugin, field, .. }) => {
                assert_eq!(plugin, "volume-pvc");
                assert_eq!(field, "claimName");
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn missing_path_fails() {
        let addon = configured(VolumeAddon::empty_dir(), OptionBag::new().with("name", "scratch"));
        assert!(matches!(
            addon.validate(),
            Err(Error::Validation { field, .. }) if field == "path"
        ));
    }

    #[test]
    fn options_round_trip() {
        let addon = configured(
            VolumeAddon::host_path(),
            OptionBag::new()
                .with("name", "scratch")
                .with("path", "/scratch")
                .with("hostPath", "/mnt/scratch"),
        );
        let exported = addon.options();
        let again = configured(VolumeAddon::host_path(), exported.clone());
        assert_eq!(again.options(), exported);
    }

    #[test]
    fn set_options_is_idempotent() {
        let options = OptionBag::new()
            .with("name", "creds")
            .with("path", "/creds")
            .with("secretName", "registry");
        let mut addon = VolumeAddon::secret();
        addon.set_options(&options).unwrap();
        let first = addon.options();
        addon.set_options(&options).unwrap();
        assert_eq!(addon.options(), first);
    }
}
