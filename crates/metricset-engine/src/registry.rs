//! Plugin registry
//!
//! Maps identifiers to factories producing fresh [`PluginInstance`]s. The
//! registry is assembled once through [`RegistryBuilder`] and is immutable
//! afterwards, so lookups need no synchronization. [`Registry::builtin`]
//! holds every plugin shipped with this crate.

use std::collections::BTreeMap;
use std::sync::Arc;

use once_cell::sync::Lazy;
use tracing::debug;

use metricset_common::{Error, Result};

use crate::capability::{Family, PluginDescriptor, PluginInstance};

/// Creates a fresh, unconfigured plugin instance
pub type PluginFactory = Arc<dyn Fn() -> PluginInstance + Send + Sync>;

#[derive(Clone)]
struct Entry {
    descriptor: PluginDescriptor,
    factory: PluginFactory,
}

static BUILTIN: Lazy<Registry> = Lazy::new(|| RegistryBuilder::new().with_builtins().build());

// =============================================================================
// Builder
// =============================================================================

/// Collects registrations before the registry is frozen
#[derive(Default)]
pub struct RegistryBuilder {
    entries: BTreeMap<String, Entry>,
}

impl RegistryBuilder {
    /// Start an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Add every built-in plugin
    pub fn with_builtins(self) -> Self {
        crate::plugins::register_builtins(self)
    }

    /// Register a factory, failing if its identifier is taken
    pub fn try_register<F>(&mut self, factory: F) -> Result<()>
    where
        F: Fn() -> PluginInstance + Send + Sync + 'static,
    {
        let descriptor = factory().descriptor().clone();
        if self.entries.contains_key(&descriptor.identifier) {
            return Err(Error::DuplicatePlugin {
                identifier: descriptor.identifier,
            });
        }
        debug!(plugin = %descriptor.identifier, kind = ?descriptor.kind, "registered plugin");
        self.entries.insert(
            descriptor.identifier.clone(),
            Entry {
                descriptor,
                factory: Arc::new(factory),
            },
        );
        Ok(())
    }

    /// Register a factory.
    ///
    /// # Panics
    ///
    /// Panics if the identifier is already registered. Registration happens
    /// once at start-up, so a collision is a programming error.
    pub fn register<F>(mut self, factory: F) -> Self
    where
        F: Fn() -> PluginInstance + Send + Sync + 'static,
    {
        if let Err(err) = self.try_register(factory) {
            panic!("{err}");
        }
        self
    }

    /// Freeze the registry
    pub fn build(self) -> Registry {
        Registry {
            entries: Arc::new(self.entries),
        }
    }
}

// =============================================================================
// Registry
// =============================================================================

/// Immutable identifier to factory map
#[derive(Clone)]
pub struct Registry {
    entries: Arc<BTreeMap<String, Entry>>,
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("plugins", &self.entries.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Registry {
    /// Start building a registry
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    /// Registry of every built-in plugin
    pub fn builtin() -> &'static Registry {
        &BUILTIN
    }

    /// Fresh, unconfigured instance of `identifier`
    pub fn lookup(&self, identifier: &str) -> Option<PluginInstance> {
        self.entries.get(identifier).map(|e| (e.factory)())
    }

    /// Like [`Registry::lookup`], but an unknown identifier is an error
    pub fn resolve(&self, identifier: &str) -> Result<PluginInstance> {
        self.lookup(identifier)
            .ok_or_else(|| Error::unknown_plugin(identifier))
    }

    /// True if `identifier` is registered
    pub fn contains(&self, identifier: &str) -> bool {
        self.entries.contains_key(identifier)
    }

    /// Sorted identifiers, optionally restricted to one family
    pub fn list(&self, family: Option<Family>) -> Vec<&str> {
        self.entries
            .values()
            .filter(|e| family.map_or(true, |f| e.descriptor.family == f))
            .map(|e| e.descriptor.identifier.as_str())
            .collect()
    }

    /// Descriptors of every registered plugin, sorted by identifier
    pub fn descriptors(&self) -> impl Iterator<Item = &PluginDescriptor> {
        self.entries.values().map(|e| &e.descriptor)
    }

    /// Number of registered plugins
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if nothing is registered
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::capability::PluginKind;
    use crate::plugins::volumes::VolumeAddon;

    #[test]
    fn builtin_lists_sorted_identifiers() {
        let ids = Registry::builtin().list(None);
        let mut sorted = ids.clone();
        sorted.sort_unstable();
        assert_eq!(ids, sorted);
        assert!(ids.contains(&"app-pennant"));
        assert!(ids.contains(&"perf-hpctoolkit"));
    }

    #[test]
    fn list_filters_by_family() {
        let storage = Registry::builtin().list(Some(Family::Storage));
        assert_eq!(
            storage,
            vec![
                "volume-cm",
                "volume-empty",
                "volume-hostpath",
                "volume-pvc",
                "volume-secret"
            ]
        );
    }

    #[test]
    fn lookup_returns_fresh_instances() {
        let registry = Registry::builtin();
        let mut first = registry.lookup("volume-empty").unwrap();
        first
            .set_options(&metricset_common::crd::OptionBag::new().with("name", "scratch"))
            .unwrap();
        let second = registry.lookup("volume-empty").unwrap();
        assert_ne!(first.options(), second.options());
        assert_eq!(second.kind(), PluginKind::Addon);
    }

    #[test]
    fn unknown_identifier() {
        assert!(Registry::builtin().lookup("nope").is_none());
        assert!(matches!(
            Registry::builtin().resolve("nope"),
            Err(Error::UnknownPlugin { .. })
        ));
    }

    #[test]
    fn try_register_rejects_duplicates() {
        let mut builder = RegistryBuilder::new();
        builder
            .try_register(|| PluginInstance::Addon(Box::new(VolumeAddon::empty_dir())))
            .unwrap();
        let err = builder
            .try_register(|| PluginInstance::Addon(Box::new(VolumeAddon::empty_dir())))
            .unwrap_err();
        assert!(matches!(err, Error::DuplicatePlugin { identifier } if identifier == "volume-empty"));
    }

    #[test]
    #[should_panic(expected = "already registered")]
    fn register_panics_on_duplicates() {
        let _ = RegistryBuilder::new()
            .with_builtins()
            .register(|| PluginInstance::Addon(Box::new(VolumeAddon::empty_dir())));
    }
}
