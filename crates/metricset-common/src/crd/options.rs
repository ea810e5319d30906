//! Generic option bags attached to metric and addon declarations

use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Loosely-typed options for a single plugin declaration.
///
/// Plugins parse this into their own typed configuration; unknown keys are
/// ignored. Ordered maps keep exported options and rendered output stable.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OptionBag {
    /// Flat options (`command: "lmp -in in.lj"`, `rate: 10`)
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub options: BTreeMap<String, IntOrString>,

    /// Table-shaped options (`resourceLimits: {cpu: 2}`, `items: {key: path}`)
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub map_options: BTreeMap<String, BTreeMap<String, IntOrString>>,
}

impl OptionBag {
    /// Create an empty option bag
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a string option
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.options
            .insert(key.into(), IntOrString::String(value.into()));
        self
    }

    /// Add an integer option
    pub fn with_int(mut self, key: impl Into<String>, value: i32) -> Self {
        self.options.insert(key.into(), IntOrString::Int(value));
        self
    }

    /// Add a map option from string pairs
    pub fn with_map<K, V>(mut self, key: impl Into<String>, entries: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        let map = entries
            .into_iter()
            .map(|(k, v)| (k.into(), IntOrString::String(v.into())))
            .collect();
        self.map_options.insert(key.into(), map);
        self
    }

    /// True when neither flat nor map options are set
    pub fn is_empty(&self) -> bool {
        self.options.is_empty() && self.map_options.is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn builder_sets_values() {
        let bag = OptionBag::new()
            .with("events", "-e IO")
            .with_int("rate", 5)
            .with_map("items", [("entrypoint", "entrypoint.sh")]);

        assert_eq!(
            bag.options["events"],
            IntOrString::String("-e IO".to_string())
        );
        assert_eq!(bag.options["rate"], IntOrString::Int(5));
        assert_eq!(
            bag.map_options["items"]["entrypoint"],
            IntOrString::String("entrypoint.sh".to_string())
        );
        assert!(!bag.is_empty());
    }

    #[test]
    fn deserializes_mixed_values() {
        let json = r#"{"options": {"rate": 2, "target": "worker"}, "mapOptions": {"resourceLimits": {"cpu": 4, "memory": "1Gi"}}}"#;
        let bag: OptionBag = serde_json::from_str(json).unwrap();
        assert_eq!(bag.options["rate"], IntOrString::Int(2));
        assert_eq!(
            bag.options["target"],
            IntOrString::String("worker".to_string())
        );
        assert_eq!(bag.map_options["resourceLimits"]["cpu"], IntOrString::Int(4));
    }

    #[test]
    fn empty_bag_serializes_to_empty_object() {
        let json = serde_json::to_string(&OptionBag::new()).unwrap();
        assert_eq!(json, "{}");
    }
}
