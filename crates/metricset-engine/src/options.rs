//! Typed access to declared option bags
//!
//! Plugins read their declaration through [`OptionReader`] into a typed
//! options struct with a `Default` table, and export it back through
//! [`OptionWriter`] in the same shape, so `set_options(options())` is a
//! round trip.

use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use metricset_common::crd::OptionBag;
use metricset_common::{Error, Result};

/// Read-only view over one declaration's options
pub struct OptionReader<'a> {
    plugin: &'a str,
    bag: &'a OptionBag,
}

impl<'a> OptionReader<'a> {
    /// Create a reader; `plugin` names the declaration in errors
    pub fn new(plugin: &'a str, bag: &'a OptionBag) -> Self {
        Self { plugin, bag }
    }

    /// String value of `key`; integers are formatted
    pub fn string(&self, key: &str) -> Option<String> {
        self.bag.options.get(key).map(value_to_string)
    }

    /// String value of `key`, or `default` when absent
    pub fn string_or(&self, key: &str, default: &str) -> String {
        self.string(key).unwrap_or_else(|| default.to_string())
    }

    /// Boolean flag: `"true"`/`"yes"` (any case) or a non-zero integer.
    /// Absent or anything else is false.
    pub fn flag(&self, key: &str) -> bool {
        match self.bag.options.get(key) {
            Some(IntOrString::Int(i)) => *i != 0,
            Some(IntOrString::String(s)) => {
                matches!(s.trim().to_ascii_lowercase().as_str(), "true" | "yes")
            }
            None => false,
        }
    }

    /// Integer value of `key`, or `default` when absent.
    ///
    /// Numeric strings are accepted; anything else is an `InvalidOption`.
    pub fn int_or(&self, key: &str, default: i32) -> Result<i32> {
        match self.bag.options.get(key) {
            None => Ok(default),
            Some(IntOrString::Int(i)) => Ok(*i),
            Some(IntOrString::String(s)) => s.trim().parse().map_err(|_| {
                Error::invalid_option(self.plugin, key, format!("'{s}' is not an integer"))
            }),
        }
    }

    /// Map option `key` with values formatted as strings (empty when absent)
    pub fn string_map(&self, key: &str) -> BTreeMap<String, String> {
        self.bag
            .map_options
            .get(key)
            .map(|m| {
                m.iter()
                    .map(|(k, v)| (k.clone(), value_to_string(v)))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Map option `key` with values untouched (empty when absent)
    pub fn raw_map(&self, key: &str) -> BTreeMap<String, IntOrString> {
        self.bag.map_options.get(key).cloned().unwrap_or_default()
    }
}

fn value_to_string(value: &IntOrString) -> String {
    match value {
        IntOrString::Int(i) => i.to_string(),
        IntOrString::String(s) => s.clone(),
    }
}

/// Builder for exported options
#[derive(Debug, Default)]
pub struct OptionWriter {
    bag: OptionBag,
}

impl OptionWriter {
    /// Start an empty export
    pub fn new() -> Self {
        Self::default()
    }

    /// Export a string option
    pub fn string(mut self, key: &str, value: impl Into<String>) -> Self {
        self.bag
            .options
            .insert(key.to_string(), IntOrString::String(value.into()));
        self
    }

    /// Export an integer option
    pub fn int(mut self, key: &str, value: i32) -> Self {
        self.bag.options.insert(key.to_string(), IntOrString::Int(value));
        self
    }

    /// Export a flag as `"true"` / `"false"`
    pub fn flag(self, key: &str, value: bool) -> Self {
        self.string(key, if value { "true" } else { "false" })
    }

    /// Export a string map option (skipped when empty)
    pub fn string_map(mut self, key: &str, map: &BTreeMap<String, String>) -> Self {
        if !map.is_empty() {
            let values = map
                .iter()
                .map(|(k, v)| (k.clone(), IntOrString::String(v.clone())))
                .collect();
            self.bag.map_options.insert(key.to_string(), values);
        }
        self
    }

    /// Export a raw map option (skipped when empty)
    pub fn raw_map(mut self, key: &str, map: &BTreeMap<String, IntOrString>) -> Self {
        if !map.is_empty() {
            self.bag.map_options.insert(key.to_string(), map.clone());
        }
        self
    }

    /// Finish the export
    pub fn finish(self) -> OptionBag {
        self.bag
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(IntOrString::String("true".into()), true)]
    #[case(IntOrString::String("yes".into()), true)]
    #[case(IntOrString::String("YES".into()), true)]
    #[case(IntOrString::String("false".into()), false)]
    #[case(IntOrString::String("on".into()), false)]
    #[case(IntOrString::Int(1), true)]
    #[case(IntOrString::Int(0), false)]
    fn flag_parsing(#[case] value: IntOrString, #[case] expected: bool) {
        let mut bag = OptionBag::new();
        bag.options.insert("privileged".to_string(), value);
        let reader = OptionReader::new("application", &bag);
        assert_eq!(reader.flag("privileged"), expected);
    }

    #[test]
    fn absent_values_use_defaults() {
        let bag = OptionBag::new();
        let reader = OptionReader::new("perf-sysstat", &bag);
        assert_eq!(reader.string_or("mount", "/opt/share"), "/opt/share");
        assert_eq!(reader.int_or("rate", 10).unwrap(), 10);
        assert!(!reader.flag("threads"));
        assert!(reader.string_map("items").is_empty());
    }

    #[test]
    fn numeric_strings_parse_as_int() {
        let bag = OptionBag::new().with("rate", " 5 ");
        let reader = OptionReader::new("perf-sysstat", &bag);
        assert_eq!(reader.int_or("rate", 10).unwrap(), 5);
    }

    #[test]
    fn malformed_int_names_plugin_and_field() {
        let bag = OptionBag::new().with("rate", "fast");
        let reader = OptionReader::new("perf-sysstat", &bag);
        match reader.int_or("rate", 10) {
            Err(Error::InvalidOption { plugin, field, .. }) => {
                assert_eq!(plugin, "perf-sysstat");
                assert_eq!(field, "rate");
            }
            other => panic!("expected InvalidOption, got {other:?}"),
        }
    }

    #[test]
    fn integers_read_as_strings() {
        let bag = OptionBag::new().with_int("completions", 3);
        let reader = OptionReader::new("perf-sysstat", &bag);
        assert_eq!(reader.string("completions").as_deref(), Some("3"));
    }

    #[test]
    fn writer_skips_empty_maps() {
        let bag = OptionWriter::new()
            .string("name", "data")
            .flag("readOnly", true)
            .string_map("items", &BTreeMap::new())
            .finish();
        assert_eq!(bag.options.len(), 2);
        assert!(bag.map_options.is_empty());
        assert_eq!(
            bag.options["readOnly"],
            IntOrString::String("true".to_string())
        );
    }
}
