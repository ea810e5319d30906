//! Error types for MetricSet composition
//!
//! Every variant names the plugin identifier (or container / job group) that
//! caused the failure so the reconciler can surface a precise status
//! condition. Composition is all-or-nothing: any error means no containers or
//! volumes were emitted.

use thiserror::Error;

/// Coarse classification of an [`Error`], mapped by the reconciler to a
/// status condition reason.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Unknown identifier, duplicate registration, malformed option value
    Configuration,
    /// A configured plugin is missing a required field
    Validation,
    /// Phase 2 produced an inconsistent container set (plugin author error)
    Composition,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Configuration => write!(f, "ConfigurationError"),
            Self::Validation => write!(f, "ValidationError"),
            Self::Composition => write!(f, "CompositionError"),
        }
    }
}

/// Main error type for MetricSet composition
#[derive(Debug, Error)]
pub enum Error {
    /// No plugin is registered under the declared identifier
    #[error("unknown plugin '{identifier}'")]
    UnknownPlugin {
        /// The declared identifier
        identifier: String,
    },

    /// The identifier resolves to the other plugin variant
    #[error("plugin '{identifier}' is {actual}, but was declared as {expected}")]
    WrongKind {
        /// The declared identifier
        identifier: String,
        /// Variant the declaration list requires ("a metric" / "an addon")
        expected: &'static str,
        /// Variant actually registered
        actual: &'static str,
    },

    /// Two plugins were registered with the same identifier
    #[error("plugin '{identifier}' is already registered")]
    DuplicatePlugin {
        /// The duplicated identifier
        identifier: String,
    },

    /// An option value could not be parsed into its typed field
    #[error("invalid option '{field}' for {plugin}: {message}")]
    InvalidOption {
        /// Identifier of the plugin being configured
        plugin: String,
        /// Option key
        field: String,
        /// Description of what's wrong with the value
        message: String,
    },

    /// A configured plugin failed its validation check
    #[error("validation failed for {plugin}: {message}")]
    Validation {
        /// Identifier of the plugin that failed
        plugin: String,
        /// The missing or invalid option
        field: String,
        /// Description of what's invalid
        message: String,
    },

    /// A monitor metric was declared without an application to observe
    #[error("{plugin} requires an application (spec.application with image and command)")]
    MissingApplication {
        /// Identifier of the monitor metric
        plugin: String,
    },

    /// The declaration contains no metrics
    #[error("metric set declares no metrics")]
    NoMetrics,

    /// The MetricSet has no `metadata.name`
    #[error("metric set has no name")]
    MissingName,

    /// An addon targets a job group that Phase 1 did not produce
    #[error("{plugin} targets job group '{job_group}', which does not exist")]
    UnknownJobGroup {
        /// Identifier of the addon
        plugin: String,
        /// The target job group name
        job_group: String,
    },

    /// Two containers share a name within one job group
    #[error("duplicate container '{container}' in job group '{job_group}'")]
    DuplicateContainer {
        /// Job group holding both containers
        job_group: String,
        /// The duplicated container name
        container: String,
    },

    /// Two volumes share a name
    #[error("duplicate volume '{name}'")]
    DuplicateVolume {
        /// The duplicated volume name
        name: String,
    },

    /// Two persisted entrypoint scripts resolved to the same artifact key
    #[error("duplicate entrypoint script '{key}'")]
    DuplicateScript {
        /// The duplicated config map key
        key: String,
    },

    /// An addon renamed or moved a container it does not own
    #[error("{plugin} modified container '{container}' in job group '{job_group}', which it does not own")]
    ForeignContainerModified {
        /// Identifier of the offending addon
        plugin: String,
        /// Job group of the container before customization
        job_group: String,
        /// Container name before customization
        container: String,
    },

    /// A script fragment contains a reserved log marker
    #[error("script for container '{container}' contains reserved marker '{marker}'")]
    MarkerInFragment {
        /// Container whose script was being rendered
        container: String,
        /// The marker that was found
        marker: &'static str,
    },
}

impl Error {
    /// Create an unknown plugin error
    pub fn unknown_plugin(identifier: impl Into<String>) -> Self {
        Self::UnknownPlugin {
            identifier: identifier.into(),
        }
    }

    /// Create an invalid option error for a plugin field
    pub fn invalid_option(
        plugin: impl Into<String>,
        field: impl Into<String>,
        msg: impl Into<String>,
    ) -> Self {
        Self::InvalidOption {
            plugin: plugin.into(),
            field: field.into(),
            message: msg.into(),
        }
    }

    /// Create a validation error naming the missing or invalid field
    pub fn validation(
        plugin: impl Into<String>,
        field: impl Into<String>,
        msg: impl Into<String>,
    ) -> Self {
        Self::Validation {
            plugin: plugin.into(),
            field: field.into(),
            message: msg.into(),
        }
    }

    /// Classify this error for status reporting
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::UnknownPlugin { .. }
            | Self::WrongKind { .. }
            | Self::DuplicatePlugin { .. }
            | Self::InvalidOption { .. }
            | Self::NoMetrics
            | Self::MissingName => ErrorCategory::Configuration,
            Self::Validation { .. } | Self::MissingApplication { .. } => {
                ErrorCategory::Validation
            }
            Self::UnknownJobGroup { .. }
            | Self::DuplicateContainer { .. }
            | Self::DuplicateVolume { .. }
            | Self::DuplicateScript { .. }
            | Self::ForeignContainerModified { .. }
            | Self::MarkerInFragment { .. } => ErrorCategory::Composition,
        }
    }

    /// Identifier of the plugin responsible for this error, if any
    pub fn plugin(&self) -> Option<&str> {
        match self {
            Self::UnknownPlugin { identifier }
            | Self::WrongKind { identifier, .. }
            | Self::DuplicatePlugin { identifier } => Some(identifier),
            Self::InvalidOption { plugin, .. }
            | Self::Validation { plugin, .. }
            | Self::MissingApplication { plugin }
            | Self::UnknownJobGroup { plugin, .. }
            | Self::ForeignContainerModified { plugin, .. } => Some(plugin),
            _ => None,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn validation_error_names_plugin_and_field() {
        let err = Error::validation("perf-hpctoolkit", "events", "at least one event is required");
        assert_eq!(
            err.to_string(),
            "validation failed for perf-hpctoolkit: at least one event is required"
        );
        assert_eq!(err.plugin(), Some("perf-hpctoolkit"));
        match err {
            Error::Validation { field, .. } => assert_eq!(field, "events"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn categories() {
        assert_eq!(
            Error::unknown_plugin("nope").category(),
            ErrorCategory::Configuration
        );
        assert_eq!(
            Error::invalid_option("perf-sysstat", "rate", "not a number").category(),
            ErrorCategory::Configuration
        );
        assert_eq!(
            Error::MissingApplication {
                plugin: "perf-sysstat".to_string()
            }
            .category(),
            ErrorCategory::Validation
        );
        assert_eq!(
            Error::DuplicateContainer {
                job_group: "worker".to_string(),
                container: "app".to_string()
            }
            .category(),
            ErrorCategory::Composition
        );
    }

    #[test]
    fn category_display() {
        assert_eq!(ErrorCategory::Validation.to_string(), "ValidationError");
        assert_eq!(ErrorCategory::Composition.to_string(), "CompositionError");
    }

    #[test]
    fn composition_errors_without_plugin() {
        let err = Error::DuplicateVolume {
            name: "data".to_string(),
        };
        assert_eq!(err.plugin(), None);
        assert_eq!(err.to_string(), "duplicate volume 'data'");
    }
}
