//! MetricSet CRD types
//!
//! Defines `MetricSet`: a declared application plus an ordered list of
//! metrics (workloads or monitors) and addons (cross-cutting instrumentation
//! and storage). The composition engine turns a `MetricSetSpec` into
//! containers, volumes, and entrypoint scripts.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::options::OptionBag;

// =============================================================================
// Phase
// =============================================================================

/// Lifecycle phase of a MetricSet
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
pub enum SetPhase {
    /// Waiting for composition
    #[default]
    Pending,
    /// Composed and handed to the manifest builder
    Composed,
    /// Composition failed; see the status message
    Failed,
}

impl std::fmt::Display for SetPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "Pending"),
            Self::Composed => write!(f, "Composed"),
            Self::Failed => write!(f, "Failed"),
        }
    }
}

// =============================================================================
// Application
// =============================================================================

/// The application a monitor metric observes, or whose command a workload
/// metric runs.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Application {
    /// Container image
    #[serde(default)]
    pub image: String,

    /// Command of the process to run (and to watch, for monitor metrics)
    #[serde(default)]
    pub command: String,

    /// Shell line to start the application, when it differs from `command`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entrypoint: Option<String>,

    /// Working directory inside the container
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<String>,

    /// Image pull secret name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pull_secret: Option<String>,
}

impl Application {
    /// The shell line that starts the application
    pub fn entrypoint(&self) -> &str {
        self.entrypoint
            .as_deref()
            .filter(|e| !e.is_empty())
            .unwrap_or(&self.command)
    }

    /// True when both an image and a command are declared
    pub fn is_complete(&self) -> bool {
        !self.image.is_empty() && !self.command.is_empty()
    }
}

/// Logging behavior of rendered scripts
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Logging {
    /// Keep every container alive after its script finishes
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub interactive: bool,
}

// =============================================================================
// Declarations
// =============================================================================

/// A declared metric: identifier plus options
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MetricSpec {
    /// Registry identifier (e.g. "app-pennant", "perf-sysstat")
    pub name: String,

    /// Plugin options
    #[serde(flatten)]
    pub options: OptionBag,
}

impl MetricSpec {
    /// Declare a metric with no options
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            options: OptionBag::default(),
        }
    }

    /// Declare a metric with options
    pub fn with_options(name: impl Into<String>, options: OptionBag) -> Self {
        Self {
            name: name.into(),
            options,
        }
    }
}

/// A declared addon: identifier plus options
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AddonSpec {
    /// Registry identifier (e.g. "perf-hpctoolkit", "volume-cm")
    pub name: String,

    /// Plugin options
    #[serde(flatten)]
    pub options: OptionBag,
}

impl AddonSpec {
    /// Declare an addon with options
    pub fn with_options(name: impl Into<String>, options: OptionBag) -> Self {
        Self {
            name: name.into(),
            options,
        }
    }
}

fn default_one() -> u32 {
    1
}

// =============================================================================
// CRD
// =============================================================================

/// Declared metrics and addons for a distributed job
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "flux-framework.org",
    version = "v1alpha2",
    kind = "MetricSet",
    plural = "metricsets",
    shortname = "ms",
    namespaced,
    status = "MetricSetStatus",
    printcolumn = r#"{"name":"Phase","type":"string","jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct MetricSetSpec {
    /// Number of pods across the job groups
    #[serde(default = "default_one")]
    pub pods: u32,

    /// Application to run or observe
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub application: Option<Application>,

    /// Logging behavior
    #[serde(default)]
    pub logging: Logging,

    /// Metrics, in declared order
    #[serde(default)]
    pub metrics: Vec<MetricSpec>,

    /// Addons, in declared order. Order is significant: later addons wrap
    /// the commands produced by earlier ones.
    #[serde(default)]
    pub addons: Vec<AddonSpec>,
}

impl Default for MetricSetSpec {
    fn default() -> Self {
        Self {
            pods: default_one(),
            application: None,
            logging: Logging::default(),
            metrics: Vec::new(),
            addons: Vec::new(),
        }
    }
}

/// Status of a MetricSet
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MetricSetStatus {
    /// Current phase
    #[serde(default)]
    pub phase: SetPhase,

    /// Human-readable message about current state
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

// =============================================================================
// Tests
// =============================================================================
