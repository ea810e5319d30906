//! Custom Resource Definitions for declared metric sets

mod metric_set;
mod options;

pub use metric_set::{
    AddonSpec, Application, Logging, MetricSet, MetricSetSpec, MetricSetStatus, MetricSpec,
    SetPhase,
};
pub use options::OptionBag;
