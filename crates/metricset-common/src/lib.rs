//! Common types for MetricSet composition: the declared resource, errors,
//! log markers, and logging setup

#![deny(missing_docs)]

pub mod crd;
pub mod error;
pub mod markers;
pub mod telemetry;

pub use error::{Error, ErrorCategory};

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Job group used by monitor metrics and the application container
pub const DEFAULT_JOB_GROUP: &str = "m";

/// Job group that runs the orchestration command of a launcher/worker metric
pub const LAUNCHER_JOB_GROUP: &str = "launcher";

/// Job group of idle workers driven by the launcher
pub const WORKER_JOB_GROUP: &str = "worker";

/// Name of the container running the declared application
pub const APPLICATION_CONTAINER: &str = "app";
