//! Error types for the CLI

use std::path::PathBuf;

/// CLI Result type
pub type Result<T> = std::result::Result<T, Error>;

/// CLI errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("logging setup failed: {0}")]
    Telemetry(#[from] metricset_common::telemetry::TelemetryError),

    #[error("{category}: {source}")]
    Compose {
        category: metricset_common::ErrorCategory,
        #[source]
        source: metricset_common::Error,
    },

    #[error("failed to read {}: {source}", path.display())]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no entrypoint scripts are persisted for '{name}'")]
    NothingPersisted { name: String },
}

impl From<metricset_common::Error> for Error {
    fn from(source: metricset_common::Error) -> Self {
        Error::Compose {
            category: source.category(),
            source,
        }
    }
}

impl Error {
    pub fn read_file(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::ReadFile {
            path: path.into(),
            source,
        }
    }
}
