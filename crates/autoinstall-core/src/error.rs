use crate::compiler::PluginError;
use std::path::PathBuf;
use thiserror::Error;

/// Core error type for autoinstall operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to read config at {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config at {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// The host bundler's resolver call shape is not one we know how to drive.
    #[error("Unsupported bundler version: {version} (supported major versions: 1, 2, 3)")]
    UnsupportedBundler { version: String },

    #[error(transparent)]
    Plugin(#[from] PluginError),

    #[error("{0}")]
    Other(String),
}

impl Error {
    #[must_use]
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }

    #[must_use]
    pub fn unsupported_bundler(version: impl Into<String>) -> Self {
        Self::UnsupportedBundler {
            version: version.into(),
        }
    }
}
