use std::path::PathBuf;

use thiserror::Error;

use crate::models::FeatureStatus;

/// Errors reported by the zone registry, ledger store, reorganizer and exporter.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid zone: '{0}' (expected active, resources or archive)")]
    InvalidZone(String),

    #[error("Invalid status: '{0}' (expected proposed, in_progress, complete or archived)")]
    InvalidStatus(String),

    #[error("Feature '{0}' already exists")]
    DuplicateFeature(String),

    #[error("Feature '{0}' not found")]
    UnknownFeature(String),

    #[error("Invalid feature identifier '{0}': use lowercase letters, digits, '-' or '_'")]
    InvalidFeatureId(String),

    #[error("Feature '{id}' cannot move from {from} to {to}")]
    InvalidTransition {
        id: String,
        from: FeatureStatus,
        to: FeatureStatus,
    },

    #[error("File '{0}' is not tracked")]
    UnknownFile(String),

    #[error("Invalid file path: '{0}'")]
    InvalidPath(String),

    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("Project at {0} is not initialized (run 'gridwrinkl init' first)")]
    NotInitialized(PathBuf),

    #[error("Project at {0} is already initialized (use --force to overwrite)")]
    AlreadyInitialized(PathBuf),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<rusqlite::Error> for Error {
    fn from(e: rusqlite::Error) -> Self {
        Self::StorageUnavailable(e.to_string())
    }
}

impl Error {
    /// Process exit code for the CLI.
    ///
    /// - `2`: the request was rejected (bad input or invalid state change)
    /// - `3`: the durable store could not be used
    /// - `1`: anything else
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::InvalidZone(_)
            | Self::InvalidStatus(_)
            | Self::DuplicateFeature(_)
            | Self::UnknownFeature(_)
            | Self::InvalidFeatureId(_)
            | Self::InvalidTransition { .. }
            | Self::UnknownFile(_)
            | Self::InvalidPath(_)
            | Self::NotInitialized(_)
            | Self::AlreadyInitialized(_) => 2,
            Self::StorageUnavailable(_) => 3,
            Self::Config(_) | Self::Io(_) | Self::Serialization(_) => 1,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
