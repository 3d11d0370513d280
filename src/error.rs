//! Error handling for the circuit index generator.
//!
//! Only a missing destinations root is fatal for a whole run. Loaders convert
//! everything else into an empty default plus a warning; these variants carry
//! the reason so it can be logged and tested.

use std::path::PathBuf;
use thiserror::Error;

/// Error type for circuit index operations.
#[derive(Debug, Error)]
pub enum CircuitIndexError {
    /// The directory holding one subdirectory per destination does not exist
    #[error("Circuits directory not found at {path}")]
    RootNotFound { path: PathBuf },

    /// A destination requested by name has no directory under the circuits root
    #[error("Destination '{name}' not found under {path}")]
    UnknownDestination { name: String, path: PathBuf },

    /// Reading or writing a file or directory failed
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A JSON document could not be parsed or serialized
    #[error("Invalid JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// A GeoJSON document was valid JSON but not usable GeoJSON
    #[error("Invalid GeoJSON in {path}: {reason}")]
    GeoJson { path: PathBuf, reason: String },

    /// The configured branding string produced an unusable pattern
    #[error("Invalid branding pattern '{branding}': {source}")]
    Branding {
        branding: String,
        #[source]
        source: regex::Error,
    },
}

/// Result type alias for circuit index operations.
pub type Result<T> = std::result::Result<T, CircuitIndexError>;

impl CircuitIndexError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        CircuitIndexError::Io { path: path.into(), source }
    }

    pub(crate) fn json(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        CircuitIndexError::Json { path: path.into(), source }
    }
}
