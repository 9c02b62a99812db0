//! Asset error types.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while loading or resolving build assets.
#[derive(Error, Debug)]
pub enum AssetError {
    /// The manifest file does not exist.
    #[error("Manifest not found: {}", .0.display())]
    ManifestNotFound(PathBuf),

    /// The manifest exists but is not a valid manifest document.
    #[error("Failed to parse manifest {}: {message}", path.display())]
    ManifestParse { path: PathBuf, message: String },

    /// The manifest could not be read.
    #[error("Failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The requested entry point is not part of the build.
    #[error("Unknown entry point: {0}")]
    UnknownEntry(String),
}
