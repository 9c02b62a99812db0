//! Error types for the page engine.

use std::time::Duration;

use thiserror::Error;
use turbo_assets::AssetError;

/// Failure of a single prop provider.
///
/// These stay local to the prop unless the prop is tagged `Always`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    /// The provider returned an error.
    #[error("Provider failed: {0}")]
    Evaluation(String),

    /// The provider's value could not be turned into JSON.
    #[error("Provider value is not serializable: {0}")]
    Serialization(String),

    /// The provider did not finish within its timeout.
    #[error("Provider timed out after {0:?}")]
    Timeout(Duration),
}

/// Errors that abort building a response.
#[derive(Error, Debug)]
pub enum PageError {
    /// A prop tagged `Always` could not be produced.
    #[error("Always prop '{prop}' failed: {source}")]
    AlwaysPropFailed {
        prop: String,
        #[source]
        source: ProviderError,
    },

    /// The page object could not be serialized.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The document renderer failed.
    #[error("Render error: {0}")]
    Render(String),

    /// Configuration is invalid.
    #[error("Invalid page configuration: {0}")]
    Config(String),

    /// Asset resolution failed.
    #[error("Asset error: {0}")]
    Assets(#[from] AssetError),
}
