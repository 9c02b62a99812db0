//! Session error types.

use thiserror::Error;

/// Errors that can occur when talking to the session store.
#[derive(Error, Debug)]
pub enum SessionError {
    /// The store could not be reached or refused the operation.
    #[error("Session unavailable: {0}")]
    Unavailable(String),

    /// A stored value did not have the expected shape.
    #[error("Session serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
