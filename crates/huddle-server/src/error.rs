//! Server error types.

use thiserror::Error;

/// Top-level server errors.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Binding or accepting on the listen socket failed.
    #[error("listener error: {0}")]
    Listener(#[from] std::io::Error),

    /// Configuration could not be loaded or validated.
    #[error("configuration error: {0}")]
    Config(String),

    /// The cluster substrate failed.
    #[error("substrate error: {0}")]
    Substrate(#[from] huddle_cluster::SubstrateError),
}
