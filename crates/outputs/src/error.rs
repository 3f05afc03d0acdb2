//! Output error types

use thiserror::Error;

/// Output construction errors
#[derive(Debug, Error)]
pub enum OutputError {
    /// Output could not be created from its params
    #[error("failed to create output for '{name}': {message}")]
    Creation { name: String, message: String },

    /// Output error (from contract)
    #[error("output error: {0}")]
    Contract(#[from] contracts::ContractError),

    /// Consumer could not be bound to its configured device
    #[error("fanout error: {0}")]
    Fanout(#[from] fanout::FanoutError),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl OutputError {
    /// Create an output creation error
    pub fn creation(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Creation {
            name: name.into(),
            message: message.into(),
        }
    }
}
