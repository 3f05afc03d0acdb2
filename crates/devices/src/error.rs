//! Device driver error types

use std::path::PathBuf;

use contracts::{ContractError, DeviceId};
use thiserror::Error;

/// Driver-side error
#[derive(Debug, Error)]
pub enum DeviceError {
    /// Device not exposed by this driver
    #[error("unknown device '{device}'")]
    UnknownDevice { device: DeviceId },

    /// Start refused (fault injection or unusable source)
    #[error("failed to start device '{device}': {message}")]
    StartFailed { device: DeviceId, message: String },

    /// Recording could not be loaded
    #[error("failed to load recording {path}: {message}")]
    Recording { path: PathBuf, message: String },

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl DeviceError {
    /// Create start failure error
    pub fn start_failed(device: &DeviceId, message: impl Into<String>) -> Self {
        Self::StartFailed {
            device: device.clone(),
            message: message.into(),
        }
    }

    /// Create recording error
    pub fn recording(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Recording {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl From<DeviceError> for ContractError {
    fn from(err: DeviceError) -> Self {
        match err {
            DeviceError::UnknownDevice { device } => ContractError::DeviceNotFound { device },
            DeviceError::StartFailed { device, message } => ContractError::DeviceOperation {
                device,
                operation: "start",
                message,
            },
            DeviceError::Recording { path, message } => {
                ContractError::Other(format!("recording {}: {message}", path.display()))
            }
            DeviceError::Io(e) => ContractError::Io(e),
        }
    }
}

/// Result alias
pub type Result<T> = std::result::Result<T, DeviceError>;
