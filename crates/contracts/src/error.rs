//! Layered error definitions
//!
//! Categorized by source: config / device / output

use thiserror::Error;

use crate::DeviceId;

/// Unified error type
#[derive(Debug, Error)]
pub enum ContractError {
    // ===== Configuration Errors =====
    /// Configuration parse error
    #[error("config parse error: {message}")]
    ConfigParse {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Configuration validation error
    #[error("config validation error at '{field}': {message}")]
    ConfigValidation { field: String, message: String },

    // ===== Device Errors =====
    /// Device unknown to the driver
    #[error("device not found: {device}")]
    DeviceNotFound { device: DeviceId },

    /// Driver refused an operation on a device
    #[error("device '{device}' {operation} failed: {message}")]
    DeviceOperation {
        device: DeviceId,
        operation: &'static str,
        message: String,
    },

    // ===== Output Errors =====
    /// Output emit error
    #[error("output '{output_name}' emit error: {message}")]
    OutputEmit {
        output_name: String,
        message: String,
    },

    /// Output connection error
    #[error("output '{output_name}' connection error: {message}")]
    OutputConnection {
        output_name: String,
        message: String,
    },

    // ===== General Errors =====
    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl ContractError {
    /// Create configuration parse error
    pub fn config_parse(message: impl Into<String>) -> Self {
        Self::ConfigParse {
            message: message.into(),
            source: None,
        }
    }

    /// Create configuration validation error
    pub fn config_validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConfigValidation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create device operation error
    pub fn device_operation(
        device: &DeviceId,
        operation: &'static str,
        message: impl Into<String>,
    ) -> Self {
        Self::DeviceOperation {
            device: device.clone(),
            operation,
            message: message.into(),
        }
    }

    /// Create output emit error
    pub fn output_emit(output_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::OutputEmit {
            output_name: output_name.into(),
            message: message.into(),
        }
    }
}
