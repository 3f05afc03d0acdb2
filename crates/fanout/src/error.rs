//! Fanout error types

use contracts::{ConsumerId, ContractError, DeviceId};
use thiserror::Error;

/// Distribution-core errors
///
/// Only attach-side failures surface here; faults on the callback path are
/// absorbed and logged, and detach never fails.
#[derive(Debug, Error)]
pub enum FanoutError {
    /// Consumer was never registered, or already torn down
    #[error("unknown consumer {consumer}")]
    UnknownConsumer { consumer: ConsumerId },

    /// Consumer is bound to another device; rebind instead
    #[error("{consumer} is already attached to '{device}'")]
    AlreadyAttached {
        consumer: ConsumerId,
        device: DeviceId,
    },

    /// Hardware connection could not be acquired; the session was rolled back
    #[error("failed to open device '{device}': {source}")]
    DeviceOpen {
        device: DeviceId,
        #[source]
        source: ContractError,
    },

    /// Contract error
    #[error("contract error: {0}")]
    Contract(#[from] ContractError),
}

/// Result alias
pub type Result<T> = std::result::Result<T, FanoutError>;
