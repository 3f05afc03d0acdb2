//! FrameOutput trait - delivery pump output interface

use crate::{ConsumerId, ContractError, Frame};

/// Output collaborator
///
/// Called from a consumer's delivery pump, once per queued frame, in FIFO
/// order. Never called while the registry lock is held, so implementations
/// may be arbitrarily slow.
#[trait_variant::make(FrameOutput: Send)]
pub trait LocalFrameOutput {
    /// Output name (used for logging/metrics)
    fn name(&self) -> &str;

    /// Emit one frame on behalf of `consumer`
    ///
    /// # Errors
    /// Returns output error (should include context)
    async fn emit(&mut self, consumer: ConsumerId, frame: &Frame) -> Result<(), ContractError>;

    /// Flush buffer (if any)
    async fn flush(&mut self) -> Result<(), ContractError>;

    /// Close output
    async fn close(&mut self) -> Result<(), ContractError>;
}
