//! ChannelOutput - hands frames to an in-process receiver

use contracts::{ConsumerId, ContractError, Frame, FrameOutput};
use tokio::sync::mpsc;
use tracing::{debug, instrument};

/// Output forwarding owned frame copies over a bounded channel.
///
/// Backpressure from a full channel stalls only this consumer's pump.
pub struct ChannelOutput {
    name: String,
    tx: Option<mpsc::Sender<Frame>>,
}

impl ChannelOutput {
    /// Create the output and the receiving end
    pub fn new(name: impl Into<String>, capacity: usize) -> (Self, mpsc::Receiver<Frame>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let output = Self {
            name: name.into(),
            tx: Some(tx),
        };
        (output, rx)
    }
}

impl FrameOutput for ChannelOutput {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(
        name = "channel_output_emit",
        skip(self, _consumer, frame),
        fields(output = %self.name, frame_index = frame.frame_index())
    )]
    async fn emit(&mut self, _consumer: ConsumerId, frame: &Frame) -> Result<(), ContractError> {
        let tx = self
            .tx
            .as_ref()
            .ok_or_else(|| ContractError::output_emit(&self.name, "channel closed"))?;

        tx.send(frame.clone())
            .await
            .map_err(|_| ContractError::OutputConnection {
                output_name: self.name.clone(),
                message: "receiver dropped".to_string(),
            })
    }

    async fn flush(&mut self) -> Result<(), ContractError> {
        Ok(())
    }

    #[instrument(name = "channel_output_close", skip(self))]
    async fn close(&mut self) -> Result<(), ContractError> {
        // Dropping the sender ends the receiver's stream
        self.tx = None;
        debug!(output = %self.name, "ChannelOutput closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_channel_output_forwards_frames() {
        let (mut output, mut rx) = ChannelOutput::new("chan", 4);
        let frame = Frame::new("pad".into(), 1, 0.0, Vec::new());

        output.emit(ConsumerId::from(1), &frame).await.unwrap();
        assert_eq!(rx.recv().await, Some(frame));

        output.close().await.unwrap();
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn test_dropped_receiver_is_an_error() {
        let (mut output, rx) = ChannelOutput::new("chan", 1);
        drop(rx);

        let frame = Frame::new("pad".into(), 1, 0.0, Vec::new());
        let err = output.emit(ConsumerId::from(1), &frame).await.unwrap_err();
        assert!(matches!(err, ContractError::OutputConnection { .. }));
    }
}
