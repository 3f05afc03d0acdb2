//! LogOutput - logs frame summaries via tracing

use contracts::{ConsumerId, ContractError, Frame, FrameOutput};
use tracing::{info, instrument};

/// Output that logs frame summaries for debugging
pub struct LogOutput {
    name: String,
    frames: u64,
}

impl LogOutput {
    /// Create a new LogOutput with the given name
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            frames: 0,
        }
    }

    /// Frames logged so far
    pub fn frames(&self) -> u64 {
        self.frames
    }
}

impl FrameOutput for LogOutput {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(
        name = "log_output_emit",
        skip(self, frame),
        fields(output = %self.name, frame_index = frame.frame_index())
    )]
    async fn emit(&mut self, consumer: ConsumerId, frame: &Frame) -> Result<(), ContractError> {
        self.frames += 1;
        info!(
            output = %self.name,
            consumer = %consumer,
            device = %frame.device(),
            frame_index = frame.frame_index(),
            timestamp = frame.timestamp(),
            contacts = frame.len(),
            "Frame received"
        );
        Ok(())
    }

    #[instrument(name = "log_output_flush", skip(self))]
    async fn flush(&mut self) -> Result<(), ContractError> {
        Ok(())
    }

    #[instrument(name = "log_output_close", skip(self))]
    async fn close(&mut self) -> Result<(), ContractError> {
        info!(output = %self.name, frames = self.frames, "LogOutput closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_log_output_emit() {
        let mut output = LogOutput::new("test_log");
        let frame = Frame::new("pad".into(), 1, 0.5, Vec::new());

        assert!(output.emit(ConsumerId::from(1), &frame).await.is_ok());
        assert_eq!(output.frames(), 1);
        assert_eq!(output.name(), "test_log");
    }
}
