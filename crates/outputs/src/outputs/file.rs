//! FileOutput - JSON-lines frame capture
//!
//! One serialized `Frame` per line. The replay driver reads the same format
//! back, so a capture can be played through the distribution core again.

use contracts::{ConsumerId, ContractError, Frame, FrameOutput};
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use tracing::{debug, error, instrument};

/// Configuration for FileOutput
#[derive(Debug, Clone)]
pub struct FileOutputConfig {
    /// Capture file path
    pub path: PathBuf,
}

impl FileOutputConfig {
    /// Create config from params map
    pub fn from_params(params: &HashMap<String, String>) -> Result<Self, String> {
        let path = params
            .get("path")
            .map(PathBuf::from)
            .ok_or_else(|| "missing 'path' parameter".to_string())?;

        Ok(Self { path })
    }
}

/// Output that appends frames to a JSON-lines file
pub struct FileOutput {
    name: String,
    config: FileOutputConfig,
    writer: Option<BufWriter<File>>,
    written: u64,
}

impl FileOutput {
    /// Create a new FileOutput, truncating any existing capture
    pub fn new(name: impl Into<String>, config: FileOutputConfig) -> std::io::Result<Self> {
        if let Some(parent) = config.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let file = File::create(&config.path)?;

        Ok(Self {
            name: name.into(),
            config,
            writer: Some(BufWriter::new(file)),
            written: 0,
        })
    }

    /// Create from params map (for factory)
    pub fn from_params(
        name: impl Into<String>,
        params: &HashMap<String, String>,
    ) -> Result<Self, ContractError> {
        let name = name.into();
        let config = FileOutputConfig::from_params(params)
            .map_err(|e| ContractError::output_emit(&name, e))?;
        Self::new(name.clone(), config).map_err(|e| ContractError::OutputConnection {
            output_name: name,
            message: e.to_string(),
        })
    }

    /// Frames written so far
    pub fn written(&self) -> u64 {
        self.written
    }

    fn writer(&mut self) -> Result<&mut BufWriter<File>, ContractError> {
        self.writer
            .as_mut()
            .ok_or_else(|| ContractError::output_emit(&self.name, "file already closed"))
    }
}

impl FrameOutput for FileOutput {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(
        name = "file_output_emit",
        skip(self, _consumer, frame),
        fields(output = %self.name, frame_index = frame.frame_index())
    )]
    async fn emit(&mut self, _consumer: ConsumerId, frame: &Frame) -> Result<(), ContractError> {
        let name = self.name.clone();
        let writer = self.writer()?;

        let result = serde_json::to_writer(&mut *writer, frame)
            .map_err(std::io::Error::from)
            .and_then(|()| writer.write_all(b"\n"));
        if let Err(e) = result {
            error!(output = %name, error = %e, "Failed to write frame");
            return Err(ContractError::output_emit(name, e.to_string()));
        }

        self.written += 1;
        Ok(())
    }

    #[instrument(name = "file_output_flush", skip(self))]
    async fn flush(&mut self) -> Result<(), ContractError> {
        if let Some(writer) = self.writer.as_mut() {
            writer
                .flush()
                .map_err(|e| ContractError::output_emit(&self.name, e.to_string()))?;
        }
        Ok(())
    }

    #[instrument(name = "file_output_close", skip(self))]
    async fn close(&mut self) -> Result<(), ContractError> {
        self.flush().await?;
        self.writer = None;
        debug!(
            output = %self.name,
            path = %self.config.path.display(),
            frames = self.written,
            "FileOutput closed"
        );
        Ok(())
    }
}
