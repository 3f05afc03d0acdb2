//! ListOutput - per-contact numeric records, one line each
//!
//! Every frame is written as a `frame` marker line followed by one record of
//! [`RECORD_LEN`] space-separated values per contact:
//!
//! `ordinal frame angle major_axis minor_axis x y vx vy identifier state size`

use contracts::{ConsumerId, ContractError, Frame, FrameOutput};
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use tracing::{debug, instrument};

/// Values per contact record
pub const RECORD_LEN: usize = 12;

/// Marker line written before each frame's records
const FRAME_MARKER: &str = "frame";

/// Encode the contacts of a frame as numeric records, in driver order
pub fn encode_contacts(frame: &Frame) -> Vec<[f32; RECORD_LEN]> {
    frame
        .contacts()
        .iter()
        .enumerate()
        .map(|(ordinal, c)| {
            [
                ordinal as f32,
                c.frame as f32,
                c.angle,
                c.major_axis,
                c.minor_axis,
                c.position.x,
                c.position.y,
                c.velocity.x,
                c.velocity.y,
                c.identifier as f32,
                c.state.code() as f32,
                c.size,
            ]
        })
        .collect()
}

/// Output writing list records to stdout or a file
pub struct ListOutput {
    name: String,
    writer: Box<dyn Write + Send>,
}

impl ListOutput {
    /// Create a ListOutput over any writer
    pub fn new(name: impl Into<String>, writer: Box<dyn Write + Send>) -> Self {
        Self {
            name: name.into(),
            writer,
        }
    }

    /// Create from params map (for factory)
    ///
    /// `path` selects a file (parent dirs are created); stdout otherwise.
    pub fn from_params(
        name: impl Into<String>,
        params: &HashMap<String, String>,
    ) -> io::Result<Self> {
        let writer: Box<dyn Write + Send> = match params.get("path").map(PathBuf::from) {
            Some(path) => {
                if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    fs::create_dir_all(parent)?;
                }
                Box::new(BufWriter::new(File::create(path)?))
            }
            None => Box::new(io::stdout()),
        };
        Ok(Self::new(name, writer))
    }

    fn write_frame(&mut self, frame: &Frame) -> io::Result<()> {
        writeln!(self.writer, "{FRAME_MARKER}")?;
        for record in encode_contacts(frame) {
            let line = record
                .iter()
                .map(|v| v.to_string())
                .collect::<Vec<_>>()
                .join(" ");
            writeln!(self.writer, "{line}")?;
        }
        Ok(())
    }
}

impl FrameOutput for ListOutput {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(
        name = "list_output_emit",
        skip(self, _consumer, frame),
        fields(output = %self.name, frame_index = frame.frame_index())
    )]
    async fn emit(&mut self, _consumer: ConsumerId, frame: &Frame) -> Result<(), ContractError> {
        self.write_frame(frame)
            .map_err(|e| ContractError::output_emit(&self.name, e.to_string()))
    }

    #[instrument(name = "list_output_flush", skip(self))]
    async fn flush(&mut self) -> Result<(), ContractError> {
        self.writer
            .flush()
            .map_err(|e| ContractError::output_emit(&self.name, e.to_string()))
    }

    #[instrument(name = "list_output_close", skip(self))]
    async fn close(&mut self) -> Result<(), ContractError> {
        self.flush().await?;
        debug!(output = %self.name, "ListOutput closed");
        Ok(())
    }
}
