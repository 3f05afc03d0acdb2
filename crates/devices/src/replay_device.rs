//! Replay devices
//!
//! Plays back JSONL recordings (one serialized `Frame` per line, as written by
//! the file output) at their original pace, scaled by a speed multiplier.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::time::Duration;

use contracts::{
    ContactCallback, ContractError, DeviceEnumerator, DeviceId, DeviceManager, Frame,
    RecordingConfig,
};
use tracing::{debug, info};

use crate::driver::{source_factory, Sample, SampleSource, SamplingDriver};
use crate::error::{DeviceError, Result};

/// Replay settings shared by every recording of a driver
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReplayConfig {
    /// Playback speed multiplier (1.0 = original pace)
    pub speed: f64,

    /// Restart from the first frame when the recording ends
    pub loop_playback: bool,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            speed: 1.0,
            loop_playback: false,
        }
    }
}

/// Load a recording, sorted by timestamp
pub fn load_recording(path: &Path) -> Result<Vec<Frame>> {
    let file = File::open(path).map_err(|e| DeviceError::recording(path, e.to_string()))?;
    let reader = BufReader::new(file);

    let mut frames = Vec::new();
    for (line_no, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let frame: Frame = serde_json::from_str(&line)
            .map_err(|e| DeviceError::recording(path, format!("line {}: {e}", line_no + 1)))?;
        frames.push(frame);
    }

    frames.sort_by(|a, b| a.timestamp().total_cmp(&b.timestamp()));
    info!(path = %path.display(), frames = frames.len(), "Loaded recording");
    Ok(frames)
}

/// Pause between the last and first frame of a looped recording whose
/// frames all share one timestamp
const DEFAULT_WRAP_GAP: f64 = 1.0 / 60.0;

/// Sample source over a loaded recording.
///
/// Frame indices are renumbered from 1 so they stay monotonic across loops.
/// Each pass is shifted by the recording span plus a wrap gap, the first
/// non-zero inter-frame gap (or [`DEFAULT_WRAP_GAP`]).
struct RecordingSource {
    frames: Vec<Frame>,
    /// Scaled delay before frame `i`; slot 0 holds the loop wrap delay
    delays: Vec<Duration>,
    loop_playback: bool,
    pass_span: f64,
    position: usize,
    loop_offset: f64,
    emitted: u64,
}

impl RecordingSource {
    fn new(device: &DeviceId, frames: Vec<Frame>, config: ReplayConfig) -> Result<Self> {
        let speed = config.speed;
        if !(speed.is_finite() && speed > 0.0) {
            return Err(DeviceError::start_failed(
                device,
                format!("invalid replay speed {speed}"),
            ));
        }

        let gaps: Vec<f64> = frames
            .windows(2)
            .map(|w| (w[1].timestamp() - w[0].timestamp()).max(0.0))
            .collect();
        let wrap_gap = gaps
            .iter()
            .copied()
            .find(|gap| *gap > 0.0)
            .unwrap_or(DEFAULT_WRAP_GAP);
        let span = match (frames.first(), frames.last()) {
            (Some(first), Some(last)) => last.timestamp() - first.timestamp(),
            _ => 0.0,
        };

        let delays = std::iter::once(wrap_gap)
            .chain(gaps)
            .map(|gap| {
                Duration::try_from_secs_f64(gap / speed).map_err(|e| {
                    DeviceError::start_failed(device, format!("unusable frame delay: {e}"))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            frames,
            delays,
            loop_playback: config.loop_playback,
            pass_span: span + wrap_gap,
            position: 0,
            loop_offset: 0.0,
            emitted: 0,
        })
    }
}

impl SampleSource for RecordingSource {
    fn next_sample(&mut self) -> Option<Sample> {
        if self.position >= self.frames.len() {
            if !self.loop_playback || self.frames.is_empty() {
                return None;
            }
            debug!("Looping recording");
            self.loop_offset += self.pass_span;
            self.position = 0;
        }

        let frame = self.frames.get(self.position)?;
        let delay = match self.emitted {
            0 => Duration::ZERO,
            _ => self.delays.get(self.position).copied().unwrap_or_default(),
        };

        self.position += 1;
        self.emitted += 1;

        Some(Sample {
            delay,
            timestamp: frame.timestamp() + self.loop_offset,
            frame_index: self.emitted,
            contacts: frame.contacts().to_vec(),
        })
    }
}

/// Replay multitouch driver
///
/// Exposes one device per recording. The recording is (re)loaded on every
/// `start`, so a missing or malformed file surfaces as a start failure.
pub struct ReplayDriver {
    inner: SamplingDriver,
}

impl ReplayDriver {
    /// Create driver from recording configs
    pub fn new(recordings: &[RecordingConfig], config: ReplayConfig) -> Self {
        let mut inner = SamplingDriver::new();
        for recording in recordings {
            let path: PathBuf = recording.path.clone();
            inner.add_device(
                DeviceId::new(&recording.id),
                source_factory(move |device| {
                    let frames = load_recording(&path)?;
                    RecordingSource::new(device, frames, config)
                }),
            );
        }
        Self { inner }
    }
}

impl Deref for ReplayDriver {
    type Target = SamplingDriver;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl DeviceEnumerator for ReplayDriver {
    fn list_devices(&self) -> Vec<DeviceId> {
        self.inner.list_devices()
    }
}

impl DeviceManager for ReplayDriver {
    fn register_callback(
        &self,
        device: &DeviceId,
        callback: Option<ContactCallback>,
    ) -> std::result::Result<(), ContractError> {
        self.inner.register_callback(device, callback)
    }

    fn start(&self, device: &DeviceId) -> std::result::Result<(), ContractError> {
        self.inner.start(device)
    }

    fn stop(&self, device: &DeviceId) -> std::result::Result<(), ContractError> {
        self.inner.stop(device)
    }

    fn release(&self, device: &DeviceId) -> std::result::Result<(), ContractError> {
        self.inner.release(device)
    }
}
