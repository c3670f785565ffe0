// SPDX-License-Identifier: GPL-3.0-only

//! Replay of recorded depth frames
//!
//! The dump format is a plain concatenation of 640x480 native-endian `u16`
//! samples per frame, exactly the buffers the sensor delivered. A recording
//! is replayed on a paced capture thread so the pipeline sees the same
//! fresh/stale pattern as with a live sensor.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use super::{DepthFrame, DepthSource, FrameSlot};
use crate::backends::frame_loop::{CaptureLoop, LoopAction};
use crate::constants::sensor::FRAME_SAMPLES;
use crate::errors::{SensorError, SensorResult};

const FRAME_BYTES: usize = FRAME_SAMPLES * std::mem::size_of::<u16>();

/// Decode every frame in a dump file
pub fn read_frames(path: &Path) -> SensorResult<Vec<DepthFrame>> {
    let bytes = std::fs::read(path)
        .map_err(|e| SensorError::Backend(format!("{}: {}", path.display(), e)))?;

    if bytes.is_empty() || bytes.len() % FRAME_BYTES != 0 {
        return Err(SensorError::InvalidFrame(format!(
            "{}: {} bytes is not a whole number of frames",
            path.display(),
            bytes.len()
        )));
    }

    let samples: Vec<u16> = bytemuck::pod_collect_to_vec(&bytes);
    let frames = samples
        .chunks_exact(FRAME_SAMPLES)
        .enumerate()
        .map(|(index, chunk)| DepthFrame::try_new(chunk.to_vec(), index as u64))
        .collect::<SensorResult<Vec<_>>>()?;

    debug!(path = %path.display(), frames = frames.len(), "Read depth recording");
    Ok(frames)
}

/// Append one frame to a dump
pub fn write_frame<W: Write>(writer: &mut W, frame: &DepthFrame) -> std::io::Result<()> {
    writer.write_all(bytemuck::cast_slice(frame.data()))
}

/// Depth source that replays a recording in a loop
pub struct ReplaySource {
    name: String,
    slot: FrameSlot,
    last_seen: u64,
    _capture: CaptureLoop,
}

impl ReplaySource {
    /// Load `path` and start publishing one frame per `period`
    pub fn open(path: PathBuf, period: Duration) -> SensorResult<Self> {
        let frames = read_frames(&path)?;
        let name = format!(
            "replay:{}",
            path.file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default()
        );
        info!(name = %name, frames = frames.len(), "Opened depth recording");
        Ok(Self::from_frames(name, frames, period))
    }

    /// Replay frames that are already in memory
    pub fn from_frames(name: String, frames: Vec<DepthFrame>, period: Duration) -> Self {
        let slot = FrameSlot::new();
        let producer = slot.clone();
        let mut next = 0usize;
        let mut published = 0u64;

        let capture = CaptureLoop::paced(&name, period, move || {
            if frames.is_empty() {
                producer.close();
                return LoopAction::Stop;
            }
            // Timestamps keep increasing across loops of the recording
            producer.publish(DepthFrame::new(frames[next].data().to_vec(), published));
            published += 1;
            next = (next + 1) % frames.len();
            LoopAction::Continue
        });

        Self {
            name,
            slot,
            last_seen: 0,
            _capture: capture,
        }
    }
}

impl DepthSource for ReplaySource {
    fn name(&self) -> &str {
        &self.name
    }

    fn poll_frame(&mut self) -> SensorResult<Arc<DepthFrame>> {
        self.slot.take_newer(&mut self.last_seen)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn temp_path() -> PathBuf {
        std::env::temp_dir().join(format!("kb-replay-{}.raw", uuid::Uuid::new_v4()))
    }

    #[test]
    fn test_dump_round_trips_samples() {
        let path = temp_path();
        let mut first = DepthFrame::empty(0);
        first.set_raw(10, 20, 612);
        let second = DepthFrame::filled(900, 1);

        let mut file = std::fs::File::create(&path).unwrap();
        write_frame(&mut file, &first).unwrap();
        write_frame(&mut file, &second).unwrap();
        drop(file);

        let frames = read_frames(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].raw(10, 20), 612);
        assert_eq!(frames[0].valid_count(), 1);
        assert_eq!(frames[1].data(), second.data());
    }

    #[test]
    fn test_truncated_dump_is_rejected() {
        let path = temp_path();
        std::fs::write(&path, [0u8; 100]).unwrap();
        let result = read_frames(&path);
        std::fs::remove_file(&path).ok();
        assert!(matches!(result, Err(SensorError::InvalidFrame(_))));
    }

    #[test]
    fn test_replay_publishes_frames() {
        let frames = vec![DepthFrame::filled(700, 0), DepthFrame::filled(800, 0)];
        let mut source =
            ReplaySource::from_frames("test".to_string(), frames, Duration::from_millis(1));

        let deadline = Instant::now() + Duration::from_secs(2);
        let frame = loop {
            match source.poll_frame() {
                Ok(frame) => break frame,
                Err(SensorError::Stale) if Instant::now() < deadline => {
                    std::thread::sleep(Duration::from_millis(1));
                }
                Err(e) => panic!("unexpected sensor error: {}", e),
            }
        };

        assert!(frame.data()[0] == 700 || frame.data()[0] == 800);
    }
}
