// SPDX-License-Identifier: GPL-3.0-only

//! Depth sensor sources
//!
//! A [`DepthSource`] is pulled once per frame by the pipeline. Backends that
//! stream on their own thread publish into a [`FrameSlot`]; the pipeline
//! only ever sees the newest frame and never waits for one.
//!
//! - [`kinect`]: live Kinect v1 via freedepth (feature `freedepth`, x86_64)
//! - [`replay`]: raw frame dump recorded with `keyboard-anywhere record`

#[cfg(all(target_arch = "x86_64", feature = "freedepth"))]
pub mod kinect;
pub mod replay;

use std::sync::{Arc, Mutex};

use crate::constants::sensor::{FRAME_HEIGHT, FRAME_SAMPLES, FRAME_WIDTH, NO_RETURN};
use crate::errors::{SensorError, SensorResult};

#[cfg(all(target_arch = "x86_64", feature = "freedepth"))]
pub use kinect::KinectSource;
pub use replay::{ReplaySource, read_frames, write_frame};

/// One raw 11-bit depth image at the fixed sensor resolution
#[derive(Debug, Clone, PartialEq)]
pub struct DepthFrame {
    data: Vec<u16>,
    timestamp: u64,
}

impl DepthFrame {
    /// Wrap raw samples (row-major, as delivered by the sensor)
    ///
    /// # Panics
    ///
    /// Panics unless `data` holds exactly 640x480 samples. Frames built in
    /// code with another shape are a programming error; use
    /// [`DepthFrame::try_new`] for untrusted input.
    pub fn new(data: Vec<u16>, timestamp: u64) -> Self {
        assert_eq!(
            data.len(),
            FRAME_SAMPLES,
            "depth frame must be {}x{}",
            FRAME_WIDTH,
            FRAME_HEIGHT
        );
        Self { data, timestamp }
    }

    /// Checked constructor for data read from files or devices
    pub fn try_new(data: Vec<u16>, timestamp: u64) -> SensorResult<Self> {
        if data.len() != FRAME_SAMPLES {
            return Err(SensorError::InvalidFrame(format!(
                "expected {} samples, got {}",
                FRAME_SAMPLES,
                data.len()
            )));
        }
        Ok(Self { data, timestamp })
    }

    /// A frame with every sample set to `code`
    pub fn filled(code: u16, timestamp: u64) -> Self {
        Self::new(vec![code; FRAME_SAMPLES], timestamp)
    }

    /// A frame with no valid returns
    pub fn empty(timestamp: u64) -> Self {
        Self::filled(NO_RETURN, timestamp)
    }

    pub fn width(&self) -> u32 {
        FRAME_WIDTH
    }

    pub fn height(&self) -> u32 {
        FRAME_HEIGHT
    }

    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    pub fn data(&self) -> &[u16] {
        &self.data
    }

    /// Raw code at sensor column `x`, sensor row `y` (row 0 = first scanned)
    pub fn raw(&self, x: u32, y: u32) -> u16 {
        self.data[(y * FRAME_WIDTH + x) as usize]
    }

    pub fn set_raw(&mut self, x: u32, y: u32, code: u16) {
        self.data[(y * FRAME_WIDTH + x) as usize] = code;
    }

    /// Number of samples that are not the no-return sentinel
    pub fn valid_count(&self) -> usize {
        self.data.iter().filter(|&&d| d != NO_RETURN).count()
    }
}

/// Pull-style depth sensor interface
pub trait DepthSource {
    /// Human-readable source name (for logging and the status bar)
    fn name(&self) -> &str;

    /// Return the newest frame not returned before
    ///
    /// Returns [`SensorError::Stale`] when nothing new arrived since the
    /// previous call. Must not block longer than one frame period.
    fn poll_frame(&mut self) -> SensorResult<Arc<DepthFrame>>;
}

/// Newest-frame mailbox shared between a capture thread and the pipeline
///
/// Writers overwrite; readers see each sequence number at most once.
#[derive(Debug, Clone, Default)]
pub struct FrameSlot {
    inner: Arc<Mutex<SlotState>>,
}

#[derive(Debug, Default)]
struct SlotState {
    sequence: u64,
    frame: Option<Arc<DepthFrame>>,
    closed: bool,
}

impl FrameSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the stored frame
    pub fn publish(&self, frame: DepthFrame) {
        if let Ok(mut state) = self.inner.lock() {
            state.sequence += 1;
            state.frame = Some(Arc::new(frame));
        }
    }

    /// Mark the producer as gone
    pub fn close(&self) {
        if let Ok(mut state) = self.inner.lock() {
            state.closed = true;
        }
    }

    /// Take the newest frame if its sequence is newer than `last_seen`
    ///
    /// Updates `last_seen` on success.
    pub fn take_newer(&self, last_seen: &mut u64) -> SensorResult<Arc<DepthFrame>> {
        let state = self
            .inner
            .lock()
            .map_err(|_| SensorError::Backend("frame slot poisoned".to_string()))?;

        match &state.frame {
            Some(frame) if state.sequence > *last_seen => {
                *last_seen = state.sequence;
                Ok(Arc::clone(frame))
            }
            _ if state.closed => Err(SensorError::Disconnected),
            _ => Err(SensorError::Stale),
        }
    }
}
