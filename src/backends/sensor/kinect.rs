// SPDX-License-Identifier: GPL-3.0-only

#![cfg(all(target_arch = "x86_64", feature = "freedepth"))]

//! Live Kinect v1 depth via freedepth
//!
//! freedepth streams over USB directly (the kernel driver is unbound while
//! streaming and rebound on drop). Only the raw 11-bit depth stream is
//! used; the video endpoint is drained and discarded.

use std::fmt;
use std::sync::Arc;
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::time::Duration;

use freedepth::{DepthFormat, DepthFrame as RawDepthFrame, KinectStreamer, Resolution, VideoFormat};
use tracing::{debug, info, warn};

use super::{DepthFrame, DepthSource, FrameSlot};
use crate::backends::frame_loop::{CaptureLoop, LoopAction};
use crate::errors::{SensorError, SensorResult};

/// How long the capture thread waits for a depth frame before checking
/// its stop signal again
const RECV_TIMEOUT: Duration = Duration::from_millis(50);

/// A depth sensor found by freedepth
#[derive(Debug, Clone)]
pub struct SensorInfo {
    pub index: usize,
    pub name: String,
    pub serial: String,
}

/// List connected sensors
pub fn enumerate_sensors() -> Vec<SensorInfo> {
    match freedepth::enumerate_devices() {
        Ok(devices) => devices
            .iter()
            .map(|dev| SensorInfo {
                index: dev.index,
                name: dev.name.clone(),
                serial: dev
                    .id
                    .serial
                    .clone()
                    .unwrap_or_else(|| "unknown".to_string()),
            })
            .collect(),
        Err(e) => {
            debug!("Failed to enumerate depth sensors: {}", e);
            Vec::new()
        }
    }
}

/// Streaming Kinect depth source
pub struct KinectSource {
    name: String,
    slot: FrameSlot,
    last_seen: u64,
    capture: Option<CaptureLoop>,
    streamer: Option<KinectStreamer>,
}

impl KinectSource {
    /// Unbind the kernel driver and start depth streaming on `device_index`
    pub fn open(device_index: usize) -> SensorResult<Self> {
        if enumerate_sensors()
            .iter()
            .all(|sensor| sensor.index != device_index)
        {
            return Err(SensorError::NoDevice);
        }

        info!(device = device_index, "Starting Kinect depth stream");

        let mut streamer = KinectStreamer::new(device_index)
            .map_err(|e| SensorError::Backend(format!("Failed to open sensor: {}", e)))?;

        let (video_rx, depth_rx) = match streamer.start(
            VideoFormat::Bayer,
            Resolution::Medium,
            DepthFormat::Depth11Bit,
        ) {
            Ok(receivers) => receivers,
            Err(e) => return Err(start_failed(e, || streamer.rebind_driver())),
        };

        let slot = FrameSlot::new();
        let capture = CaptureLoop::spawn(
            "kinect-depth",
            capture_step(slot.clone(), video_rx, depth_rx),
        );

        Ok(Self {
            name: format!("kinect:{}", device_index),
            slot,
            last_seen: 0,
            capture: Some(capture),
            streamer: Some(streamer),
        })
    }
}

/// Hand the device back to the kernel driver after a failed stream start
///
/// Opening the streamer already unbound the driver.
fn start_failed<E, R, F>(error: E, rebind: F) -> SensorError
where
    E: fmt::Display,
    R: fmt::Display,
    F: FnOnce() -> Result<(), R>,
{
    if let Err(e) = rebind() {
        warn!("Failed to rebind kernel driver: {}", e);
    }
    SensorError::Backend(format!("Failed to start streaming: {}", error))
}

/// One iteration of the capture thread: drain video, wait for depth
fn capture_step<V: Send + 'static>(
    slot: FrameSlot,
    video_rx: Receiver<V>,
    depth_rx: Receiver<RawDepthFrame>,
) -> impl FnMut() -> LoopAction + Send + 'static {
    let mut dropped = 0u64;

    move || {
        while video_rx.try_recv().is_ok() {}

        match depth_rx.recv_timeout(RECV_TIMEOUT) {
            Ok(raw) => match raw.as_u16() {
                Some(samples) => match DepthFrame::try_new(samples.to_vec(), raw.timestamp as u64)
                {
                    Ok(frame) => slot.publish(frame),
                    Err(e) => {
                        dropped += 1;
                        warn!(dropped, error = %e, "Dropping malformed depth frame");
                    }
                },
                None => {
                    dropped += 1;
                    debug!(dropped, "Depth frame without u16 payload");
                }
            },
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => {
                info!("Depth channel disconnected");
                slot.close();
                return LoopAction::Stop;
            }
        }

        LoopAction::Continue
    }
}

impl DepthSource for KinectSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn poll_frame(&mut self) -> SensorResult<Arc<DepthFrame>> {
        self.slot.take_newer(&mut self.last_seen)
    }
}

impl Drop for KinectSource {
    fn drop(&mut self) {
        if let Some(mut capture) = self.capture.take() {
            capture.stop();
        }

        // Stopping the streamer rebinds the kernel driver
        if let Some(mut streamer) = self.streamer.take() {
            streamer.stop();
            if let Err(e) = streamer.rebind_driver() {
                warn!("Failed to rebind kernel driver: {}", e);
            }
        }

        info!(name = %self.name, "Kinect depth stream stopped");
    }
}
