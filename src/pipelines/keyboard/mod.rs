// SPDX-License-Identifier: GPL-3.0-only

//! Virtual keyboard: calibration plus an ordered row of keys
//!
//! Each frame the sensor cloud is clipped to the keyboard volume in local
//! space, then every key counts the points inside its own box and decides
//! whether it is pressed. Transitions are sent to a [`NoteSink`].

pub mod key;
pub mod layout;

use std::time::Duration;

use nalgebra::Point3;
use tracing::debug;

use crate::backends::audio::NoteSink;
use crate::config::{AudioConfig, Config};
use crate::errors::AppResult;
use crate::pipelines::calibration::Calibration;
use crate::pipelines::depth::PointCloud;
use crate::pipelines::transform::{self, LocalBounds};

pub use key::{DetectionParams, Key, KeyTransition};
pub use layout::{KeyLayout, white_notes};

/// Note event sent for one key transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoteEvent {
    On { note: u8, velocity: u8 },
    Off { note: u8 },
}

/// Keyboard state owned by the session
#[derive(Debug, Clone)]
pub struct Keyboard {
    calibration: Calibration,
    bounds: LocalBounds,
    keys: Vec<Key>,
    params: DetectionParams,
    channel: u8,
    velocity: u8,
}

impl Keyboard {
    pub fn new(
        calibration: Calibration,
        layout: &KeyLayout,
        params: DetectionParams,
        audio: &AudioConfig,
    ) -> Self {
        let keys = layout
            .key_boxes()
            .into_iter()
            .map(|(note, bounds)| Key::new(note, bounds))
            .collect();

        Self {
            calibration,
            bounds: layout.bounds(),
            keys,
            params,
            channel: audio.channel,
            velocity: audio.velocity,
        }
    }

    /// Build from the user configuration
    pub fn from_config(config: &Config, calibration: Calibration) -> AppResult<Self> {
        let layout = KeyLayout::from_config(&config.keyboard)?;
        Ok(Self::new(
            calibration,
            &layout,
            DetectionParams::from_config(&config.detection),
            &config.audio,
        ))
    }

    pub fn calibration(&self) -> &Calibration {
        &self.calibration
    }

    /// Swap the active calibration; key state is kept
    pub fn set_calibration(&mut self, calibration: Calibration) {
        self.calibration = calibration;
    }

    pub fn bounds(&self) -> &LocalBounds {
        &self.bounds
    }

    pub fn keys(&self) -> &[Key] {
        &self.keys
    }

    /// Sensor cloud to local points inside the keyboard volume
    pub fn clip(&self, sensor_cloud: &[Point3<f32>]) -> PointCloud {
        transform::clip_to_keyboard(sensor_cloud, &self.calibration, &self.bounds)
    }

    /// Run every key against an already clipped local cloud
    ///
    /// Each key sees the whole cloud. Transitions are forwarded to `sink`
    /// and returned in key order.
    pub fn update(
        &mut self,
        local_cloud: &[Point3<f32>],
        now: Duration,
        sink: &mut dyn NoteSink,
    ) -> Vec<NoteEvent> {
        let mut events = Vec::new();

        for key in &mut self.keys {
            let Some(transition) = key.update(local_cloud, now, &self.params) else {
                continue;
            };

            let event = match transition {
                KeyTransition::Pressed => {
                    sink.note_on(self.channel, key.note(), self.velocity);
                    NoteEvent::On {
                        note: key.note(),
                        velocity: self.velocity,
                    }
                }
                KeyTransition::Released => {
                    sink.note_off(self.channel, key.note());
                    NoteEvent::Off { note: key.note() }
                }
            };
            debug!(note = key.note(), ?transition, points = key.inside(), "Key transition");
            events.push(event);
        }

        events
    }

    /// Number of keys currently pressed
    pub fn pressed_count(&self) -> usize {
        self.keys.iter().filter(|k| k.is_pressed()).count()
    }
}
