// SPDX-License-Identifier: GPL-3.0-only

//! White-key layout in local space

use nalgebra::Point3;

use crate::config::KeyboardConfig;
use crate::constants::keyboard::{FIRST_OCTAVE_NOTE, OCTAVES, WHITE_BASIS, WHITE_NOTE_COUNT};
use crate::errors::{AppError, AppResult};
use crate::pipelines::transform::LocalBounds;

/// MIDI notes of every white key in the four supported octaves (C2 to B5)
pub fn white_notes() -> [u8; WHITE_NOTE_COUNT] {
    let mut notes = [0u8; WHITE_NOTE_COUNT];
    for octave in 0..OCTAVES {
        for (i, offset) in WHITE_BASIS.iter().enumerate() {
            notes[octave * WHITE_BASIS.len() + i] = FIRST_OCTAVE_NOTE + 12 * octave as u8 + offset;
        }
    }
    notes
}

/// A contiguous run of white keys spread evenly over the keyboard length
#[derive(Debug, Clone, PartialEq)]
pub struct KeyLayout {
    num_keys: usize,
    start_key: usize,
    width_factor: f32,
    height_factor: f32,
    gap_factor: f32,
}

impl KeyLayout {
    pub fn new(
        num_keys: usize,
        start_key: usize,
        width_factor: f32,
        height_factor: f32,
        gap_factor: f32,
    ) -> AppResult<Self> {
        if num_keys == 0 {
            return Err(AppError::Config("keyboard needs at least one key".into()));
        }
        if start_key + num_keys > WHITE_NOTE_COUNT {
            return Err(AppError::Config(format!(
                "keys {}..{} exceed the {} available white notes",
                start_key,
                start_key + num_keys,
                WHITE_NOTE_COUNT
            )));
        }
        if width_factor <= 0.0 || height_factor <= 0.0 {
            return Err(AppError::Config(
                "keyboard width and height must be positive".into(),
            ));
        }
        if gap_factor < 0.0 || gap_factor >= 1.0 / num_keys as f32 {
            return Err(AppError::Config(format!(
                "gap {} leaves no room for {} keys",
                gap_factor, num_keys
            )));
        }

        Ok(Self {
            num_keys,
            start_key,
            width_factor,
            height_factor,
            gap_factor,
        })
    }

    pub fn from_config(config: &KeyboardConfig) -> AppResult<Self> {
        Self::new(
            config.num_keys,
            config.start_key,
            config.width_factor,
            config.height_factor,
            config.gap_factor,
        )
    }

    pub fn num_keys(&self) -> usize {
        self.num_keys
    }

    /// Bounding box of the whole keyboard
    pub fn bounds(&self) -> LocalBounds {
        LocalBounds::keyboard(self.width_factor, self.height_factor)
    }

    /// Notes of the laid out keys, left to right
    pub fn notes(&self) -> Vec<u8> {
        white_notes()[self.start_key..self.start_key + self.num_keys].to_vec()
    }

    /// Box of slot `index`, inset by half a gap on both sides
    pub fn key_bounds(&self, index: usize) -> LocalBounds {
        let n = self.num_keys as f32;
        let half_gap = self.gap_factor / 2.0;
        LocalBounds::new(
            Point3::new(index as f32 / n + half_gap, 0.0, 0.0),
            Point3::new(
                (index + 1) as f32 / n - half_gap,
                self.width_factor,
                self.height_factor,
            ),
        )
    }

    /// `(note, box)` for every key, left to right
    pub fn key_boxes(&self) -> Vec<(u8, LocalBounds)> {
        self.notes()
            .into_iter()
            .enumerate()
            .map(|(i, note)| (note, self.key_bounds(i)))
            .collect()
    }
}

impl Default for KeyLayout {
    fn default() -> Self {
        use crate::constants::keyboard::*;
        Self {
            num_keys: DEFAULT_NUM_KEYS,
            start_key: DEFAULT_START_KEY,
            width_factor: DEFAULT_WIDTH_FACTOR,
            height_factor: DEFAULT_HEIGHT_FACTOR,
            gap_factor: DEFAULT_GAP_FACTOR,
        }
    }
}
