// SPDX-License-Identifier: GPL-3.0-only

//! Application-wide constants
//!
//! Defaults for every tunable in [`crate::config::Config`] live here so the
//! config layer, the CLI help text and the tests agree on one value.

use std::time::Duration;

/// Depth sensor constants (Kinect v1, 11-bit disparity mode)
pub mod sensor {
    /// Depth frame width in pixels
    pub const FRAME_WIDTH: u32 = 640;
    /// Depth frame height in pixels
    pub const FRAME_HEIGHT: u32 = 480;
    /// Number of samples in one depth frame
    pub const FRAME_SAMPLES: usize = (FRAME_WIDTH * FRAME_HEIGHT) as usize;
    /// Raw code reported for pixels with no return
    pub const NO_RETURN: u16 = 2047;
    /// Number of distinct 11-bit raw codes
    pub const RAW_CODE_COUNT: usize = 2048;
    /// Default spatial sampling stride (divides resolution by this amount)
    pub const DEFAULT_STRIDE: usize = 2;
    /// Default freedepth device index
    pub const DEFAULT_DEVICE_INDEX: usize = 0;
}

/// Empirical disparity-to-position model
///
/// `z_cam = SCALE / (raw * CODE_GAIN + CODE_OFFSET)`, then x/y are spread
/// around the image centre proportionally to `(z_cam + MIN_DISTANCE)`.
pub mod projection {
    pub const SCALE: f32 = 100.0;
    pub const CODE_GAIN: f32 = -0.00307;
    pub const CODE_OFFSET: f32 = 3.33;
    /// Image centre column
    pub const CENTER_U: f32 = 320.0;
    /// Image centre row
    pub const CENTER_V: f32 = 240.0;
    pub const MIN_DISTANCE: f32 = -10.0;
    pub const DEPTH_SCALE_FACTOR: f32 = 0.0021;
    /// Sensor is moved this far from the origin (easier for viewing)
    pub const SENSOR_OFFSET: f32 = 200.0;
}

/// Keyboard layout defaults
pub mod keyboard {
    /// Only white keys are modelled
    pub const DEFAULT_NUM_KEYS: usize = 22;
    /// 0 = C2, 1 = D2, etc... (whites only)
    pub const DEFAULT_START_KEY: usize = 0;
    /// Width of keyboard = length * WIDTH_FACTOR
    pub const DEFAULT_WIDTH_FACTOR: f32 = 0.1;
    /// Height of keyboard = length * HEIGHT_FACTOR
    pub const DEFAULT_HEIGHT_FACTOR: f32 = 0.01;
    /// Gap between keys = length * GAP_FACTOR
    pub const DEFAULT_GAP_FACTOR: f32 = 0.01;

    /// Semitone offsets of the white keys within one octave
    pub const WHITE_BASIS: [u8; 7] = [0, 2, 4, 5, 7, 9, 11];
    /// MIDI note of the first octave's C (C2)
    pub const FIRST_OCTAVE_NOTE: u8 = 36;
    /// Number of octaves in the precomputed note table
    pub const OCTAVES: usize = 4;
    /// Total white notes available to a layout
    pub const WHITE_NOTE_COUNT: usize = WHITE_BASIS.len() * OCTAVES;

    /// RGBA colour of a released key
    pub const KEY_COLOR: [f32; 4] = [1.0, 1.0, 1.0, 0.5];
    /// RGBA colour of a pressed key
    pub const PRESSED_COLOR: [f32; 4] = [0.0, 1.0, 0.0, 0.4];
}

/// Press detection defaults
pub mod detection {
    use super::Duration;

    /// Minimum points in a key for it to be pressed (strictly more required)
    pub const DEFAULT_MIN_POINTS: usize = 4;
    /// Minimum time after the last transition before a key may press again
    pub const DEFAULT_PRESS_DEBOUNCE: Duration = Duration::from_millis(100);
    /// Minimum time a note sounds before it may be released
    pub const DEFAULT_RELEASE_DEBOUNCE: Duration = Duration::from_millis(100);
}

/// Audio output defaults
pub mod audio {
    pub const DEFAULT_CHANNEL: u8 = 0;
    pub const DEFAULT_VELOCITY: u8 = 127;
    /// General MIDI acoustic grand piano
    pub const DEFAULT_PROGRAM: u8 = 0;
    /// Client name announced to the MIDI subsystem
    pub const MIDI_CLIENT_NAME: &str = "keyboard-anywhere";
}

/// Calibration defaults
pub mod calibration {
    /// Diagonal of the placeholder transform used before calibration
    pub const DEFAULT_SCALE: f64 = 100.0;
    /// Angle of one roll nudge in radians
    pub const DEFAULT_ROLL_STEP_RAD: f64 = 0.001;
    /// Fraction of the local Z basis vector moved per Z nudge
    pub const DEFAULT_Z_STEP_FRACTION: f64 = 0.001;
    /// Minimum sine of the angle between the keyboard edges
    pub const MIN_EDGE_SINE: f64 = 1e-6;
    /// Minimum keyboard length accepted by the estimator
    pub const MIN_EDGE_LENGTH: f64 = 1e-9;
    /// File name of the persisted transform
    pub const TRANSFORM_FILE_NAME: &str = "keyboard_transform.json";
}

/// Frame loop period (~30 fps)
pub const FRAME_PERIOD: Duration = Duration::from_millis(33);

/// Directory name used under the XDG config/data/cache roots
pub const APP_DIR_NAME: &str = "keyboard-anywhere";

/// Terminal viewer constants
pub mod ui {
    /// Cursor step when Shift is held
    pub const FAST_CURSOR_STEP: u32 = 8;

    /// Raw code mapped to white in the depth preview (closest)
    pub const PREVIEW_NEAR_CODE: u16 = 400;

    /// Raw code mapped to black in the depth preview (furthest)
    pub const PREVIEW_FAR_CODE: u16 = 1100;

    /// Height of the keyboard strip in terminal rows
    pub const KEYBOARD_STRIP_HEIGHT: u16 = 5;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_white_note_table_covers_default_layout() {
        assert!(
            keyboard::DEFAULT_START_KEY + keyboard::DEFAULT_NUM_KEYS <= keyboard::WHITE_NOTE_COUNT
        );
    }

    #[test]
    fn test_sentinel_is_last_raw_code() {
        assert_eq!(sensor::NO_RETURN as usize, sensor::RAW_CODE_COUNT - 1);
    }

    #[test]
    fn test_preview_range_ordering() {
        assert!(ui::PREVIEW_NEAR_CODE < ui::PREVIEW_FAR_CODE);
        assert!(ui::PREVIEW_FAR_CODE < sensor::NO_RETURN);
    }
}
