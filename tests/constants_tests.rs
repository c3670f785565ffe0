// SPDX-License-Identifier: GPL-3.0-only

//! Integration tests for constants module

use keyboard_anywhere::constants::{calibration, detection, keyboard, sensor};
use keyboard_anywhere::pipelines::keyboard::white_notes;

#[test]
fn test_white_note_table() {
    let notes = white_notes();
    assert_eq!(notes.len(), keyboard::WHITE_NOTE_COUNT);

    // C2, D2, ... with octaves 12 semitones apart
    assert_eq!(notes[0], keyboard::FIRST_OCTAVE_NOTE);
    assert_eq!(notes[7], keyboard::FIRST_OCTAVE_NOTE + 12);
    assert!(notes.windows(2).all(|w| w[0] < w[1]), "Notes should ascend");
}

#[test]
fn test_default_layout_fits() {
    assert!(keyboard::DEFAULT_START_KEY + keyboard::DEFAULT_NUM_KEYS <= keyboard::WHITE_NOTE_COUNT);
    assert!(keyboard::DEFAULT_GAP_FACTOR < 1.0 / keyboard::DEFAULT_NUM_KEYS as f32);
}

#[test]
fn test_frame_geometry() {
    assert_eq!(
        sensor::FRAME_SAMPLES,
        (sensor::FRAME_WIDTH * sensor::FRAME_HEIGHT) as usize
    );
    assert!(sensor::DEFAULT_STRIDE >= 1);
}

#[test]
fn test_detection_defaults_are_positive() {
    assert!(!detection::DEFAULT_PRESS_DEBOUNCE.is_zero());
    assert!(!detection::DEFAULT_RELEASE_DEBOUNCE.is_zero());
}

#[test]
fn test_nudge_steps_are_small() {
    assert!(calibration::DEFAULT_ROLL_STEP_RAD > 0.0 && calibration::DEFAULT_ROLL_STEP_RAD < 0.01);
    assert!(calibration::DEFAULT_Z_STEP_FRACTION > 0.0 && calibration::DEFAULT_Z_STEP_FRACTION < 0.01);
}
