// SPDX-License-Identifier: GPL-3.0-only

//! Single key region and its press state machine

use std::time::Duration;

use nalgebra::Point3;

use crate::config::DetectionConfig;
use crate::constants::keyboard::{KEY_COLOR, PRESSED_COLOR};
use crate::pipelines::transform::LocalBounds;

/// Thresholds shared by every key
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectionParams {
    /// Pressed when strictly more points than this are inside the key
    pub min_points: usize,
    /// Time since the last transition before a press is accepted
    pub press_debounce: Duration,
    /// Time since the last transition before a release is accepted
    pub release_debounce: Duration,
}

impl DetectionParams {
    pub fn from_config(config: &DetectionConfig) -> Self {
        Self {
            min_points: config.min_points,
            press_debounce: config.press_debounce(),
            release_debounce: config.release_debounce(),
        }
    }
}

impl Default for DetectionParams {
    fn default() -> Self {
        Self::from_config(&DetectionConfig::default())
    }
}

/// A press or release decided for one key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyTransition {
    Pressed,
    Released,
}

/// White key: a box in local space plus transient press state
#[derive(Debug, Clone)]
pub struct Key {
    note: u8,
    bounds: LocalBounds,
    color: [f32; 4],
    pressed: bool,
    last_transition: Duration,
    inside: usize,
}

impl Key {
    pub fn new(note: u8, bounds: LocalBounds) -> Self {
        Self {
            note,
            bounds,
            color: KEY_COLOR,
            pressed: false,
            last_transition: Duration::ZERO,
            inside: 0,
        }
    }

    pub fn note(&self) -> u8 {
        self.note
    }

    pub fn bounds(&self) -> &LocalBounds {
        &self.bounds
    }

    pub fn is_pressed(&self) -> bool {
        self.pressed
    }

    /// Time of the last press or release, relative to the session start
    pub fn last_transition(&self) -> Duration {
        self.last_transition
    }

    /// Points counted by the most recent update
    pub fn inside(&self) -> usize {
        self.inside
    }

    /// Colour to draw the key with in its current state
    pub fn display_color(&self) -> [f32; 4] {
        if self.pressed {
            PRESSED_COLOR
        } else {
            self.color
        }
    }

    /// Number of points strictly inside the key
    pub fn count_inside(&self, cloud: &[Point3<f32>]) -> usize {
        cloud.iter().filter(|p| self.bounds.contains(p)).count()
    }

    /// Run the state machine against `cloud` at time `now`
    pub fn update(
        &mut self,
        cloud: &[Point3<f32>],
        now: Duration,
        params: &DetectionParams,
    ) -> Option<KeyTransition> {
        self.inside = self.count_inside(cloud);
        let elapsed = now.saturating_sub(self.last_transition);

        if self.inside > params.min_points {
            if !self.pressed && elapsed > params.press_debounce {
                self.pressed = true;
                self.last_transition = now;
                return Some(KeyTransition::Pressed);
            }
        } else if self.pressed && elapsed > params.release_debounce {
            self.pressed = false;
            self.last_transition = now;
            return Some(KeyTransition::Released);
        }

        None
    }

    /// The six box faces as 24 quad vertices
    pub fn quads(&self) -> [Point3<f32>; 24] {
        let (x1, y1, z1) = (self.bounds.vmin.x, self.bounds.vmin.y, self.bounds.vmin.z);
        let (x2, y2, z2) = (self.bounds.vmax.x, self.bounds.vmax.y, self.bounds.vmax.z);
        let p = Point3::<f32>::new;

        [
            // bottom
            p(x1, y1, z1),
            p(x1, y2, z1),
            p(x2, y2, z1),
            p(x2, y1, z1),
            // top
            p(x1, y1, z2),
            p(x2, y1, z2),
            p(x2, y2, z2),
            p(x1, y2, z2),
            // left
            p(x1, y1, z1),
            p(x1, y1, z2),
            p(x1, y2, z2),
            p(x1, y2, z1),
            // right
            p(x2, y1, z1),
            p(x2, y2, z1),
            p(x2, y2, z2),
            p(x2, y1, z2),
            // front
            p(x1, y1, z1),
            p(x2, y1, z1),
            p(x2, y1, z2),
            p(x1, y1, z2),
            // back
            p(x1, y2, z1),
            p(x1, y2, z2),
            p(x2, y2, z2),
            p(x2, y2, z1),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(millis: u64) -> Duration {
        Duration::from_millis(millis)
    }

    fn unit_key() -> Key {
        Key::new(
            60,
            LocalBounds::new(Point3::new(0.0, 0.0, 0.0), Point3::new(1.0, 1.0, 1.0)),
        )
    }

    fn points_inside(n: usize) -> Vec<Point3<f32>> {
        vec![Point3::new(0.5, 0.5, 0.5); n]
    }

    #[test]
    fn test_min_points_is_exclusive() {
        let params = DetectionParams::default();
        let mut key = unit_key();

        assert_eq!(key.update(&points_inside(4), ms(500), &params), None);
        assert!(!key.is_pressed());
        assert_eq!(key.inside(), 4);

        assert_eq!(
            key.update(&points_inside(5), ms(500), &params),
            Some(KeyTransition::Pressed)
        );
        assert!(key.is_pressed());
        assert_eq!(key.last_transition(), ms(500));
    }

    #[test]
    fn test_press_waits_for_debounce_from_epoch() {
        let params = DetectionParams::default();
        let mut key = unit_key();

        assert_eq!(key.update(&points_inside(10), ms(100), &params), None);
        assert_eq!(
            key.update(&points_inside(10), ms(101), &params),
            Some(KeyTransition::Pressed)
        );
    }

    #[test]
    fn test_release_waits_for_debounce() {
        let params = DetectionParams::default();
        let mut key = unit_key();
        key.update(&points_inside(10), ms(200), &params);

        assert_eq!(key.update(&[], ms(250), &params), None);
        assert!(key.is_pressed());
        assert_eq!(
            key.update(&[], ms(301), &params),
            Some(KeyTransition::Released)
        );
        assert_eq!(key.last_transition(), ms(301));
    }

    #[test]
    fn test_repress_waits_after_release() {
        let params = DetectionParams::default();
        let mut key = unit_key();
        key.update(&points_inside(10), ms(200), &params);
        key.update(&[], ms(400), &params);

        assert_eq!(key.update(&points_inside(10), ms(450), &params), None);
        assert_eq!(
            key.update(&points_inside(10), ms(501), &params),
            Some(KeyTransition::Pressed)
        );
    }

    #[test]
    fn test_repeated_update_is_idempotent() {
        let params = DetectionParams::default();
        let mut key = unit_key();
        let cloud = points_inside(8);

        assert!(key.update(&cloud, ms(1000), &params).is_some());
        assert_eq!(key.update(&cloud, ms(1000), &params), None);
        assert_eq!(key.update(&cloud, ms(5000), &params), None);
    }

    #[test]
    fn test_empty_cloud_never_fires_released_key() {
        let params = DetectionParams::default();
        let mut key = unit_key();
        for t in [0, 150, 1000, 10_000] {
            assert_eq!(key.update(&[], ms(t), &params), None);
        }
    }

    #[test]
    fn test_points_on_faces_are_outside() {
        let key = unit_key();
        let cloud = vec![
            Point3::new(0.0, 0.5, 0.5),
            Point3::new(0.5, 1.0, 0.5),
            Point3::new(0.5, 0.5, 0.0),
            Point3::new(0.5, 0.5, 0.5),
        ];
        assert_eq!(key.count_inside(&cloud), 1);
    }

    #[test]
    fn test_display_color_follows_state() {
        let params = DetectionParams::default();
        let mut key = unit_key();
        assert_eq!(key.display_color(), KEY_COLOR);
        key.update(&points_inside(10), ms(200), &params);
        assert_eq!(key.display_color(), PRESSED_COLOR);
    }

    #[test]
    fn test_quads_cover_box_corners() {
        let key = unit_key();
        let quads = key.quads();
        assert_eq!(quads[0], Point3::new(0.0, 0.0, 0.0));
        assert_eq!(quads[6], Point3::new(1.0, 1.0, 1.0));
        // Every face lies on one of the six box planes
        for face in quads.chunks(4) {
            let on_plane = (0..3).any(|axis| {
                face.iter().all(|v| v[axis] == 0.0) || face.iter().all(|v| v[axis] == 1.0)
            });
            assert!(on_plane);
        }
    }
}
