// SPDX-License-Identifier: GPL-3.0-only

//! Picking 3D points for calibration

use nalgebra::Point3;

use super::depth::DepthProjector;
use crate::backends::sensor::DepthFrame;

/// Turns a screen position into a sensor-space point
pub trait PointPicker {
    /// Point under image coordinates `(u, v)`, or `None` on a miss
    fn pick(&self, u: u32, v: u32) -> Option<Point3<f32>>;
}

/// Picks the projected depth sample under the cursor
///
/// `v` counts from the bottom of the image, as in
/// [`DepthProjector::project`].
pub struct DepthPicker<'a> {
    frame: &'a DepthFrame,
    projector: &'a DepthProjector,
}

impl<'a> DepthPicker<'a> {
    pub fn new(frame: &'a DepthFrame, projector: &'a DepthProjector) -> Self {
        Self { frame, projector }
    }
}

impl PointPicker for DepthPicker<'_> {
    fn pick(&self, u: u32, v: u32) -> Option<Point3<f32>> {
        self.projector.project_pixel(self.frame, u, v)
    }
}

/// Keyboard corners in picking order
pub const CORNER_LABELS: [&str; 3] = ["lower left", "lower right", "upper left"];

/// The three reference points collected before calibrating
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CornerSet {
    corners: [Option<Point3<f32>>; 3],
    active: usize,
}

impl CornerSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Slot the next pick goes into
    pub fn active(&self) -> usize {
        self.active
    }

    pub fn active_label(&self) -> &'static str {
        CORNER_LABELS[self.active]
    }

    /// Select slot 0, 1 or 2; other values are ignored
    pub fn select(&mut self, slot: usize) {
        if slot < self.corners.len() {
            self.active = slot;
        }
    }

    /// Store `point` in the active slot
    pub fn set(&mut self, point: Point3<f32>) {
        self.corners[self.active] = Some(point);
    }

    pub fn get(&self, slot: usize) -> Option<Point3<f32>> {
        self.corners.get(slot).copied().flatten()
    }

    /// All three points once every slot is filled
    pub fn complete(&self) -> Option<[Point3<f32>; 3]> {
        match self.corners {
            [Some(p0), Some(p1), Some(p2)] => Some([p0, p1, p2]),
            _ => None,
        }
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pick_hits_valid_sample() {
        let projector = DepthProjector::new(2);
        let mut frame = DepthFrame::empty(0);
        frame.set_raw(100, 479 - 50, 720);

        let picker = DepthPicker::new(&frame, &projector);
        let point = picker.pick(100, 50).unwrap();
        assert_eq!(Some(point), projector.project_sample(100, 50, 720));
    }

    #[test]
    fn test_corner_set_completes_after_three_slots() {
        let mut corners = CornerSet::new();
        assert_eq!(corners.active_label(), "lower left");

        corners.set(Point3::new(0.0, 0.0, 0.0));
        assert!(corners.complete().is_none());

        corners.select(1);
        corners.set(Point3::new(10.0, 0.0, 0.0));
        corners.select(2);
        corners.set(Point3::new(0.0, 5.0, 0.0));
        assert_eq!(corners.active_label(), "upper left");

        let [p0, p1, p2] = corners.complete().unwrap();
        assert_eq!(p0, Point3::origin());
        assert_eq!(p1.x, 10.0);
        assert_eq!(p2.y, 5.0);

        // Re-picking one slot keeps the others
        corners.select(0);
        corners.set(Point3::new(1.0, 0.0, 0.0));
        assert_eq!(corners.get(0), Some(Point3::new(1.0, 0.0, 0.0)));
        assert!(corners.complete().is_some());
    }

    #[test]
    fn test_corner_select_ignores_invalid_slot() {
        let mut corners = CornerSet::new();
        corners.select(2);
        corners.select(3);
        assert_eq!(corners.active(), 2);
        corners.clear();
        assert_eq!(corners.active(), 0);
    }

    #[test]
    fn test_pick_misses_no_return() {
        let projector = DepthProjector::new(1);
        let frame = DepthFrame::empty(0);
        assert!(DepthPicker::new(&frame, &projector).pick(320, 240).is_none());
    }
}
