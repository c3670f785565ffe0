// SPDX-License-Identifier: GPL-3.0-only

//! Depth map to sensor-space point cloud
//!
//! Uses the empirical Kinect v1 disparity model from the OpenKinect mailing
//! list rather than a pinhole intrinsic model:
//!
//! ```text
//! z_cam = 100 / (-0.00307 * d + 3.33)
//! x     = (u - 320) * (z_cam - 10) * 0.0021
//! y     = (v - 240) * (z_cam - 10) * 0.0021
//! z     = -(z_cam - 200)
//! ```
//!
//! Sampled rows run bottom-up: `v = 0` reads the last row the sensor
//! scanned, so `+y` points up in the projected cloud.

use nalgebra::{Point2, Point3};

use crate::backends::sensor::DepthFrame;
use crate::constants::projection::*;
use crate::constants::sensor::{FRAME_HEIGHT, FRAME_WIDTH, NO_RETURN, RAW_CODE_COUNT};

/// A point cloud; order carries no meaning
pub type PointCloud = Vec<Point3<f32>>;

/// Camera distance for one raw code
fn camera_z(code: u16) -> f32 {
    SCALE / (CODE_GAIN * code as f32 + CODE_OFFSET)
}

/// Image coordinates `(u, v)` a sensor-space point projects to
///
/// Inverse of [`DepthProjector::project_sample`]; `v` counts from the
/// bottom. Points at or behind the model's vanishing distance have no
/// image position.
pub fn image_coords(p: &Point3<f32>) -> Option<Point2<f32>> {
    let z_cam = SENSOR_OFFSET - p.z;
    let spread = (z_cam + MIN_DISTANCE) * DEPTH_SCALE_FACTOR;
    if !spread.is_finite() || spread <= f32::EPSILON {
        return None;
    }
    Some(Point2::new(p.x / spread + CENTER_U, p.y / spread + CENTER_V))
}

/// Projects depth frames with a fixed sampling stride
///
/// Camera distances for all 11-bit codes are tabulated once.
#[derive(Debug, Clone)]
pub struct DepthProjector {
    stride: usize,
    z_table: Vec<f32>,
}

impl DepthProjector {
    /// # Panics
    ///
    /// Panics if `stride` is zero.
    pub fn new(stride: usize) -> Self {
        assert!(stride >= 1, "sampling stride must be at least 1");
        let z_table = (0..RAW_CODE_COUNT).map(|code| camera_z(code as u16)).collect();
        Self { stride, z_table }
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Number of pixels visited per frame
    pub fn sample_count(&self) -> usize {
        (FRAME_WIDTH as usize).div_ceil(self.stride) * (FRAME_HEIGHT as usize).div_ceil(self.stride)
    }

    fn z_cam(&self, code: u16) -> f32 {
        self.z_table
            .get(code as usize)
            .copied()
            .unwrap_or_else(|| camera_z(code))
    }

    /// Project one sample at image coordinates `(u, v)`
    ///
    /// Returns `None` for the no-return sentinel.
    pub fn project_sample(&self, u: u32, v: u32, code: u16) -> Option<Point3<f32>> {
        if code == NO_RETURN {
            return None;
        }

        let z_cam = self.z_cam(code);
        let spread = (z_cam + MIN_DISTANCE) * DEPTH_SCALE_FACTOR;

        Some(Point3::new(
            (u as f32 - CENTER_U) * spread,
            (v as f32 - CENTER_V) * spread,
            -(z_cam - SENSOR_OFFSET),
        ))
    }

    /// Project the pixel at image coordinates `(u, v)` of `frame`
    ///
    /// `v` counts from the bottom of the sensor image, matching
    /// [`DepthProjector::project`]. Out-of-range coordinates miss.
    pub fn project_pixel(&self, frame: &DepthFrame, u: u32, v: u32) -> Option<Point3<f32>> {
        if u >= frame.width() || v >= frame.height() {
            return None;
        }
        let row = frame.height() - 1 - v;
        self.project_sample(u, v, frame.raw(u, row))
    }

    /// Project every sampled pixel with a valid return
    pub fn project(&self, frame: &DepthFrame) -> PointCloud {
        let mut cloud = Vec::with_capacity(self.sample_count());

        for v in (0..frame.height()).step_by(self.stride) {
            let row = frame.height() - 1 - v;
            for u in (0..frame.width()).step_by(self.stride) {
                if let Some(point) = self.project_sample(u, v, frame.raw(u, row)) {
                    cloud.push(point);
                }
            }
        }

        cloud
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f32 = 1e-3;

    #[test]
    fn test_all_sentinel_frame_is_empty() {
        let projector = DepthProjector::new(2);
        assert!(projector.project(&DepthFrame::empty(0)).is_empty());
    }

    #[test]
    fn test_count_matches_valid_samples() {
        let projector = DepthProjector::new(2);
        let mut frame = DepthFrame::empty(0);

        // Sampled rows are 479, 477, ... and sampled columns 0, 2, 4, ...
        frame.set_raw(0, 479, 600);
        frame.set_raw(2, 477, 610);
        frame.set_raw(638, 1, 620);
        // Odd column and even row: never sampled with stride 2
        frame.set_raw(3, 477, 630);
        frame.set_raw(4, 476, 640);

        assert_eq!(projector.project(&frame).len(), 3);
    }

    #[test]
    fn test_full_frame_visits_every_sample() {
        for stride in [1, 2, 3, 7] {
            let projector = DepthProjector::new(stride);
            let cloud = projector.project(&DepthFrame::filled(700, 0));
            assert_eq!(cloud.len(), projector.sample_count(), "stride {}", stride);
        }
    }

    #[test]
    fn test_known_sample_values() {
        let projector = DepthProjector::new(1);
        let code = 800u16;
        let z_cam = 100.0 / (-0.00307 * 800.0 + 3.33);

        let p = projector.project_sample(420, 140, code).unwrap();
        assert!((p.x - 100.0 * (z_cam - 10.0) * 0.0021).abs() < EPS);
        assert!((p.y + 100.0 * (z_cam - 10.0) * 0.0021).abs() < EPS);
        assert!((p.z + (z_cam - 200.0)).abs() < EPS);
    }

    #[test]
    fn test_image_centre_lies_on_axis() {
        let projector = DepthProjector::new(1);
        let p = projector.project_sample(320, 240, 750).unwrap();
        assert_eq!(p.x, 0.0);
        assert_eq!(p.y, 0.0);
    }

    #[test]
    fn test_rows_are_flipped() {
        let projector = DepthProjector::new(1);
        let mut frame = DepthFrame::empty(0);
        // Top sensor row becomes the highest v
        frame.set_raw(320, 0, 700);

        let cloud = projector.project(&frame);
        assert_eq!(cloud.len(), 1);
        assert!(cloud[0].y > 0.0);

        let picked = projector.project_pixel(&frame, 320, 479).unwrap();
        assert_eq!(picked, cloud[0]);
        assert!(projector.project_pixel(&frame, 320, 0).is_none());
    }

    #[test]
    fn test_codes_above_table_use_formula() {
        let projector = DepthProjector::new(1);
        let p = projector.project_sample(320, 240, 3000).unwrap();
        assert!((p.z + (camera_z(3000) - 200.0)).abs() < EPS);
    }

    #[test]
    fn test_image_coords_invert_projection() {
        let projector = DepthProjector::new(1);
        for (u, v, code) in [(420, 140, 800), (12, 470, 650), (320, 240, 1000)] {
            let p = projector.project_sample(u, v, code).unwrap();
            let uv = image_coords(&p).unwrap();
            assert!((uv.x - u as f32).abs() < EPS, "u for {:?}", (u, v, code));
            assert!((uv.y - v as f32).abs() < EPS, "v for {:?}", (u, v, code));
        }
    }

    #[test]
    fn test_points_past_vanishing_distance_have_no_image() {
        // z_cam = 10 collapses the spread to zero
        assert!(image_coords(&Point3::new(1.0, 1.0, SENSOR_OFFSET + MIN_DISTANCE)).is_none());
        assert!(image_coords(&Point3::new(1.0, 1.0, 500.0)).is_none());
    }

    #[test]
    fn test_out_of_range_pixel_misses() {
        let projector = DepthProjector::new(1);
        let frame = DepthFrame::filled(700, 0);
        assert!(projector.project_pixel(&frame, 640, 0).is_none());
        assert!(projector.project_pixel(&frame, 0, 480).is_none());
    }
}
