// SPDX-License-Identifier: GPL-3.0-only

//! Sensor space to keyboard-local space
//!
//! Runs every frame on the full projected cloud, so only the affine part of
//! the inverse transform is applied and the bounding clip happens in the
//! same pass.

use nalgebra::{Matrix3, Point3, Vector3};

use super::calibration::Calibration;
use super::depth::PointCloud;

/// Axis-aligned box in local space
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocalBounds {
    pub vmin: Point3<f32>,
    pub vmax: Point3<f32>,
}

impl LocalBounds {
    pub fn new(vmin: Point3<f32>, vmax: Point3<f32>) -> Self {
        Self { vmin, vmax }
    }

    /// The whole keyboard: unit length, `width_factor` deep and
    /// `height_factor` tall
    pub fn keyboard(width_factor: f32, height_factor: f32) -> Self {
        Self::new(
            Point3::origin(),
            Point3::new(1.0, width_factor, height_factor),
        )
    }

    /// Strictly inside on all three axes
    pub fn contains(&self, p: &Point3<f32>) -> bool {
        p.x > self.vmin.x
            && p.x < self.vmax.x
            && p.y > self.vmin.y
            && p.y < self.vmax.y
            && p.z > self.vmin.z
            && p.z < self.vmax.z
    }
}

/// Affine part of a calibration's inverse
fn inverse_affine(calibration: &Calibration) -> (Matrix3<f32>, Vector3<f32>) {
    let inverse = calibration.inverse_f32();
    (
        inverse.fixed_view::<3, 3>(0, 0).into_owned(),
        inverse.fixed_view::<3, 1>(0, 3).into_owned(),
    )
}

/// Map every point into local space
pub fn to_local(cloud: &[Point3<f32>], calibration: &Calibration) -> PointCloud {
    let (rotation, translation) = inverse_affine(calibration);
    cloud
        .iter()
        .map(|p| Point3::from(rotation * p.coords + translation))
        .collect()
}

/// Map into local space and keep only points strictly inside `bounds`
pub fn clip_to_keyboard(
    cloud: &[Point3<f32>],
    calibration: &Calibration,
    bounds: &LocalBounds,
) -> PointCloud {
    let (rotation, translation) = inverse_affine(calibration);
    cloud
        .iter()
        .map(|p| Point3::from(rotation * p.coords + translation))
        .filter(|p| bounds.contains(p))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_round_trip() {
        let cloud = vec![
            Point3::new(1.5, -2.0, 3.25),
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(-100.0, 40.0, 7.0),
        ];
        let local = to_local(&cloud, &Calibration::identity());
        assert_eq!(local, cloud);
    }

    #[test]
    fn test_clip_uses_strict_bounds() {
        let bounds = LocalBounds::keyboard(0.1, 0.01);
        let cloud = vec![
            Point3::new(0.5, 0.05, 0.005),
            // On the boundary planes
            Point3::new(0.0, 0.05, 0.005),
            Point3::new(0.5, 0.1, 0.005),
            Point3::new(0.5, 0.05, 0.0),
            // Outside
            Point3::new(1.5, 0.05, 0.005),
            Point3::new(0.5, -0.05, 0.005),
        ];

        let clipped = clip_to_keyboard(&cloud, &Calibration::identity(), &bounds);
        assert_eq!(clipped, vec![Point3::new(0.5, 0.05, 0.005)]);
    }

    #[test]
    fn test_placeholder_scales_into_bounds() {
        let bounds = LocalBounds::keyboard(0.1, 0.01);
        let cloud = vec![Point3::new(50.0, 5.0, 0.5), Point3::new(50.0, 5.0, 2.0)];

        let clipped = clip_to_keyboard(&cloud, &Calibration::placeholder(), &bounds);
        assert_eq!(clipped.len(), 1);
        assert!((clipped[0].x - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_clip_matches_filtered_to_local() {
        let calibration = Calibration::from_points(
            &Point3::new(-30.0, -10.0, 50.0),
            &Point3::new(30.0, -10.0, 55.0),
            &Point3::new(-30.0, 0.0, 50.0),
        )
        .unwrap();
        let bounds = LocalBounds::keyboard(0.1, 0.01);

        let cloud: Vec<Point3<f32>> = (0..400)
            .map(|i| {
                let t = i as f32;
                Point3::new(-40.0 + t * 0.2, -12.0 + (t * 0.37) % 8.0, 49.0 + (t * 0.11) % 7.0)
            })
            .collect();

        let expected: Vec<_> = to_local(&cloud, &calibration)
            .into_iter()
            .filter(|p| bounds.contains(p))
            .collect();
        assert_eq!(clip_to_keyboard(&cloud, &calibration, &bounds), expected);
    }
}
