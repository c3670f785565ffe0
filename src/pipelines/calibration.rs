// SPDX-License-Identifier: GPL-3.0-only

//! Keyboard pose and scale
//!
//! A [`Calibration`] maps keyboard-local coordinates to sensor space. Local
//! space is normalized so the keyboard spans `x ∈ [0, 1]` along its length;
//! the same scale is applied to the other two axes.
//!
//! The matrix is kept in `f64` and only its cached inverse is converted to
//! `f32` for the per-frame transform.

use nalgebra::{Matrix3, Matrix4, Point3, Unit, Vector3, Vector4};
use tracing::debug;

use crate::constants::calibration::{DEFAULT_SCALE, MIN_EDGE_LENGTH, MIN_EDGE_SINE};
use crate::errors::CalibrationError;

/// An invertible local-to-sensor transform and its cached inverse
#[derive(Debug, Clone, PartialEq)]
pub struct Calibration {
    transform: Matrix4<f64>,
    inverse: Matrix4<f64>,
    inverse_f32: Matrix4<f32>,
}

impl Calibration {
    /// Accept `transform` if it is invertible
    pub fn new(transform: Matrix4<f64>) -> Result<Self, CalibrationError> {
        if !transform.iter().all(|v| v.is_finite()) {
            return Err(CalibrationError::Singular);
        }
        let inverse = transform
            .try_inverse()
            .filter(|inv| inv.iter().all(|v| v.is_finite()))
            .ok_or(CalibrationError::Singular)?;

        Ok(Self {
            transform,
            inverse,
            inverse_f32: inverse.cast::<f32>(),
        })
    }

    /// Transform used before the first calibration: `diag(100, 100, 100, 1)`
    pub fn placeholder() -> Self {
        let transform = Matrix4::from_diagonal(&Vector4::new(
            DEFAULT_SCALE,
            DEFAULT_SCALE,
            DEFAULT_SCALE,
            1.0,
        ));
        let inverse = Matrix4::from_diagonal(&Vector4::new(
            1.0 / DEFAULT_SCALE,
            1.0 / DEFAULT_SCALE,
            1.0 / DEFAULT_SCALE,
            1.0,
        ));
        Self {
            transform,
            inverse,
            inverse_f32: inverse.cast::<f32>(),
        }
    }

    pub fn identity() -> Self {
        Self {
            transform: Matrix4::identity(),
            inverse: Matrix4::identity(),
            inverse_f32: Matrix4::identity(),
        }
    }

    /// Estimate the keyboard pose from three picked points
    ///
    /// `p0` is the lower left corner, `p1` the lower right corner (along the
    /// keyboard length) and `p2` any other point on the keyboard plane. The
    /// length `|p1 - p0|` becomes the scale of all three local axes.
    pub fn from_points(
        p0: &Point3<f64>,
        p1: &Point3<f64>,
        p2: &Point3<f64>,
    ) -> Result<Self, CalibrationError> {
        let x_axis = p1 - p0;
        let scale = x_axis.norm();
        if !scale.is_finite() || scale < MIN_EDGE_LENGTH {
            return Err(CalibrationError::Degenerate("first two points coincide"));
        }

        let planar = p2 - p0;
        let normal = x_axis.cross(&planar);
        // |a x b| = |a| |b| sin(angle)
        if normal.norm() <= MIN_EDGE_SINE * scale * planar.norm() {
            return Err(CalibrationError::Degenerate("points are collinear"));
        }

        let z_dir = Unit::try_new(normal, MIN_EDGE_LENGTH)
            .ok_or(CalibrationError::Degenerate("points are collinear"))?;
        let z_axis = z_dir.into_inner() * scale;

        let y_dir = Unit::try_new(x_axis.cross(&z_axis), MIN_EDGE_LENGTH)
            .ok_or(CalibrationError::Degenerate("points do not span a plane"))?;
        let y_axis = -y_dir.into_inner() * scale;

        let mut transform = Matrix4::identity();
        transform
            .fixed_view_mut::<3, 3>(0, 0)
            .copy_from(&Matrix3::from_columns(&[x_axis, y_axis, z_axis]));
        transform
            .fixed_view_mut::<3, 1>(0, 3)
            .copy_from(&p0.coords);

        debug!(scale, "Estimated keyboard transform");
        Self::new(transform)
    }

    /// Rotate about the local Y axis by `sign * step` radians
    pub fn nudged_roll(&self, sign: f64, step: f64) -> Result<Self, CalibrationError> {
        let t = sign * step;
        let (s, c) = t.sin_cos();

        #[rustfmt::skip]
        let delta = Matrix4::new(
            c,   0.0, -s,  0.0,
            0.0, 1.0, 0.0, 0.0,
            s,   0.0, c,   0.0,
            0.0, 0.0, 0.0, 1.0,
        );

        Self::new(self.transform * delta)
    }

    /// Move along the local Z axis by `sign * fraction` of its basis vector
    pub fn nudged_z(&self, sign: f64, fraction: f64) -> Result<Self, CalibrationError> {
        let shift: Vector3<f64> = self.transform.fixed_view::<3, 1>(0, 2) * (fraction * sign);

        let mut transform = self.transform;
        let mut translation = transform.fixed_view_mut::<3, 1>(0, 3);
        translation += shift;

        Self::new(transform)
    }

    /// Local to sensor space
    pub fn transform(&self) -> &Matrix4<f64> {
        &self.transform
    }

    /// Sensor to local space
    pub fn inverse(&self) -> &Matrix4<f64> {
        &self.inverse
    }

    /// Single-precision inverse for per-frame use
    pub fn inverse_f32(&self) -> &Matrix4<f32> {
        &self.inverse_f32
    }

    /// Keyboard length in sensor units
    pub fn scale(&self) -> f64 {
        self.transform.fixed_view::<3, 1>(0, 0).norm()
    }

    /// Map one sensor-space point into local space
    pub fn to_local(&self, p: &Point3<f64>) -> Point3<f64> {
        self.inverse.transform_point(p)
    }

    /// Map one local point into sensor space
    pub fn to_sensor(&self, p: &Point3<f64>) -> Point3<f64> {
        self.transform.transform_point(p)
    }

    /// Rows of the local-to-sensor matrix
    pub fn rows(&self) -> [[f64; 4]; 4] {
        let mut rows = [[0.0; 4]; 4];
        for (r, row) in rows.iter_mut().enumerate() {
            for (c, value) in row.iter_mut().enumerate() {
                *value = self.transform[(r, c)];
            }
        }
        rows
    }

    /// Build from row-major values
    pub fn from_rows(rows: &[[f64; 4]; 4]) -> Result<Self, CalibrationError> {
        Self::new(Matrix4::from_fn(|r, c| rows[r][c]))
    }
}

impl Default for Calibration {
    fn default() -> Self {
        Self::placeholder()
    }
}
