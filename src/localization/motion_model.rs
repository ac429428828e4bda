//! Velocity motion model
//!
//! Exact circular-arc integration of a (v, omega) command over one sample
//! period, with the straight-line limit when omega vanishes.
//!
//! Reference:
//! - Probabilistic Robotics (Thrun, Burgard, Fox), table 5.3

use nalgebra::{Matrix2, SMatrix, Vector2, Vector3};
use tracing::trace;

use crate::common::{
    wrap_angle, ControlInput, LocalizationError, LocalizationResult, MotionModel, Pose2D,
};

/// |omega| below this takes the straight-line branch
pub const STRAIGHT_LINE_OMEGA: f64 = 1e-12;

/// Velocity motion model with a fixed sample period
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VelocityMotionModel {
    dt: f64,
}

impl VelocityMotionModel {
    pub fn new(dt: f64) -> LocalizationResult<Self> {
        if !dt.is_finite() || dt <= 0.0 {
            return Err(LocalizationError::InvalidParameter(format!(
                "sample period must be positive, got {}",
                dt
            )));
        }
        Ok(Self { dt })
    }

    /// Propagate a pose vector [x, y, yaw] under a control vector [v, omega]
    pub fn propagate_vector(&self, x: &Vector3<f64>, u: &Vector2<f64>) -> Vector3<f64> {
        let (v, omega) = (u[0], u[1]);
        let theta = x[2];
        let dt = self.dt;

        if omega.abs() < STRAIGHT_LINE_OMEGA {
            trace!(v, omega, "straight-line motion branch");
            return Vector3::new(
                x[0] + v * dt * theta.cos(),
                x[1] + v * dt * theta.sin(),
                wrap_angle(theta),
            );
        }

        let radius = v / omega;
        let w_dt = omega * dt;
        Vector3::new(
            x[0] + radius * ((theta + w_dt).sin() - theta.sin()),
            x[1] + radius * (theta.cos() - (theta + w_dt).cos()),
            wrap_angle(theta + w_dt),
        )
    }
}

/// Control noise coefficients (alpha1..alpha4)
///
/// The linear velocity noise has variance `a1 v^2 + a2 w^2`, the angular
/// velocity noise `a3 v^2 + a4 w^2`, both scaling with the commanded
/// velocities.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotionNoise {
    pub a1: f64,
    pub a2: f64,
    pub a3: f64,
    pub a4: f64,
}

impl MotionNoise {
    pub fn new(a1: f64, a2: f64, a3: f64, a4: f64) -> LocalizationResult<Self> {
        let noise = Self { a1, a2, a3, a4 };
        noise.validate()?;
        Ok(noise)
    }

    /// No control noise at all
    pub fn zero() -> Self {
        Self { a1: 0.0, a2: 0.0, a3: 0.0, a4: 0.0 }
    }

    pub fn validate(&self) -> LocalizationResult<()> {
        for (name, a) in [("a1", self.a1), ("a2", self.a2), ("a3", self.a3), ("a4", self.a4)] {
            if !a.is_finite() || a < 0.0 {
                return Err(LocalizationError::InvalidParameter(format!(
                    "motion noise {} must be finite and non-negative, got {}",
                    name, a
                )));
            }
        }
        Ok(())
    }

    /// Variances of the (v, omega) noise for a commanded control
    pub fn variances(&self, u: &ControlInput) -> Vector2<f64> {
        let v2 = u.v * u.v;
        let w2 = u.omega * u.omega;
        Vector2::new(self.a1 * v2 + self.a2 * w2, self.a3 * v2 + self.a4 * w2)
    }

    /// Diagonal control noise covariance `M(u)`
    pub fn covariance(&self, u: &ControlInput) -> Matrix2<f64> {
        Matrix2::from_diagonal(&self.variances(u))
    }
}

impl Default for MotionNoise {
    fn default() -> Self {
        Self { a1: 0.1, a2: 0.01, a3: 0.01, a4: 0.1 }
    }
}

impl MotionModel for VelocityMotionModel {
    fn propagate(&self, pose: &Pose2D, control: &ControlInput) -> Pose2D {
        self.propagate_vector(&pose.to_vector(), &control.to_vector()).into()
    }

    fn dt(&self) -> f64 {
        self.dt
    }

    /// Columns may mix turning and straight-line commands
    fn propagate_batch<const N: usize>(
        &self,
        poses: &SMatrix<f64, 3, N>,
        controls: &SMatrix<f64, 2, N>,
    ) -> SMatrix<f64, 3, N> {
        let mut out = SMatrix::<f64, 3, N>::zeros();
        for i in 0..N {
            let x = Vector3::new(poses[(0, i)], poses[(1, i)], poses[(2, i)]);
            let u = Vector2::new(controls[(0, i)], controls[(1, i)]);
            out.set_column(i, &self.propagate_vector(&x, &u));
        }
        out
    }
}
