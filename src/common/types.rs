//! Common types used throughout ukf_localization

use std::ops::Deref;
use std::sync::Arc;

use nalgebra::{Vector2, Vector3};

use crate::common::angle::wrap_angle;
use crate::common::error::{LocalizationError, LocalizationResult};

/// 2D point representation (landmark positions)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point2D {
    pub x: f64,
    pub y: f64,
}

impl Point2D {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn origin() -> Self {
        Self { x: 0.0, y: 0.0 }
    }

    pub fn distance(&self, other: &Point2D) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }

    pub fn to_vector(&self) -> Vector2<f64> {
        Vector2::new(self.x, self.y)
    }
}

impl From<(f64, f64)> for Point2D {
    fn from(tuple: (f64, f64)) -> Self {
        Self { x: tuple.0, y: tuple.1 }
    }
}

impl From<[f64; 2]> for Point2D {
    fn from(a: [f64; 2]) -> Self {
        Self { x: a[0], y: a[1] }
    }
}

impl From<Vector2<f64>> for Point2D {
    fn from(v: Vector2<f64>) -> Self {
        Self { x: v[0], y: v[1] }
    }
}

/// 2D pose (position + orientation), yaw kept in (-pi, pi]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose2D {
    pub x: f64,
    pub y: f64,
    pub yaw: f64,
}

impl Pose2D {
    /// Create a pose, wrapping the yaw
    pub fn new(x: f64, y: f64, yaw: f64) -> Self {
        Self { x, y, yaw: wrap_angle(yaw) }
    }

    pub fn origin() -> Self {
        Self { x: 0.0, y: 0.0, yaw: 0.0 }
    }

    pub fn position(&self) -> Point2D {
        Point2D::new(self.x, self.y)
    }

    pub fn to_vector(&self) -> Vector3<f64> {
        Vector3::new(self.x, self.y, self.yaw)
    }
}

impl From<Vector3<f64>> for Pose2D {
    fn from(v: Vector3<f64>) -> Self {
        Self::new(v[0], v[1], v[2])
    }
}

/// Velocity command for a differential drive robot
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControlInput {
    pub v: f64,      // linear velocity
    pub omega: f64,  // angular velocity
}

impl ControlInput {
    pub fn new(v: f64, omega: f64) -> Self {
        Self { v, omega }
    }

    pub fn zero() -> Self {
        Self { v: 0.0, omega: 0.0 }
    }

    pub fn to_vector(&self) -> Vector2<f64> {
        Vector2::new(self.v, self.omega)
    }
}

impl From<Vector2<f64>> for ControlInput {
    fn from(v: Vector2<f64>) -> Self {
        Self { v: v[0], omega: v[1] }
    }
}

/// Range-bearing observation of a single landmark
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RangeBearing {
    pub range: f64,
    pub bearing: f64,
}

impl RangeBearing {
    pub fn new(range: f64, bearing: f64) -> Self {
        Self { range, bearing }
    }

    pub fn to_vector(&self) -> Vector2<f64> {
        Vector2::new(self.range, self.bearing)
    }
}

impl From<Vector2<f64>> for RangeBearing {
    fn from(v: Vector2<f64>) -> Self {
        Self { range: v[0], bearing: v[1] }
    }
}

/// Known landmark positions, shared read-only for the whole run
///
/// The index order is stable and pairs each entry with the measurement at
/// the same index.
#[derive(Debug, Clone, PartialEq)]
pub struct Landmarks(Arc<[Point2D]>);

impl Landmarks {
    /// Validate and freeze a landmark set
    pub fn new(points: Vec<Point2D>) -> LocalizationResult<Self> {
        if let Some((i, _)) = points
            .iter()
            .enumerate()
            .find(|(_, p)| !p.x.is_finite() || !p.y.is_finite())
        {
            return Err(LocalizationError::InvalidParameter(format!(
                "landmark {} has non-finite coordinates",
                i
            )));
        }
        Ok(Self(points.into()))
    }

    /// Empty set: the sensor never reports anything
    pub fn empty() -> Self {
        Self(Arc::from(Vec::<Point2D>::new()))
    }

    pub fn from_xy(xy: &[[f64; 2]]) -> LocalizationResult<Self> {
        Self::new(xy.iter().map(|&p| Point2D::from(p)).collect())
    }

    pub fn x_coords(&self) -> Vec<f64> {
        self.0.iter().map(|p| p.x).collect()
    }

    pub fn y_coords(&self) -> Vec<f64> {
        self.0.iter().map(|p| p.y).collect()
    }
}

impl Deref for Landmarks {
    type Target = [Point2D];

    fn deref(&self) -> &[Point2D] {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    #[test]
    fn test_point2d_distance() {
        let p1 = Point2D::new(0.0, 0.0);
        let p2 = Point2D::new(3.0, 4.0);
        assert!((p1.distance(&p2) - 5.0).abs() < 1e-10);
    }

    #[test]
    fn test_pose2d_wraps_yaw() {
        let pose = Pose2D::new(0.0, 0.0, 4.0);
        assert!(pose.yaw > -PI && pose.yaw <= PI);
        let pose: Pose2D = Vector3::new(1.0, 2.0, -4.0).into();
        assert!(pose.yaw > -PI && pose.yaw <= PI);
        assert_eq!(pose.x, 1.0);
    }

    #[test]
    fn test_landmarks_keep_order() {
        let lms = Landmarks::from_xy(&[[6.0, 4.0], [-7.0, 8.0], [6.0, -4.0]]).unwrap();
        assert_eq!(lms.len(), 3);
        assert_eq!(lms[1], Point2D::new(-7.0, 8.0));
        assert_eq!(lms.x_coords(), vec![6.0, -7.0, 6.0]);

        let shared = lms.clone();
        assert_eq!(shared, lms);
    }

    #[test]
    fn test_landmarks_reject_nan() {
        let result = Landmarks::from_xy(&[[1.0, f64::NAN]]);
        assert!(matches!(result, Err(LocalizationError::InvalidParameter(_))));
        assert!(Landmarks::empty().is_empty());
    }
}
