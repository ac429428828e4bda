//! Range-bearing measurement model

use nalgebra::{Vector2, Vector3};

use crate::common::{ObservationModel, Point2D, Pose2D, RangeBearing};

/// Range and bearing from a pose to a known landmark
///
/// The bearing is returned unwrapped; callers wrap once it is combined with
/// another angle.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RangeBearingModel;

impl RangeBearingModel {
    pub fn new() -> Self {
        RangeBearingModel
    }

    /// Observe `landmark` from a pose vector [x, y, yaw]
    pub fn observe_vector(&self, x: &Vector3<f64>, landmark: &Point2D) -> Vector2<f64> {
        let dx = landmark.x - x[0];
        let dy = landmark.y - x[1];
        Vector2::new((dx * dx + dy * dy).sqrt(), dy.atan2(dx) - x[2])
    }
}

impl ObservationModel for RangeBearingModel {
    fn observe(&self, pose: &Pose2D, landmark: &Point2D) -> RangeBearing {
        self.observe_vector(&pose.to_vector(), landmark).into()
    }
}

/// Landmark position implied by a range-bearing reading taken at `pose`
pub fn landmark_from_measurement(pose: &Pose2D, z: &RangeBearing) -> Point2D {
    let phi = pose.yaw + z.bearing;
    Point2D::new(pose.x + z.range * phi.cos(), pose.y + z.range * phi.sin())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::FRAC_PI_2;

    #[test]
    fn test_range_bearing() {
        let model = RangeBearingModel::new();
        let z = model.observe(&Pose2D::origin(), &Point2D::new(3.0, 4.0));
        assert!((z.range - 5.0).abs() < 1e-12);
        assert!((z.bearing - 4.0_f64.atan2(3.0)).abs() < 1e-12);

        let z = model.observe(&Pose2D::new(0.0, 0.0, FRAC_PI_2), &Point2D::new(0.0, 2.0));
        assert!((z.range - 2.0).abs() < 1e-12);
        assert!(z.bearing.abs() < 1e-12);
    }

    #[test]
    fn test_bearing_not_wrapped() {
        let model = RangeBearingModel::new();
        // landmark just above the negative x axis, robot facing -3 rad
        let z = model.observe(&Pose2D::new(0.0, 0.0, -3.0), &Point2D::new(-1.0, 0.1));
        assert!(z.bearing > std::f64::consts::PI);
    }

    #[test]
    fn test_round_trip_reconstructs_landmark() {
        let model = RangeBearingModel::new();
        let poses = [
            Pose2D::new(-5.0, -3.0, FRAC_PI_2),
            Pose2D::new(1.5, 2.0, 3.1),
            Pose2D::new(0.2, -7.0, -2.4),
        ];
        let landmarks = [Point2D::new(6.0, 4.0), Point2D::new(-7.0, 8.0), Point2D::new(6.0, -4.0)];
        for pose in poses.iter() {
            for lm in landmarks.iter() {
                let z = model.observe(pose, lm);
                assert!(z.range >= 0.0);
                let back = landmark_from_measurement(pose, &z);
                assert!((back.x - lm.x).abs() < 1e-9);
                assert!((back.y - lm.y).abs() < 1e-9);
            }
        }
    }
}
