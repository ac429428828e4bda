//! Capability interfaces for the nonlinear models driving the filter

use nalgebra::SMatrix;

use crate::common::types::{ControlInput, Point2D, Pose2D, RangeBearing};

/// Deterministic state transition `g(u, x)`
pub trait MotionModel {
    /// Propagate a pose one sample period forward under a control command
    fn propagate(&self, pose: &Pose2D, control: &ControlInput) -> Pose2D;

    /// Sample period the model integrates over
    fn dt(&self) -> f64;

    /// Column-wise propagation: pose column `i` of `poses` moves under
    /// control column `i` of `controls`
    fn propagate_batch<const N: usize>(
        &self,
        poses: &SMatrix<f64, 3, N>,
        controls: &SMatrix<f64, 2, N>,
    ) -> SMatrix<f64, 3, N>
    where
        Self: Sized,
    {
        let mut out = SMatrix::<f64, 3, N>::zeros();
        for i in 0..N {
            let pose = Pose2D::new(poses[(0, i)], poses[(1, i)], poses[(2, i)]);
            let control = ControlInput::new(controls[(0, i)], controls[(1, i)]);
            out.set_column(i, &self.propagate(&pose, &control).to_vector());
        }
        out
    }
}

/// Deterministic observation function `h(x, landmark)`
pub trait ObservationModel {
    /// Predict the measurement of `landmark` seen from `pose`
    fn observe(&self, pose: &Pose2D, landmark: &Point2D) -> RangeBearing;
}
