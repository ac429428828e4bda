//! Visualization utilities for ukf_localization
//!
//! The [`Visualizer`] owns its own render state and history. It is fed one
//! immutable [`StepSnapshot`] per step and renders with gnuplot on demand.

use gnuplot::{AutoOption, AxesCommon, Caption, Color, Figure, LineWidth, PointSize, PointSymbol};
use itertools::Itertools;
use nalgebra::{Matrix3, Vector3};

use crate::common::{angle_diff, Landmarks, LocalizationError, LocalizationResult, Point2D, Pose2D};
use crate::localization::measurement_model::landmark_from_measurement;
use crate::localization::simulation::StepSnapshot;

/// Color palette for consistent styling
pub mod colors {
    pub const BLACK: &str = "#000000";
    pub const RED: &str = "#FF0000";
    pub const BLUE: &str = "#0000FF";

    // Semantic colors
    pub const LANDMARK: &str = BLACK;
    pub const ESTIMATED: &str = RED;
    pub const GROUND_TRUTH: &str = BLUE;
    pub const ESTIMATED_LANDMARK: &str = "#DD3355";
    pub const ROBOT: &str = "#FFA500";

    /// One trace per gain entry
    pub const GAINS: [&str; 6] = ["#1F77B4", "#FF7F0E", "#2CA02C", "#D62728", "#9467BD", "#8C564B"];
}

/// Legend of the flattened gain entries, (state, measurement) pairs
const GAIN_LABELS: [&str; 6] = ["x, r", "x, phi", "y, r", "y, phi", "theta, r", "theta, phi"];

/// Two-sigma bounds from a covariance diagonal
fn two_sigma(covariance: &Matrix3<f64>) -> Vector3<f64> {
    covariance.diagonal().map(|v| 2.0 * v.max(0.0).sqrt())
}

/// Run history and plot settings
pub struct Visualizer {
    landmarks: Landmarks,
    title: String,
    limits: [f64; 4],
    robot_radius: f64,
    time: Vec<f64>,
    truth: Vec<Pose2D>,
    estimates: Vec<Pose2D>,
    /// [x, y, yaw] estimation errors, yaw wrapped
    errors: Vec<Vector3<f64>>,
    two_sigma: Vec<Vector3<f64>>,
    /// Row-major flattened gains
    gains: Vec<Vec<f64>>,
    gain_time: Vec<f64>,
    estimated_landmarks: Vec<Point2D>,
}

impl Visualizer {
    /// Start a history at t = 0
    pub fn new(landmarks: Landmarks, x0: Pose2D, xhat0: Pose2D, sigma0: &Matrix3<f64>) -> Self {
        Self {
            landmarks,
            title: "Turtlebot Simulation".to_string(),
            limits: [-10.0, 10.0, -10.0, 10.0],
            robot_radius: 0.75,
            time: vec![0.0],
            truth: vec![x0],
            estimates: vec![xhat0],
            errors: vec![pose_error(&x0, &xhat0)],
            two_sigma: vec![two_sigma(sigma0)],
            gains: Vec::new(),
            gain_time: Vec::new(),
            estimated_landmarks: Vec::new(),
        }
    }

    /// Set the plot title
    pub fn set_title(&mut self, title: &str) -> &mut Self {
        self.title = title.to_string();
        self
    }

    /// Set the trajectory plot limits [x_min, x_max, y_min, y_max]
    pub fn set_limits(&mut self, limits: [f64; 4]) -> &mut Self {
        self.limits = limits;
        self
    }

    /// Record one step
    pub fn update(&mut self, snapshot: &StepSnapshot) {
        self.time.push(snapshot.time);
        self.truth.push(snapshot.true_pose);
        self.estimates.push(snapshot.estimate);
        self.errors.push(pose_error(&snapshot.true_pose, &snapshot.estimate));
        self.two_sigma.push(two_sigma(&snapshot.covariance));
        if let Some(k) = &snapshot.gain {
            self.gains.push(k.transpose().iter().cloned().collect());
            self.gain_time.push(snapshot.time);
        }
        self.estimated_landmarks = snapshot
            .predicted_measurements
            .iter()
            .map(|z| landmark_from_measurement(&snapshot.estimate, z))
            .collect();
    }

    pub fn time(&self) -> &[f64] {
        &self.time
    }

    pub fn errors(&self) -> &[Vector3<f64>] {
        &self.errors
    }

    pub fn two_sigma_bounds(&self) -> &[Vector3<f64>] {
        &self.two_sigma
    }

    pub fn gains(&self) -> &[Vec<f64>] {
        &self.gains
    }

    /// Landmark positions implied by the latest predicted measurements
    pub fn estimated_landmarks(&self) -> &[Point2D] {
        &self.estimated_landmarks
    }

    /// Fraction of samples whose error lies inside the 2-sigma bound, per axis
    pub fn two_sigma_coverage(&self) -> Vector3<f64> {
        let n = self.errors.len().max(1) as f64;
        let mut inside = Vector3::zeros();
        for (e, b) in self.errors.iter().zip_eq(self.two_sigma.iter()) {
            for i in 0..3 {
                if e[i].abs() <= b[i] {
                    inside[i] += 1.0;
                }
            }
        }
        inside / n
    }

    /// Trajectory plot: truth, estimates, landmarks, final robot pose
    pub fn save_trajectory_svg(&self, path: &str) -> LocalizationResult<()> {
        let mut fg = Figure::new();
        let axes = fg.axes2d();
        axes.set_title(&self.title, &[])
            .set_x_label("X (m)", &[])
            .set_y_label("Y (m)", &[])
            .set_x_range(AutoOption::Fix(self.limits[0]), AutoOption::Fix(self.limits[1]))
            .set_y_range(AutoOption::Fix(self.limits[2]), AutoOption::Fix(self.limits[3]))
            .set_aspect_ratio(AutoOption::Fix(1.0));

        let tx: Vec<f64> = self.truth.iter().map(|p| p.x).collect();
        let ty: Vec<f64> = self.truth.iter().map(|p| p.y).collect();
        let ex: Vec<f64> = self.estimates.iter().map(|p| p.x).collect();
        let ey: Vec<f64> = self.estimates.iter().map(|p| p.y).collect();

        axes.points(
            &tx,
            &ty,
            &[Caption("truth"), Color(colors::GROUND_TRUTH), PointSymbol('.'), PointSize(0.5)],
        )
        .points(
            &ex,
            &ey,
            &[Caption("estimates"), Color(colors::ESTIMATED), PointSymbol('.'), PointSize(0.5)],
        );

        if !self.landmarks.is_empty() {
            axes.points(
                &self.landmarks.x_coords(),
                &self.landmarks.y_coords(),
                &[Caption("landmark"), Color(colors::LANDMARK), PointSymbol('x'), PointSize(1.5)],
            );
        }
        if !self.estimated_landmarks.is_empty() {
            let lx: Vec<f64> = self.estimated_landmarks.iter().map(|p| p.x).collect();
            let ly: Vec<f64> = self.estimated_landmarks.iter().map(|p| p.y).collect();
            axes.points(
                &lx,
                &ly,
                &[Caption("est landmark"), Color(colors::ESTIMATED_LANDMARK), PointSymbol('x')],
            );
        }

        if let Some(pose) = self.truth.last() {
            let end_x = pose.x + self.robot_radius * pose.yaw.cos();
            let end_y = pose.y + self.robot_radius * pose.yaw.sin();
            let robot = [Color(colors::ROBOT), PointSymbol('O'), PointSize(3.0)];
            axes.points(&[pose.x], &[pose.y], &robot)
                .lines(&[pose.x, end_x], &[pose.y, end_y], &[Color(colors::BLACK), LineWidth(2.0)]);
        }

        fg.save_to_svg(path, 900, 700)
            .map_err(|e| LocalizationError::Visualization(e.to_string()))
    }

    /// States vs estimates for x, y and yaw over time
    pub fn save_state_svg(&self, path: &str) -> LocalizationResult<()> {
        let mut fg = Figure::new();
        let labels = ["X (m)", "Y (m)", "Theta (rad)"];
        let component = |p: &Pose2D, i: usize| match i {
            0 => p.x,
            1 => p.y,
            _ => p.yaw,
        };
        for (i, label) in labels.iter().enumerate() {
            let truth: Vec<f64> = self.truth.iter().map(|p| component(p, i)).collect();
            let est: Vec<f64> = self.estimates.iter().map(|p| component(p, i)).collect();

            let axes = fg.axes2d().set_pos_grid(3, 1, i as u32);
            if i == 0 {
                axes.set_title("States vs Estimates", &[]);
            }
            if i == labels.len() - 1 {
                axes.set_x_label("Time (s)", &[]);
            }
            axes.set_y_label(label, &[])
                .lines(&self.time, &truth, &[Caption("truth"), Color(colors::GROUND_TRUTH)])
                .lines(&self.time, &est, &[Caption("est"), Color(colors::ESTIMATED)]);
        }

        fg.save_to_svg(path, 800, 800)
            .map_err(|e| LocalizationError::Visualization(e.to_string()))
    }

    /// Kalman gain entries over time
    pub fn save_gain_svg(&self, path: &str) -> LocalizationResult<()> {
        if self.gains.is_empty() {
            return Err(LocalizationError::Visualization(
                "no gains recorded".to_string(),
            ));
        }
        let mut fg = Figure::new();
        let axes = fg.axes2d();
        axes.set_title("Kalman Gains", &[])
            .set_x_label("Time (s)", &[])
            .set_y_label("Gain", &[]);
        for (j, label) in GAIN_LABELS.iter().enumerate() {
            let trace: Vec<f64> = self.gains.iter().map(|k| k[j]).collect();
            axes.lines(&self.gain_time, &trace, &[Caption(*label), Color(colors::GAINS[j])]);
        }

        fg.save_to_svg(path, 800, 600)
            .map_err(|e| LocalizationError::Visualization(e.to_string()))
    }

    /// Error plots: error vs +-2 sigma for x, y and yaw
    pub fn save_error_svg(&self, path: &str) -> LocalizationResult<()> {
        let mut fg = Figure::new();
        let labels = ["X (m)", "Y (m)", "Theta (rad)"];
        for (i, label) in labels.iter().enumerate() {
            let err: Vec<f64> = self.errors.iter().map(|e| e[i]).collect();
            let upper: Vec<f64> = self.two_sigma.iter().map(|b| b[i]).collect();
            let lower: Vec<f64> = upper.iter().map(|b| -b).collect();

            let axes = fg.axes2d().set_pos_grid(3, 1, i as u32);
            if i == 0 {
                axes.set_title("Error Plots", &[]);
            }
            if i == labels.len() - 1 {
                axes.set_x_label("Time (s)", &[]);
            }
            axes.set_y_label(label, &[])
                .lines(&self.time, &err, &[Caption("error"), Color(colors::BLUE)])
                .lines(&self.time, &upper, &[Caption("2 sigma"), Color(colors::RED)])
                .lines(&self.time, &lower, &[Color(colors::RED)]);
        }

        fg.save_to_svg(path, 800, 800)
            .map_err(|e| LocalizationError::Visualization(e.to_string()))
    }
}

/// Truth minus estimate, heading difference wrapped
fn pose_error(truth: &Pose2D, estimate: &Pose2D) -> Vector3<f64> {
    Vector3::new(
        truth.x - estimate.x,
        truth.y - estimate.y,
        angle_diff(truth.yaw, estimate.yaw),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::RangeBearing;
    use crate::localization::unscented_kalman_filter::KalmanGain;
    use std::f64::consts::PI;

    fn at_origin(landmarks: Landmarks) -> Visualizer {
        Visualizer::new(landmarks, Pose2D::origin(), Pose2D::origin(), &Matrix3::identity())
    }

    fn snapshot(time: f64, true_pose: Pose2D, estimate: Pose2D) -> StepSnapshot {
        StepSnapshot {
            time,
            true_pose,
            estimate,
            prior_covariance: Matrix3::identity(),
            covariance: Matrix3::identity() * 0.25,
            gain: Some(KalmanGain::from_fn(|r, c| (r * 2 + c) as f64)),
            predicted_measurements: vec![RangeBearing::new(2.0, PI / 2.0)],
            measurements: None,
            warning: None,
        }
    }

    #[test]
    fn test_history_records_wrapped_errors() {
        let lms = Landmarks::from_xy(&[[0.0, 2.0]]).unwrap();
        let mut vis = at_origin(lms);
        let truth = Pose2D::new(1.0, 0.0, PI - 0.05);
        vis.update(&snapshot(0.1, truth, Pose2D::new(0.5, 0.0, -PI + 0.05)));

        assert_eq!(vis.time(), &[0.0, 0.1]);
        let e = vis.errors()[1];
        assert!((e[0] - 0.5).abs() < 1e-12);
        assert!((e[2] + 0.1).abs() < 1e-9);
        assert!((vis.two_sigma_bounds()[1][0] - 1.0).abs() < 1e-12);
        assert_eq!(vis.gains()[0], vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0]);
        assert_eq!(vis.gain_time, vec![0.1]);
    }

    #[test]
    fn test_estimated_landmarks_from_predictions() {
        let lms = Landmarks::from_xy(&[[0.0, 2.0]]).unwrap();
        let mut vis = at_origin(lms);
        vis.update(&snapshot(0.1, Pose2D::origin(), Pose2D::origin()));
        let lm = vis.estimated_landmarks()[0];
        assert!(lm.x.abs() < 1e-12);
        assert!((lm.y - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_gain_plot_needs_history() {
        let vis = at_origin(Landmarks::empty());
        assert!(matches!(
            vis.save_gain_svg("unused.svg"),
            Err(LocalizationError::Visualization(_))
        ));
    }

    #[test]
    fn test_gain_time_skips_steps_without_gain() {
        let mut vis = at_origin(Landmarks::empty());
        let mut snap = snapshot(0.1, Pose2D::origin(), Pose2D::origin());
        snap.gain = None;
        vis.update(&snap);
        vis.update(&snapshot(0.2, Pose2D::origin(), Pose2D::origin()));
        assert_eq!(vis.time().len(), 3);
        assert_eq!(vis.gains().len(), 1);
        assert_eq!(vis.gain_time, vec![0.2]);
    }

    #[test]
    fn test_two_sigma_coverage() {
        let mut vis = at_origin(Landmarks::empty());
        vis.update(&snapshot(0.1, Pose2D::new(3.0, 0.0, 0.0), Pose2D::origin()));
        let coverage = vis.two_sigma_coverage();
        assert!((coverage[0] - 0.5).abs() < 1e-12);
        assert!((coverage[1] - 1.0).abs() < 1e-12);
    }
}
