//! Simulation loop sequencing the ground-truth robot and the filter
//!
//! Each step feeds the nominal command to the filter's prediction, drives
//! the simulated robot with either internally noised or recorded noisy
//! commands, and fuses the resulting measurements.

use std::f64::consts::PI;

use tracing::info;

use crate::common::{
    ControlInput, Landmarks, LocalizationError, LocalizationResult, MotionModel, ObservationModel,
    Pose2D, RangeBearing,
};
use crate::localization::measurement_model::RangeBearingModel;
use crate::localization::motion_model::VelocityMotionModel;
use crate::localization::turtlebot::{TurtleBot, TurtleBotConfig};
use crate::localization::unscented_kalman_filter::{
    FilterWarning, KalmanGain, UKFConfig, UnscentedKalmanFilter,
};
use nalgebra::Matrix3;

/// Commanded velocity profile v(t) = 1 + 0.5 cos(2 pi 0.2 t),
/// w(t) = -0.2 + 2 cos(2 pi 0.6 t)
pub fn reference_command(t: f64) -> ControlInput {
    ControlInput::new(
        1.0 + 0.5 * (2.0 * PI * 0.2 * t).cos(),
        -0.2 + 2.0 * (2.0 * PI * 0.6 * t).cos(),
    )
}

/// Evenly spaced time vector from 0 to `tf` inclusive
pub fn time_vector(dt: f64, tf: f64) -> LocalizationResult<Vec<f64>> {
    if !dt.is_finite() || dt <= 0.0 || !tf.is_finite() || tf < 0.0 {
        return Err(LocalizationError::InvalidParameter(format!(
            "invalid time span dt={} tf={}",
            dt, tf
        )));
    }
    let steps = (tf / dt).round() as usize;
    Ok((0..=steps).map(|k| k as f64 * dt).collect())
}

/// Recorded run replayed instead of simulating control noise
#[derive(Debug, Clone)]
pub struct RecordedTrajectory {
    /// Sample times, first entry is the initial condition
    pub time: Vec<f64>,
    /// Noisy commands actually executed by the robot, one per time sample
    pub noisy_controls: Vec<ControlInput>,
    /// Pose at `time[0]`
    pub initial_pose: Pose2D,
}

impl RecordedTrajectory {
    pub fn validate(&self) -> LocalizationResult<()> {
        if self.time.len() < 2 {
            return Err(LocalizationError::InvalidParameter(
                "recorded trajectory needs at least two samples".to_string(),
            ));
        }
        if self.noisy_controls.len() != self.time.len() {
            return Err(LocalizationError::DimensionMismatch {
                expected: self.time.len(),
                actual: self.noisy_controls.len(),
            });
        }
        Ok(())
    }

    /// Sample period implied by the first two time stamps
    pub fn dt(&self) -> f64 {
        self.time[1] - self.time[0]
    }
}

/// Where the robot's executed commands come from
#[derive(Debug, Clone)]
pub enum ControlSource {
    /// Nominal commands corrupted inside the simulator
    Simulated,
    /// Externally supplied noisy commands, applied without extra noise
    Recorded(Vec<ControlInput>),
}

/// Immutable per-step hand-off to loggers and the visualizer
#[derive(Debug, Clone)]
pub struct StepSnapshot {
    pub time: f64,
    pub true_pose: Pose2D,
    pub estimate: Pose2D,
    pub prior_covariance: Matrix3<f64>,
    pub covariance: Matrix3<f64>,
    pub gain: Option<KalmanGain>,
    pub predicted_measurements: Vec<RangeBearing>,
    pub measurements: Option<Vec<RangeBearing>>,
    pub warning: Option<FilterWarning>,
}

/// Fixed, finite run over a predetermined time vector
pub struct Simulation<G = VelocityMotionModel, H = RangeBearingModel> {
    robot: TurtleBot,
    filter: UnscentedKalmanFilter<G, H>,
    time: Vec<f64>,
    source: ControlSource,
}

impl Simulation {
    /// Simulated-noise run over `time` with the reference command profile
    pub fn new(
        filter_config: UKFConfig,
        robot_config: TurtleBotConfig,
        landmarks: Landmarks,
        time: Vec<f64>,
    ) -> LocalizationResult<Self> {
        let dt = filter_config.dt;
        let robot = TurtleBot::with_dt(dt, robot_config, landmarks.clone())?;
        let filter = UnscentedKalmanFilter::from_config(filter_config, landmarks)?;
        Self::from_parts(robot, filter, time)
    }

    /// Replay a recorded run: the robot executes the recorded noisy commands
    /// while the filter sees the nominal profile
    pub fn from_recording(
        filter_config: UKFConfig,
        robot_config: TurtleBotConfig,
        landmarks: Landmarks,
        recording: RecordedTrajectory,
    ) -> LocalizationResult<Self> {
        recording.validate()?;
        let filter_config = UKFConfig {
            dt: recording.dt(),
            ..filter_config
        };
        let robot_config = TurtleBotConfig {
            initial_pose: recording.initial_pose,
            ..robot_config
        };
        let mut sim = Self::new(filter_config, robot_config, landmarks, recording.time)?;
        sim.source = ControlSource::Recorded(recording.noisy_controls);
        Ok(sim)
    }
}

impl<G: MotionModel, H: ObservationModel> Simulation<G, H> {
    /// Simulated-noise run with an already built robot and filter
    pub fn from_parts(
        robot: TurtleBot,
        filter: UnscentedKalmanFilter<G, H>,
        time: Vec<f64>,
    ) -> LocalizationResult<Self> {
        if time.len() < 2 {
            return Err(LocalizationError::InvalidParameter(
                "time vector needs at least two samples".to_string(),
            ));
        }
        Ok(Self {
            robot,
            filter,
            time,
            source: ControlSource::Simulated,
        })
    }

    pub fn robot(&self) -> &TurtleBot {
        &self.robot
    }

    pub fn filter(&self) -> &UnscentedKalmanFilter<G, H> {
        &self.filter
    }

    pub fn time(&self) -> &[f64] {
        &self.time
    }

    /// One simulate -> predict -> correct cycle at sample `k`
    pub fn step(&mut self, k: usize) -> LocalizationResult<StepSnapshot> {
        let t = *self.time.get(k).ok_or_else(|| {
            LocalizationError::InvalidParameter(format!("step {} outside the time vector", k))
        })?;
        let u = reference_command(t);

        let true_pose = match &self.source {
            ControlSource::Simulated => self.robot.propagate(&u),
            ControlSource::Recorded(controls) => {
                let un = controls[k];
                self.robot.propagate_with_noise(&un, false)
            }
        };

        let measurements = self.robot.measure();
        let prior = self.filter.predict(&u)?;
        let z = measurements.clone().unwrap_or_default();
        let post = self.filter.correct(&z)?;

        Ok(StepSnapshot {
            time: t,
            true_pose,
            estimate: post.mean,
            prior_covariance: prior.covariance,
            covariance: post.covariance,
            gain: post.gain,
            predicted_measurements: post.predicted_measurements,
            measurements,
            warning: post.warning,
        })
    }

    /// Run every remaining step, handing each snapshot to `observer`. The
    /// first numerical failure aborts the run.
    pub fn run_with<F>(&mut self, mut observer: F) -> LocalizationResult<Vec<StepSnapshot>>
    where
        F: FnMut(&StepSnapshot),
    {
        info!(steps = self.time.len() - 1, "starting localization run");
        let mut snapshots = Vec::with_capacity(self.time.len() - 1);
        for k in 1..self.time.len() {
            let snapshot = self.step(k)?;
            observer(&snapshot);
            snapshots.push(snapshot);
        }
        let warnings = snapshots.iter().filter(|s| s.warning.is_some()).count();
        info!(warnings, "localization run finished");
        Ok(snapshots)
    }

    pub fn run(&mut self) -> LocalizationResult<Vec<StepSnapshot>> {
        self.run_with(|_| {})
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::angle_diff;
    use crate::localization::motion_model::MotionNoise;
    use nalgebra::Matrix2;

    fn landmarks() -> Landmarks {
        Landmarks::from_xy(&[[6.0, 4.0], [-7.0, 8.0], [6.0, -4.0]]).unwrap()
    }

    #[test]
    fn test_time_vector() {
        let t = time_vector(0.1, 20.0).unwrap();
        assert_eq!(t.len(), 201);
        assert_eq!(t[0], 0.0);
        assert!((t[200] - 20.0).abs() < 1e-9);
        assert!(time_vector(0.0, 1.0).is_err());
    }

    #[test]
    fn test_reference_run_tracks_truth() {
        let filter_config = UKFConfig {
            initial_mean: Pose2D::new(-5.0, -3.0, PI / 2.0),
            ..UKFConfig::default()
        };
        let robot_config = TurtleBotConfig { seed: Some(11), ..TurtleBotConfig::default() };
        let mut sim = Simulation::new(
            filter_config,
            robot_config,
            landmarks(),
            time_vector(0.1, 20.0).unwrap(),
        )
        .unwrap();

        let mut seen = 0;
        let snapshots = sim.run_with(|_| seen += 1).unwrap();
        assert_eq!(snapshots.len(), 200);
        assert_eq!(seen, 200);

        let last = snapshots.last().unwrap();
        assert!((last.estimate.x - last.true_pose.x).abs() < 1.0);
        assert!((last.estimate.y - last.true_pose.y).abs() < 1.0);
        assert!(angle_diff(last.estimate.yaw, last.true_pose.yaw).abs() < 0.5);
        assert!(snapshots.iter().all(|s| s.predicted_measurements.len() == 3));
    }

    #[test]
    fn test_recorded_controls_drive_the_robot() {
        let time = time_vector(0.1, 1.0).unwrap();
        let noisy: Vec<ControlInput> = time
            .iter()
            .map(|&t| {
                let u = reference_command(t);
                ControlInput::new(u.v + 0.05, u.omega - 0.1)
            })
            .collect();
        let recording = RecordedTrajectory {
            time: time.clone(),
            noisy_controls: noisy.clone(),
            initial_pose: Pose2D::new(-5.0, -3.0, PI / 2.0),
        };
        let filter_config = UKFConfig {
            initial_mean: Pose2D::new(-5.0, -3.0, PI / 2.0),
            ..UKFConfig::default()
        };
        let robot_config = TurtleBotConfig {
            motion_noise: MotionNoise::zero(),
            sensor_covariance: Matrix2::zeros(),
            seed: Some(1),
            ..TurtleBotConfig::default()
        };
        let mut sim =
            Simulation::from_recording(filter_config, robot_config, landmarks(), recording)
                .unwrap();
        let snapshots = sim.run().unwrap();

        // replaying the recorded commands reproduces the same truth
        let model = crate::localization::motion_model::VelocityMotionModel::new(0.1).unwrap();
        let mut pose = Pose2D::new(-5.0, -3.0, PI / 2.0);
        for (k, snap) in snapshots.iter().enumerate() {
            pose = crate::common::MotionModel::propagate(&model, &pose, &noisy[k + 1]);
            assert!((snap.true_pose.x - pose.x).abs() < 1e-12);
            assert!((snap.true_pose.y - pose.y).abs() < 1e-12);
        }
    }

    /// Velocity model that starts returning NaN poses after `limit` calls
    struct DivergesAfter {
        inner: VelocityMotionModel,
        calls: std::cell::Cell<usize>,
        limit: usize,
    }

    impl MotionModel for DivergesAfter {
        fn propagate(&self, pose: &Pose2D, control: &ControlInput) -> Pose2D {
            let k = self.calls.get();
            self.calls.set(k + 1);
            if k < self.limit {
                self.inner.propagate(pose, control)
            } else {
                Pose2D { x: f64::NAN, ..*pose }
            }
        }

        fn dt(&self) -> f64 {
            self.inner.dt()
        }
    }

    #[test]
    fn test_numerical_failure_aborts_run() {
        let filter_config = UKFConfig {
            initial_mean: Pose2D::new(-5.0, -3.0, PI / 2.0),
            ..UKFConfig::default()
        };
        let robot_config = TurtleBotConfig { seed: Some(3), ..TurtleBotConfig::default() };
        let robot = TurtleBot::with_dt(0.1, robot_config, landmarks()).unwrap();
        // two full predictions of 15 sigma points succeed
        let motion = DivergesAfter {
            inner: VelocityMotionModel::new(0.1).unwrap(),
            calls: std::cell::Cell::new(0),
            limit: 30,
        };
        let filter = UnscentedKalmanFilter::new(
            motion,
            RangeBearingModel::new(),
            filter_config,
            landmarks(),
        )
        .unwrap();
        let time = time_vector(0.1, 1.0).unwrap();
        let mut sim = Simulation::from_parts(robot, filter, time).unwrap();

        let mut seen = Vec::new();
        let result = sim.run_with(|s| seen.push(s.time));
        assert!(matches!(
            result,
            Err(LocalizationError::NonPositiveDefiniteCovariance { .. })
        ));
        assert_eq!(seen.len(), 2);
        assert!(sim.filter().estimate().x.is_finite());
    }

    #[test]
    fn test_recording_length_is_checked() {
        let recording = RecordedTrajectory {
            time: vec![0.0, 0.1, 0.2],
            noisy_controls: vec![ControlInput::zero(); 2],
            initial_pose: Pose2D::origin(),
        };
        let result = Simulation::from_recording(
            UKFConfig::default(),
            TurtleBotConfig::default(),
            landmarks(),
            recording,
        );
        assert!(matches!(result, Err(LocalizationError::DimensionMismatch { .. })));
    }
}
