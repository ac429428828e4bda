//! Ground-truth simulator for a differential drive robot
//!
//! Owns the true pose, corrupts the commanded velocities with control noise
//! before integrating them and produces noisy range-bearing readings of
//! every known landmark.

use nalgebra::{Matrix2, Vector2};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;
use tracing::debug;

use crate::common::linalg::{ensure_symmetric, psd_cholesky};
use crate::common::{
    wrap_angle, ControlInput, Landmarks, LocalizationResult, MotionModel, ObservationModel,
    Pose2D, RangeBearing,
};
use crate::localization::measurement_model::RangeBearingModel;
use crate::localization::motion_model::{MotionNoise, VelocityMotionModel};

/// Configuration for the simulated robot
#[derive(Debug, Clone)]
pub struct TurtleBotConfig {
    /// Control noise coefficients
    pub motion_noise: MotionNoise,
    /// Range-bearing sensor covariance Q
    pub sensor_covariance: Matrix2<f64>,
    /// True starting pose
    pub initial_pose: Pose2D,
    /// RNG seed, entropy when `None`
    pub seed: Option<u64>,
}

impl Default for TurtleBotConfig {
    fn default() -> Self {
        Self {
            motion_noise: MotionNoise::default(),
            sensor_covariance: Matrix2::from_diagonal(&Vector2::new(
                0.1_f64.powi(2),  // range variance
                0.05_f64.powi(2), // bearing variance
            )),
            initial_pose: Pose2D::new(-5.0, -3.0, std::f64::consts::FRAC_PI_2),
            seed: None,
        }
    }
}

/// Simulated robot holding the true pose
pub struct TurtleBot<G = VelocityMotionModel, H = RangeBearingModel> {
    motion_model: G,
    observation_model: H,
    motion_noise: MotionNoise,
    /// Lower-triangular square root of the sensor covariance
    sensor_sqrt: Matrix2<f64>,
    pose: Pose2D,
    landmarks: Landmarks,
    rng: StdRng,
}

impl TurtleBot {
    /// Robot using the velocity motion model and range-bearing sensor
    pub fn with_dt(
        dt: f64,
        config: TurtleBotConfig,
        landmarks: Landmarks,
    ) -> LocalizationResult<Self> {
        Self::new(VelocityMotionModel::new(dt)?, RangeBearingModel::new(), config, landmarks)
    }
}

impl<G: MotionModel, H: ObservationModel> TurtleBot<G, H> {
    pub fn new(
        motion_model: G,
        observation_model: H,
        config: TurtleBotConfig,
        landmarks: Landmarks,
    ) -> LocalizationResult<Self> {
        config.motion_noise.validate()?;
        ensure_symmetric(&config.sensor_covariance, "sensor covariance")?;
        let sensor_sqrt = psd_cholesky(&config.sensor_covariance, "sensor covariance")?;

        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let p = config.initial_pose;
        Ok(Self {
            motion_model,
            observation_model,
            motion_noise: config.motion_noise,
            sensor_sqrt,
            pose: Pose2D::new(p.x, p.y, p.yaw),
            landmarks,
            rng,
        })
    }

    /// Current true pose
    pub fn pose(&self) -> Pose2D {
        self.pose
    }

    pub fn landmarks(&self) -> &Landmarks {
        &self.landmarks
    }

    /// Apply a command with injected control noise
    pub fn propagate(&mut self, u: &ControlInput) -> Pose2D {
        self.propagate_with_noise(u, true)
    }

    /// Apply a command, optionally without noise (replaying recorded
    /// commands that are already noisy)
    pub fn propagate_with_noise(&mut self, u: &ControlInput, noise: bool) -> Pose2D {
        let applied = if noise {
            let sigma = self.motion_noise.variances(u).map(f64::sqrt);
            let dv: f64 = self.rng.sample(StandardNormal);
            let dw: f64 = self.rng.sample(StandardNormal);
            ControlInput::new(u.v + sigma[0] * dv, u.omega + sigma[1] * dw)
        } else {
            *u
        };

        self.pose = self.motion_model.propagate(&self.pose, &applied);
        debug!(
            x = self.pose.x,
            y = self.pose.y,
            yaw = self.pose.yaw,
            "true pose propagated"
        );
        self.pose
    }

    /// Noisy reading of every landmark in index order, `None` when no
    /// landmarks are configured
    pub fn measure(&mut self) -> Option<Vec<RangeBearing>> {
        if self.landmarks.is_empty() {
            return None;
        }

        let landmarks = self.landmarks.clone();
        let z = landmarks
            .iter()
            .map(|lm| {
                let clean = self.observation_model.observe(&self.pose, lm).to_vector();
                let white = Vector2::new(
                    self.rng.sample::<f64, _>(StandardNormal),
                    self.rng.sample::<f64, _>(StandardNormal),
                );
                let noisy = clean + self.sensor_sqrt * white;
                RangeBearing::new(noisy[0], wrap_angle(noisy[1]))
            })
            .collect();
        Some(z)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    fn quiet_config(initial_pose: Pose2D) -> TurtleBotConfig {
        TurtleBotConfig {
            motion_noise: MotionNoise::zero(),
            sensor_covariance: Matrix2::zeros(),
            initial_pose,
            seed: Some(7),
        }
    }

    #[test]
    fn test_noise_free_propagation_matches_model() {
        let lms = Landmarks::from_xy(&[[6.0, 4.0]]).unwrap();
        let mut bot = TurtleBot::with_dt(0.1, quiet_config(Pose2D::origin()), lms).unwrap();
        for _ in 0..10 {
            bot.propagate(&ControlInput::new(1.0, 0.0));
        }
        assert!((bot.pose().x - 1.0).abs() < 1e-12);
        assert!(bot.pose().y.abs() < 1e-12);
    }

    #[test]
    fn test_noise_free_measurement() {
        let lms = Landmarks::from_xy(&[[6.0, 4.0], [-7.0, 8.0]]).unwrap();
        let mut bot = TurtleBot::with_dt(0.1, quiet_config(Pose2D::origin()), lms).unwrap();
        let z = bot.measure().unwrap();
        assert_eq!(z.len(), 2);
        assert!((z[0].range - 52.0_f64.sqrt()).abs() < 1e-12);
        assert!((z[1].bearing - 8.0_f64.atan2(-7.0)).abs() < 1e-12);
    }

    #[test]
    fn test_measured_bearing_is_wrapped() {
        let lms = Landmarks::from_xy(&[[-1.0, 0.1]]).unwrap();
        let config = quiet_config(Pose2D::new(0.0, 0.0, -3.0));
        let mut bot = TurtleBot::with_dt(0.1, config, lms).unwrap();
        let z = bot.measure().unwrap();
        assert!(z[0].bearing > -PI && z[0].bearing <= PI);
    }

    #[test]
    fn test_no_landmarks_no_measurement() {
        let config = quiet_config(Pose2D::origin());
        let mut bot = TurtleBot::with_dt(0.1, config, Landmarks::empty()).unwrap();
        assert!(bot.measure().is_none());
    }

    #[test]
    fn test_seeded_runs_are_reproducible() {
        let lms = Landmarks::from_xy(&[[6.0, 4.0]]).unwrap();
        let config = TurtleBotConfig { seed: Some(42), ..TurtleBotConfig::default() };
        let mut a = TurtleBot::with_dt(0.1, config.clone(), lms.clone()).unwrap();
        let mut b = TurtleBot::with_dt(0.1, config, lms).unwrap();
        let u = ControlInput::new(1.0, 0.5);
        for _ in 0..5 {
            assert_eq!(a.propagate(&u), b.propagate(&u));
            assert_eq!(a.measure(), b.measure());
        }
    }

    #[test]
    fn test_control_noise_perturbs_pose() {
        let lms = Landmarks::empty();
        let config = TurtleBotConfig { seed: Some(3), ..TurtleBotConfig::default() };
        let start = config.initial_pose;
        let mut noisy = TurtleBot::with_dt(0.1, config.clone(), lms.clone()).unwrap();
        let mut clean = TurtleBot::with_dt(0.1, config, lms).unwrap();
        let u = ControlInput::new(1.0, 0.5);
        let a = noisy.propagate(&u);
        let b = clean.propagate_with_noise(&u, false);
        assert_ne!(a, b);
        assert_ne!(b, start);
    }

    #[test]
    fn test_rejects_invalid_sensor_covariance() {
        let config = TurtleBotConfig {
            sensor_covariance: Matrix2::new(0.01, 0.0, 0.0, -0.01),
            ..TurtleBotConfig::default()
        };
        assert!(TurtleBot::with_dt(0.1, config, Landmarks::empty()).is_err());
    }
}
