//! Run configuration, loadable from TOML
//!
//! Every field has a default reproducing the reference scenario, so a
//! partial file only overrides what it names.

use std::path::Path;

use nalgebra::{Matrix2, Matrix3, Vector2, Vector3};
use serde::Deserialize;

use crate::common::{Landmarks, LocalizationResult, Pose2D};
use crate::localization::motion_model::MotionNoise;
use crate::localization::simulation::time_vector;
use crate::localization::turtlebot::TurtleBotConfig;
use crate::localization::unscented_kalman_filter::{UKFConfig, UKFParams};

/// Top-level configuration
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Sample period in seconds (default: 0.1)
    pub dt: f64,
    /// Final time in seconds (default: 20.0)
    pub final_time: f64,
    /// Landmark positions [x, y] in index order
    pub landmarks: Vec<[f64; 2]>,
    /// Control noise coefficients alpha1..alpha4
    pub motion_noise: [f64; 4],
    /// Range and bearing standard deviations; Q = diag(std^2)
    pub sensor_noise_std: [f64; 2],
    /// True initial pose [x, y, yaw]
    pub initial_pose: [f64; 3],
    /// Initial estimate [x, y, yaw]
    pub initial_estimate: [f64; 3],
    /// Diagonal of the initial estimate covariance
    pub initial_covariance: [f64; 3],
    /// Sigma point tuning
    pub ukf: UkfTuning,
    /// Simulator RNG seed
    pub seed: Option<u64>,
    pub output: OutputConfig,
}

/// Sigma point tuning parameters
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct UkfTuning {
    pub alpha: f64,
    pub beta: f64,
    pub kappa: f64,
}

/// Plot output
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Trajectory plot path, skipped when absent
    pub trajectory_svg: Option<String>,
    /// Error plot path, skipped when absent
    pub error_svg: Option<String>,
    /// States vs estimates plot path, skipped when absent
    pub state_svg: Option<String>,
    /// Kalman gain plot path, skipped when absent
    pub gain_svg: Option<String>,
}

impl Default for UkfTuning {
    fn default() -> Self {
        let p = UKFParams::default();
        Self {
            alpha: p.alpha,
            beta: p.beta,
            kappa: p.kappa,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            trajectory_svg: Some("./img/ukf_localization.svg".to_string()),
            error_svg: Some("./img/ukf_localization_errors.svg".to_string()),
            state_svg: Some("./img/ukf_localization_states.svg".to_string()),
            gain_svg: Some("./img/ukf_localization_gains.svg".to_string()),
        }
    }
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            dt: 0.1,
            final_time: 20.0,
            landmarks: vec![[6.0, 4.0], [-7.0, 8.0], [6.0, -4.0]],
            motion_noise: [0.1, 0.01, 0.01, 0.1],
            sensor_noise_std: [0.1, 0.05],
            initial_pose: [-5.0, -3.0, std::f64::consts::FRAC_PI_2],
            initial_estimate: [0.0, 0.0, 0.0],
            initial_covariance: [1.0, 1.0, 0.1],
            ukf: UkfTuning::default(),
            seed: None,
            output: OutputConfig::default(),
        }
    }
}

impl SimulationConfig {
    /// Load from a TOML file
    pub fn load(path: &Path) -> LocalizationResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> LocalizationResult<Self> {
        Ok(toml::from_str(text)?)
    }

    pub fn landmarks(&self) -> LocalizationResult<Landmarks> {
        Landmarks::from_xy(&self.landmarks)
    }

    pub fn time(&self) -> LocalizationResult<Vec<f64>> {
        time_vector(self.dt, self.final_time)
    }

    fn motion_noise(&self) -> LocalizationResult<MotionNoise> {
        let [a1, a2, a3, a4] = self.motion_noise;
        MotionNoise::new(a1, a2, a3, a4)
    }

    fn sensor_covariance(&self) -> Matrix2<f64> {
        let [r, phi] = self.sensor_noise_std;
        Matrix2::from_diagonal(&Vector2::new(r * r, phi * phi))
    }

    /// Filter construction parameters
    pub fn filter_config(&self) -> LocalizationResult<UKFConfig> {
        let [x, y, yaw] = self.initial_estimate;
        Ok(UKFConfig {
            params: UKFParams {
                alpha: self.ukf.alpha,
                beta: self.ukf.beta,
                kappa: self.ukf.kappa,
            },
            dt: self.dt,
            motion_noise: self.motion_noise()?,
            sensor_covariance: self.sensor_covariance(),
            initial_mean: Pose2D::new(x, y, yaw),
            initial_covariance: Matrix3::from_diagonal(&Vector3::from(self.initial_covariance)),
        })
    }

    /// Ground-truth simulator parameters
    pub fn robot_config(&self) -> LocalizationResult<TurtleBotConfig> {
        let [x, y, yaw] = self.initial_pose;
        Ok(TurtleBotConfig {
            motion_noise: self.motion_noise()?,
            sensor_covariance: self.sensor_covariance(),
            initial_pose: Pose2D::new(x, y, yaw),
            seed: self.seed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::LocalizationError;

    #[test]
    fn test_defaults_match_reference_scenario() {
        let config = SimulationConfig::default();
        let filter = config.filter_config().unwrap();
        assert!((filter.sensor_covariance[(0, 0)] - 0.01).abs() < 1e-15);
        assert!((filter.sensor_covariance[(1, 1)] - 0.0025).abs() < 1e-15);
        assert_eq!(filter.initial_covariance[(2, 2)], 0.1);
        assert_eq!(config.landmarks().unwrap().len(), 3);
        assert_eq!(config.time().unwrap().len(), 201);
    }

    #[test]
    fn test_partial_toml_overrides() {
        let config = SimulationConfig::from_toml_str(
            r#"
            dt = 0.05
            landmarks = [[1.0, 2.0]]
            seed = 9

            [ukf]
            alpha = 0.5

            [output]
            gain_svg = "gains.svg"
            "#,
        )
        .unwrap();
        assert_eq!(config.dt, 0.05);
        assert_eq!(config.landmarks, vec![[1.0, 2.0]]);
        assert_eq!(config.seed, Some(9));
        assert_eq!(config.ukf.alpha, 0.5);
        assert_eq!(config.ukf.kappa, 3.5);
        assert_eq!(config.final_time, 20.0);
        assert_eq!(config.robot_config().unwrap().seed, Some(9));
        assert_eq!(config.output.gain_svg.as_deref(), Some("gains.svg"));
        assert!(config.output.state_svg.is_some());
    }

    #[test]
    fn test_bad_toml_is_a_config_error() {
        let result = SimulationConfig::from_toml_str("dt = \"fast\"");
        assert!(matches!(result, Err(LocalizationError::Config(_))));
    }

    #[test]
    fn test_negative_motion_noise_rejected() {
        let config = SimulationConfig {
            motion_noise: [0.1, -1.0, 0.0, 0.0],
            ..SimulationConfig::default()
        };
        assert!(config.filter_config().is_err());
    }
}
