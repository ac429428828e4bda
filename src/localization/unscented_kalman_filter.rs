//! Unscented Kalman Filter (UKF) localization with an augmented state
//!
//! The pose [x, y, yaw] is augmented with the control noise (v, omega) and the
//! range-bearing sensor noise, giving a 7-dimensional state whose 15 sigma
//! points carry the noise through the nonlinear motion and measurement
//! models. Landmarks are fused one at a time, each posterior becoming the
//! prior of the next landmark.
//!
//! Reference:
//! - Probabilistic Robotics (Thrun, Burgard, Fox), table 7.4

use nalgebra::{DVector, Matrix2, Matrix3, Matrix3x2, SMatrix, SVector, Vector2, Vector3};
use tracing::{debug, warn};

use crate::common::linalg::{ensure_symmetric, psd_cholesky, symmetrize};
use crate::common::{
    angle_diff, weighted_angle_mean, wrap_angle, ControlInput, Landmarks, LocalizationError,
    LocalizationResult, MotionModel, ObservationModel, Point2D, Pose2D, RangeBearing,
};
use crate::localization::measurement_model::RangeBearingModel;
use crate::localization::motion_model::{MotionNoise, VelocityMotionModel};

/// Pose dimension
pub const POSE_DIM: usize = 3;
/// Pose + control noise + sensor noise
pub const AUGMENTED_DIM: usize = 7;
/// 2n + 1 sigma points
pub const SIGMA_COUNT: usize = 2 * AUGMENTED_DIM + 1;

const CONTROL_NOISE_ROW: usize = 3;
const SENSOR_NOISE_ROW: usize = 5;

/// Augmented mean [x, y, yaw, dv, dw, dr, dphi]
pub type AugmentedState = SVector<f64, AUGMENTED_DIM>;

/// Block-diagonal covariance of the augmented state
pub type AugmentedCovariance = SMatrix<f64, AUGMENTED_DIM, AUGMENTED_DIM>;

/// One sigma point per column
pub type SigmaPoints = SMatrix<f64, AUGMENTED_DIM, SIGMA_COUNT>;

/// Measurement sigma points for a single landmark
type MeasurementSigmaPoints = SMatrix<f64, 2, SIGMA_COUNT>;

/// Gain mapping a range-bearing innovation onto the pose
pub type KalmanGain = Matrix3x2<f64>;

/// UKF scaling parameters
#[derive(Debug, Clone)]
pub struct UKFParams {
    /// Alpha: spread of sigma points
    pub alpha: f64,
    /// Beta: prior knowledge (Gaussian = 2.0)
    pub beta: f64,
    /// Kappa: secondary scaling
    pub kappa: f64,
}

impl Default for UKFParams {
    fn default() -> Self {
        Self {
            alpha: 0.35,
            beta: 2.0,
            kappa: 3.5,
        }
    }
}

/// UKF weights for mean and covariance computation
#[derive(Debug, Clone)]
pub struct UKFWeights {
    /// Mean weights
    pub wm: DVector<f64>,
    /// Covariance weights
    pub wc: DVector<f64>,
    /// Scaling parameter (gamma)
    pub gamma: f64,
}

impl UKFWeights {
    /// Create weights for given state dimension and parameters
    pub fn new(nx: usize, params: &UKFParams) -> LocalizationResult<Self> {
        let n = nx as f64;
        let lambda = params.alpha.powi(2) * (n + params.kappa) - n;
        if !lambda.is_finite() || n + lambda <= 0.0 {
            return Err(LocalizationError::InvalidParameter(format!(
                "sigma point scaling n + lambda must be positive, got {}",
                n + lambda
            )));
        }
        let n_sigma = 2 * nx + 1;

        let mut wm = Vec::with_capacity(n_sigma);
        let mut wc = Vec::with_capacity(n_sigma);

        // First weight (mean point)
        wm.push(lambda / (lambda + n));
        wc.push((lambda / (lambda + n)) + (1.0 - params.alpha.powi(2) + params.beta));

        // Remaining weights (sigma points)
        let weight = 1.0 / (2.0 * (n + lambda));
        for _ in 0..(2 * nx) {
            wm.push(weight);
            wc.push(weight);
        }

        let gamma = (n + lambda).sqrt();

        Ok(Self {
            wm: DVector::from_vec(wm),
            wc: DVector::from_vec(wc),
            gamma,
        })
    }
}

/// Configuration for the UKF localizer
#[derive(Debug, Clone)]
pub struct UKFConfig {
    /// UKF scaling parameters
    pub params: UKFParams,
    /// Sample period
    pub dt: f64,
    /// Control noise coefficients used to build M(u)
    pub motion_noise: MotionNoise,
    /// Range-bearing sensor covariance Q
    pub sensor_covariance: Matrix2<f64>,
    /// Initial pose estimate
    pub initial_mean: Pose2D,
    /// Initial pose covariance
    pub initial_covariance: Matrix3<f64>,
}

impl Default for UKFConfig {
    fn default() -> Self {
        Self {
            params: UKFParams::default(),
            dt: 0.1,
            motion_noise: MotionNoise::default(),
            sensor_covariance: Matrix2::from_diagonal(&Vector2::new(
                0.1_f64.powi(2),  // range variance
                0.05_f64.powi(2), // bearing variance
            )),
            initial_mean: Pose2D::origin(),
            initial_covariance: Matrix3::from_diagonal(&Vector3::new(1.0, 1.0, 0.1)),
        }
    }
}

/// Output of a prediction step
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    /// Prior mean
    pub mean: Pose2D,
    /// Prior covariance
    pub covariance: Matrix3<f64>,
}

/// Warning-level conditions raised by a correction
#[derive(Debug, Clone, PartialEq)]
pub enum FilterWarning {
    /// Every posterior variance came out larger than its prior. Points at
    /// filter mistuning or an angle that was not wrapped upstream.
    ImpossibleCovarianceShrink {
        prior_diagonal: Vector3<f64>,
        posterior_diagonal: Vector3<f64>,
    },
}

/// Output of a correction step
#[derive(Debug, Clone, PartialEq)]
pub struct Correction {
    /// Posterior mean
    pub mean: Pose2D,
    /// Posterior covariance
    pub covariance: Matrix3<f64>,
    /// Gain of the last landmark update, `None` without landmarks
    pub gain: Option<KalmanGain>,
    /// Predicted measurement of every landmark, from the sigma points
    /// entering this correction
    pub predicted_measurements: Vec<RangeBearing>,
    pub warning: Option<FilterWarning>,
}

/// Sigma points and noise blocks kept between predict and correct
#[derive(Debug, Clone)]
struct PredictedBelief {
    sigma_points: SigmaPoints,
    control_covariance: Matrix2<f64>,
    prior_covariance: Matrix3<f64>,
}

#[derive(Debug, Clone)]
enum FilterPhase {
    Idle,
    Predicted(PredictedBelief),
    Corrected,
}

/// Unscented Kalman Filter for landmark-based robot localization
pub struct UnscentedKalmanFilter<G = VelocityMotionModel, H = RangeBearingModel> {
    /// Current pose estimate [x, y, yaw]
    mean: Vector3<f64>,
    /// Pose covariance
    covariance: Matrix3<f64>,
    /// Range-bearing sensor covariance
    sensor_covariance: Matrix2<f64>,
    motion_noise: MotionNoise,
    motion_model: G,
    observation_model: H,
    /// UKF weights
    weights: UKFWeights,
    landmarks: Landmarks,
    phase: FilterPhase,
    last_gain: Option<KalmanGain>,
}

impl UnscentedKalmanFilter {
    /// Filter using the velocity motion model and range-bearing sensor
    pub fn from_config(config: UKFConfig, landmarks: Landmarks) -> LocalizationResult<Self> {
        let motion_model = VelocityMotionModel::new(config.dt)?;
        Self::new(motion_model, RangeBearingModel::new(), config, landmarks)
    }
}

impl<G: MotionModel, H: ObservationModel> UnscentedKalmanFilter<G, H> {
    /// Create a filter, rejecting invalid configuration up front
    pub fn new(
        motion_model: G,
        observation_model: H,
        config: UKFConfig,
        landmarks: Landmarks,
    ) -> LocalizationResult<Self> {
        let mu = config.initial_mean;
        if !(mu.x.is_finite() && mu.y.is_finite() && mu.yaw.is_finite()) {
            return Err(LocalizationError::InvalidParameter(
                "initial mean must be finite".to_string(),
            ));
        }
        config.motion_noise.validate()?;

        ensure_symmetric(&config.initial_covariance, "initial covariance")?;
        psd_cholesky(&config.initial_covariance, "initial covariance")?;
        ensure_symmetric(&config.sensor_covariance, "sensor covariance")?;
        psd_cholesky(&config.sensor_covariance, "sensor covariance")?;

        let weights = UKFWeights::new(AUGMENTED_DIM, &config.params)?;

        Ok(Self {
            mean: Vector3::new(mu.x, mu.y, wrap_angle(mu.yaw)),
            covariance: config.initial_covariance,
            sensor_covariance: config.sensor_covariance,
            motion_noise: config.motion_noise,
            motion_model,
            observation_model,
            weights,
            landmarks,
            phase: FilterPhase::Idle,
            last_gain: None,
        })
    }

    /// Get current state estimate
    pub fn estimate(&self) -> Pose2D {
        Pose2D::from(self.mean)
    }

    /// Get pose covariance
    pub fn covariance(&self) -> &Matrix3<f64> {
        &self.covariance
    }

    /// Gain of the most recent landmark update
    pub fn last_gain(&self) -> Option<&KalmanGain> {
        self.last_gain.as_ref()
    }

    pub fn weights(&self) -> &UKFWeights {
        &self.weights
    }

    pub fn landmarks(&self) -> &Landmarks {
        &self.landmarks
    }

    /// Sigma points retained by the last prediction, if a correction may
    /// still consume them
    pub fn sigma_points(&self) -> Option<&SigmaPoints> {
        match &self.phase {
            FilterPhase::Predicted(p) => Some(&p.sigma_points),
            _ => None,
        }
    }

    /// Block-diagonal augmented covariance diag(Sigma, M, Q)
    fn augmented_covariance(
        &self,
        covariance: &Matrix3<f64>,
        control_covariance: &Matrix2<f64>,
    ) -> AugmentedCovariance {
        let mut sigma_a = AugmentedCovariance::zeros();
        sigma_a
            .fixed_view_mut::<POSE_DIM, POSE_DIM>(0, 0)
            .copy_from(covariance);
        sigma_a
            .fixed_view_mut::<2, 2>(CONTROL_NOISE_ROW, CONTROL_NOISE_ROW)
            .copy_from(control_covariance);
        sigma_a
            .fixed_view_mut::<2, 2>(SENSOR_NOISE_ROW, SENSOR_NOISE_ROW)
            .copy_from(&self.sensor_covariance);
        sigma_a
    }

    /// Spread 2n + 1 sigma points around the pose belief (`mean`, `covariance`)
    fn generate_sigma_points(
        &self,
        mean: &Vector3<f64>,
        covariance: &Matrix3<f64>,
        control_covariance: &Matrix2<f64>,
    ) -> LocalizationResult<SigmaPoints> {
        let mut mu_a = AugmentedState::zeros();
        mu_a.fixed_rows_mut::<POSE_DIM>(0).copy_from(mean);

        let sigma_a = self.augmented_covariance(covariance, control_covariance);
        let l = psd_cholesky(&sigma_a, "augmented covariance")?;
        let gamma = self.weights.gamma;

        let mut sigma = SigmaPoints::zeros();
        sigma.set_column(0, &mu_a);
        for i in 0..AUGMENTED_DIM {
            let offset = gamma * l.column(i);
            sigma.set_column(i + 1, &(mu_a + offset));
            sigma.set_column(i + 1 + AUGMENTED_DIM, &(mu_a - offset));
        }
        Ok(sigma)
    }

    /// Weighted pose mean of the pose rows, heading averaged on the circle
    fn pose_mean(&self, sigma: &SigmaPoints) -> Vector3<f64> {
        let wm = &self.weights.wm;
        let mut mean = Vector3::zeros();
        for i in 0..SIGMA_COUNT {
            mean[0] += wm[i] * sigma[(0, i)];
            mean[1] += wm[i] * sigma[(1, i)];
        }
        let headings = sigma.row(2);
        mean[2] = weighted_angle_mean(sigma[(2, 0)], wm.iter().cloned().zip(headings.iter()));
        mean
    }

    /// Pose deviation of sigma point `i` from `mean`, heading wrapped
    fn pose_deviation(sigma: &SigmaPoints, i: usize, mean: &Vector3<f64>) -> Vector3<f64> {
        Vector3::new(
            sigma[(0, i)] - mean[0],
            sigma[(1, i)] - mean[1],
            angle_diff(sigma[(2, i)], mean[2]),
        )
    }

    /// Pass every sigma point through h for one landmark, adding its own
    /// sensor-noise rows
    fn measurement_sigma_points(
        &self,
        sigma: &SigmaPoints,
        landmark: &Point2D,
    ) -> MeasurementSigmaPoints {
        let mut z_sigma = MeasurementSigmaPoints::zeros();
        for i in 0..SIGMA_COUNT {
            let pose = Pose2D {
                x: sigma[(0, i)],
                y: sigma[(1, i)],
                yaw: sigma[(2, i)],
            };
            let z = self.observation_model.observe(&pose, landmark);
            z_sigma[(0, i)] = z.range + sigma[(SENSOR_NOISE_ROW, i)];
            z_sigma[(1, i)] = z.bearing + sigma[(SENSOR_NOISE_ROW + 1, i)];
        }
        z_sigma
    }

    /// Weighted measurement mean, bearing averaged on the circle
    fn measurement_mean(&self, z_sigma: &MeasurementSigmaPoints) -> Vector2<f64> {
        let wm = &self.weights.wm;
        let range = (0..SIGMA_COUNT).map(|i| wm[i] * z_sigma[(0, i)]).sum::<f64>();
        let bearings = z_sigma.row(1);
        let bearing =
            weighted_angle_mean(z_sigma[(1, 0)], wm.iter().cloned().zip(bearings.iter()));
        Vector2::new(range, bearing)
    }

    /// Prediction step: push the augmented sigma points through the motion
    /// model, each with its own control-noise sample. On failure the belief
    /// is left untouched.
    pub fn predict(&mut self, u: &ControlInput) -> LocalizationResult<Prediction> {
        let control_covariance = self.motion_noise.covariance(u);
        let mut sigma =
            self.generate_sigma_points(&self.mean, &self.covariance, &control_covariance)?;

        let poses = sigma.fixed_view::<POSE_DIM, SIGMA_COUNT>(0, 0).into_owned();
        let mut controls = sigma
            .fixed_view::<2, SIGMA_COUNT>(CONTROL_NOISE_ROW, 0)
            .into_owned();
        controls.row_mut(0).add_scalar_mut(u.v);
        controls.row_mut(1).add_scalar_mut(u.omega);
        let propagated = self.motion_model.propagate_batch(&poses, &controls);
        sigma
            .fixed_view_mut::<POSE_DIM, SIGMA_COUNT>(0, 0)
            .copy_from(&propagated);

        // mean first, then deviations against it
        let mean = self.pose_mean(&sigma);
        let mut covariance = Matrix3::zeros();
        for i in 0..SIGMA_COUNT {
            let d = Self::pose_deviation(&sigma, i, &mean);
            covariance += self.weights.wc[i] * d * d.transpose();
        }
        let covariance = symmetrize(&covariance);
        if covariance.iter().any(|v| !v.is_finite()) {
            return Err(LocalizationError::not_psd(
                "predicted covariance: non-finite entry",
            ));
        }

        self.mean = mean;
        self.covariance = covariance;
        self.phase = FilterPhase::Predicted(PredictedBelief {
            sigma_points: sigma,
            control_covariance,
            prior_covariance: covariance,
        });

        debug!(
            v = u.v,
            omega = u.omega,
            trace = covariance.trace(),
            "ukf prediction"
        );

        Ok(Prediction {
            mean: self.estimate(),
            covariance,
        })
    }

    /// Correction step: fuse the range-bearing readings landmark by
    /// landmark, in landmark index order.
    ///
    /// The belief is only written back once every landmark has been fused;
    /// a numerical failure leaves the predicted belief in place.
    pub fn correct(&mut self, z: &[RangeBearing]) -> LocalizationResult<Correction> {
        let predicted = match &self.phase {
            FilterPhase::Predicted(p) => p.clone(),
            _ => return Err(LocalizationError::CorrectWithoutPredict),
        };

        if self.landmarks.is_empty() {
            self.phase = FilterPhase::Corrected;
            return Ok(Correction {
                mean: self.estimate(),
                covariance: self.covariance,
                gain: None,
                predicted_measurements: Vec::new(),
                warning: None,
            });
        }

        if z.len() != self.landmarks.len() {
            return Err(LocalizationError::DimensionMismatch {
                expected: self.landmarks.len(),
                actual: z.len(),
            });
        }

        let landmarks = self.landmarks.clone();
        let mut sigma = predicted.sigma_points;

        let predicted_measurements: Vec<RangeBearing> = landmarks
            .iter()
            .map(|lm| {
                self.measurement_mean(&self.measurement_sigma_points(&sigma, lm))
                    .into()
            })
            .collect();

        let wc = &self.weights.wc;
        let mut mean = self.mean;
        let mut covariance = self.covariance;
        let mut gain = KalmanGain::zeros();
        for (i, (lm, zi)) in landmarks.iter().zip(z.iter()).enumerate() {
            let z_sigma = self.measurement_sigma_points(&sigma, lm);
            let z_hat = self.measurement_mean(&z_sigma);

            let mut s = Matrix2::zeros();
            let mut sigma_xz = Matrix3x2::zeros();
            for j in 0..SIGMA_COUNT {
                let dz = Vector2::new(
                    z_sigma[(0, j)] - z_hat[0],
                    angle_diff(z_sigma[(1, j)], z_hat[1]),
                );
                let dx = Self::pose_deviation(&sigma, j, &mean);
                s += wc[j] * dz * dz.transpose();
                sigma_xz += wc[j] * dx * dz.transpose();
            }

            let s_inv = s
                .try_inverse()
                .ok_or(LocalizationError::SingularInnovationCovariance { landmark: i })?;
            gain = sigma_xz * s_inv;

            let innovation = Vector2::new(zi.range - z_hat[0], angle_diff(zi.bearing, z_hat[1]));
            mean += gain * innovation;
            mean[2] = wrap_angle(mean[2]);
            covariance = symmetrize(&(covariance - gain * s * gain.transpose()));

            if i + 1 < landmarks.len() {
                sigma =
                    self.generate_sigma_points(&mean, &covariance, &predicted.control_covariance)?;
                for j in 0..SIGMA_COUNT {
                    sigma[(2, j)] = wrap_angle(sigma[(2, j)]);
                }
            }
        }

        self.mean = mean;
        self.covariance = covariance;
        self.last_gain = Some(gain);
        self.phase = FilterPhase::Corrected;

        let warning = covariance_shrink_warning(&predicted.prior_covariance, &covariance);
        if let Some(FilterWarning::ImpossibleCovarianceShrink {
            prior_diagonal,
            posterior_diagonal,
        }) = &warning
        {
            warn!(
                prior = ?prior_diagonal.as_slice(),
                posterior = ?posterior_diagonal.as_slice(),
                "posterior covariance grew in every coordinate during correction"
            );
        }

        debug!(
            landmarks = landmarks.len(),
            trace = covariance.trace(),
            "ukf correction"
        );

        Ok(Correction {
            mean: self.estimate(),
            covariance,
            gain: Some(gain),
            predicted_measurements,
            warning,
        })
    }

    /// Calculate position uncertainty (2-sigma ellipse parameters)
    pub fn position_uncertainty(&self) -> (f64, f64, f64) {
        covariance_ellipse(&self.covariance, 2.0)
    }
}

/// Flags a correction whose posterior variances all exceed the prior ones
pub fn covariance_shrink_warning(
    prior: &Matrix3<f64>,
    posterior: &Matrix3<f64>,
) -> Option<FilterWarning> {
    let prior_diagonal = prior.diagonal();
    let posterior_diagonal = posterior.diagonal();
    if prior_diagonal
        .iter()
        .zip(posterior_diagonal.iter())
        .all(|(p, q)| q > p)
    {
        Some(FilterWarning::ImpossibleCovarianceShrink {
            prior_diagonal,
            posterior_diagonal,
        })
    } else {
        None
    }
}

/// Semi-axes and orientation of the n-sigma ellipse of the x/y block
pub fn covariance_ellipse(covariance: &Matrix3<f64>, n_sigma: f64) -> (f64, f64, f64) {
    let p_xy = covariance.fixed_view::<2, 2>(0, 0).into_owned();
    let eigen = p_xy.symmetric_eigen();

    let (big_idx, small_idx) = if eigen.eigenvalues[0] >= eigen.eigenvalues[1] {
        (0, 1)
    } else {
        (1, 0)
    };

    let a = n_sigma * eigen.eigenvalues[big_idx].max(0.0).sqrt();
    let b = n_sigma * eigen.eigenvalues[small_idx].max(0.0).sqrt();
    let angle = eigen.eigenvectors[(1, big_idx)].atan2(eigen.eigenvectors[(0, big_idx)]);

    (a, b, angle)
}
