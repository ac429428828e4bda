// Localization: models, ground-truth simulator and the unscented filter

pub mod measurement_model;
pub mod motion_model;
pub mod simulation;
pub mod turtlebot;
pub mod unscented_kalman_filter;

// Re-exports
pub use measurement_model::{landmark_from_measurement, RangeBearingModel};
pub use motion_model::{MotionNoise, VelocityMotionModel};
pub use simulation::{
    reference_command, time_vector, ControlSource, RecordedTrajectory, Simulation, StepSnapshot,
};
pub use turtlebot::{TurtleBot, TurtleBotConfig};
pub use unscented_kalman_filter::{
    Correction, FilterWarning, KalmanGain, Prediction, UKFConfig, UKFParams, UKFWeights,
    UnscentedKalmanFilter,
};
