//! ukf_localization - landmark-based robot localization with an augmented
//! Unscented Kalman Filter
//!
//! A differential drive robot moves under a noisy velocity motion model and
//! observes known landmarks through a noisy range-bearing sensor. The
//! filter carries the control and sensor noise in an augmented state and
//! fuses landmarks sequentially.

// Core modules
pub mod common;
pub mod config;
pub mod utils;

// Algorithm modules
pub mod localization;

// Re-export common types for convenience
pub use common::{ControlInput, Landmarks, Point2D, Pose2D, RangeBearing};
pub use common::{MotionModel, ObservationModel};
pub use common::{LocalizationError, LocalizationResult};
pub use config::SimulationConfig;
pub use localization::{Simulation, TurtleBot, UnscentedKalmanFilter};
