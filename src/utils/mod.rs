//! Utility modules for ukf_localization

pub mod visualization;

pub use visualization::{colors, Visualizer};
