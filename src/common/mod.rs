//! Common types, traits, and error definitions for ukf_localization
//!
//! This module provides the foundational building blocks shared by the
//! motion/measurement models, the ground-truth simulator and the filter.

pub mod angle;
pub mod error;
pub mod linalg;
pub mod traits;
pub mod types;

pub use angle::*;
pub use error::*;
pub use traits::*;
pub use types::*;
