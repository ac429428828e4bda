//! Error types for ukf_localization

use thiserror::Error;

/// Main error type for the localization core
#[derive(Debug, Error)]
pub enum LocalizationError {
    /// Cholesky factorization failed: the matrix is not positive semi-definite
    #[error("Non-positive-definite covariance: {context}")]
    NonPositiveDefiniteCovariance { context: String },

    /// A covariance supplied at construction is not symmetric
    #[error("Asymmetric covariance: {context}")]
    AsymmetricCovariance { context: String },

    /// Innovation covariance could not be inverted
    #[error("Singular innovation covariance for landmark {landmark}")]
    SingularInnovationCovariance { landmark: usize },

    /// Measurement set does not line up with the landmark set
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Invalid parameter
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// `correct` was called without a fresh `predict`
    #[error("Correction requested without a preceding prediction")]
    CorrectWithoutPredict,

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration file could not be parsed
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// Visualization error
    #[error("Visualization error: {0}")]
    Visualization(String),
}

impl LocalizationError {
    pub(crate) fn not_psd(context: impl Into<String>) -> Self {
        LocalizationError::NonPositiveDefiniteCovariance {
            context: context.into(),
        }
    }
}

/// Result type alias for localization operations
pub type LocalizationResult<T> = Result<T, LocalizationError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = LocalizationError::DimensionMismatch { expected: 3, actual: 2 };
        assert_eq!(format!("{}", err), "Dimension mismatch: expected 3, got 2");

        let err = LocalizationError::not_psd("initial covariance");
        assert_eq!(
            format!("{}", err),
            "Non-positive-definite covariance: initial covariance"
        );
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: LocalizationError = io_err.into();
        assert!(matches!(err, LocalizationError::Io(_)));
    }
}
