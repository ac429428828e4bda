//! Small dense linear algebra helpers for covariance handling

use nalgebra::SMatrix;

use crate::common::error::{LocalizationError, LocalizationResult};

/// Pivot tolerance relative to the largest diagonal entry
const PSD_TOLERANCE: f64 = 1e-10;

/// Lower-triangular factor `L` with `L * L^T = m` for a positive
/// semi-definite `m`.
///
/// Unlike `nalgebra::Cholesky` this accepts zero pivots (e.g. a zero noise
/// block in an augmented covariance): the corresponding column of `L` is
/// left at zero. A negative pivot, or a zero pivot with a non-zero residual
/// below it, means `m` is not PSD and is reported as
/// [`LocalizationError::NonPositiveDefiniteCovariance`].
pub fn psd_cholesky<const D: usize>(
    m: &SMatrix<f64, D, D>,
    context: &str,
) -> LocalizationResult<SMatrix<f64, D, D>> {
    if m.iter().any(|v| !v.is_finite()) {
        return Err(LocalizationError::not_psd(format!(
            "{}: non-finite entry",
            context
        )));
    }

    let scale = (0..D).map(|i| m[(i, i)].abs()).fold(0.0, f64::max);
    let tol = PSD_TOLERANCE * scale;
    let off_tol = (tol * scale).sqrt().max(tol);

    let mut l = SMatrix::<f64, D, D>::zeros();
    for j in 0..D {
        let mut d = m[(j, j)];
        for k in 0..j {
            d -= l[(j, k)] * l[(j, k)];
        }

        if d < -tol {
            return Err(LocalizationError::not_psd(format!(
                "{}: pivot {} is {:.3e}",
                context, j, d
            )));
        }

        if d <= tol {
            // zero pivot, the rest of the column has to vanish too
            for i in (j + 1)..D {
                let mut r = m[(i, j)];
                for k in 0..j {
                    r -= l[(i, k)] * l[(j, k)];
                }
                if r.abs() > off_tol {
                    return Err(LocalizationError::not_psd(format!(
                        "{}: zero pivot {} with residual {:.3e}",
                        context, j, r
                    )));
                }
            }
            continue;
        }

        let ljj = d.sqrt();
        l[(j, j)] = ljj;
        for i in (j + 1)..D {
            let mut r = m[(i, j)];
            for k in 0..j {
                r -= l[(i, k)] * l[(j, k)];
            }
            l[(i, j)] = r / ljj;
        }
    }

    Ok(l)
}

/// Largest absolute difference between `m` and its transpose
pub fn asymmetry<const D: usize>(m: &SMatrix<f64, D, D>) -> f64 {
    (m - m.transpose()).amax()
}

/// Reject a matrix that is not symmetric to within a relative tolerance
pub fn ensure_symmetric<const D: usize>(
    m: &SMatrix<f64, D, D>,
    context: &str,
) -> LocalizationResult<()> {
    let scale = m.amax().max(1.0);
    if asymmetry(m) > 1e-9 * scale {
        return Err(LocalizationError::AsymmetricCovariance {
            context: context.to_string(),
        });
    }
    Ok(())
}

/// `(m + m^T) / 2`
pub fn symmetrize<const D: usize>(m: &SMatrix<f64, D, D>) -> SMatrix<f64, D, D> {
    (m + m.transpose()) * 0.5
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::{Matrix3, Matrix4};

    #[test]
    fn test_cholesky_matches_nalgebra_for_pd() {
        let m = Matrix3::new(
            4.0, 2.0, 0.4,
            2.0, 3.0, 0.2,
            0.4, 0.2, 1.0,
        );
        let l = psd_cholesky(&m, "test").unwrap();
        let reference = m.cholesky().unwrap().l();
        assert!((l - reference).amax() < 1e-12);
        assert!((l * l.transpose() - m).amax() < 1e-12);
    }

    #[test]
    fn test_cholesky_accepts_zero_block() {
        let mut m = Matrix4::zeros();
        m[(0, 0)] = 1.0;
        m[(3, 3)] = 0.25;
        let l = psd_cholesky(&m, "augmented").unwrap();
        assert_eq!(l[(1, 1)], 0.0);
        assert_eq!(l[(2, 2)], 0.0);
        assert!((l[(3, 3)] - 0.5).abs() < 1e-12);
        assert!((l * l.transpose() - m).amax() < 1e-12);
    }

    #[test]
    fn test_cholesky_rejects_negative_eigenvalue() {
        // eigenvalues 3 and -1 in the upper block
        let m = Matrix3::new(
            1.0, 2.0, 0.0,
            2.0, 1.0, 0.0,
            0.0, 0.0, 1.0,
        );
        let err = psd_cholesky(&m, "initial covariance").unwrap_err();
        assert!(matches!(err, LocalizationError::NonPositiveDefiniteCovariance { .. }));
    }

    #[test]
    fn test_cholesky_rejects_zero_pivot_with_coupling() {
        let m = Matrix3::new(
            0.0, 1.0, 0.0,
            1.0, 1.0, 0.0,
            0.0, 0.0, 1.0,
        );
        assert!(psd_cholesky(&m, "coupled").is_err());
    }

    #[test]
    fn test_cholesky_rejects_nan() {
        let mut m = Matrix3::identity();
        m[(1, 1)] = f64::NAN;
        assert!(psd_cholesky(&m, "nan").is_err());
    }

    #[test]
    fn test_symmetry_helpers() {
        let mut m = Matrix3::identity();
        m[(0, 1)] = 0.2;
        assert!(ensure_symmetric(&m, "lopsided").is_err());
        let s = symmetrize(&m);
        assert!(asymmetry(&s) < 1e-15);
        assert!((s[(1, 0)] - 0.1).abs() < 1e-15);
        assert!(ensure_symmetric(&s, "fixed").is_ok());
    }
}
