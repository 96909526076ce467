use nalgebra::DMatrix;

use crate::error::{ArbError, Result};

/// Correlation to distance: `d_ij = sqrt(2 (1 - rho_ij))`, zero diagonal.
///
/// Perfectly correlated assets sit at 0, perfectly anti-correlated ones at 2.
pub fn correlation_distance(correlation: &DMatrix<f64>) -> Result<DMatrix<f64>> {
    if !correlation.is_square() {
        return Err(ArbError::numerical("correlation matrix must be square"));
    }
    if correlation.iter().any(|v| !v.is_finite()) {
        return Err(ArbError::numerical("correlation matrix has non-finite entries"));
    }
    let n = correlation.nrows();
    let mut dist = DMatrix::from_fn(n, n, |i, j| {
        (2.0 * (1.0 - correlation[(i, j)])).max(0.0).sqrt()
    });
    dist.fill_diagonal(0.0);
    validate_distance_matrix(&dist)?;
    Ok(dist)
}

/// A usable filtration input: square, finite, symmetric, non-negative, zero diagonal.
pub fn validate_distance_matrix(dist: &DMatrix<f64>) -> Result<()> {
    if !dist.is_square() {
        return Err(ArbError::numerical("distance matrix must be square"));
    }
    let n = dist.nrows();
    for i in 0..n {
        if dist[(i, i)] != 0.0 {
            return Err(ArbError::numerical(format!(
                "distance matrix diagonal at {} is {}",
                i,
                dist[(i, i)]
            )));
        }
        for j in (i + 1)..n {
            let (a, b) = (dist[(i, j)], dist[(j, i)]);
            if !a.is_finite() || !b.is_finite() || a < 0.0 {
                return Err(ArbError::numerical(format!(
                    "invalid distance {} between {} and {}",
                    a, i, j
                )));
            }
            if (a - b).abs() > 1e-9 {
                return Err(ArbError::numerical("distance matrix is not symmetric"));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_correlation_extremes() {
        let corr = DMatrix::from_row_slice(3, 3, &[1.0, 1.0, -1.0, 1.0, 1.0, 0.0, -1.0, 0.0, 1.0]);
        let d = correlation_distance(&corr).unwrap();
        assert_eq!(d[(0, 1)], 0.0);
        assert!((d[(0, 2)] - 2.0).abs() < 1e-12);
        assert!((d[(1, 2)] - 2f64.sqrt()).abs() < 1e-12);
        assert!((0..3).all(|i| d[(i, i)] == 0.0));
    }

    #[test]
    fn rounding_above_one_clips_to_zero() {
        let corr = DMatrix::from_row_slice(2, 2, &[1.0, 1.0 + 1e-15, 1.0 + 1e-15, 1.0]);
        let d = correlation_distance(&corr).unwrap();
        assert_eq!(d[(0, 1)], 0.0);
    }

    #[test]
    fn nan_correlation_is_rejected() {
        let corr = DMatrix::from_row_slice(2, 2, &[1.0, f64::NAN, f64::NAN, 1.0]);
        assert!(correlation_distance(&corr).unwrap_err().is_numerical());
    }
}
