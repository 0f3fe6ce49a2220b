//! Covariance matrix assembly and jittered Cholesky factorization.

use crate::errors::{GpError, Result};
use crate::kernels::Kernel;
use crate::linalg::CholeskyFactor;
use log::{debug, warn};
use ndarray::{Array2, ArrayBase, Data, Ix2};
#[cfg(feature = "serializable")]
use serde::{Deserialize, Serialize};

/// Escalation schedule of the diagonal jitter added when a covariance
/// matrix fails to factorize
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serializable", derive(Serialize, Deserialize))]
pub struct JitterPolicy {
    /// First jitter, relative to the mean of the matrix diagonal
    pub initial: f64,
    /// Multiplicative growth of the jitter between attempts
    pub growth: f64,
    /// Maximum number of jittered attempts
    pub max_attempts: usize,
}

impl JitterPolicy {
    /// Default relative jitter
    pub const DEFAULT_INITIAL: f64 = 1e-6;
    /// Default growth factor
    pub const DEFAULT_GROWTH: f64 = 10.;
    /// Default number of jittered attempts
    pub const DEFAULT_MAX_ATTEMPTS: usize = 5;

    /// Policy never adding jitter
    pub fn none() -> Self {
        JitterPolicy {
            max_attempts: 0,
            ..Default::default()
        }
    }
}

impl Default for JitterPolicy {
    fn default() -> Self {
        JitterPolicy {
            initial: Self::DEFAULT_INITIAL,
            growth: Self::DEFAULT_GROWTH,
            max_attempts: Self::DEFAULT_MAX_ATTEMPTS,
        }
    }
}

/// Covariance matrix `K(x, x) + diag_term * I`, symmetrized
pub fn covariance_matrix(
    kernel: &dyn Kernel,
    x: &ArrayBase<impl Data<Elem = f64>, Ix2>,
    diag_term: f64,
) -> Array2<f64> {
    let k = kernel.value(&x.view(), &x.view());
    let mut k = (&k + &k.t()) * 0.5;
    k.diag_mut().mapv_inplace(|v| v + diag_term);
    k
}

/// Cholesky factorization of `k`, adding escalating diagonal jitter on failure.
///
/// Returns the factor along with the jitter actually added (0 when none was needed).
pub fn stable_cholesky(
    k: &ArrayBase<impl Data<Elem = f64>, Ix2>,
    policy: &JitterPolicy,
) -> Result<(CholeskyFactor, f64)> {
    match CholeskyFactor::new(k) {
        Ok(chol) => return Ok((chol, 0.)),
        Err(GpError::DimensionMismatch(msg)) => return Err(GpError::DimensionMismatch(msg)),
        Err(err) => debug!("Cholesky failed without jitter: {err}"),
    }

    let n = k.nrows().max(1) as f64;
    let mean_diag = k.diag().sum() / n;
    let scale = if mean_diag.is_finite() && mean_diag > 0. {
        mean_diag
    } else {
        1.
    };
    let mut jitter = policy.initial * scale;
    for attempt in 1..=policy.max_attempts {
        let mut kj = k.to_owned();
        kj.diag_mut().mapv_inplace(|v| v + jitter);
        match CholeskyFactor::new(&kj) {
            Ok(chol) => {
                warn!("Covariance matrix not positive definite: added jitter {jitter:e} (attempt {attempt})");
                return Ok((chol, jitter));
            }
            Err(err) => debug!("Cholesky failed with jitter {jitter:e}: {err}"),
        }
        jitter *= policy.growth;
    }
    Err(GpError::NumericalInstability(format!(
        "Cholesky factorization failed after {} jitter attempts",
        policy.max_attempts
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernels::{Matern52, Rbf};
    use approx::assert_abs_diff_eq;
    use ndarray::{array, Array};

    #[test]
    fn test_covariance_symmetric_and_factorizable() {
        let x = Array::<f64, _>::linspace(0., 1., 15).insert_axis(ndarray::Axis(1));
        for kernel in [
            Box::new(Rbf::new(1., 0.3).unwrap()) as Box<dyn Kernel>,
            Box::new(Matern52::new(2., 0.5).unwrap()),
        ] {
            let k = covariance_matrix(kernel.as_ref(), &x, 1e-8);
            assert_abs_diff_eq!(k, k.t(), epsilon = 0.);
            let (chol, _) = stable_cholesky(&k, &JitterPolicy::default()).unwrap();
            assert_abs_diff_eq!(chol.lower().dot(&chol.lower().t()), k, epsilon = 1e-4);
        }
    }

    #[test]
    fn test_jitter_rescues_duplicated_points() {
        let x = array![[0.], [0.], [1.]];
        let k = covariance_matrix(&Rbf::default(), &x, 0.);
        let (_, jitter) = stable_cholesky(&k, &JitterPolicy::default()).unwrap();
        assert!(jitter > 0.);
        assert!(jitter <= 1e-6 * 1e4);
    }

    #[test]
    fn test_jitter_exhausted() {
        let k = array![[1., 2.], [2., 1.]];
        let res = stable_cholesky(&k, &JitterPolicy::none());
        assert!(matches!(res, Err(GpError::NumericalInstability(_))));
        let res = stable_cholesky(&k, &JitterPolicy::default());
        assert!(matches!(res, Err(GpError::NumericalInstability(_))));
    }
}
