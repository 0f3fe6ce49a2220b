//! Cholesky based linear algebra used by GP inference.
//!
//! Covariance matrices are never inverted explicitly outside of this module:
//! solves go through triangular substitutions on the lower factor `L` with `K = L.L^T`.

use crate::errors::{GpError, Result};
use linfa_linalg::{cholesky::*, triangular::*};
use ndarray::{Array1, Array2, ArrayBase, Axis, Data, Ix1, Ix2, Zip};
#[cfg(feature = "serializable")]
use serde::{Deserialize, Serialize};

/// Lower Cholesky factor of a symmetric positive definite matrix
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serializable", derive(Serialize, Deserialize))]
pub struct CholeskyFactor {
    l: Array2<f64>,
}

impl CholeskyFactor {
    /// Factorize a symmetric positive definite matrix `k`
    pub fn new(k: &ArrayBase<impl Data<Elem = f64>, Ix2>) -> Result<Self> {
        if k.nrows() != k.ncols() {
            return Err(GpError::DimensionMismatch(format!(
                "cannot factorize a non square ({}, {}) matrix",
                k.nrows(),
                k.ncols()
            )));
        }
        let l = k.to_owned().cholesky()?;
        if l.diag().iter().any(|v| !v.is_finite() || *v <= 0.) {
            return Err(GpError::NumericalInstability(
                "matrix is not numerically positive definite".to_string(),
            ));
        }
        Ok(CholeskyFactor { l })
    }

    /// Lower triangular factor
    pub fn lower(&self) -> &Array2<f64> {
        &self.l
    }

    /// Size of the factorized matrix
    pub fn dim(&self) -> usize {
        self.l.nrows()
    }

    /// Solve `L.X = B`
    pub fn solve_lower(&self, b: &ArrayBase<impl Data<Elem = f64>, Ix2>) -> Result<Array2<f64>> {
        Ok(self.l.solve_triangular(b, UPLO::Lower)?)
    }

    /// Solve `L^T.X = B`
    pub fn solve_upper(&self, b: &ArrayBase<impl Data<Elem = f64>, Ix2>) -> Result<Array2<f64>> {
        Ok(self.l.t().solve_triangular(b, UPLO::Upper)?)
    }

    /// Solve `K.X = B`
    pub fn solve(&self, b: &ArrayBase<impl Data<Elem = f64>, Ix2>) -> Result<Array2<f64>> {
        let z = self.solve_lower(b)?;
        self.solve_upper(&z)
    }

    /// Solve `K.x = b`
    pub fn solve_vec(&self, b: &ArrayBase<impl Data<Elem = f64>, Ix1>) -> Result<Array1<f64>> {
        let b = b.to_owned().insert_axis(Axis(1));
        Ok(self.solve(&b)?.remove_axis(Axis(1)))
    }

    /// `log|K| = 2 sum_i log(L_ii)`
    pub fn log_det(&self) -> f64 {
        2. * self.half_log_det()
    }

    /// `sum_i log(L_ii)`
    pub fn half_log_det(&self) -> f64 {
        self.l.diag().mapv(f64::ln).sum()
    }

    /// Diagonal of `K^-1` computed as column sums of squares of `L^-1`
    pub fn inverse_diag(&self) -> Result<Array1<f64>> {
        let linv = self.solve_lower(&Array2::<f64>::eye(self.dim()))?;
        Ok(linv.mapv(|v| v * v).sum_axis(Axis(0)))
    }

    /// `K^-1` through triangular solves against the identity
    pub fn inverse(&self) -> Result<Array2<f64>> {
        let mut inv = self.solve(&Array2::<f64>::eye(self.dim()))?;
        // enforce exact symmetry lost by round-off
        let t = inv.t().to_owned();
        Zip::from(&mut inv).and(&t).for_each(|a, &b| *a = 0.5 * (*a + b));
        Ok(inv)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    fn spd() -> Array2<f64> {
        array![[4., 2., 0.4], [2., 3., 0.5], [0.4, 0.5, 2.]]
    }

    #[test]
    fn test_solve_and_inverse() {
        let k = spd();
        let chol = CholeskyFactor::new(&k).unwrap();
        assert_abs_diff_eq!(chol.lower().dot(&chol.lower().t()), k, epsilon = 1e-12);

        let b = array![1., -2., 0.5];
        let x = chol.solve_vec(&b).unwrap();
        assert_abs_diff_eq!(k.dot(&x), b, epsilon = 1e-12);

        let inv = chol.inverse().unwrap();
        assert_abs_diff_eq!(k.dot(&inv), Array2::eye(3), epsilon = 1e-12);
        assert_abs_diff_eq!(chol.inverse_diag().unwrap(), inv.diag(), epsilon = 1e-12);
    }

    #[test]
    fn test_log_det() {
        let k = spd();
        let chol = CholeskyFactor::new(&k).unwrap();
        // det computed by cofactor expansion
        let det: f64 = 4. * (3. * 2. - 0.5 * 0.5) - 2. * (2. * 2. - 0.5 * 0.4) + 0.4 * (2. * 0.5 - 3. * 0.4);
        assert_abs_diff_eq!(chol.log_det(), det.ln(), epsilon = 1e-12);
    }

    #[test]
    fn test_not_positive_definite() {
        let k = array![[1., 2.], [2., 1.]];
        assert!(CholeskyFactor::new(&k).is_err());
        let k = array![[1., 2.]];
        assert!(matches!(
            CholeskyFactor::new(&k),
            Err(GpError::DimensionMismatch(_))
        ));
    }
}
