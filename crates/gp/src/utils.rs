use ndarray::{Array2, ArrayView2, Zip};

const SQRT_2: f64 = std::f64::consts::SQRT_2;
const LN_SQRT_2PI: f64 = 0.918_938_533_204_672_7;

/// Squared differences along column `j` between rows of `x` and rows of `z`
/// as a (x.nrows(), z.nrows()) matrix
pub(crate) fn sq_differences(x: &ArrayView2<f64>, z: &ArrayView2<f64>, j: usize) -> Array2<f64> {
    let xj = x.column(j);
    let zj = z.column(j);
    Array2::from_shape_fn((x.nrows(), z.nrows()), |(a, b)| {
        let d = xj[a] - zj[b];
        d * d
    })
}

/// Signed differences along column `j` between rows of `x` and rows of `z`
pub(crate) fn differences(x: &ArrayView2<f64>, z: &ArrayView2<f64>, j: usize) -> Array2<f64> {
    let xj = x.column(j);
    let zj = z.column(j);
    Array2::from_shape_fn((x.nrows(), z.nrows()), |(a, b)| xj[a] - zj[b])
}

/// Squared distances scaled by lengthscales: sum_j ((x_j - z_j) / l_j)^2.
/// A single lengthscale is shared by every input dimension.
pub(crate) fn scaled_sq_distances(
    x: &ArrayView2<f64>,
    z: &ArrayView2<f64>,
    lengthscales: &[f64],
) -> Array2<f64> {
    let mut r2 = Array2::<f64>::zeros((x.nrows(), z.nrows()));
    for j in 0..x.ncols() {
        let l = if lengthscales.len() == 1 {
            lengthscales[0]
        } else {
            lengthscales[j]
        };
        let l2 = l * l;
        Zip::from(&mut r2)
            .and(&sq_differences(x, z, j))
            .for_each(|r, &d2| *r += d2 / l2);
    }
    r2
}

/// Indicator matrix of exactly identical rows
pub(crate) fn identical_rows(x: &ArrayView2<f64>, z: &ArrayView2<f64>) -> Array2<f64> {
    Array2::from_shape_fn((x.nrows(), z.nrows()), |(a, b)| {
        if x.row(a) == z.row(b) {
            1.
        } else {
            0.
        }
    })
}

/// Standard normal density
pub(crate) fn norm_pdf(x: f64) -> f64 {
    (-0.5 * x * x - LN_SQRT_2PI).exp()
}

/// Standard normal cumulative distribution, accurate in both tails
pub(crate) fn norm_cdf(x: f64) -> f64 {
    0.5 * libm::erfc(-x / SQRT_2)
}

/// Logarithm of the standard normal cumulative distribution
pub(crate) fn log_norm_cdf(x: f64) -> f64 {
    if x > -25. {
        norm_cdf(x).ln()
    } else {
        // asymptotic expansion of the Mills ratio in the far left tail
        let x2 = x * x;
        -0.5 * x2 - LN_SQRT_2PI - (-x).ln() + (1. - 1. / x2 + 3. / (x2 * x2)).ln()
    }
}

/// Ratio pdf(x) / cdf(x), stable for very negative x
pub(crate) fn inv_mills_ratio(x: f64) -> f64 {
    if x > -25. {
        norm_pdf(x) / norm_cdf(x)
    } else {
        (-0.5 * x * x - LN_SQRT_2PI - log_norm_cdf(x)).exp()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn test_scaled_sq_distances() {
        let x = array![[0., 0.], [1., 2.]];
        let z = array![[1., 1.]];
        let iso = scaled_sq_distances(&x.view(), &z.view(), &[2.]);
        assert_abs_diff_eq!(iso, array![[0.5], [0.25]], epsilon = 1e-12);
        let ard = scaled_sq_distances(&x.view(), &z.view(), &[1., 0.5]);
        assert_abs_diff_eq!(ard, array![[5.], [4.]], epsilon = 1e-12);
    }

    #[test]
    fn test_identical_rows() {
        let x = array![[0., 1.], [2., 3.], [0., 1.]];
        let ind = identical_rows(&x.view(), &x.view());
        assert_abs_diff_eq!(
            ind,
            array![[1., 0., 1.], [0., 1., 0.], [1., 0., 1.]],
            epsilon = 0.
        );
    }

    #[test]
    fn test_normal_functions() {
        assert_abs_diff_eq!(norm_cdf(0.), 0.5, epsilon = 1e-15);
        assert_abs_diff_eq!(norm_cdf(1.96), 0.975_002_104_851_780, epsilon = 1e-12);
        assert_abs_diff_eq!(norm_pdf(0.), 0.398_942_280_401_432_7, epsilon = 1e-15);
        // tail expansion agrees with the direct evaluation past the switch point
        assert_abs_diff_eq!(log_norm_cdf(-25.1), norm_cdf(-25.1).ln(), epsilon = 1e-6);
        assert!(log_norm_cdf(-40.).is_finite());
        assert_abs_diff_eq!(inv_mills_ratio(-30.), 30., epsilon = 0.1);
    }
}
