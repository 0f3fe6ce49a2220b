//! Covariance kernels k(x, x') used as GP priors.
//!
//! The following kernels are implemented:
//! * stationary: [`Rbf`], [`Exponential`], [`Matern32`], [`Matern52`], [`RatQuad`] and [`StdPeriodic`],
//!   with a scalar lengthscale or one lengthscale per input dimension (ARD),
//! * dot product: [`Linear`], [`Polynomial`],
//! * constant: [`White`], [`Bias`],
//! * combinators: [`Sum`], [`Product`] and [`Masked`] (kernel restricted to active dimensions).
//!
//! Kernels are used as `Box<dyn Kernel>` trait objects and may be composed with `+` and `*`:
//!
//! ```
//! use gpkit::kernels::{Kernel, Rbf, Linear, Masked};
//!
//! let k = Masked::new(Rbf::default(), vec![0]).unwrap().boxed()
//!     + Masked::new(Linear::default(), vec![1]).unwrap().boxed();
//! assert_eq!(k.name(), "sum");
//! ```

mod combination;
mod constant;
mod dot_product;
mod periodic;
mod stationary;

pub use combination::*;
pub use constant::*;
pub use dot_product::*;
pub use periodic::*;
pub use stationary::*;

use crate::errors::{GpError, Result};
use crate::hyperparameters::{Hyperparameter, Param};
use ndarray::{Array1, Array2, ArrayView2};
use std::fmt;
use std::ops::{Add, Mul};

/// A trait for covariance functions
///
/// Gradients are taken wrt hyperparameters in their natural (untransformed) space
/// and returned in the order of [`Kernel::params`].
#[cfg_attr(feature = "serializable", typetag::serde(tag = "type_kernel"))]
pub trait Kernel: fmt::Display + fmt::Debug + Send + Sync {
    /// Short kernel identifier used to qualify hyperparameter names
    fn name(&self) -> String;

    /// Input dimension required by the kernel if any (ARD kernels)
    fn input_dim(&self) -> Option<usize> {
        None
    }

    /// Check the kernel can be evaluated on inputs with `nx` components
    fn check_input_dim(&self, nx: usize) -> Result<()> {
        match self.input_dim() {
            Some(dim) if dim != nx => Err(GpError::DimensionMismatch(format!(
                "{} kernel expects inputs of dimension {}, got {}",
                self.name(),
                dim,
                nx
            ))),
            _ => Ok(()),
        }
    }

    /// Covariance matrix between rows of `x` (n, nx) and rows of `z` (m, nx) as a (n, m) matrix
    fn value(&self, x: &ArrayView2<f64>, z: &ArrayView2<f64>) -> Array2<f64>;

    /// Diagonal of `value(x, x)`
    fn diag(&self, x: &ArrayView2<f64>) -> Array1<f64>;

    /// Hyperparameters with their local names
    fn params(&self) -> Vec<(String, &Param)>;

    /// Mutable hyperparameters in the same order as [`Kernel::params`]
    fn params_mut(&mut self) -> Vec<&mut Param>;

    /// Derivatives of `value(x, x)` wrt each hyperparameter
    fn gradients(&self, x: &ArrayView2<f64>) -> Vec<Array2<f64>>;

    /// Clone as a trait object
    fn box_clone(&self) -> Box<dyn Kernel>;

    /// Box the kernel as a trait object, to compose it with `+` and `*`
    fn boxed(self) -> Box<dyn Kernel>
    where
        Self: Sized + 'static,
    {
        Box::new(self)
    }
}

impl Clone for Box<dyn Kernel> {
    fn clone(&self) -> Self {
        self.box_clone()
    }
}

impl Add for Box<dyn Kernel> {
    type Output = Box<dyn Kernel>;

    fn add(self, rhs: Box<dyn Kernel>) -> Self::Output {
        Box::new(Sum::new(vec![self, rhs]))
    }
}

impl Mul for Box<dyn Kernel> {
    type Output = Box<dyn Kernel>;

    fn mul(self, rhs: Box<dyn Kernel>) -> Self::Output {
        Box::new(Product::new(vec![self, rhs]))
    }
}

/// Snapshot of kernel hyperparameters qualified with `prefix`
pub(crate) fn kernel_hyperparameters(kernel: &dyn Kernel, prefix: &str) -> Vec<Hyperparameter> {
    kernel
        .params()
        .into_iter()
        .map(|(name, p)| Hyperparameter::new(format!("{prefix}.{name}"), p))
        .collect()
}

/// Check a positive value used at construction time
pub(crate) fn positive(name: &str, value: f64) -> Result<Param> {
    Param::positive(value).map_err(|_| {
        GpError::InvalidParameter(format!("{name} should be strictly positive, got {value}"))
    })
}

/// Lengthscale parameters from either a scalar or an ARD vector
pub(crate) fn lengthscales(values: &[f64]) -> Result<Vec<Param>> {
    if values.is_empty() {
        return Err(GpError::InvalidParameter(
            "at least one lengthscale is required".to_string(),
        ));
    }
    values.iter().map(|&v| positive("lengthscale", v)).collect()
}

/// Names of lengthscale parameters
pub(crate) fn lengthscale_names(n: usize) -> Vec<String> {
    if n == 1 {
        vec!["lengthscale".to_string()]
    } else {
        (0..n).map(|i| format!("lengthscale[{i}]")).collect()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use finitediff::FiniteDiff;
    use ndarray::{array, Array, Axis};
    use ndarray_rand::rand::SeedableRng;
    use ndarray_rand::rand_distr::Uniform;
    use ndarray_rand::RandomExt;
    use paste::paste;
    use rand_xoshiro::Xoshiro256Plus;

    /// Check analytic hyperparameter gradients against central finite differences
    /// computed in the natural parameter space
    pub(crate) fn check_gradients(kernel: &dyn Kernel, x: &Array2<f64>, eps: f64) {
        let values: Vec<f64> = kernel.params().iter().map(|(_, p)| p.value()).collect();
        let grads = kernel.gradients(&x.view());
        assert_eq!(grads.len(), values.len());
        for (a, b) in [(0, 1), (1, 2), (0, x.nrows() - 1), (2, 2)] {
            let f = |v: &Vec<f64>| -> f64 {
                let mut k = kernel.box_clone();
                for (p, val) in k.params_mut().into_iter().zip(v.iter()) {
                    p.set_value(*val).unwrap();
                }
                k.value(&x.view(), &x.view())[[a, b]]
            };
            let fd = values.central_diff(&f);
            for (i, g) in grads.iter().enumerate() {
                assert_abs_diff_eq!(g[[a, b]], fd[i], epsilon = eps);
            }
        }
    }

    pub(crate) fn sample_points(n: usize, nx: usize, seed: u64) -> Array2<f64> {
        let mut rng = Xoshiro256Plus::seed_from_u64(seed);
        Array::random_using((n, nx), Uniform::<f64>::new(-1., 1.), &mut rng)
    }

    macro_rules! test_kernel {
        ($kernel:ident, $ctor:expr) => {
            paste! {
                #[test]
                fn [<test_ $kernel:snake _symmetric>]() {
                    let k: Box<dyn Kernel> = Box::new($ctor);
                    let x = sample_points(6, 2, 42);
                    let kxx = k.value(&x.view(), &x.view());
                    assert_abs_diff_eq!(kxx, kxx.t(), epsilon = 1e-12);
                    assert_abs_diff_eq!(kxx.diag().to_owned(), k.diag(&x.view()), epsilon = 1e-12);
                    let kxz = k.value(&x.view(), &x.slice(ndarray::s![..2, ..]));
                    assert_eq!(kxz.dim(), (6, 2));
                }

                #[test]
                fn [<test_ $kernel:snake _gradients>]() {
                    let k: Box<dyn Kernel> = Box::new($ctor);
                    let x = sample_points(5, 2, 43);
                    check_gradients(k.as_ref(), &x, 1e-6);
                }
            }
        };
    }

    test_kernel!(Rbf, Rbf::new(1.5, 0.7).unwrap());
    test_kernel!(RbfArd, Rbf::ard(0.8, &[0.5, 2.]).unwrap());
    test_kernel!(Exponential, Exponential::ard(1.2, &[0.9, 0.4]).unwrap());
    test_kernel!(Matern32, Matern32::new(2., 0.6).unwrap());
    test_kernel!(Matern52, Matern52::ard(0.7, &[0.3, 1.1]).unwrap());
    test_kernel!(RatQuad, RatQuad::new(1.3, 0.8, 2.5).unwrap());
    test_kernel!(StdPeriodic, StdPeriodic::new(1.1, 0.9, 1.7).unwrap());
    test_kernel!(StdPeriodicArd, StdPeriodic::ard(1.1, 1.7, &[0.6, 1.4]).unwrap());
    test_kernel!(Linear, Linear::new(0.6).unwrap());
    test_kernel!(Polynomial, Polynomial::new(0.9, 1.2, 0.3, 3).unwrap());
    test_kernel!(White, White::new(0.2).unwrap());
    test_kernel!(Bias, Bias::new(0.4).unwrap());
    test_kernel!(
        SumRbfLinear,
        Sum::new(vec![
            Box::new(Rbf::new(1.5, 0.7).unwrap()),
            Box::new(Linear::new(0.6).unwrap())
        ])
    );
    test_kernel!(
        ProductRbfPeriodic,
        Product::new(vec![
            Box::new(Rbf::new(1.5, 0.7).unwrap()),
            Box::new(StdPeriodic::new(1.1, 0.9, 1.7).unwrap()),
            Box::new(Matern32::new(0.5, 1.3).unwrap())
        ])
    );
    test_kernel!(
        MaskedMatern52,
        Masked::new(Matern52::new(0.7, 0.4).unwrap(), vec![1]).unwrap()
    );

    #[test]
    fn test_sum_and_product_are_elementwise() {
        let x = sample_points(7, 2, 44);
        let z = sample_points(4, 2, 45);
        let k1: Box<dyn Kernel> = Box::new(Rbf::new(1.3, 0.5).unwrap());
        let k2: Box<dyn Kernel> = Box::new(Polynomial::new(0.4, 1., 1., 2).unwrap());
        let k3: Box<dyn Kernel> = Box::new(StdPeriodic::new(0.8, 0.7, 1.2).unwrap());
        let v1 = k1.value(&x.view(), &z.view());
        let v2 = k2.value(&x.view(), &z.view());
        let v3 = k3.value(&x.view(), &z.view());

        let sum = k1.clone() + k2.clone() + k3.clone();
        assert_abs_diff_eq!(
            sum.value(&x.view(), &z.view()),
            &v1 + &v2 + &v3,
            epsilon = 1e-12
        );
        let prod = k1 * k2 * k3;
        assert_abs_diff_eq!(
            prod.value(&x.view(), &z.view()),
            &v1 * &v2 * &v3,
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_masked_selects_columns() {
        let x = sample_points(5, 3, 46);
        let masked = Masked::new(Rbf::ard(1., &[0.5, 0.8]).unwrap(), vec![2, 0]).unwrap();
        let xs = x.select(Axis(1), &[2, 0]);
        let inner = Rbf::ard(1., &[0.5, 0.8]).unwrap();
        assert_abs_diff_eq!(
            masked.value(&x.view(), &x.view()),
            inner.value(&xs.view(), &xs.view()),
            epsilon = 1e-14
        );
        assert!(masked.check_input_dim(3).is_ok());
        assert!(matches!(
            masked.check_input_dim(2),
            Err(GpError::DimensionMismatch(_))
        ));
    }

    #[test]
    fn test_masked_dimension_mismatch() {
        let res = Masked::new(Rbf::ard(1., &[0.5, 0.8]).unwrap(), vec![0]);
        assert!(matches!(res, Err(GpError::DimensionMismatch(_))));
        let res = Masked::new(Rbf::default(), vec![]);
        assert!(matches!(res, Err(GpError::DimensionMismatch(_))));
    }

    #[test]
    fn test_ard_input_dim() {
        let k = Matern32::ard(1., &[0.1, 0.2, 0.3]).unwrap();
        assert_eq!(k.input_dim(), Some(3));
        assert!(matches!(
            k.check_input_dim(2),
            Err(GpError::DimensionMismatch(_))
        ));
        assert!(Matern32::default().check_input_dim(7).is_ok());
    }

    #[test]
    fn test_invalid_construction() {
        assert!(matches!(
            Rbf::new(-1., 1.),
            Err(GpError::InvalidParameter(_))
        ));
        assert!(matches!(
            StdPeriodic::new(1., 1., 0.),
            Err(GpError::InvalidParameter(_))
        ));
        assert!(matches!(
            Rbf::ard(1., &[]),
            Err(GpError::InvalidParameter(_))
        ));
        assert!(matches!(
            Polynomial::new(1., 1., 0., 0),
            Err(GpError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_qualified_names() {
        let k = Rbf::default().boxed() + Rbf::ard(1., &[1., 2.]).unwrap().boxed();
        let names: Vec<String> = kernel_hyperparameters(k.as_ref(), &k.name())
            .into_iter()
            .map(|h| h.name)
            .collect();
        assert_eq!(
            names,
            vec![
                "sum.rbf.variance",
                "sum.rbf.lengthscale",
                "sum.rbf_1.variance",
                "sum.rbf_1.lengthscale[0]",
                "sum.rbf_1.lengthscale[1]",
            ]
        );
    }

    #[test]
    fn test_white_only_on_identical_inputs() {
        let k = White::new(0.3).unwrap();
        let x = array![[0.], [1.]];
        let z = array![[0.], [0.5]];
        assert_abs_diff_eq!(
            k.value(&x.view(), &z.view()),
            array![[0.3, 0.], [0., 0.]],
            epsilon = 0.
        );
    }
}
