//! Stationary kernels k(x, x') = variance * g(r) where
//! r = sqrt(sum_j ((x_j - x'_j) / l_j)^2) is the lengthscale-scaled distance.

use super::{lengthscale_names, lengthscales, positive, Kernel};
use crate::errors::Result;
use crate::hyperparameters::Param;
use crate::utils::{scaled_sq_distances, sq_differences};
use ndarray::{Array1, Array2, ArrayView2, Zip};
#[cfg(feature = "serializable")]
use serde::{Deserialize, Serialize};
use std::fmt;

/// Variance and lengthscale(s) shared by stationary kernels
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serializable", derive(Serialize, Deserialize))]
pub struct StationaryParams {
    pub(crate) variance: Param,
    pub(crate) lengthscale: Vec<Param>,
}

impl StationaryParams {
    pub(crate) fn new(variance: f64, lengthscale: &[f64]) -> Result<Self> {
        Ok(StationaryParams {
            variance: positive("variance", variance)?,
            lengthscale: lengthscales(lengthscale)?,
        })
    }

    /// Kernel variance
    pub fn variance(&self) -> f64 {
        self.variance.value()
    }

    /// Lengthscale values, one per input dimension when ARD
    pub fn lengthscales(&self) -> Vec<f64> {
        self.lengthscale.iter().map(|p| p.value()).collect()
    }

    pub(crate) fn input_dim(&self) -> Option<usize> {
        match self.lengthscale.len() {
            1 => None,
            n => Some(n),
        }
    }

    pub(crate) fn r2(&self, x: &ArrayView2<f64>, z: &ArrayView2<f64>) -> Array2<f64> {
        scaled_sq_distances(x, z, &self.lengthscales())
    }

    pub(crate) fn params(&self) -> Vec<(String, &Param)> {
        let mut params = vec![("variance".to_string(), &self.variance)];
        params.extend(
            lengthscale_names(self.lengthscale.len())
                .into_iter()
                .zip(self.lengthscale.iter()),
        );
        params
    }

    pub(crate) fn params_mut(&mut self) -> Vec<&mut Param> {
        let mut params = vec![&mut self.variance];
        params.extend(self.lengthscale.iter_mut());
        params
    }

    /// Derivatives of r^2 wrt each lengthscale: -2 * D_j / l_j^3 where D_j is the
    /// squared difference matrix of the dimensions governed by l_j
    pub(crate) fn r2_gradients(&self, x: &ArrayView2<f64>) -> Vec<Array2<f64>> {
        let ls = self.lengthscales();
        if ls.len() == 1 {
            let l = ls[0];
            let mut d2 = Array2::zeros((x.nrows(), x.nrows()));
            for j in 0..x.ncols() {
                d2 += &sq_differences(x, x, j);
            }
            vec![d2.mapv(|v| -2. * v / (l * l * l))]
        } else {
            ls.iter()
                .enumerate()
                .map(|(j, l)| sq_differences(x, x, j).mapv(|v| -2. * v / (l * l * l)))
                .collect()
        }
    }

    /// Value and gradients given the profile g(r^2) and its derivative dg/d(r^2)
    pub(crate) fn gradients(
        &self,
        x: &ArrayView2<f64>,
        g: impl Fn(f64) -> f64,
        dg_dr2: impl Fn(f64) -> f64,
    ) -> Vec<Array2<f64>> {
        let r2 = self.r2(x, x);
        let sigma2 = self.variance();
        let dk_dr2 = r2.mapv(|v| sigma2 * dg_dr2(v));
        let mut grads = vec![r2.mapv(g)];
        grads.extend(self.r2_gradients(x).into_iter().map(|mut dr2| {
            Zip::from(&mut dr2).and(&dk_dr2).for_each(|d, &k| {
                // dr2 vanishes on coincident points where dk_dr2 may be singular
                *d = if *d == 0. { 0. } else { *d * k }
            });
            dr2
        }));
        grads
    }
}

impl fmt::Display for StationaryParams {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "variance={}, lengthscale={:?}",
            self.variance(),
            self.lengthscales()
        )
    }
}

macro_rules! stationary_kernel {
    (
        $(#[$doc:meta])*
        $kernel:ident, $name:literal,
        |$r2:ident| $g:expr,
        |$s2:ident| $dg:expr
    ) => {
        $(#[$doc])*
        #[derive(Clone, Debug, PartialEq)]
        #[cfg_attr(feature = "serializable", derive(Serialize, Deserialize))]
        pub struct $kernel {
            params: StationaryParams,
        }

        impl $kernel {
            /// Isotropic kernel with given variance and a single lengthscale
            pub fn new(variance: f64, lengthscale: f64) -> Result<Self> {
                Ok($kernel {
                    params: StationaryParams::new(variance, &[lengthscale])?,
                })
            }

            /// Kernel with one lengthscale per input dimension
            pub fn ard(variance: f64, lengthscales: &[f64]) -> Result<Self> {
                Ok($kernel {
                    params: StationaryParams::new(variance, lengthscales)?,
                })
            }

            /// Variance and lengthscales
            pub fn stationary_params(&self) -> &StationaryParams {
                &self.params
            }

            fn profile($r2: f64) -> f64 {
                $g
            }

            fn profile_derivative($s2: f64) -> f64 {
                $dg
            }
        }

        impl Default for $kernel {
            fn default() -> Self {
                $kernel {
                    params: StationaryParams {
                        variance: Param::default(),
                        lengthscale: vec![Param::default()],
                    },
                }
            }
        }

        impl fmt::Display for $kernel {
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                write!(f, "{}({})", $name, self.params)
            }
        }

        #[cfg_attr(feature = "serializable", typetag::serde)]
        impl Kernel for $kernel {
            fn name(&self) -> String {
                $name.to_string()
            }

            fn input_dim(&self) -> Option<usize> {
                self.params.input_dim()
            }

            fn value(&self, x: &ArrayView2<f64>, z: &ArrayView2<f64>) -> Array2<f64> {
                let sigma2 = self.params.variance();
                self.params
                    .r2(x, z)
                    .mapv(|v| sigma2 * Self::profile(v))
            }

            fn diag(&self, x: &ArrayView2<f64>) -> Array1<f64> {
                Array1::from_elem(x.nrows(), self.params.variance() * Self::profile(0.))
            }

            fn params(&self) -> Vec<(String, &Param)> {
                self.params.params()
            }

            fn params_mut(&mut self) -> Vec<&mut Param> {
                self.params.params_mut()
            }

            fn gradients(&self, x: &ArrayView2<f64>) -> Vec<Array2<f64>> {
                self.params
                    .gradients(x, Self::profile, Self::profile_derivative)
            }

            fn box_clone(&self) -> Box<dyn Kernel> {
                Box::new(self.clone())
            }
        }
    };
}

const SQRT_3: f64 = 1.732_050_807_568_877_2;
const SQRT_5: f64 = 2.236_067_977_499_79;

stationary_kernel!(
    /// Squared exponential (RBF) kernel: variance * exp(-r^2 / 2)
    Rbf, "rbf",
    |r2| (-0.5 * r2).exp(),
    |r2| -0.5 * (-0.5 * r2).exp()
);

stationary_kernel!(
    /// Exponential (Matern 1/2) kernel: variance * exp(-r)
    Exponential, "exponential",
    |r2| (-r2.sqrt()).exp(),
    |r2| {
        let r = r2.sqrt();
        if r > 0. {
            -0.5 * (-r).exp() / r
        } else {
            f64::NEG_INFINITY
        }
    }
);

stationary_kernel!(
    /// Matern 3/2 kernel: variance * (1 + sqrt(3) r) exp(-sqrt(3) r)
    Matern32, "matern32",
    |r2| {
        let a = SQRT_3 * r2.sqrt();
        (1. + a) * (-a).exp()
    },
    |r2| -1.5 * (-SQRT_3 * r2.sqrt()).exp()
);

stationary_kernel!(
    /// Matern 5/2 kernel: variance * (1 + sqrt(5) r + 5 r^2 / 3) exp(-sqrt(5) r)
    Matern52, "matern52",
    |r2| {
        let a = SQRT_5 * r2.sqrt();
        (1. + a + 5. * r2 / 3.) * (-a).exp()
    },
    |r2| {
        let a = SQRT_5 * r2.sqrt();
        -5. / 6. * (1. + a) * (-a).exp()
    }
);

/// Rational quadratic kernel: variance * (1 + r^2 / (2 alpha))^(-alpha)
///
/// Equivalent to a scale mixture of RBF kernels, `alpha` controlling the mixture weights.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serializable", derive(Serialize, Deserialize))]
pub struct RatQuad {
    params: StationaryParams,
    power: Param,
}

impl RatQuad {
    /// Isotropic kernel with given variance, lengthscale and power `alpha`
    pub fn new(variance: f64, lengthscale: f64, power: f64) -> Result<Self> {
        Self::ard(variance, &[lengthscale], power)
    }

    /// Kernel with one lengthscale per input dimension
    pub fn ard(variance: f64, lengthscales: &[f64], power: f64) -> Result<Self> {
        Ok(RatQuad {
            params: StationaryParams::new(variance, lengthscales)?,
            power: positive("power", power)?,
        })
    }

    /// Variance and lengthscales
    pub fn stationary_params(&self) -> &StationaryParams {
        &self.params
    }

    /// Power `alpha`
    pub fn power(&self) -> f64 {
        self.power.value()
    }
}

impl Default for RatQuad {
    fn default() -> Self {
        RatQuad {
            params: StationaryParams {
                variance: Param::default(),
                lengthscale: vec![Param::default()],
            },
            power: Param::default(),
        }
    }
}

impl fmt::Display for RatQuad {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "ratquad({}, power={})", self.params, self.power())
    }
}

#[cfg_attr(feature = "serializable", typetag::serde)]
impl Kernel for RatQuad {
    fn name(&self) -> String {
        "ratquad".to_string()
    }

    fn input_dim(&self) -> Option<usize> {
        self.params.input_dim()
    }

    fn value(&self, x: &ArrayView2<f64>, z: &ArrayView2<f64>) -> Array2<f64> {
        let sigma2 = self.params.variance();
        let alpha = self.power();
        self.params
            .r2(x, z)
            .mapv(|v| sigma2 * (1. + v / (2. * alpha)).powf(-alpha))
    }

    fn diag(&self, x: &ArrayView2<f64>) -> Array1<f64> {
        Array1::from_elem(x.nrows(), self.params.variance())
    }

    fn params(&self) -> Vec<(String, &Param)> {
        let mut params = self.params.params();
        params.push(("power".to_string(), &self.power));
        params
    }

    fn params_mut(&mut self) -> Vec<&mut Param> {
        let mut params = self.params.params_mut();
        params.push(&mut self.power);
        params
    }

    fn gradients(&self, x: &ArrayView2<f64>) -> Vec<Array2<f64>> {
        let alpha = self.power();
        let mut grads = self.params.gradients(
            x,
            |r2| (1. + r2 / (2. * alpha)).powf(-alpha),
            |r2| -0.5 * (1. + r2 / (2. * alpha)).powf(-alpha - 1.),
        );
        let sigma2 = self.params.variance();
        let dalpha = self.params.r2(x, x).mapv(|r2| {
            let u = r2 / (2. * alpha);
            sigma2 * (1. + u).powf(-alpha) * (u / (1. + u) - u.ln_1p())
        });
        grads.push(dalpha);
        grads
    }

    fn box_clone(&self) -> Box<dyn Kernel> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn test_profiles_at_known_distances() {
        let x = array![[0.], [1.]];
        let x = x.view();
        let rbf = Rbf::new(2., 0.5).unwrap().value(&x, &x);
        assert_abs_diff_eq!(rbf[[0, 1]], 2. * (-2f64).exp(), epsilon = 1e-12);
        let exp = Exponential::new(1., 2.).unwrap().value(&x, &x);
        assert_abs_diff_eq!(exp[[0, 1]], (-0.5f64).exp(), epsilon = 1e-12);
        let m32 = Matern32::new(1., 1.).unwrap().value(&x, &x);
        assert_abs_diff_eq!(
            m32[[0, 1]],
            (1. + SQRT_3) * (-SQRT_3).exp(),
            epsilon = 1e-12
        );
        let m52 = Matern52::new(1., 1.).unwrap().value(&x, &x);
        assert_abs_diff_eq!(
            m52[[0, 1]],
            (1. + SQRT_5 + 5. / 3.) * (-SQRT_5).exp(),
            epsilon = 1e-12
        );
        let rq = RatQuad::new(1., 1., 2.).unwrap().value(&x, &x);
        assert_abs_diff_eq!(rq[[0, 1]], 1.25f64.powf(-2.), epsilon = 1e-12);
        assert_abs_diff_eq!(rq[[1, 1]], 1., epsilon = 1e-12);
    }

    #[test]
    fn test_ratquad_tends_to_rbf() {
        let x = array![[0.], [0.3], [1.2]];
        let x = x.view();
        let rq = RatQuad::new(1., 0.4, 1e6).unwrap().value(&x, &x);
        let rbf = Rbf::new(1., 0.4).unwrap().value(&x, &x);
        assert_abs_diff_eq!(rq, rbf, epsilon = 1e-5);
    }

    #[test]
    fn test_exponential_gradient_on_duplicates() {
        let x = array![[0.5], [0.5], [1.]];
        let grads = Exponential::new(1., 0.3).unwrap().gradients(&x.view());
        assert!(grads[1].iter().all(|v| v.is_finite()));
        assert_abs_diff_eq!(grads[1][[0, 1]], 0.);
    }
}
