//! Binary classification likelihoods `p(y | f)` for labels `y` in {-1, +1}.

use crate::utils::{inv_mills_ratio, log_norm_cdf, norm_cdf};
use std::f64::consts::PI;
use std::fmt;

#[cfg(feature = "serializable")]
use serde::{Deserialize, Serialize};

/// Sigmoid link squashing the latent function into a class probability
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serializable", derive(Serialize, Deserialize))]
pub enum Link {
    /// `p(y | f) = 1 / (1 + exp(-y f))`
    #[default]
    Logistic,
    /// `p(y | f) = Phi(y f)`
    Probit,
}

impl fmt::Display for Link {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Link::Logistic => write!(f, "logistic"),
            Link::Probit => write!(f, "probit"),
        }
    }
}

fn sigmoid(f: f64) -> f64 {
    if f >= 0. {
        1. / (1. + (-f).exp())
    } else {
        let e = f.exp();
        e / (1. + e)
    }
}

impl Link {
    /// `log p(y | f)`
    pub fn log_likelihood(&self, y: f64, f: f64) -> f64 {
        let z = y * f;
        match self {
            // -log(1 + exp(-z))
            Link::Logistic => -((-z).max(0.) + (-z.abs()).exp().ln_1p()),
            Link::Probit => log_norm_cdf(z),
        }
    }

    /// First derivative of `log p(y | f)` wrt `f`
    pub fn gradient(&self, y: f64, f: f64) -> f64 {
        match self {
            Link::Logistic => 0.5 * (y + 1.) - sigmoid(f),
            Link::Probit => y * inv_mills_ratio(y * f),
        }
    }

    /// Negative second derivative of `log p(y | f)` wrt `f`, always positive
    pub fn neg_hessian(&self, y: f64, f: f64) -> f64 {
        match self {
            Link::Logistic => {
                let p = sigmoid(f);
                p * (1. - p)
            }
            Link::Probit => {
                let z = y * f;
                let r = inv_mills_ratio(z);
                r * (r + z)
            }
        }
    }

    /// Third derivative of `log p(y | f)` wrt `f`
    pub fn third_derivative(&self, y: f64, f: f64) -> f64 {
        match self {
            Link::Logistic => {
                let p = sigmoid(f);
                -p * (1. - p) * (1. - 2. * p)
            }
            Link::Probit => {
                let z = y * f;
                let r = inv_mills_ratio(z);
                y * r * ((z + r) * (z + 2. * r) - 1.)
            }
        }
    }

    /// Probability of the positive class given a Gaussian latent `f ~ N(mean, var)`.
    ///
    /// Exact for probit, uses the probit approximation of the logistic otherwise.
    pub fn predictive_probability(&self, mean: f64, var: f64) -> f64 {
        match self {
            Link::Logistic => sigmoid(mean / (1. + PI * var / 8.).sqrt()),
            Link::Probit => norm_cdf(mean / (1. + var).sqrt()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn check_derivatives(link: Link) {
        let h = 1e-5;
        for y in [-1., 1.] {
            for f in [-3., -0.7, 0., 0.4, 2.5] {
                let d1 = (link.log_likelihood(y, f + h) - link.log_likelihood(y, f - h)) / (2. * h);
                assert_abs_diff_eq!(link.gradient(y, f), d1, epsilon = 1e-6);
                let d2 = (link.gradient(y, f + h) - link.gradient(y, f - h)) / (2. * h);
                assert_abs_diff_eq!(link.neg_hessian(y, f), -d2, epsilon = 1e-6);
                let d3 =
                    (link.neg_hessian(y, f + h) - link.neg_hessian(y, f - h)) / (2. * h);
                assert_abs_diff_eq!(link.third_derivative(y, f), -d3, epsilon = 1e-6);
            }
        }
    }

    #[test]
    fn test_logistic_derivatives() {
        check_derivatives(Link::Logistic)
    }

    #[test]
    fn test_probit_derivatives() {
        check_derivatives(Link::Probit)
    }

    #[test]
    fn test_log_likelihood_values() {
        assert_abs_diff_eq!(
            Link::Logistic.log_likelihood(1., 0.),
            0.5f64.ln(),
            epsilon = 1e-15
        );
        assert_abs_diff_eq!(
            Link::Probit.log_likelihood(-1., 0.),
            0.5f64.ln(),
            epsilon = 1e-15
        );
        // no overflow for large margins
        assert!(Link::Logistic.log_likelihood(-1., 800.).is_finite());
        assert!(Link::Probit.log_likelihood(-1., 60.).is_finite());
    }

    #[test]
    fn test_predictive_probability() {
        for link in [Link::Logistic, Link::Probit] {
            assert_abs_diff_eq!(link.predictive_probability(0., 3.), 0.5, epsilon = 1e-15);
            let p = link.predictive_probability(1.5, 0.);
            let q = link.predictive_probability(1.5, 10.);
            // uncertainty moderates the probability towards 1/2
            assert!(p > q && q > 0.5);
            assert_abs_diff_eq!(
                link.predictive_probability(-1.5, 2.),
                1. - link.predictive_probability(1.5, 2.),
                epsilon = 1e-12
            );
        }
    }
}
