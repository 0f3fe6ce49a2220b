use crate::algorithm::{check_query, check_training_data, kernel_with_values};
use crate::classifier_parameters::{GpcParams, GpcValidParams, LaplaceConfig};
use crate::covariance::{covariance_matrix, stable_cholesky, JitterPolicy};
use crate::errors::{GpError, Result};
use crate::hyperparameters::{position, Hyperparameter};
use crate::kernels::{kernel_hyperparameters, Kernel};
use crate::likelihoods::Link;
use crate::linalg::CholeskyFactor;
use crate::optimization::{optimize_hyperparameters, Evidence, OptimizationReport, OptimizerConfig};

use linfa::prelude::{DatasetBase, Fit, PredictInplace};
use ndarray::{Array1, Array2, ArrayBase, Axis, Data, Ix1, Ix2, Zip};
use ndarray_stats::QuantileExt;

use log::{debug, warn};
#[cfg(feature = "serializable")]
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Instant;

/// Maximum number of step halvings within one Newton iteration
const MAX_HALVINGS: usize = 20;

/// Laplace approximation of the latent posterior at its mode
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serializable", derive(Serialize, Deserialize))]
pub(crate) struct LaplaceState {
    /// Posterior mode of the latent function at training points
    pub(crate) f: Array1<f64>,
    /// `K^-1 f`
    pub(crate) a: Array1<f64>,
    /// Gradient of the log likelihood at the mode
    pub(crate) dlp: Array1<f64>,
    /// Square root of the negative log likelihood hessian at the mode
    pub(crate) sqrt_w: Array1<f64>,
    /// Cholesky factor of `B = I + W^1/2 K W^1/2`
    pub(crate) chol: CholeskyFactor,
    /// Approximate log marginal likelihood
    pub(crate) lml: f64,
    /// Number of Newton iterations
    pub(crate) n_iter: usize,
    /// Whether the latent update fell below tolerance within `max_iter` iterations
    pub(crate) converged: bool,
}

fn log_likelihood(link: Link, y: &Array1<f64>, f: &Array1<f64>) -> f64 {
    Zip::from(y)
        .and(f)
        .fold(0., |acc, &y, &f| acc + link.log_likelihood(y, f))
}

fn pointwise(link: Link, y: &Array1<f64>, f: &Array1<f64>, g: fn(&Link, f64, f64) -> f64) -> Array1<f64> {
    Zip::from(y).and(f).map_collect(|&y, &f| g(&link, y, f))
}

fn max_abs(v: &Array1<f64>) -> Result<f64> {
    v.mapv(f64::abs)
        .max()
        .copied()
        .map_err(|err| GpError::NumericalInstability(format!("Laplace iteration: {err}")))
}

/// `B = I + W^1/2 K W^1/2` factorization
fn factorize_b(k: &Array2<f64>, sqrt_w: &Array1<f64>, jitter: &JitterPolicy) -> Result<CholeskyFactor> {
    let sw = sqrt_w.view().insert_axis(Axis(1));
    let mut b = &sw * k * &sw.t();
    b.diag_mut().mapv_inplace(|v| v + 1.);
    let (chol, _) = stable_cholesky(&b, jitter)?;
    Ok(chol)
}

impl LaplaceState {
    /// Newton iterations on `psi(f) = log p(y | f) - 1/2 f^T K^-1 f`
    /// with step halving whenever `psi` decreases, until the relative
    /// latent update `max|df| / (1 + max|f|)` falls below tolerance
    fn compute(
        k: &Array2<f64>,
        link: Link,
        jitter: &JitterPolicy,
        laplace: &LaplaceConfig,
        y: &Array1<f64>,
    ) -> Result<Self> {
        let n = y.len();
        let mut a = Array1::<f64>::zeros(n);
        let mut f = Array1::<f64>::zeros(n);
        let mut psi = log_likelihood(link, y, &f);

        let mut best = (a.clone(), f.clone(), psi);

        let mut n_iter = 0;
        let mut converged = false;
        while n_iter < laplace.max_iter {
            n_iter += 1;
            let sqrt_w = pointwise(link, y, &f, Link::neg_hessian).mapv(f64::sqrt);
            let chol = factorize_b(k, &sqrt_w, jitter)?;
            let b = &sqrt_w * &sqrt_w * &f + pointwise(link, y, &f, Link::gradient);
            let c = chol.solve_vec(&(&sqrt_w * &k.dot(&b)))?;
            let da = &b - &(&sqrt_w * &c) - &a;

            let mut step = 1.;
            let mut halvings = 0;
            let (a_new, f_new, psi_new) = loop {
                let a_try = &a + &(&da * step);
                let f_try = k.dot(&a_try);
                let psi_try = -0.5 * a_try.dot(&f_try) + log_likelihood(link, y, &f_try);
                if (psi_try.is_finite() && psi_try >= psi) || halvings == MAX_HALVINGS {
                    break (a_try, f_try, psi_try);
                }
                step *= 0.5;
                halvings += 1;
            };
            if halvings > 0 {
                debug!("Laplace iteration {n_iter}: step halved {halvings} times");
            }
            if !psi_new.is_finite() {
                warn!("Laplace iteration {n_iter}: non finite objective, stop at best iterate");
                break;
            }
            let df = max_abs(&(&f_new - &f))?;
            let scale = 1. + max_abs(&f_new)?;
            a = a_new;
            f = f_new;
            psi = psi_new;
            if psi >= best.2 {
                best = (a.clone(), f.clone(), psi);
            }
            if df / scale < laplace.tol {
                converged = true;
                break;
            }
        }
        let (a, f) = if converged {
            (a, f)
        } else {
            warn!(
                "Laplace mode search did not converge after {n_iter} iterations (objective = {})",
                best.2
            );
            (best.0, best.1)
        };

        let sqrt_w = pointwise(link, y, &f, Link::neg_hessian).mapv(f64::sqrt);
        let chol = factorize_b(k, &sqrt_w, jitter)?;
        let dlp = pointwise(link, y, &f, Link::gradient);
        let lml = -0.5 * a.dot(&f) + log_likelihood(link, y, &f) - chol.half_log_det();
        Ok(LaplaceState {
            f,
            a,
            dlp,
            sqrt_w,
            chol,
            lml,
            n_iter,
            converged,
        })
    }

    /// Gradient of the approximate log marginal likelihood wrt kernel hyperparameters,
    /// accounting for the implicit dependency of the mode
    fn lml_gradient(
        &self,
        kernel: &dyn Kernel,
        k: &Array2<f64>,
        link: Link,
        x: &Array2<f64>,
        y: &Array1<f64>,
    ) -> Result<Array1<f64>> {
        let sw = self.sqrt_w.view().insert_axis(Axis(1));
        // R = W^1/2 B^-1 W^1/2
        let r = &sw * &self.chol.solve(&Array2::from_diag(&self.sqrt_w))?;
        let c = self.chol.solve_lower(&(&sw * k))?;
        let third = pointwise(link, y, &self.f, Link::third_derivative);
        // d log q / d f = 1/2 diag((K^-1 + W)^-1) d3 log p(y|f)
        let s2 = (k.diag().to_owned() - c.mapv(|v| v * v).sum_axis(Axis(0))) * third * 0.5;

        let grad = kernel
            .gradients(&x.view())
            .iter()
            .map(|dk| {
                let s1 = 0.5 * self.a.dot(&dk.dot(&self.a))
                    - 0.5 * Zip::from(&r).and(&dk.t()).fold(0., |acc, &r, &d| acc + r * d);
                let b = dk.dot(&self.dlp);
                let s3 = &b - &k.dot(&r.dot(&b));
                s1 + s2.dot(&s3)
            })
            .collect();
        Ok(grad)
    }
}

/// Binary GP classifier using the Laplace approximation of the latent posterior.
///
/// Labels are `-1` and `+1`, the latent function has a zero mean GP prior with
/// covariance given by a [`Kernel`] and is squashed by a [`Link`] function.
/// Hyperparameters are the kernel ones and are fitted by maximizing the
/// approximate log marginal likelihood.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serializable", derive(Serialize, Deserialize))]
pub struct GaussianProcessClassifier {
    kernel: Box<dyn Kernel>,
    link: Link,
    eps: f64,
    jitter: JitterPolicy,
    laplace: LaplaceConfig,
    pub(crate) training_data: (Array2<f64>, Array1<f64>),
    posterior: LaplaceState,
}

impl fmt::Display for GaussianProcessClassifier {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "GPC(kernel={}, link={}, likelihood={})",
            self.kernel, self.link, self.posterior.lml
        )
    }
}

fn check_labels(y: &ArrayBase<impl Data<Elem = f64>, Ix1>) -> Result<()> {
    if let Some(bad) = y.iter().find(|&&v| v != 1. && v != -1.) {
        return Err(GpError::InvalidValueError(format!(
            "class labels should be -1 or 1, got {bad}"
        )));
    }
    Ok(())
}

impl GaussianProcessClassifier {
    /// Gp classifier parameters contructor
    pub fn params(kernel: Box<dyn Kernel>) -> GpcParams {
        GpcParams::new(kernel)
    }

    fn laplace_state(&self, kernel: &dyn Kernel) -> Result<(Array2<f64>, LaplaceState)> {
        let (x, y) = &self.training_data;
        self.laplace_state_on(kernel, x, y)
    }

    fn laplace_state_on(
        &self,
        kernel: &dyn Kernel,
        x: &Array2<f64>,
        y: &Array1<f64>,
    ) -> Result<(Array2<f64>, LaplaceState)> {
        let k = covariance_matrix(kernel, x, self.eps);
        let state = LaplaceState::compute(&k, self.link, &self.jitter, &self.laplace, y)?;
        Ok((k, state))
    }

    /// Mean and variance of the approximate latent posterior at `x` points
    pub fn predict_latent(
        &self,
        x: &ArrayBase<impl Data<Elem = f64>, Ix2>,
    ) -> Result<(Array1<f64>, Array1<f64>)> {
        check_query(&self.training_data.0, x)?;
        let ks = self.kernel.value(&x.view(), &self.training_data.0.view());
        let mean = ks.dot(&self.posterior.dlp);
        let sw = self.posterior.sqrt_w.view().insert_axis(Axis(1));
        let v = self.posterior.chol.solve_lower(&(&sw * &ks.t()))?;
        let var = self.kernel.diag(&x.view()) - v.mapv(|v| v * v).sum_axis(Axis(0));
        Ok((mean, var.mapv(|v| v.max(0.))))
    }

    /// Probability of the positive class at `x` points
    pub fn predict_proba(&self, x: &ArrayBase<impl Data<Elem = f64>, Ix2>) -> Result<Array1<f64>> {
        let (mean, var) = self.predict_latent(x)?;
        Ok(Zip::from(&mean)
            .and(&var)
            .map_collect(|&m, &v| self.link.predictive_probability(m, v)))
    }

    /// Most probable labels (-1 or 1) at `x` points
    pub fn predict_labels(&self, x: &ArrayBase<impl Data<Elem = f64>, Ix2>) -> Result<Array1<f64>> {
        Ok(self
            .predict_proba(x)?
            .mapv(|p| if p >= 0.5 { 1. } else { -1. }))
    }

    /// Approximate log marginal likelihood of the training labels
    pub fn log_marginal_likelihood(&self) -> f64 {
        self.posterior.lml
    }

    /// Gradient of the approximate log marginal likelihood wrt hyperparameters
    /// ordered as [`GaussianProcessClassifier::hyperparameters`]
    pub fn log_marginal_likelihood_gradient(&self) -> Result<Array1<f64>> {
        let (x, y) = &self.training_data;
        let k = covariance_matrix(self.kernel.as_ref(), x, self.eps);
        self.posterior
            .lml_gradient(self.kernel.as_ref(), &k, self.link, x, y)
    }

    /// Posterior mode of the latent function at training points
    pub fn latent_mode(&self) -> &Array1<f64> {
        &self.posterior.f
    }

    /// Number of Newton iterations used to find the posterior mode
    pub fn n_iter(&self) -> usize {
        self.posterior.n_iter
    }

    /// Whether the Newton iterations reached the posterior mode within `max_iter`,
    /// otherwise the posterior is built on the best iterate found
    pub fn laplace_converged(&self) -> bool {
        self.posterior.converged
    }

    /// Kernel hyperparameters qualified by the kernel name
    pub fn hyperparameters(&self) -> Vec<Hyperparameter> {
        kernel_hyperparameters(self.kernel.as_ref(), &self.kernel.name())
    }

    /// Set a hyperparameter value by name and update the posterior.
    ///
    /// The model is left unchanged on error.
    pub fn set_hyperparameter(&mut self, name: &str, value: f64) -> Result<()> {
        let hypers = self.hyperparameters();
        let idx = position(&hypers, name)?;
        let mut values: Vec<f64> = hypers.iter().map(|h| h.value).collect();
        values[idx] = value;
        self.set_hyperparameters(&values)
    }

    /// Set all hyperparameter values and update the posterior.
    /// The model is left unchanged on error.
    pub fn set_hyperparameters(&mut self, values: &[f64]) -> Result<()> {
        let kernel = kernel_with_values(self.kernel.as_ref(), values)?;
        let (_, posterior) = self.laplace_state(kernel.as_ref())?;
        self.kernel = kernel;
        self.posterior = posterior;
        Ok(())
    }

    /// Exclude the named hyperparameter from optimization
    pub fn fix(&mut self, name: &str) -> Result<()> {
        let idx = position(&self.hyperparameters(), name)?;
        self.kernel.params_mut().swap_remove(idx).fix();
        Ok(())
    }

    /// Include the named hyperparameter in optimization
    pub fn unfix(&mut self, name: &str) -> Result<()> {
        let idx = position(&self.hyperparameters(), name)?;
        self.kernel.params_mut().swap_remove(idx).unfix();
        Ok(())
    }

    /// Replace training data and recompute the Laplace approximation.
    /// The model is left unchanged on error.
    pub fn set_training_data(
        &mut self,
        x: &ArrayBase<impl Data<Elem = f64>, Ix2>,
        y: &ArrayBase<impl Data<Elem = f64>, Ix1>,
    ) -> Result<()> {
        check_training_data(self.kernel.as_ref(), x, y)?;
        check_labels(y)?;
        let (x, y) = (x.to_owned(), y.to_owned());
        let (_, posterior) = self.laplace_state_on(self.kernel.as_ref(), &x, &y)?;
        self.training_data = (x, y);
        self.posterior = posterior;
        Ok(())
    }

    /// Parameters reproducing this model when fitted, without optimizer
    pub fn current_params(&self) -> GpcParams {
        GpcParams::from(GpcValidParams {
            kernel: self.kernel.clone(),
            link: self.link,
            eps: self.eps,
            jitter: self.jitter,
            laplace: self.laplace,
            optimizer: None,
        })
    }

    /// Maximize the approximate log marginal likelihood wrt free hyperparameters
    pub fn optimize(&mut self, config: &OptimizerConfig) -> Result<OptimizationReport> {
        optimize_hyperparameters(self, config)
    }

    /// Covariance kernel
    pub fn kernel(&self) -> &dyn Kernel {
        self.kernel.as_ref()
    }

    /// Link function
    pub fn link(&self) -> Link {
        self.link
    }

    /// Training dataset (inputs, labels)
    pub fn training_data(&self) -> &(Array2<f64>, Array1<f64>) {
        &self.training_data
    }
}

impl Evidence for GaussianProcessClassifier {
    fn hyperparameters(&self) -> Vec<Hyperparameter> {
        GaussianProcessClassifier::hyperparameters(self)
    }

    fn evidence_at(&self, values: &[f64]) -> Result<(f64, Array1<f64>)> {
        let kernel = kernel_with_values(self.kernel.as_ref(), values)?;
        let (k, state) = self.laplace_state(kernel.as_ref())?;
        let (x, y) = &self.training_data;
        let grad = state.lml_gradient(kernel.as_ref(), &k, self.link, x, y)?;
        Ok((state.lml, grad))
    }

    fn set_hyperparameter_values(&mut self, values: &[f64]) -> Result<()> {
        self.set_hyperparameters(values)
    }
}

impl<D> PredictInplace<ArrayBase<D, Ix2>, Array1<f64>> for GaussianProcessClassifier
where
    D: Data<Elem = f64>,
{
    fn predict_inplace(&self, x: &ArrayBase<D, Ix2>, y: &mut Array1<f64>) {
        assert_eq!(
            x.nrows(),
            y.len(),
            "The number of data points must match the number of output targets."
        );

        let labels = self.predict_labels(x).expect("GPC Prediction");
        *y = labels;
    }

    fn default_target(&self, x: &ArrayBase<D, Ix2>) -> Array1<f64> {
        Array1::zeros((x.nrows(),))
    }
}

impl<D: Data<Elem = f64>> Fit<ArrayBase<D, Ix2>, ArrayBase<D, Ix1>, GpError> for GpcValidParams {
    type Object = GaussianProcessClassifier;

    /// Fit the Laplace approximation, optimizing hyperparameters when an optimizer is specified
    fn fit(
        &self,
        dataset: &DatasetBase<ArrayBase<D, Ix2>, ArrayBase<D, Ix1>>,
    ) -> Result<Self::Object> {
        let x = dataset.records();
        let y = dataset.targets();
        check_training_data(self.kernel(), x, y)?;
        check_labels(y)?;

        let (x, y) = (x.to_owned(), y.to_owned());
        let now = Instant::now();
        let k = covariance_matrix(self.kernel(), &x, self.eps());
        let posterior = LaplaceState::compute(&k, self.link(), self.jitter(), self.laplace(), &y)?;
        debug!(
            "Laplace mode search: {} iterations, converged = {}, elapsed = {:?}",
            posterior.n_iter,
            posterior.converged,
            now.elapsed().as_micros()
        );

        let mut gpc = GaussianProcessClassifier {
            kernel: self.kernel.clone(),
            link: self.link(),
            eps: self.eps(),
            jitter: *self.jitter(),
            laplace: *self.laplace(),
            training_data: (x, y),
            posterior,
        };
        if let Some(config) = self.optimizer() {
            let report = gpc.optimize(config)?;
            if !report.converged {
                warn!("GPC hyperparameters optimization did not converge");
            }
        }
        Ok(gpc)
    }
}
