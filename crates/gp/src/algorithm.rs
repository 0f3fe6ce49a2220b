use crate::covariance::{covariance_matrix, stable_cholesky, JitterPolicy};
use crate::errors::{GpError, Result};
use crate::hyperparameters::{position, Hyperparameter, Param};
use crate::kernels::{kernel_hyperparameters, Kernel};
use crate::linalg::CholeskyFactor;
use crate::optimization::{optimize_hyperparameters, Evidence, OptimizationReport, OptimizerConfig};
use crate::parameters::{GpParams, GpValidParams};

use linfa::prelude::{DatasetBase, Fit, PredictInplace};
use ndarray::{Array, Array1, Array2, ArrayBase, Axis, Data, Ix1, Ix2, Zip};
use ndarray_rand::rand::Rng;
use ndarray_rand::rand_distr::StandardNormal;
use ndarray_rand::RandomExt;

use log::debug;
#[cfg(feature = "serializable")]
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Instant;

const LN_2PI: f64 = 1.837_877_066_409_345_5;

/// Quantities computed at fit time and reused by predictions
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serializable", derive(Serialize, Deserialize))]
pub(crate) struct PosteriorState {
    /// Cholesky factor of K(X, X) + noise * I (+ jitter * I)
    pub(crate) chol: CholeskyFactor,
    /// Weights (K + noise * I)^-1 y
    pub(crate) alpha: Array1<f64>,
    /// Jitter added to get a positive definite matrix
    pub(crate) jitter: f64,
    /// Log marginal likelihood
    pub(crate) lml: f64,
}

impl PosteriorState {
    fn compute(
        kernel: &dyn Kernel,
        noise_variance: f64,
        policy: &JitterPolicy,
        x: &Array2<f64>,
        y: &Array1<f64>,
    ) -> Result<Self> {
        let k = covariance_matrix(kernel, x, noise_variance);
        let (chol, jitter) = stable_cholesky(&k, policy)?;
        let alpha = chol.solve_vec(y)?;
        let lml = -0.5 * y.dot(&alpha) - chol.half_log_det() - 0.5 * y.len() as f64 * LN_2PI;
        Ok(PosteriorState {
            chol,
            alpha,
            jitter,
            lml,
        })
    }

    /// Gradient of the log marginal likelihood wrt kernel hyperparameters followed by
    /// noise variance: 1/2 tr((alpha.alpha^T - K^-1) dK/dtheta)
    fn lml_gradient(&self, kernel: &dyn Kernel, x: &Array2<f64>) -> Result<Array1<f64>> {
        let a = self.alpha.view().insert_axis(Axis(1));
        let w = a.dot(&a.t()) - self.chol.inverse()?;
        let mut grad: Vec<f64> = kernel
            .gradients(&x.view())
            .iter()
            .map(|dk| 0.5 * Zip::from(&w).and(dk).fold(0., |acc, &w, &d| acc + w * d))
            .collect();
        grad.push(0.5 * w.diag().sum());
        Ok(Array1::from(grad))
    }
}

/// A GP regression models a latent function with a zero mean Gaussian process prior
/// governed by a covariance [`Kernel`], observed through additive Gaussian noise:
///
/// `y = f(x) + e` with `f ~ GP(0, k(x, x'))` and `e ~ Normal(0, noise_variance)`
///
/// # Implementation
///
/// * Based on [ndarray](https://github.com/rust-ndarray/ndarray)
///   and [linfa](https://github.com/rust-ml/linfa) and strive to follow [linfa guidelines](https://github.com/rust-ml/linfa/blob/master/CONTRIBUTE.md)
/// * Inference relies on the Cholesky factorization of `K + noise_variance * I`,
///   escalating a diagonal jitter when the matrix is not numerically positive definite
/// * Hyperparameters (kernel parameters and noise variance) are named, may be fixed,
///   and are fitted by maximizing the log marginal likelihood using its analytic gradient
/// * Leave-one-out predictions are available in closed form
///
/// # Features
///
/// ## serializable
///
/// The `serializable` feature enables the serialization of GP models using the [`serde crate`](https://serde.rs/).
///
/// ## persistent
///
/// The `persistent` feature enables `save()`/`load()` methods for a GP model to/from a json file.
///
/// # Example
///
/// ```no_run
/// use gpkit::{kernels::Rbf, GaussianProcess, OptimizerConfig};
/// use linfa::prelude::*;
/// use ndarray::{arr2, Array1, Array2, Axis};
///
/// fn xsinx(x: &Array2<f64>) -> Array1<f64> {
///     ((x - 3.5) * ((x - 3.5) / std::f64::consts::PI).mapv(|v| v.sin())).remove_axis(Axis(1))
/// }
///
/// let xt = arr2(&[[0.0], [5.0], [10.0], [15.0], [18.0], [20.0], [25.0]]);
/// let yt = xsinx(&xt);
///
/// let gp = GaussianProcess::params(Box::new(Rbf::new(1., 5.).unwrap()))
///     .noise_variance(1e-2)
///     .optimize(OptimizerConfig::default())
///     .fit(&Dataset::new(xt, yt))
///     .expect("GP fitted");
///
/// println!("{}", gp);
/// let xtest = arr2(&[[1.0], [2.1]]);
/// let (mean, var) = gp.predict_valvar(&xtest).expect("prediction");
/// ```
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serializable", derive(Serialize, Deserialize))]
pub struct GaussianProcess {
    /// Prior covariance kernel
    kernel: Box<dyn Kernel>,
    /// Observation noise variance
    noise: Param,
    /// Jitter escalation policy
    jitter: JitterPolicy,
    /// Training dataset (input, output)
    pub(crate) training_data: (Array2<f64>, Array1<f64>),
    /// Posterior quantities
    posterior: PosteriorState,
}

impl fmt::Display for GaussianProcess {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "GP(kernel={}, noise_variance={}, likelihood={})",
            self.kernel,
            self.noise.value(),
            self.posterior.lml,
        )
    }
}

const NOISE_VARIANCE: &str = "noise_variance";

/// Check training data consistency wrt a kernel
pub(crate) fn check_training_data(
    kernel: &dyn Kernel,
    x: &ArrayBase<impl Data<Elem = f64>, Ix2>,
    y: &ArrayBase<impl Data<Elem = f64>, Ix1>,
) -> Result<()> {
    if x.nrows() != y.len() {
        return Err(GpError::DimensionMismatch(format!(
            "number of inputs ({}) and targets ({}) differ",
            x.nrows(),
            y.len()
        )));
    }
    if x.nrows() == 0 {
        return Err(GpError::InvalidValueError(
            "training data should contain at least one point".to_string(),
        ));
    }
    if x.iter().chain(y.iter()).any(|v| !v.is_finite()) {
        return Err(GpError::InvalidValueError(
            "training data should contain finite values only".to_string(),
        ));
    }
    kernel.check_input_dim(x.ncols())
}

/// Check query points dimension against training inputs
pub(crate) fn check_query(
    xtrain: &Array2<f64>,
    x: &ArrayBase<impl Data<Elem = f64>, Ix2>,
) -> Result<()> {
    if x.ncols() != xtrain.ncols() {
        return Err(GpError::DimensionMismatch(format!(
            "query points have {} components, training inputs have {}",
            x.ncols(),
            xtrain.ncols()
        )));
    }
    Ok(())
}

/// Kernel with hyperparameter values replaced by `values` (fixed flags are kept)
pub(crate) fn kernel_with_values(kernel: &dyn Kernel, values: &[f64]) -> Result<Box<dyn Kernel>> {
    let mut kernel = kernel.box_clone();
    let params = kernel.params_mut();
    if params.len() != values.len() {
        return Err(GpError::DimensionMismatch(format!(
            "expected {} kernel hyperparameter values, got {}",
            params.len(),
            values.len()
        )));
    }
    for (p, &v) in params.into_iter().zip(values) {
        p.set_value(v)?;
    }
    Ok(kernel)
}

impl GaussianProcess {
    /// Gp parameters contructor
    pub fn params(kernel: Box<dyn Kernel>) -> GpParams {
        GpParams::new(kernel)
    }

    /// Predict output values at n given `x` points of nx components specified as a (n, nx) matrix.
    /// Returns n scalar output values as a vector (n,).
    pub fn predict(&self, x: &ArrayBase<impl Data<Elem = f64>, Ix2>) -> Result<Array1<f64>> {
        check_query(&self.training_data.0, x)?;
        let ks = self.cross_covariance(x);
        Ok(ks.dot(&self.posterior.alpha))
    }

    /// Predict variance of the latent function at n given `x` points of nx components
    /// specified as a (n, nx) matrix. Returns n variance values as (n,) column vector.
    pub fn predict_var(&self, x: &ArrayBase<impl Data<Elem = f64>, Ix2>) -> Result<Array1<f64>> {
        check_query(&self.training_data.0, x)?;
        let ks = self.cross_covariance(x);
        self.latent_var(x, &ks)
    }

    /// Predict variance of noisy observations at `x` points
    pub fn predict_noisy_var(
        &self,
        x: &ArrayBase<impl Data<Elem = f64>, Ix2>,
    ) -> Result<Array1<f64>> {
        Ok(self.predict_var(x)? + self.noise.value())
    }

    /// Predict both output values and latent variance at n given `x` points of nx components
    pub fn predict_valvar(
        &self,
        x: &ArrayBase<impl Data<Elem = f64>, Ix2>,
    ) -> Result<(Array1<f64>, Array1<f64>)> {
        check_query(&self.training_data.0, x)?;
        let ks = self.cross_covariance(x);
        let mean = ks.dot(&self.posterior.alpha);
        let var = self.latent_var(x, &ks)?;
        Ok((mean, var))
    }

    /// Full posterior covariance of the latent function at `x` points as a (n, n) matrix
    pub fn predict_covariance(
        &self,
        x: &ArrayBase<impl Data<Elem = f64>, Ix2>,
    ) -> Result<Array2<f64>> {
        check_query(&self.training_data.0, x)?;
        let ks = self.cross_covariance(x);
        let v = self.posterior.chol.solve_lower(&ks.t())?;
        let cov = self.kernel.value(&x.view(), &x.view()) - v.t().dot(&v);
        Ok((&cov + &cov.t()) * 0.5)
    }

    /// Sample `n_traj` trajectories of the posterior latent function at `x` points.
    /// Returns a (n, n_traj) matrix.
    pub fn sample<R: Rng>(
        &self,
        x: &ArrayBase<impl Data<Elem = f64>, Ix2>,
        n_traj: usize,
        rng: &mut R,
    ) -> Result<Array2<f64>> {
        let (mean, _) = self.predict_valvar(x)?;
        let cov = self.predict_covariance(x)?;
        let (chol, _) = stable_cholesky(&cov, &self.jitter)?;
        let normal: Array2<f64> = Array::random_using((x.nrows(), n_traj), StandardNormal, rng);
        Ok(chol.lower().dot(&normal) + mean.insert_axis(Axis(1)))
    }

    fn cross_covariance(&self, x: &ArrayBase<impl Data<Elem = f64>, Ix2>) -> Array2<f64> {
        self.kernel.value(&x.view(), &self.training_data.0.view())
    }

    fn latent_var(
        &self,
        x: &ArrayBase<impl Data<Elem = f64>, Ix2>,
        ks: &Array2<f64>,
    ) -> Result<Array1<f64>> {
        let v = self.posterior.chol.solve_lower(&ks.t())?;
        let var = self.kernel.diag(&x.view()) - v.mapv(|v| v * v).sum_axis(Axis(0));
        // Variance might be slightly negative depending on
        // machine precision: set to zero in that case
        Ok(var.mapv(|v| v.max(0.)))
    }

    /// Log marginal likelihood of the training targets
    pub fn log_marginal_likelihood(&self) -> f64 {
        self.posterior.lml
    }

    /// Gradient of the log marginal likelihood wrt hyperparameters
    /// ordered as [`GaussianProcess::hyperparameters`]
    pub fn log_marginal_likelihood_gradient(&self) -> Result<Array1<f64>> {
        self.posterior
            .lml_gradient(self.kernel.as_ref(), &self.training_data.0)
    }

    /// Closed form leave-one-out predictions at training points.
    ///
    /// Returns predictive means and variances of each observation `y_i` given all others.
    pub fn loo(&self) -> Result<(Array1<f64>, Array1<f64>)> {
        let kinv_diag = self.posterior.chol.inverse_diag()?;
        let mean = &self.training_data.1 - &(&self.posterior.alpha / &kinv_diag);
        let var = kinv_diag.mapv(|v| 1. / v);
        Ok((mean, var))
    }

    /// Hyperparameters: kernel ones qualified by the kernel name, then `noise_variance`
    pub fn hyperparameters(&self) -> Vec<Hyperparameter> {
        let mut hypers = kernel_hyperparameters(self.kernel.as_ref(), &self.kernel.name());
        hypers.push(Hyperparameter::new(NOISE_VARIANCE.to_string(), &self.noise));
        hypers
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

    /// Set all hyperparameter values (ordered as [`GaussianProcess::hyperparameters`])
    /// and update the posterior. The model is left unchanged on error.
    pub fn set_hyperparameters(&mut self, values: &[f64]) -> Result<()> {
        let (kernel, noise) = self.candidate(values)?;
        let posterior = PosteriorState::compute(
            kernel.as_ref(),
            noise.value(),
            &self.jitter,
            &self.training_data.0,
            &self.training_data.1,
        )?;
        self.kernel = kernel;
        self.noise = noise;
        self.posterior = posterior;
        Ok(())
    }

    /// Exclude the named hyperparameter from optimization
    pub fn fix(&mut self, name: &str) -> Result<()> {
        self.param_mut(name)?.fix();
        Ok(())
    }

    /// Include the named hyperparameter in optimization
    pub fn unfix(&mut self, name: &str) -> Result<()> {
        self.param_mut(name)?.unfix();
        Ok(())
    }

    fn param_mut(&mut self, name: &str) -> Result<&mut Param> {
        let idx = position(&self.hyperparameters(), name)?;
        let nk = self.kernel.params().len();
        if idx < nk {
            Ok(self.kernel.params_mut().swap_remove(idx))
        } else {
            Ok(&mut self.noise)
        }
    }

    fn candidate(&self, values: &[f64]) -> Result<(Box<dyn Kernel>, Param)> {
        let nk = self.kernel.params().len();
        if values.len() != nk + 1 {
            return Err(GpError::DimensionMismatch(format!(
                "expected {} hyperparameter values, got {}",
                nk + 1,
                values.len()
            )));
        }
        let kernel = kernel_with_values(self.kernel.as_ref(), &values[..nk])?;
        let mut noise = self.noise.clone();
        noise.set_value(values[nk])?;
        Ok((kernel, noise))
    }

    /// Replace training data and update the posterior. The model is left unchanged on error.
    pub fn set_training_data(
        &mut self,
        x: &ArrayBase<impl Data<Elem = f64>, Ix2>,
        y: &ArrayBase<impl Data<Elem = f64>, Ix1>,
    ) -> Result<()> {
        check_training_data(self.kernel.as_ref(), x, y)?;
        let (x, y) = (x.to_owned(), y.to_owned());
        let posterior =
            PosteriorState::compute(self.kernel.as_ref(), self.noise.value(), &self.jitter, &x, &y)?;
        self.training_data = (x, y);
        self.posterior = posterior;
        Ok(())
    }

    /// Maximize the log marginal likelihood wrt free hyperparameters
    pub fn optimize(&mut self, config: &OptimizerConfig) -> Result<OptimizationReport> {
        optimize_hyperparameters(self, config)
    }

    /// Covariance kernel
    pub fn kernel(&self) -> &dyn Kernel {
        self.kernel.as_ref()
    }

    /// Observation noise variance
    pub fn noise_variance(&self) -> f64 {
        self.noise.value()
    }

    /// Jitter added to the training covariance matrix to factorize it
    pub fn jitter(&self) -> f64 {
        self.posterior.jitter
    }

    /// Training inputs dimension and number of training points
    pub fn dims(&self) -> (usize, usize) {
        (self.training_data.0.ncols(), self.training_data.0.nrows())
    }

    /// Training dataset (inputs, targets)
    pub fn training_data(&self) -> &(Array2<f64>, Array1<f64>) {
        &self.training_data
    }

    /// Parameters reproducing this model current hyperparameters without optimization
    pub fn current_params(&self) -> GpParams {
        GpParams::from(GpValidParams {
            kernel: self.kernel.clone(),
            noise_variance: self.noise.value(),
            fix_noise: self.noise.is_fixed(),
            jitter: self.jitter,
            optimizer: None,
        })
    }
}

impl Evidence for GaussianProcess {
    fn hyperparameters(&self) -> Vec<Hyperparameter> {
        GaussianProcess::hyperparameters(self)
    }

    fn evidence_at(&self, values: &[f64]) -> Result<(f64, Array1<f64>)> {
        let (kernel, noise) = self.candidate(values)?;
        let (x, y) = &self.training_data;
        let posterior = PosteriorState::compute(kernel.as_ref(), noise.value(), &self.jitter, x, y)?;
        let grad = posterior.lml_gradient(kernel.as_ref(), x)?;
        Ok((posterior.lml, grad))
    }

    fn set_hyperparameter_values(&mut self, values: &[f64]) -> Result<()> {
        self.set_hyperparameters(values)
    }
}

impl<D> PredictInplace<ArrayBase<D, Ix2>, Array1<f64>> for GaussianProcess
where
    D: Data<Elem = f64>,
{
    fn predict_inplace(&self, x: &ArrayBase<D, Ix2>, y: &mut Array1<f64>) {
        assert_eq!(
            x.nrows(),
            y.len(),
            "The number of data points must match the number of output targets."
        );

        let values = self.predict(x).expect("GP Prediction");
        *y = values;
    }

    fn default_target(&self, x: &ArrayBase<D, Ix2>) -> Array1<f64> {
        Array1::zeros((x.nrows(),))
    }
}

impl<D: Data<Elem = f64>> Fit<ArrayBase<D, Ix2>, ArrayBase<D, Ix1>, GpError> for GpValidParams {
    type Object = GaussianProcess;

    /// Fit GP posterior, optimizing hyperparameters when an optimizer is specified
    fn fit(
        &self,
        dataset: &DatasetBase<ArrayBase<D, Ix2>, ArrayBase<D, Ix1>>,
    ) -> Result<Self::Object> {
        let x = dataset.records();
        let y = dataset.targets();
        check_training_data(self.kernel(), x, y)?;

        let mut noise = Param::positive(self.noise_variance())?;
        if self.fix_noise() {
            noise.fix();
        }
        let (x, y) = (x.to_owned(), y.to_owned());
        let now = Instant::now();
        let posterior =
            PosteriorState::compute(self.kernel(), noise.value(), self.jitter(), &x, &y)?;
        debug!("elapsed posterior = {:?}", now.elapsed().as_micros());

        let mut gp = GaussianProcess {
            kernel: self.kernel.clone(),
            noise,
            jitter: *self.jitter(),
            training_data: (x, y),
            posterior,
        };
        if let Some(config) = self.optimizer() {
            gp.optimize(config)?;
        }
        Ok(gp)
    }
}
