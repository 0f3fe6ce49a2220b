//! A module for metrics to evaluate Gaussian Process models performances
//! It implements metrics from the following paper:
//! Marrel, Amandine, and Bertrand Iooss.
//! "Probabilistic surrogate modeling by Gaussian process: A review on recent insights in estimation and validation."
//! Reliability Engineering & System Safety 247 (2024): 110094.

use linfa::dataset::Dataset;
use linfa::{
    traits::{Fit, Predict, PredictInplace},
    Float, ParamGuard,
};
use log::warn;
use ndarray::{Array1, Array2};

use crate::{GaussianProcess, GpError, GpParams, Result};

/// A trait for Q2 predictive coefficient cross validation score
pub trait PredictScore<F, ER, P, O>
where
    F: Float,
    ER: std::error::Error + From<linfa::error::Error>,
    P: Fit<Array2<F>, Array1<F>, ER, Object = O> + ParamGuard,
    O: PredictInplace<Array2<F>, Array1<F>>,
{
    /// Return the training data (xt, yt)
    fn training_data(&self) -> &(Array2<F>, Array1<F>);

    /// Return the model parameters
    fn params(&self) -> P;

    /// Compute quality metric Q2 with kfold cross validation,
    /// NaN when a sub model fails to fit
    fn q2_score(&self, kfold: usize) -> F {
        let (xt, yt) = self.training_data();
        let dataset = Dataset::new(xt.to_owned(), yt.to_owned());
        let yt_mean = match yt.mean() {
            Some(mean) => mean,
            None => return F::nan(),
        };
        // Predictive Residual Sum of Squares
        let mut press = F::zero();
        // Total Sum of Squares
        let mut tss = F::zero();
        for (train, valid) in dataset.fold(kfold).into_iter() {
            let params = self.params();
            let model: O = match params.fit(&train) {
                Ok(model) => model,
                Err(err) => {
                    warn!("Cross-validation sub model fit failed: {err}");
                    return F::nan();
                }
            };
            let pred = model.predict(valid.records());
            press += (valid.targets() - pred).mapv(|v| v * v).sum();
            tss += (valid.targets() - yt_mean).mapv(|v| v * v).sum();
        }
        F::one() - press / tss
    }

    /// Q2 predictive coefficient with Leave-One-Out Cross-Validation
    fn looq2_score(&self) -> F {
        self.q2_score(self.training_data().0.nrows())
    }
}

/// Sub models are refitted with the current hyperparameters held constant
impl PredictScore<f64, GpError, GpParams, Self> for GaussianProcess {
    fn training_data(&self) -> &(Array2<f64>, Array1<f64>) {
        &self.training_data
    }

    fn params(&self) -> GpParams {
        self.current_params()
    }

    /// Closed form leave-one-out Q2, no sub model is fitted
    fn looq2_score(&self) -> f64 {
        match self.loo() {
            Ok((mean, _)) => {
                let yt = &self.training_data.1;
                let yt_mean = yt.mean().unwrap_or(0.);
                let press = (yt - &mean).mapv(|v| v * v).sum();
                let tss = yt.mapv(|v| (v - yt_mean) * (v - yt_mean)).sum();
                1. - press / tss
            }
            Err(err) => {
                warn!("Closed form leave-one-out failed ({err}), fall back to refitting");
                self.q2_score(self.training_data.0.nrows())
            }
        }
    }
}

/// Predictive variance adequacy: `|log(1/n sum_i (y_i - m_i)^2 / s_i^2)|`
/// computed on leave-one-out predictions. Zero when predicted variances match
/// the observed squared errors on average.
pub fn loo_pva_score(gp: &GaussianProcess) -> Result<f64> {
    let (mean, var) = gp.loo()?;
    let yt = &gp.training_data.1;
    let ratio = ((yt - &mean).mapv(|v| v * v) / var).mean().unwrap_or(f64::NAN);
    Ok(ratio.ln().abs())
}
