//! Gradient based maximization of model evidence wrt free hyperparameters.
//!
//! Positive hyperparameters are optimized in log space, unconstrained ones as is.
//! The search is done with SLSQP (quasi-Newton with BFGS updates) within bounds.

use crate::errors::{GpError, Result};
use crate::hyperparameters::{from_search, search_jacobian, Constraint, Hyperparameter};
use log::{debug, info, warn};
use ndarray::Array1;
#[cfg(feature = "serializable")]
use serde::{Deserialize, Serialize};
use std::cell::{Cell, RefCell};
use std::time::Instant;

/// A model whose hyperparameters can be fitted by maximizing an evidence
/// (log marginal likelihood or its approximation)
pub trait Evidence {
    /// Ordered hyperparameter snapshot
    fn hyperparameters(&self) -> Vec<Hyperparameter>;

    /// Evidence and its gradient wrt every hyperparameter for the given values
    /// (ordered as [`Evidence::hyperparameters`]), without modifying the model
    fn evidence_at(&self, values: &[f64]) -> Result<(f64, Array1<f64>)>;

    /// Set all hyperparameter values at once, leaving the model unchanged on error
    fn set_hyperparameter_values(&mut self, values: &[f64]) -> Result<()>;
}

/// Hyperparameter optimizer settings
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serializable", derive(Serialize, Deserialize))]
pub struct OptimizerConfig {
    /// Maximum number of evidence evaluations
    pub max_eval: usize,
    /// Relative tolerance on the objective
    pub ftol_rel: f64,
    /// Absolute tolerance on the objective
    pub ftol_abs: f64,
    /// Gradient norm (in search space) below which a point is stationary: the search is
    /// skipped from such a starting point, and a best point below it counts as converged
    pub gtol: f64,
    /// Bounds of positive hyperparameters (natural space)
    pub positive_bounds: (f64, f64),
    /// Bounds of unconstrained hyperparameters
    pub unconstrained_bounds: (f64, f64),
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        OptimizerConfig {
            max_eval: OptimizerConfig::DEFAULT_MAX_EVAL,
            ftol_rel: 1e-8,
            ftol_abs: 1e-10,
            gtol: 1e-6,
            positive_bounds: (1e-8, 1e8),
            unconstrained_bounds: (-1e8, 1e8),
        }
    }
}

impl OptimizerConfig {
    /// Default maximum number of evidence evaluations
    pub const DEFAULT_MAX_EVAL: usize = 200;

    /// Set the maximum number of evidence evaluations
    pub fn max_eval(mut self, max_eval: usize) -> Self {
        self.max_eval = max_eval.max(1);
        self
    }

    /// Set the relative tolerance on the objective
    pub fn ftol_rel(mut self, ftol_rel: f64) -> Self {
        self.ftol_rel = ftol_rel;
        self
    }

    /// Set bounds of positive hyperparameters
    pub fn positive_bounds(mut self, lower: f64, upper: f64) -> Self {
        self.positive_bounds = (lower, upper);
        self
    }

    fn search_bounds(&self, constraint: Constraint) -> (f64, f64) {
        match constraint {
            Constraint::Positive => (self.positive_bounds.0.ln(), self.positive_bounds.1.ln()),
            Constraint::Unconstrained => self.unconstrained_bounds,
        }
    }

    fn check(&self) -> Result<()> {
        let (lo, up) = self.positive_bounds;
        if !(lo > 0. && lo < up && up.is_finite()) {
            return Err(GpError::InvalidValueError(format!(
                "positive bounds should verify 0 < lower < upper < inf, got ({lo}, {up})"
            )));
        }
        let (lo, up) = self.unconstrained_bounds;
        if !(lo < up) {
            return Err(GpError::InvalidValueError(format!(
                "unconstrained bounds should verify lower < upper, got ({lo}, {up})"
            )));
        }
        Ok(())
    }
}

/// Outcome of a hyperparameter optimization
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serializable", derive(Serialize, Deserialize))]
pub struct OptimizationReport {
    /// Hyperparameters of the model after optimization
    pub hyperparameters: Vec<Hyperparameter>,
    /// Evidence at the returned hyperparameters
    pub objective: f64,
    /// Evidence before optimization
    pub initial_objective: f64,
    /// Number of evidence evaluations
    pub n_evals: usize,
    /// Whether the optimizer stopped on a tolerance criterion
    pub converged: bool,
}

impl OptimizationReport {
    /// Turn a non converged report into [`GpError::OptimizationNonConvergence`]
    pub fn into_result(self) -> Result<Self> {
        if self.converged {
            Ok(self)
        } else {
            Err(GpError::OptimizationNonConvergence {
                iterations: self.n_evals,
                objective: self.objective,
            })
        }
    }
}

/// Maximize the evidence of `model` wrt its free hyperparameters.
///
/// The best evaluated point is committed to the model only when it does not decrease
/// the evidence, fixed hyperparameters are never modified. Hitting the evaluation
/// budget is not an error: it is reported through [`OptimizationReport::converged`].
pub fn optimize_hyperparameters<M: Evidence + ?Sized>(
    model: &mut M,
    config: &OptimizerConfig,
) -> Result<OptimizationReport> {
    config.check()?;
    let hypers = model.hyperparameters();
    let values0: Vec<f64> = hypers.iter().map(|h| h.value).collect();
    let free: Vec<usize> = (0..hypers.len()).filter(|&i| !hypers[i].fixed).collect();

    let (obj0, grad0) = model.evidence_at(&values0)?;
    if free.is_empty() {
        debug!("No free hyperparameter to optimize");
        return Ok(OptimizationReport {
            hyperparameters: hypers,
            objective: obj0,
            initial_objective: obj0,
            n_evals: 1,
            converged: true,
        });
    }

    let search_gradient_norm = |values: &[f64], grad: &Array1<f64>| -> f64 {
        free.iter()
            .map(|&i| {
                let g = grad[i] * search_jacobian(hypers[i].constraint, values[i]);
                g * g
            })
            .sum::<f64>()
            .sqrt()
    };
    let gnorm = search_gradient_norm(&values0, &grad0);
    if gnorm < config.gtol {
        debug!("Initial gradient norm {gnorm:e} below tolerance, skip optimization");
        return Ok(OptimizationReport {
            hyperparameters: hypers,
            objective: obj0,
            initial_objective: obj0,
            n_evals: 1,
            converged: true,
        });
    }

    let bounds: Vec<(f64, f64)> = free
        .iter()
        .map(|&i| config.search_bounds(hypers[i].constraint))
        .collect();
    let xinit: Vec<f64> = free
        .iter()
        .zip(bounds.iter())
        .map(|(&i, (lo, up))| hypers[i].search_value().clamp(*lo, *up))
        .collect();

    let n_evals = Cell::new(0usize);
    let best = RefCell::new((obj0, values0.clone(), gnorm));
    let model_ref: &M = model;
    let objfn = |u: &[f64], gradient: Option<&mut [f64]>, _params: &mut ()| -> f64 {
        n_evals.set(n_evals.get() + 1);
        let mut values = values0.clone();
        for (k, &i) in free.iter().enumerate() {
            values[i] = from_search(hypers[i].constraint, u[k]);
        }
        match model_ref.evidence_at(&values) {
            Ok((obj, grad)) if obj.is_finite() && grad.iter().all(|g| g.is_finite()) => {
                if let Some(gradient) = gradient {
                    for (k, &i) in free.iter().enumerate() {
                        gradient[k] = -grad[i] * search_jacobian(hypers[i].constraint, values[i]);
                    }
                }
                let mut best = best.borrow_mut();
                if obj > best.0 {
                    let gnorm = search_gradient_norm(&values, &grad);
                    *best = (obj, values, gnorm);
                }
                -obj
            }
            res => {
                if let Err(err) = res {
                    debug!("Evidence evaluation failed at {values:?}: {err}");
                }
                if let Some(gradient) = gradient {
                    gradient.iter_mut().for_each(|g| *g = 0.);
                }
                f64::INFINITY
            }
        }
    };

    debug!("Optimize {} hyperparameters from {:?}", free.len(), xinit);
    let now = Instant::now();
    let cons: Vec<&dyn slsqp::Func<()>> = vec![];
    let res = slsqp::minimize(
        objfn,
        &xinit,
        &bounds,
        &cons,
        (),
        config.max_eval,
        Some(slsqp::StopTols {
            ftol_rel: config.ftol_rel,
            ftol_abs: config.ftol_abs,
            ..slsqp::StopTols::default()
        }),
    );
    debug!("elapsed optim = {:?}", now.elapsed().as_millis());

    let n_evals = n_evals.get();
    let (objective, values, best_gnorm) = best.into_inner();
    let stopped_on_tolerance = match res {
        Ok((status, _, _)) => {
            debug!("SLSQP status: {status:?}");
            matches!(
                status,
                slsqp::SuccessStatus::Success
                    | slsqp::SuccessStatus::StopValReached
                    | slsqp::SuccessStatus::FtolReached
                    | slsqp::SuccessStatus::XtolReached
            )
        }
        Err((status, _, _)) => {
            warn!("SLSQP optimizer failed with status {status:?}");
            false
        }
    };
    let converged = stopped_on_tolerance || best_gnorm < config.gtol;

    if objective > obj0 {
        model.set_hyperparameter_values(&values)?;
    }
    if !converged {
        warn!("Hyperparameter optimization stopped after {n_evals} evaluations without convergence");
    }
    info!("Evidence improved from {obj0} to {objective} in {n_evals} evaluations");

    Ok(OptimizationReport {
        hyperparameters: model.hyperparameters(),
        objective,
        initial_objective: obj0,
        n_evals,
        converged,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hyperparameters::Param;
    use approx::assert_abs_diff_eq;

    /// Concave toy evidence -(ln a - ln 2)^2 - (b - 3)^2 with a positive, b unconstrained
    struct Toy {
        a: Param,
        b: Param,
    }

    impl Evidence for Toy {
        fn hyperparameters(&self) -> Vec<Hyperparameter> {
            vec![
                Hyperparameter::new("a".to_string(), &self.a),
                Hyperparameter::new("b".to_string(), &self.b),
            ]
        }

        fn evidence_at(&self, values: &[f64]) -> Result<(f64, Array1<f64>)> {
            let (a, b) = (values[0], values[1]);
            let la = a.ln() - 2f64.ln();
            Ok((
                -la * la - (b - 3.) * (b - 3.),
                Array1::from(vec![-2. * la / a, -2. * (b - 3.)]),
            ))
        }

        fn set_hyperparameter_values(&mut self, values: &[f64]) -> Result<()> {
            let mut a = self.a.clone();
            let mut b = self.b.clone();
            a.set_value(values[0])?;
            b.set_value(values[1])?;
            self.a = a;
            self.b = b;
            Ok(())
        }
    }

    #[test]
    fn test_optimize_toy_evidence() {
        let mut toy = Toy {
            a: Param::positive(0.1).unwrap(),
            b: Param::unconstrained(-1.).unwrap(),
        };
        let report = optimize_hyperparameters(&mut toy, &OptimizerConfig::default()).unwrap();
        assert!(report.converged);
        assert!(report.n_evals < OptimizerConfig::DEFAULT_MAX_EVAL);
        assert!(report.objective >= report.initial_objective);
        assert_abs_diff_eq!(toy.a.value(), 2., epsilon = 1e-3);
        assert_abs_diff_eq!(toy.b.value(), 3., epsilon = 1e-3);
    }

    #[test]
    fn test_fixed_parameter_untouched() {
        let mut toy = Toy {
            a: Param::positive(0.1).unwrap().fixed(),
            b: Param::unconstrained(-1.).unwrap(),
        };
        optimize_hyperparameters(&mut toy, &OptimizerConfig::default()).unwrap();
        assert_eq!(toy.a.value(), 0.1);
        assert_abs_diff_eq!(toy.b.value(), 3., epsilon = 1e-3);
    }

    #[test]
    fn test_nothing_to_optimize() {
        let mut toy = Toy {
            a: Param::positive(0.1).unwrap().fixed(),
            b: Param::unconstrained(-1.).unwrap().fixed(),
        };
        let report = optimize_hyperparameters(&mut toy, &OptimizerConfig::default()).unwrap();
        assert!(report.converged);
        assert_eq!(report.n_evals, 1);
    }

    #[test]
    fn test_non_convergence_reported() {
        let mut toy = Toy {
            a: Param::positive(1e-3).unwrap(),
            b: Param::unconstrained(-50.).unwrap(),
        };
        let report =
            optimize_hyperparameters(&mut toy, &OptimizerConfig::default().max_eval(2)).unwrap();
        assert!(!report.converged);
        assert!(report.objective >= report.initial_objective);
        assert!(matches!(
            report.into_result(),
            Err(GpError::OptimizationNonConvergence { .. })
        ));
    }

    #[test]
    fn test_invalid_bounds() {
        let mut toy = Toy {
            a: Param::positive(1.).unwrap(),
            b: Param::unconstrained(0.).unwrap(),
        };
        let config = OptimizerConfig::default().positive_bounds(0., 1.);
        assert!(matches!(
            optimize_hyperparameters(&mut toy, &config),
            Err(GpError::InvalidValueError(_))
        ));
    }
}
