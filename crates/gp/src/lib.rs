//! This library implements [Gaussian Process](https://en.wikipedia.org/wiki/Gaussian_process) models
//! built from composable covariance [kernels]:
//!
//! * regression with Gaussian noise, implemented by [GaussianProcess] parameterized by [GpParams],
//!   giving predictive means, variances, full covariances, posterior samples
//!   and closed form leave-one-out predictions,
//! * binary classification using the Laplace approximation, implemented by
//!   [GaussianProcessClassifier] parameterized by [GpcParams].
//!
//! Models expose named [hyperparameters](Hyperparameter) (kernel parameters and noise variance)
//! which can be set, fixed or fitted by maximizing the log marginal likelihood
//! with its analytic gradient (see [OptimizerConfig]).
//!
//! ```no_run
//! use gpkit::{kernels::{Kernel, Rbf}, GaussianProcess, OptimizerConfig};
//! use linfa::prelude::*;
//! use ndarray::{Array, Axis};
//!
//! let xt = Array::<f64, _>::linspace(0., 1., 10).insert_axis(Axis(1));
//! let yt = xt.column(0).mapv(|v| (6. * v).sin());
//!
//! let kernel: Box<dyn Kernel> = Box::new(Rbf::new(1., 0.2).unwrap());
//! let gp = GaussianProcess::params(kernel)
//!     .noise_variance(1e-2)
//!     .optimize(OptimizerConfig::default())
//!     .fit(&Dataset::new(xt, yt))
//!     .expect("GP fitted");
//! for h in gp.hyperparameters() {
//!     println!("{} = {}", h.name, h.value);
//! }
//! ```
#![warn(missing_docs)]
#![warn(rustdoc::broken_intra_doc_links)]
mod algorithm;
mod classifier_algorithm;
mod classifier_parameters;
pub mod covariance;
mod errors;
mod hyperparameters;
pub mod kernels;
mod likelihoods;
pub mod linalg;
pub mod metrics;
mod optimization;
mod parameters;
#[cfg(feature = "persistent")]
mod persistence;
mod utils;

pub use algorithm::*;
pub use classifier_algorithm::*;
pub use classifier_parameters::*;
pub use covariance::JitterPolicy;
pub use errors::*;
pub use hyperparameters::{Constraint, Hyperparameter, Param};
pub use likelihoods::*;
pub use optimization::*;
pub use parameters::*;
#[cfg(feature = "persistent")]
pub use persistence::*;
