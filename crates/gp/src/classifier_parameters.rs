use crate::covariance::JitterPolicy;
use crate::errors::{GpError, Result};
use crate::kernels::{Kernel, Rbf};
use crate::likelihoods::Link;
use crate::optimization::OptimizerConfig;
use crate::parameters::check_jitter;
use linfa::ParamGuard;

#[cfg(feature = "serializable")]
use serde::{Deserialize, Serialize};

/// Settings of the Newton iterations finding the Laplace posterior mode
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serializable", derive(Serialize, Deserialize))]
pub struct LaplaceConfig {
    /// Maximum number of Newton iterations
    pub max_iter: usize,
    /// Tolerance on the relative latent update between iterations
    pub tol: f64,
}

impl Default for LaplaceConfig {
    fn default() -> Self {
        LaplaceConfig {
            max_iter: 100,
            tol: 1e-8,
        }
    }
}

/// A set of validated GP classification parameters.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serializable", derive(Serialize, Deserialize))]
pub struct GpcValidParams {
    pub(crate) kernel: Box<dyn Kernel>,
    pub(crate) link: Link,
    /// Diagonal term added to the latent prior covariance
    pub(crate) eps: f64,
    pub(crate) jitter: JitterPolicy,
    pub(crate) laplace: LaplaceConfig,
    pub(crate) optimizer: Option<OptimizerConfig>,
}

impl Default for GpcValidParams {
    fn default() -> GpcValidParams {
        GpcValidParams {
            kernel: Box::<Rbf>::default(),
            link: Link::default(),
            eps: GpcValidParams::DEFAULT_EPS,
            jitter: JitterPolicy::default(),
            laplace: LaplaceConfig::default(),
            optimizer: None,
        }
    }
}

impl GpcValidParams {
    /// Default diagonal term of the latent prior covariance
    pub const DEFAULT_EPS: f64 = 1e-8;

    /// Get covariance kernel
    pub fn kernel(&self) -> &dyn Kernel {
        self.kernel.as_ref()
    }

    /// Get link function
    pub fn link(&self) -> Link {
        self.link
    }

    /// Get diagonal term of the latent prior covariance
    pub fn eps(&self) -> f64 {
        self.eps
    }

    /// Get jitter policy
    pub fn jitter(&self) -> &JitterPolicy {
        &self.jitter
    }

    /// Get Laplace mode finding settings
    pub fn laplace(&self) -> &LaplaceConfig {
        &self.laplace
    }

    /// Get optimizer configuration applied at fit time
    pub fn optimizer(&self) -> Option<&OptimizerConfig> {
        self.optimizer.as_ref()
    }
}

#[derive(Clone, Debug)]
/// The set of hyperparameters that can be specified for the execution of
/// the [GP classification algorithm](crate::GaussianProcessClassifier).
pub struct GpcParams(GpcValidParams);

impl GpcParams {
    /// A constructor for GP classifier parameters given a covariance kernel
    pub fn new(kernel: Box<dyn Kernel>) -> GpcParams {
        Self(GpcValidParams {
            kernel,
            ..Default::default()
        })
    }

    /// Set covariance kernel.
    pub fn kernel(mut self, kernel: Box<dyn Kernel>) -> Self {
        self.0.kernel = kernel;
        self
    }

    /// Set link function.
    pub fn link(mut self, link: Link) -> Self {
        self.0.link = link;
        self
    }

    /// Set diagonal term added to the latent prior covariance.
    pub fn eps(mut self, eps: f64) -> Self {
        self.0.eps = eps;
        self
    }

    /// Set jitter policy.
    pub fn jitter(mut self, jitter: JitterPolicy) -> Self {
        self.0.jitter = jitter;
        self
    }

    /// Set Laplace mode finding settings.
    pub fn laplace(mut self, laplace: LaplaceConfig) -> Self {
        self.0.laplace = laplace;
        self
    }

    /// Optimize hyperparameters at fit time with the given configuration
    pub fn optimize(mut self, config: OptimizerConfig) -> Self {
        self.0.optimizer = Some(config);
        self
    }
}

impl From<GpcValidParams> for GpcParams {
    fn from(valid: GpcValidParams) -> Self {
        GpcParams(valid)
    }
}

impl ParamGuard for GpcParams {
    type Checked = GpcValidParams;
    type Error = GpError;

    fn check_ref(&self) -> Result<&Self::Checked> {
        if !(self.0.eps >= 0. && self.0.eps.is_finite()) {
            return Err(GpError::InvalidValueError(format!(
                "eps should be a non negative value, got {}",
                self.0.eps
            )));
        }
        if self.0.laplace.max_iter == 0 || !(self.0.laplace.tol > 0.) {
            return Err(GpError::InvalidValueError(format!(
                "Laplace settings should verify max_iter > 0 and tol > 0, got {:?}",
                self.0.laplace
            )));
        }
        check_jitter(&self.0.jitter)?;
        Ok(&self.0)
    }

    fn check(self) -> Result<Self::Checked> {
        self.check_ref()?;
        Ok(self.0)
    }
}
