use crate::covariance::JitterPolicy;
use crate::errors::{GpError, Result};
use crate::kernels::{Kernel, Rbf};
use crate::optimization::OptimizerConfig;
use linfa::ParamGuard;

#[cfg(feature = "serializable")]
use serde::{Deserialize, Serialize};

/// A set of validated GP regression parameters.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serializable", derive(Serialize, Deserialize))]
pub struct GpValidParams {
    /// Prior covariance kernel
    pub(crate) kernel: Box<dyn Kernel>,
    /// Initial observation noise variance
    pub(crate) noise_variance: f64,
    /// Whether noise variance is held constant during optimization
    pub(crate) fix_noise: bool,
    /// Jitter escalation used when factorizing covariance matrices
    pub(crate) jitter: JitterPolicy,
    /// Hyperparameter optimization run at fit time when specified
    pub(crate) optimizer: Option<OptimizerConfig>,
}

impl Default for GpValidParams {
    fn default() -> GpValidParams {
        GpValidParams {
            kernel: Box::<Rbf>::default(),
            noise_variance: GpValidParams::DEFAULT_NOISE_VARIANCE,
            fix_noise: false,
            jitter: JitterPolicy::default(),
            optimizer: None,
        }
    }
}

impl GpValidParams {
    /// Default initial noise variance
    pub const DEFAULT_NOISE_VARIANCE: f64 = 1.0;

    /// Get covariance kernel
    pub fn kernel(&self) -> &dyn Kernel {
        self.kernel.as_ref()
    }

    /// Get initial noise variance
    pub fn noise_variance(&self) -> f64 {
        self.noise_variance
    }

    /// Whether noise variance is fixed
    pub fn fix_noise(&self) -> bool {
        self.fix_noise
    }

    /// Get jitter policy
    pub fn jitter(&self) -> &JitterPolicy {
        &self.jitter
    }

    /// Get optimizer configuration applied at fit time
    pub fn optimizer(&self) -> Option<&OptimizerConfig> {
        self.optimizer.as_ref()
    }
}

#[derive(Clone, Debug)]
/// The set of hyperparameters that can be specified for the execution of
/// the [GP regression algorithm](crate::GaussianProcess).
pub struct GpParams(GpValidParams);

impl GpParams {
    /// A constructor for GP parameters given a covariance kernel
    pub fn new(kernel: Box<dyn Kernel>) -> GpParams {
        Self(GpValidParams {
            kernel,
            ..Default::default()
        })
    }

    /// Set covariance kernel.
    pub fn kernel(mut self, kernel: Box<dyn Kernel>) -> Self {
        self.0.kernel = kernel;
        self
    }

    /// Set initial observation noise variance.
    pub fn noise_variance(mut self, noise_variance: f64) -> Self {
        self.0.noise_variance = noise_variance;
        self
    }

    /// Hold noise variance constant during hyperparameter optimization.
    pub fn fix_noise(mut self, fix_noise: bool) -> Self {
        self.0.fix_noise = fix_noise;
        self
    }

    /// Set jitter policy.
    pub fn jitter(mut self, jitter: JitterPolicy) -> Self {
        self.0.jitter = jitter;
        self
    }

    /// Optimize hyperparameters at fit time with the given configuration
    pub fn optimize(mut self, config: OptimizerConfig) -> Self {
        self.0.optimizer = Some(config);
        self
    }
}

impl From<GpValidParams> for GpParams {
    fn from(valid: GpValidParams) -> Self {
        GpParams(valid)
    }
}

pub(crate) fn check_jitter(jitter: &JitterPolicy) -> Result<()> {
    if !(jitter.initial > 0. && jitter.initial.is_finite()) || jitter.growth <= 1. {
        return Err(GpError::InvalidValueError(format!(
            "jitter policy should verify initial > 0 and growth > 1, got {jitter:?}"
        )));
    }
    Ok(())
}

impl ParamGuard for GpParams {
    type Checked = GpValidParams;
    type Error = GpError;

    fn check_ref(&self) -> Result<&Self::Checked> {
        if !(self.0.noise_variance > 0. && self.0.noise_variance.is_finite()) {
            return Err(GpError::InvalidParameter(format!(
                "noise variance should be strictly positive, got {}",
                self.0.noise_variance
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
