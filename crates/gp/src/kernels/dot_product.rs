use super::{positive, Kernel};
use crate::errors::{GpError, Result};
use crate::hyperparameters::{Constraint, Param};
use ndarray::{Array1, Array2, ArrayView2, Axis};
#[cfg(feature = "serializable")]
use serde::{Deserialize, Serialize};
use std::fmt;

/// Linear kernel: `k(x, x') = variance * x.x'`
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serializable", derive(Serialize, Deserialize))]
pub struct Linear {
    variance: Param,
}

impl Linear {
    /// Constructor
    pub fn new(variance: f64) -> Result<Self> {
        Ok(Linear {
            variance: positive("variance", variance)?,
        })
    }

    /// Kernel variance
    pub fn variance(&self) -> f64 {
        self.variance.value()
    }
}

impl fmt::Display for Linear {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "linear(variance={})", self.variance())
    }
}

#[cfg_attr(feature = "serializable", typetag::serde)]
impl Kernel for Linear {
    fn name(&self) -> String {
        "linear".to_string()
    }

    fn value(&self, x: &ArrayView2<f64>, z: &ArrayView2<f64>) -> Array2<f64> {
        x.dot(&z.t()) * self.variance()
    }

    fn diag(&self, x: &ArrayView2<f64>) -> Array1<f64> {
        x.mapv(|v| v * v).sum_axis(Axis(1)) * self.variance()
    }

    fn params(&self) -> Vec<(String, &Param)> {
        vec![("variance".to_string(), &self.variance)]
    }

    fn params_mut(&mut self) -> Vec<&mut Param> {
        vec![&mut self.variance]
    }

    fn gradients(&self, x: &ArrayView2<f64>) -> Vec<Array2<f64>> {
        vec![x.dot(&x.t())]
    }

    fn box_clone(&self) -> Box<dyn Kernel> {
        Box::new(self.clone())
    }
}

/// Polynomial kernel: `k(x, x') = variance * (scale * x.x' + bias)^degree`
///
/// `bias` is an unconstrained offset, `degree` is not a hyperparameter.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serializable", derive(Serialize, Deserialize))]
pub struct Polynomial {
    variance: Param,
    scale: Param,
    bias: Param,
    degree: u32,
}

impl Polynomial {
    /// Constructor, `degree` should be at least 1
    pub fn new(variance: f64, scale: f64, bias: f64, degree: u32) -> Result<Self> {
        if degree == 0 {
            return Err(GpError::InvalidParameter(
                "polynomial degree should be at least 1".to_string(),
            ));
        }
        Ok(Polynomial {
            variance: positive("variance", variance)?,
            scale: positive("scale", scale)?,
            bias: Param::unconstrained(bias)?,
            degree,
        })
    }

    /// Polynomial degree
    pub fn degree(&self) -> u32 {
        self.degree
    }

    fn base(&self, dot: &Array2<f64>) -> Array2<f64> {
        let (s, c) = (self.scale.value(), self.bias.value());
        dot.mapv(|v| s * v + c)
    }
}

impl Default for Polynomial {
    fn default() -> Self {
        Polynomial {
            variance: Param::default(),
            scale: Param::default(),
            bias: Param::unchecked(1., Constraint::Unconstrained),
            degree: 2,
        }
    }
}

impl fmt::Display for Polynomial {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "poly(variance={}, scale={}, bias={}, degree={})",
            self.variance.value(),
            self.scale.value(),
            self.bias.value(),
            self.degree
        )
    }
}

#[cfg_attr(feature = "serializable", typetag::serde)]
impl Kernel for Polynomial {
    fn name(&self) -> String {
        "poly".to_string()
    }

    fn value(&self, x: &ArrayView2<f64>, z: &ArrayView2<f64>) -> Array2<f64> {
        let sigma2 = self.variance.value();
        let d = self.degree as i32;
        self.base(&x.dot(&z.t())).mapv(|b| sigma2 * b.powi(d))
    }

    fn diag(&self, x: &ArrayView2<f64>) -> Array1<f64> {
        let (sigma2, s, c) = (self.variance.value(), self.scale.value(), self.bias.value());
        let d = self.degree as i32;
        x.mapv(|v| v * v)
            .sum_axis(Axis(1))
            .mapv(|v| sigma2 * (s * v + c).powi(d))
    }

    fn params(&self) -> Vec<(String, &Param)> {
        vec![
            ("variance".to_string(), &self.variance),
            ("scale".to_string(), &self.scale),
            ("bias".to_string(), &self.bias),
        ]
    }

    fn params_mut(&mut self) -> Vec<&mut Param> {
        vec![&mut self.variance, &mut self.scale, &mut self.bias]
    }

    fn gradients(&self, x: &ArrayView2<f64>) -> Vec<Array2<f64>> {
        let sigma2 = self.variance.value();
        let d = self.degree as i32;
        let dot = x.dot(&x.t());
        let base = self.base(&dot);
        let dbase = base.mapv(|b| sigma2 * d as f64 * b.powi(d - 1));
        vec![base.mapv(|b| b.powi(d)), &dbase * &dot, dbase]
    }

    fn box_clone(&self) -> Box<dyn Kernel> {
        Box::new(self.clone())
    }
}
