use super::{positive, Kernel};
use crate::errors::Result;
use crate::hyperparameters::Param;
use crate::utils::identical_rows;
use ndarray::{Array1, Array2, ArrayView2};
#[cfg(feature = "serializable")]
use serde::{Deserialize, Serialize};
use std::fmt;

/// White noise kernel: `variance` on exactly identical inputs, 0 otherwise
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serializable", derive(Serialize, Deserialize))]
pub struct White {
    variance: Param,
}

impl White {
    /// Constructor
    pub fn new(variance: f64) -> Result<Self> {
        Ok(White {
            variance: positive("variance", variance)?,
        })
    }
}

impl fmt::Display for White {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "white(variance={})", self.variance.value())
    }
}

#[cfg_attr(feature = "serializable", typetag::serde)]
impl Kernel for White {
    fn name(&self) -> String {
        "white".to_string()
    }

    fn value(&self, x: &ArrayView2<f64>, z: &ArrayView2<f64>) -> Array2<f64> {
        identical_rows(x, z) * self.variance.value()
    }

    fn diag(&self, x: &ArrayView2<f64>) -> Array1<f64> {
        Array1::from_elem(x.nrows(), self.variance.value())
    }

    fn params(&self) -> Vec<(String, &Param)> {
        vec![("variance".to_string(), &self.variance)]
    }

    fn params_mut(&mut self) -> Vec<&mut Param> {
        vec![&mut self.variance]
    }

    fn gradients(&self, x: &ArrayView2<f64>) -> Vec<Array2<f64>> {
        vec![identical_rows(x, x)]
    }

    fn box_clone(&self) -> Box<dyn Kernel> {
        Box::new(self.clone())
    }
}

/// Constant kernel: `k(x, x') = variance`
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serializable", derive(Serialize, Deserialize))]
pub struct Bias {
    variance: Param,
}

impl Bias {
    /// Constructor
    pub fn new(variance: f64) -> Result<Self> {
        Ok(Bias {
            variance: positive("variance", variance)?,
        })
    }
}

impl fmt::Display for Bias {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "bias(variance={})", self.variance.value())
    }
}

#[cfg_attr(feature = "serializable", typetag::serde)]
impl Kernel for Bias {
    fn name(&self) -> String {
        "bias".to_string()
    }

    fn value(&self, x: &ArrayView2<f64>, z: &ArrayView2<f64>) -> Array2<f64> {
        Array2::from_elem((x.nrows(), z.nrows()), self.variance.value())
    }

    fn diag(&self, x: &ArrayView2<f64>) -> Array1<f64> {
        Array1::from_elem(x.nrows(), self.variance.value())
    }

    fn params(&self) -> Vec<(String, &Param)> {
        vec![("variance".to_string(), &self.variance)]
    }

    fn params_mut(&mut self) -> Vec<&mut Param> {
        vec![&mut self.variance]
    }

    fn gradients(&self, x: &ArrayView2<f64>) -> Vec<Array2<f64>> {
        vec![Array2::ones((x.nrows(), x.nrows()))]
    }

    fn box_clone(&self) -> Box<dyn Kernel> {
        Box::new(self.clone())
    }
}
