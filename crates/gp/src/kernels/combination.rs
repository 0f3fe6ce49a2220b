use super::Kernel;
use crate::errors::{GpError, Result};
use crate::hyperparameters::Param;
use ndarray::{Array1, Array2, ArrayView2, Axis};
#[cfg(feature = "serializable")]
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Prefixes of sub-kernel parameters: kernel names, suffixed by `_<i>`
/// for the i-th repetition of a name
fn child_prefixes(kernels: &[Box<dyn Kernel>]) -> Vec<String> {
    let mut seen: HashMap<String, usize> = HashMap::new();
    kernels
        .iter()
        .map(|k| {
            let name = k.name();
            let count = seen.entry(name.clone()).or_insert(0);
            let prefix = if *count == 0 {
                name
            } else {
                format!("{}_{}", name, count)
            };
            *count += 1;
            prefix
        })
        .collect()
}

fn child_params(kernels: &[Box<dyn Kernel>]) -> Vec<(String, &Param)> {
    child_prefixes(kernels)
        .into_iter()
        .zip(kernels.iter())
        .flat_map(|(prefix, k)| {
            k.params()
                .into_iter()
                .map(move |(name, p)| (format!("{prefix}.{name}"), p))
        })
        .collect()
}

fn check_children(kernels: &[Box<dyn Kernel>], nx: usize) -> Result<()> {
    kernels.iter().try_for_each(|k| k.check_input_dim(nx))
}

fn display_children(
    f: &mut fmt::Formatter,
    kernels: &[Box<dyn Kernel>],
    sep: &str,
) -> fmt::Result {
    let terms: Vec<String> = kernels.iter().map(|k| k.to_string()).collect();
    write!(f, "({})", terms.join(sep))
}

/// Sum of kernels: `k(x, x') = sum_i k_i(x, x')`
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serializable", derive(Serialize, Deserialize))]
pub struct Sum {
    kernels: Vec<Box<dyn Kernel>>,
}

impl Sum {
    /// Constructor
    pub fn new(kernels: Vec<Box<dyn Kernel>>) -> Self {
        Sum { kernels }
    }

    /// Summed kernels
    pub fn kernels(&self) -> &[Box<dyn Kernel>] {
        &self.kernels
    }
}

impl fmt::Display for Sum {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        display_children(f, &self.kernels, " + ")
    }
}

#[cfg_attr(feature = "serializable", typetag::serde)]
impl Kernel for Sum {
    fn name(&self) -> String {
        "sum".to_string()
    }

    fn check_input_dim(&self, nx: usize) -> Result<()> {
        check_children(&self.kernels, nx)
    }

    fn value(&self, x: &ArrayView2<f64>, z: &ArrayView2<f64>) -> Array2<f64> {
        self.kernels
            .iter()
            .fold(Array2::zeros((x.nrows(), z.nrows())), |acc, k| {
                acc + k.value(x, z)
            })
    }

    fn diag(&self, x: &ArrayView2<f64>) -> Array1<f64> {
        self.kernels
            .iter()
            .fold(Array1::zeros(x.nrows()), |acc, k| acc + k.diag(x))
    }

    fn params(&self) -> Vec<(String, &Param)> {
        child_params(&self.kernels)
    }

    fn params_mut(&mut self) -> Vec<&mut Param> {
        self.kernels
            .iter_mut()
            .flat_map(|k| k.params_mut())
            .collect()
    }

    fn gradients(&self, x: &ArrayView2<f64>) -> Vec<Array2<f64>> {
        self.kernels.iter().flat_map(|k| k.gradients(x)).collect()
    }

    fn box_clone(&self) -> Box<dyn Kernel> {
        Box::new(self.clone())
    }
}

/// Product of kernels: `k(x, x') = prod_i k_i(x, x')`
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serializable", derive(Serialize, Deserialize))]
pub struct Product {
    kernels: Vec<Box<dyn Kernel>>,
}

impl Product {
    /// Constructor
    pub fn new(kernels: Vec<Box<dyn Kernel>>) -> Self {
        Product { kernels }
    }

    /// Multiplied kernels
    pub fn kernels(&self) -> &[Box<dyn Kernel>] {
        &self.kernels
    }
}

impl fmt::Display for Product {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        display_children(f, &self.kernels, " * ")
    }
}

#[cfg_attr(feature = "serializable", typetag::serde)]
impl Kernel for Product {
    fn name(&self) -> String {
        "prod".to_string()
    }

    fn check_input_dim(&self, nx: usize) -> Result<()> {
        check_children(&self.kernels, nx)
    }

    fn value(&self, x: &ArrayView2<f64>, z: &ArrayView2<f64>) -> Array2<f64> {
        self.kernels
            .iter()
            .fold(Array2::ones((x.nrows(), z.nrows())), |acc, k| {
                acc * k.value(x, z)
            })
    }

    fn diag(&self, x: &ArrayView2<f64>) -> Array1<f64> {
        self.kernels
            .iter()
            .fold(Array1::ones(x.nrows()), |acc, k| acc * k.diag(x))
    }

    fn params(&self) -> Vec<(String, &Param)> {
        child_params(&self.kernels)
    }

    fn params_mut(&mut self) -> Vec<&mut Param> {
        self.kernels
            .iter_mut()
            .flat_map(|k| k.params_mut())
            .collect()
    }

    fn gradients(&self, x: &ArrayView2<f64>) -> Vec<Array2<f64>> {
        let n = x.nrows();
        let values: Vec<Array2<f64>> = self.kernels.iter().map(|k| k.value(x, x)).collect();
        self.kernels
            .iter()
            .enumerate()
            .flat_map(|(i, k)| {
                let others = values
                    .iter()
                    .enumerate()
                    .filter(|(j, _)| *j != i)
                    .fold(Array2::<f64>::ones((n, n)), |acc, (_, v)| acc * v);
                k.gradients(x)
                    .into_iter()
                    .map(move |g| g * &others)
                    .collect::<Vec<_>>()
            })
            .collect()
    }

    fn box_clone(&self) -> Box<dyn Kernel> {
        Box::new(self.clone())
    }
}

/// Kernel acting on a subset of input dimensions
///
/// Used to build additive decompositions such as `k1(x_0) + k2(x_1, x_2)`.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serializable", derive(Serialize, Deserialize))]
pub struct Masked {
    kernel: Box<dyn Kernel>,
    active_dims: Vec<usize>,
}

impl Masked {
    /// Restrict `kernel` to `active_dims` columns of the inputs
    pub fn new<K: Kernel + 'static>(kernel: K, active_dims: Vec<usize>) -> Result<Self> {
        Self::from_boxed(Box::new(kernel), active_dims)
    }

    /// Restrict a boxed `kernel` to `active_dims` columns of the inputs
    pub fn from_boxed(kernel: Box<dyn Kernel>, active_dims: Vec<usize>) -> Result<Self> {
        if active_dims.is_empty() {
            return Err(GpError::DimensionMismatch(
                "active dimensions should not be empty".to_string(),
            ));
        }
        kernel.check_input_dim(active_dims.len()).map_err(|_| {
            GpError::DimensionMismatch(format!(
                "{} active dimensions declared for kernel {} expecting {:?} dimensions",
                active_dims.len(),
                kernel,
                kernel.input_dim()
            ))
        })?;
        Ok(Masked {
            kernel,
            active_dims,
        })
    }

    /// Input columns used by the kernel
    pub fn active_dims(&self) -> &[usize] {
        &self.active_dims
    }

    fn select(&self, x: &ArrayView2<f64>) -> Array2<f64> {
        x.select(Axis(1), &self.active_dims)
    }
}

impl fmt::Display for Masked {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}[dims={:?}]", self.kernel, self.active_dims)
    }
}

#[cfg_attr(feature = "serializable", typetag::serde)]
impl Kernel for Masked {
    fn name(&self) -> String {
        self.kernel.name()
    }

    fn check_input_dim(&self, nx: usize) -> Result<()> {
        match self.active_dims.iter().max() {
            Some(&max) if max >= nx => Err(GpError::DimensionMismatch(format!(
                "active dimension {max} out of range for inputs of dimension {nx}"
            ))),
            _ => Ok(()),
        }
    }

    fn value(&self, x: &ArrayView2<f64>, z: &ArrayView2<f64>) -> Array2<f64> {
        self.kernel
            .value(&self.select(x).view(), &self.select(z).view())
    }

    fn diag(&self, x: &ArrayView2<f64>) -> Array1<f64> {
        self.kernel.diag(&self.select(x).view())
    }

    fn params(&self) -> Vec<(String, &Param)> {
        self.kernel.params()
    }

    fn params_mut(&mut self) -> Vec<&mut Param> {
        self.kernel.params_mut()
    }

    fn gradients(&self, x: &ArrayView2<f64>) -> Vec<Array2<f64>> {
        self.kernel.gradients(&self.select(x).view())
    }

    fn box_clone(&self) -> Box<dyn Kernel> {
        Box::new(self.clone())
    }
}
