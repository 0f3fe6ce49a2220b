use super::{lengthscale_names, lengthscales, positive, Kernel};
use crate::errors::Result;
use crate::hyperparameters::Param;
use crate::utils::differences;
use ndarray::{Array1, Array2, ArrayView2, Zip};
#[cfg(feature = "serializable")]
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::fmt;

/// Standard periodic kernel
///
/// `k(x, x') = variance * exp(-1/2 * sum_j (sin(pi * (x_j - x'_j) / period) / l_j)^2)`
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serializable", derive(Serialize, Deserialize))]
pub struct StdPeriodic {
    variance: Param,
    period: Param,
    lengthscale: Vec<Param>,
}

impl StdPeriodic {
    /// Isotropic periodic kernel
    pub fn new(variance: f64, lengthscale: f64, period: f64) -> Result<Self> {
        Self::ard(variance, period, &[lengthscale])
    }

    /// Periodic kernel with one lengthscale per input dimension
    pub fn ard(variance: f64, period: f64, lengthscales_: &[f64]) -> Result<Self> {
        Ok(StdPeriodic {
            variance: positive("variance", variance)?,
            period: positive("period", period)?,
            lengthscale: lengthscales(lengthscales_)?,
        })
    }

    /// Kernel variance
    pub fn variance(&self) -> f64 {
        self.variance.value()
    }

    /// Kernel period
    pub fn period(&self) -> f64 {
        self.period.value()
    }

    fn lengthscale(&self, j: usize) -> f64 {
        if self.lengthscale.len() == 1 {
            self.lengthscale[0].value()
        } else {
            self.lengthscale[j].value()
        }
    }

    /// Per dimension sin(pi d_j / p) matrices along with the differences d_j
    fn sines(&self, x: &ArrayView2<f64>, z: &ArrayView2<f64>) -> Vec<(Array2<f64>, Array2<f64>)> {
        let p = self.period();
        (0..x.ncols())
            .map(|j| {
                let d = differences(x, z, j);
                (d.mapv(|v| (PI * v / p).sin()), d)
            })
            .collect()
    }

    fn exponent(&self, sines: &[(Array2<f64>, Array2<f64>)], shape: (usize, usize)) -> Array2<f64> {
        let mut e = Array2::zeros(shape);
        for (j, (s, _)) in sines.iter().enumerate() {
            let l = self.lengthscale(j);
            Zip::from(&mut e)
                .and(s)
                .for_each(|e, &s| *e += s * s / (l * l));
        }
        e
    }
}

impl Default for StdPeriodic {
    fn default() -> Self {
        StdPeriodic {
            variance: Param::default(),
            period: Param::default(),
            lengthscale: vec![Param::default()],
        }
    }
}

impl fmt::Display for StdPeriodic {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let ls: Vec<f64> = self.lengthscale.iter().map(|p| p.value()).collect();
        write!(
            f,
            "std_periodic(variance={}, period={}, lengthscale={:?})",
            self.variance(),
            self.period(),
            ls
        )
    }
}

#[cfg_attr(feature = "serializable", typetag::serde)]
impl Kernel for StdPeriodic {
    fn name(&self) -> String {
        "std_periodic".to_string()
    }

    fn input_dim(&self) -> Option<usize> {
        match self.lengthscale.len() {
            1 => None,
            n => Some(n),
        }
    }

    fn value(&self, x: &ArrayView2<f64>, z: &ArrayView2<f64>) -> Array2<f64> {
        let sines = self.sines(x, z);
        let sigma2 = self.variance();
        self.exponent(&sines, (x.nrows(), z.nrows()))
            .mapv(|e| sigma2 * (-0.5 * e).exp())
    }

    fn diag(&self, x: &ArrayView2<f64>) -> Array1<f64> {
        Array1::from_elem(x.nrows(), self.variance())
    }

    fn params(&self) -> Vec<(String, &Param)> {
        let mut params = vec![
            ("variance".to_string(), &self.variance),
            ("period".to_string(), &self.period),
        ];
        params.extend(
            lengthscale_names(self.lengthscale.len())
                .into_iter()
                .zip(self.lengthscale.iter()),
        );
        params
    }

    fn params_mut(&mut self) -> Vec<&mut Param> {
        let mut params = vec![&mut self.variance, &mut self.period];
        params.extend(self.lengthscale.iter_mut());
        params
    }

    fn gradients(&self, x: &ArrayView2<f64>) -> Vec<Array2<f64>> {
        let n = x.nrows();
        let sines = self.sines(x, x);
        let p = self.period();
        let sigma2 = self.variance();
        let k = self
            .exponent(&sines, (n, n))
            .mapv(|e| sigma2 * (-0.5 * e).exp());

        // d exponent / d period, exponent being -1/2 sum_j s_j^2 / l_j^2
        let mut dperiod = Array2::<f64>::zeros((n, n));
        let mut dls: Vec<Array2<f64>> = vec![Array2::zeros((n, n)); self.lengthscale.len()];
        for (j, (s, d)) in sines.iter().enumerate() {
            let l = self.lengthscale(j);
            Zip::from(&mut dperiod).and(s).and(d).for_each(|g, &s, &d| {
                let c = (PI * d / p).cos();
                *g += s * c * PI * d / (p * p * l * l);
            });
            let idx = if self.lengthscale.len() == 1 { 0 } else { j };
            Zip::from(&mut dls[idx])
                .and(s)
                .for_each(|g, &s| *g += s * s / (l * l * l));
        }

        let mut grads = vec![k.mapv(|v| v / sigma2), &k * &dperiod];
        grads.extend(dls.into_iter().map(|g| &k * &g));
        grads
    }

    fn box_clone(&self) -> Box<dyn Kernel> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn test_periodicity() {
        let k = StdPeriodic::new(1.5, 0.8, 2.).unwrap();
        let x = array![[0.3]];
        let z = array![[0.7], [2.7], [-3.3]];
        let v = k.value(&x.view(), &z.view());
        assert_abs_diff_eq!(v[[0, 0]], v[[0, 1]], epsilon = 1e-12);
        let at_period = k.value(&x.view(), &array![[4.3]].view());
        assert_abs_diff_eq!(at_period[[0, 0]], 1.5, epsilon = 1e-12);
    }
}
