//! Save and load fitted models to and from files.

use crate::errors::Result;
use crate::{GaussianProcess, GaussianProcessClassifier};
use serde::{de::DeserializeOwned, Serialize};
use std::fs;
use std::io::Write;

#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
/// An enumeration of available model file formats
pub enum GpFileFormat {
    /// Human readable format
    #[default]
    Json,
}

fn save_model<T: Serialize>(model: &T, path: &str, format: GpFileFormat) -> Result<()> {
    let mut file = fs::File::create(path)?;
    let bytes = match format {
        GpFileFormat::Json => serde_json::to_vec(model)?,
    };
    file.write_all(&bytes)?;
    Ok(())
}

fn load_model<T: DeserializeOwned>(path: &str, format: GpFileFormat) -> Result<T> {
    let data = fs::read(path)?;
    let model = match format {
        GpFileFormat::Json => serde_json::from_slice(&data)?,
    };
    Ok(model)
}

impl GaussianProcess {
    /// Save GP model in given file.
    pub fn save(&self, path: &str, format: GpFileFormat) -> Result<()> {
        save_model(self, path, format)
    }

    /// Load GP model from the given file.
    pub fn load(path: &str, format: GpFileFormat) -> Result<Box<GaussianProcess>> {
        Ok(Box::new(load_model(path, format)?))
    }
}

impl GaussianProcessClassifier {
    /// Save GP classifier in given file.
    pub fn save(&self, path: &str, format: GpFileFormat) -> Result<()> {
        save_model(self, path, format)
    }

    /// Load GP classifier from the given file.
    pub fn load(path: &str, format: GpFileFormat) -> Result<Box<GaussianProcessClassifier>> {
        Ok(Box::new(load_model(path, format)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernels::{
        Kernel, Linear, Masked, Matern32, Polynomial, RatQuad, Rbf, StdPeriodic, Sum, White,
    };
    use crate::Link;
    use approx::assert_abs_diff_eq;
    use linfa::prelude::*;
    use ndarray::{array, Array, Array2, Axis};
    use ndarray_rand::rand::SeedableRng;
    use ndarray_rand::rand_distr::Uniform;
    use ndarray_rand::RandomExt;
    use rand_xoshiro::Xoshiro256Plus;

    const TEST_DIR: &str = "target/tests";

    #[test]
    fn test_save_load_gp() {
        std::fs::create_dir_all(TEST_DIR).ok();
        let mut rng = Xoshiro256Plus::seed_from_u64(42);
        let xt = Array::random_using((15, 2), Uniform::<f64>::new(0., 1.), &mut rng);
        let yt = xt.column(0).mapv(|v| (5. * v).cos()) * xt.column(1);

        let periodic = Matern32::ard(1., &[0.3, 0.5]).unwrap().boxed()
            * StdPeriodic::new(1., 0.8, 2.).unwrap().boxed();
        let kernel = Sum::new(vec![
            periodic,
            Box::new(Masked::new(Polynomial::new(0.5, 1., -0.2, 2).unwrap(), vec![0]).unwrap()),
            Box::new(RatQuad::new(0.3, 0.4, 1.5).unwrap()),
            Box::new(Masked::new(Linear::new(0.1).unwrap(), vec![1]).unwrap()),
            Box::new(White::new(1e-3).unwrap()),
        ]);
        let mut gp = GaussianProcess::params(Box::new(kernel))
            .noise_variance(1e-2)
            .fit(&Dataset::new(xt, yt))
            .expect("GP fit error");
        gp.fix("sum.prod.std_periodic.period").unwrap();

        let filename = format!("{TEST_DIR}/saved_gp.json");
        gp.save(&filename, GpFileFormat::Json).expect("GP saving");
        let loaded = GaussianProcess::load(&filename, GpFileFormat::Json).expect("GP loading");

        let xtest = array![[0.1, 0.2], [0.5, 0.9], [1.3, -0.4]];
        let (mean, var) = gp.predict_valvar(&xtest).unwrap();
        let (mean2, var2) = loaded.predict_valvar(&xtest).unwrap();
        assert_abs_diff_eq!(mean, mean2, epsilon = 1e-12);
        assert_abs_diff_eq!(var, var2, epsilon = 1e-12);
        for (h, l) in gp.hyperparameters().iter().zip(loaded.hyperparameters()) {
            assert_eq!(h.name, l.name);
            assert_eq!(h.fixed, l.fixed);
            assert_abs_diff_eq!(h.value, l.value, epsilon = 1e-14);
        }
        assert_abs_diff_eq!(
            gp.log_marginal_likelihood(),
            loaded.log_marginal_likelihood(),
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_save_load_gpc() {
        std::fs::create_dir_all(TEST_DIR).ok();
        let xt = Array::<f64, _>::linspace(-1., 1., 12).insert_axis(Axis(1));
        let yt = xt.column(0).mapv(|v| if v.abs() < 0.5 { 1. } else { -1. });
        let gpc = GaussianProcessClassifier::params(Box::new(Rbf::new(4., 0.3).unwrap()))
            .link(Link::Probit)
            .fit(&Dataset::new(xt, yt))
            .expect("GPC fit error");

        let filename = format!("{TEST_DIR}/saved_gpc.json");
        gpc.save(&filename, GpFileFormat::Json).expect("GPC saving");
        let loaded =
            GaussianProcessClassifier::load(&filename, GpFileFormat::Json).expect("GPC loading");

        let xtest: Array2<f64> = array![[0.], [0.45], [0.9]];
        assert_abs_diff_eq!(
            gpc.predict_proba(&xtest).unwrap(),
            loaded.predict_proba(&xtest).unwrap(),
            epsilon = 1e-12
        );
        assert_eq!(loaded.link(), Link::Probit);
    }

    #[test]
    fn test_load_missing_file() {
        let res = GaussianProcess::load("target/tests/does_not_exist.json", GpFileFormat::Json);
        assert!(matches!(res, Err(crate::GpError::LoadIoError(_))));
    }
}
