use env_logger::{Builder, Env};
use gpkit::kernels::Rbf;
use gpkit::{GaussianProcessClassifier, Link, OptimizerConfig};
use linfa::prelude::*;
use ndarray::{array, Array, Axis};
use ndarray_rand::rand::SeedableRng;
use ndarray_rand::rand_distr::Uniform;
use ndarray_rand::RandomExt;
use rand_xoshiro::Xoshiro256Plus;

fn main() {
    let env = Env::new().filter_or("GPKIT_LOG", "info");
    Builder::from_env(env)
        .target(env_logger::Target::Stdout)
        .try_init()
        .ok();

    // label 1 inside the disk of radius 0.3 centered at (0.5, 0.5), -1 outside
    let mut rng = Xoshiro256Plus::seed_from_u64(42);
    let xt = Array::random_using((80, 2), Uniform::<f64>::new(0., 1.), &mut rng);
    let yt = xt.map_axis(Axis(1), |row| {
        if (row[0] - 0.5).powi(2) + (row[1] - 0.5).powi(2) < 0.09 {
            1.
        } else {
            -1.
        }
    });

    let gpc = GaussianProcessClassifier::params(Box::new(Rbf::new(4., 0.3).expect("valid kernel")))
        .link(Link::Logistic)
        .optimize(OptimizerConfig::default())
        .fit(&Dataset::new(xt, yt))
        .expect("GPC fitting");
    println!("{gpc}");

    let xtest = array![[0.5, 0.5], [0.7, 0.5], [0.8, 0.5], [0.95, 0.95]];
    let proba = gpc.predict_proba(&xtest).expect("GPC prediction");
    let labels = gpc.predict(&xtest);
    for ((x, p), l) in xtest.rows().into_iter().zip(proba.iter()).zip(labels.iter()) {
        println!("x = {x}: p(+1) = {p:.3}, label = {l}");
    }
}
