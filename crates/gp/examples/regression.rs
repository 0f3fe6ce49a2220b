use env_logger::{Builder, Env};
use gpkit::kernels::{Kernel, Rbf, White};
use gpkit::metrics::PredictScore;
use gpkit::{GaussianProcess, OptimizerConfig};
use linfa::prelude::*;
use ndarray::{arr2, concatenate, Array, Array1, Array2, Axis};

fn xsinx(x: &Array2<f64>) -> Array1<f64> {
    ((x - 3.5) * ((x - 3.5) / std::f64::consts::PI).mapv(|v| v.sin())).remove_axis(Axis(1))
}

fn main() {
    let env = Env::new().filter_or("GPKIT_LOG", "info");
    Builder::from_env(env)
        .target(env_logger::Target::Stdout)
        .try_init()
        .ok();

    let xt = arr2(&[[0.0], [5.0], [10.0], [15.0], [18.0], [20.0], [25.0]]);
    let yt = xsinx(&xt);

    println!("Train GP surrogate of 'xsinx' at {}", xt.column(0));
    let kernel = Rbf::new(10., 5.).expect("valid kernel").boxed()
        + White::new(1e-4).expect("valid kernel").boxed();
    let gp = GaussianProcess::params(kernel)
        .noise_variance(1e-6)
        .fix_noise(true)
        .optimize(OptimizerConfig::default())
        .fit(&Dataset::new(xt, yt))
        .expect("GP fitting");
    println!("{gp}");
    for h in gp.hyperparameters() {
        println!("  {} = {:.4} (fixed: {})", h.name, h.value, h.fixed);
    }
    println!("LOO Q2 = {:.4}", gp.looq2_score());

    let xtest = Array::<f64, _>::linspace(0., 25., 26).insert_axis(Axis(1));
    let ytest = xsinx(&xtest);
    let (ypred, yvar) = gp.predict_valvar(&xtest).expect("GP prediction");
    let ysigma = yvar.mapv(f64::sqrt);

    println!("Compute prediction errors (x, err(x), sigma(x))");
    println!(
        "{}",
        concatenate![
            Axis(1),
            xtest,
            (ypred - ytest).insert_axis(Axis(1)),
            ysigma.insert_axis(Axis(1))
        ]
    );
}
