use criterion::{criterion_group, criterion_main, Criterion};
use gpkit::kernels::{Kernel, Matern52, Rbf};
use gpkit::{GaussianProcess, OptimizerConfig};
use linfa::prelude::{Dataset, Fit};
use ndarray::{Array, Array1, Array2, Zip};
use ndarray_rand::rand::SeedableRng;
use ndarray_rand::rand_distr::Uniform;
use ndarray_rand::RandomExt;
use rand_xoshiro::Xoshiro256Plus;

fn griewank(x: &Array2<f64>) -> Array1<f64> {
    let dim = x.ncols();
    let d = Array1::linspace(1., dim as f64, dim).mapv(|v| v.sqrt());
    let mut y = Array1::zeros(x.nrows());
    Zip::from(&mut y).and(x.rows()).for_each(|y, x| {
        *y = x.mapv(|v| v * v).sum() / 4000.
            - (x.to_owned() / &d)
                .mapv(|v| v.cos())
                .fold(1f64, |acc, x| acc * x)
            + 1.0
    });
    y
}

fn criterion_gp(c: &mut Criterion) {
    let dims = [2, 5];
    let nts = [100, 300];

    let mut group = c.benchmark_group("gp");
    group.sample_size(20);
    for (&dim, &nt) in dims.iter().zip(nts.iter()) {
        let mut rng = Xoshiro256Plus::seed_from_u64(42);
        let xt = Array::random_using((nt, dim), Uniform::<f64>::new(-10., 10.), &mut rng);
        let yt = griewank(&xt);

        group.bench_function(format!("gp fit {dim}x{nt}"), |b| {
            b.iter(|| {
                std::hint::black_box(
                    GaussianProcess::params(Box::new(Rbf::new(1., 2.).unwrap()))
                        .noise_variance(1e-4)
                        .fit(&Dataset::new(xt.to_owned(), yt.to_owned()))
                        .expect("GP fit error"),
                )
            });
        });

        let gp = GaussianProcess::params(Box::new(Rbf::new(1., 2.).unwrap()))
            .noise_variance(1e-4)
            .fit(&Dataset::new(xt.to_owned(), yt.to_owned()))
            .expect("GP fit error");
        let xtest = Array::random_using((1000, dim), Uniform::<f64>::new(-10., 10.), &mut rng);
        group.bench_function(format!("gp predict {dim}x{nt}"), |b| {
            b.iter(|| std::hint::black_box(gp.predict_valvar(&xtest).expect("GP prediction")))
        });
    }

    let mut rng = Xoshiro256Plus::seed_from_u64(42);
    let xt = Array::random_using((50, 2), Uniform::<f64>::new(-10., 10.), &mut rng);
    let yt = griewank(&xt);
    group.bench_function("gp optimize 2x50", |b| {
        b.iter(|| {
            let kernel: Box<dyn Kernel> = Box::new(Matern52::ard(1., &[1., 1.]).unwrap());
            std::hint::black_box(
                GaussianProcess::params(kernel)
                    .noise_variance(1e-4)
                    .optimize(OptimizerConfig::default())
                    .fit(&Dataset::new(xt.to_owned(), yt.to_owned()))
                    .expect("GP fit error"),
            )
        });
    });
    group.finish();
}

criterion_group!(benches, criterion_gp);
criterion_main!(benches);
