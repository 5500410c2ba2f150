/// Profiler friendly benchmark for the FFT-accelerated interaction MatVec.

use criterion::{criterion_group, criterion_main, Criterion};
use num_complex::Complex64;

use dda_core::config::RunConfigBuilder;
use dda_core::geometry::{Lattice, OccupancyGrid};
use dda_core::interaction::FftMatVec;
use dda_core::polarizability::all_material_alphas;
use dda_core::solvers::MatVec;

fn filled_cube(n: usize) -> OccupancyGrid {
    let mut grid = OccupancyGrid::new(n, n, n);
    for iz in 0..n {
        for iy in 0..n {
            for ix in 0..n {
                grid.set(ix, iy, iz, 0);
            }
        }
    }
    grid
}

fn my_benchmark(c: &mut Criterion) {
    const N: usize = 16;
    let config = RunConfigBuilder::new()
        .lambda(std::f64::consts::TAU)
        .dpl(10.0)
        .refr_index(vec![Complex64::new(1.5, 0.01)])
        .build()
        .unwrap();

    let grid = filled_cube(N);
    let lattice = Lattice::from_occupancy(&grid, config.d, 0, 1).unwrap();
    let alphas = all_material_alphas(&config).unwrap();
    let matvec = FftMatVec::new(&config, &lattice, &alphas).unwrap();

    let x = vec![Complex64::new(1.0, 0.0); 3 * lattice.local_ndip];
    let mut y = vec![Complex64::new(0.0, 0.0); 3 * lattice.local_ndip];

    c.bench_function("fft_matvec_apply_16_cubed", |b| {
        b.iter(|| {
            matvec.apply(&x, &mut y).unwrap();
        })
    });
}

criterion_group! {
    name = benches;
    config = Criterion::default().sample_size(10);
    targets = my_benchmark
}
criterion_main!(benches);
