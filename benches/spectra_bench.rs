//! Benchmarks for the spectral and turbulence paths.
//!
//! Run with: `cargo bench --bench spectra_bench`
//!
//! Compares PSD cost across FFT lengths and measures the TKE and rotation
//! passes on a 30 minute, 32 Hz point record.

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use ndarray::{Array1, Array2, Array3};
use velocity_rs::rotate::matrix::rotation_z;
use velocity_rs::{CoordSys, Dataset, PsdOptions, VelBinner};

const FS: f64 = 32.0;
const N: usize = 57_600;

/// Generate a synthetic ADV record with a rotating orientation.
fn generate_record(n: usize) -> Dataset {
    let time = Array1::from_iter((0..n).map(|i| i as f64 / FS));
    let vel = Array2::from_shape_fn((3, n), |(c, t)| {
        let t = t as f64 / FS;
        let phase = c as f64 * 0.7;
        0.5 + 0.1 * (0.3 * t + phase).sin() + 0.02 * (11.0 * t + 2.0 * phase).cos()
    });
    let mut orientmat = Array3::zeros((3, 3, n));
    for t in 0..n {
        let r = rotation_z(1e-4 * t as f64);
        for i in 0..3 {
            for j in 0..3 {
                orientmat[[i, j, t]] = r[i][j];
            }
        }
    }
    Dataset::from_series(time, vel, FS, CoordSys::Inst)
        .unwrap()
        .with_orientmat(orientmat)
        .unwrap()
}

/// Benchmark PSD estimation for different FFT lengths.
fn bench_psd(c: &mut Criterion) {
    let mut group = c.benchmark_group("psd");
    let ds = generate_record(N);

    for n_fft in [256, 1024, 4096] {
        let binner = VelBinner::new(9600, FS).with_n_fft(n_fft);
        group.bench_with_input(BenchmarkId::new("calc_vel_psd", n_fft), &n_fft, |b, _| {
            b.iter(|| {
                binner
                    .calc_vel_psd(black_box(&ds), &PsdOptions::default())
                    .unwrap()
            });
        });
    }

    group.finish();
}

/// Benchmark TKE and stress estimation.
fn bench_tke(c: &mut Criterion) {
    let ds = generate_record(N);
    let binner = VelBinner::new(9600, FS);

    c.bench_function("do_tke", |b| {
        b.iter(|| binner.do_tke(black_box(&ds), None).unwrap());
    });
}

/// Benchmark an inst -> earth rotation with per-sample orientation.
fn bench_rotation(c: &mut Criterion) {
    let ds = generate_record(N);

    c.bench_function("rotate_inst_earth", |b| {
        b.iter(|| velocity_rs::rotate2(black_box(&ds), CoordSys::Earth).unwrap());
    });
}

criterion_group!(benches, bench_psd, bench_tke, bench_rotation);
criterion_main!(benches);
