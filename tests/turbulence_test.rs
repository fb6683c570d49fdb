//! Integration tests for the turbulence and spectral engine.
//!
//! Uses synthetic records with known variance, covariance and spectra.

use approx::assert_relative_eq;
use ndarray::{Array1, Array2, Array3};
use num_complex::Complex64;
use std::f64::consts::PI;
use velocity_rs::io::parse_userdata;
use velocity_rs::{
    CoordSys, CsdOptions, Dataset, FreqUnits, PsdOptions, StressVector, TkeVector, VelBinner,
    VelocityError, Window, read_userdata,
};

/// Uniform noise on [-0.5, 0.5) from a linear congruential generator.
fn white_noise(n: usize, seed: u64) -> Vec<f64> {
    let mut state = seed;
    (0..n)
        .map(|_| {
            state = state
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            (state >> 11) as f64 / (1u64 << 53) as f64 - 0.5
        })
        .collect()
}

fn noise_dataset(n: usize, fs: f64) -> Dataset {
    let time = Array1::from_iter((0..n).map(|i| i as f64 / fs));
    let mut vel = Array2::zeros((3, n));
    for c in 0..3 {
        let x = white_noise(n, 17 + c as u64);
        for t in 0..n {
            vel[[c, t]] = 0.3 + (c + 1) as f64 * 0.1 * x[t];
        }
    }
    Dataset::from_series(time, vel, fs, CoordSys::Earth).unwrap()
}

/// Square waves with exact variances `amp²` and exactly known covariances.
fn square_wave_dataset(n: usize, amp: [f64; 3], mean: [f64; 3]) -> Dataset {
    let time = Array1::from_iter((0..n).map(|i| i as f64));
    let vel = Array2::from_shape_fn((3, n), |(c, t)| {
        let sign = if t % 2 == 0 { 1.0 } else { -1.0 };
        mean[c] + amp[c] * sign
    });
    Dataset::from_series(time, vel, 1.0, CoordSys::Earth).unwrap()
}

#[test]
fn test_known_variance_single_bin() {
    let n = 1000;
    let ds = square_wave_dataset(n, [0.3, 0.2, 0.1], [1.0, -0.5, 0.0]);
    let tke = VelBinner::new(n, 1.0).calc_tke(&ds, [0.0; 3]).unwrap();

    assert_eq!(tke.values.dim(), (3, 1, 1));
    assert_relative_eq!(tke.values[[0, 0, 0]], 0.09_f32, epsilon = 1e-6);
    assert_relative_eq!(tke.values[[1, 0, 0]], 0.04_f32, epsilon = 1e-6);
    assert_relative_eq!(tke.values[[2, 0, 0]], 0.01_f32, epsilon = 1e-6);
    assert_relative_eq!(tke.time[0], 499.5);
    assert_eq!(TkeVector::LABELS, ["u'u'_", "v'v'_", "w'w'_"]);
}

#[test]
fn test_noise_subtracted_per_component() {
    let n = 1000;
    let ds = square_wave_dataset(n, [0.3, 0.2, 0.1], [0.0; 3]);
    let binner = VelBinner::new(n, 1.0);
    let tke = binner.calc_tke(&ds, [0.1, 0.0, 0.0]).unwrap();
    assert_relative_eq!(tke.values[[0, 0, 0]], 0.08_f32, epsilon = 1e-6);
    assert_relative_eq!(tke.values[[1, 0, 0]], 0.04_f32, epsilon = 1e-6);

    // Noise larger than the signal leaves a negative variance
    let over = binner.calc_tke(&ds, [0.0, 0.0, 0.2]).unwrap();
    assert!(over.values[[2, 0, 0]] < 0.0);
}

#[test]
fn test_stress_ordering() {
    // u = s, v = 2s, w = -s for a ±1 square wave s
    let n = 100;
    let time = Array1::from_iter((0..n).map(|i| i as f64));
    let vel = Array2::from_shape_fn((3, n), |(c, t)| {
        let s = if t % 2 == 0 { 1.0 } else { -1.0 };
        [1.0, 2.0, -1.0][c] * s
    });
    let ds = Dataset::from_series(time, vel, 1.0, CoordSys::Earth).unwrap();
    let stress = VelBinner::new(n, 1.0).calc_stress(&ds).unwrap();

    assert_eq!(StressVector::LABELS, ["u'v'_", "u'w'_", "v'w'_"]);
    assert_relative_eq!(stress.values[[0, 0, 0]], 2.0_f32);
    assert_relative_eq!(stress.values[[1, 0, 0]], -1.0_f32);
    assert_relative_eq!(stress.values[[2, 0, 0]], -2.0_f32);
}

#[test]
fn test_freq_units_consistent() {
    let binner = VelBinner::new(512, 32.0).with_n_fft(256).with_n_fft_coh(128);
    for coh in [false, true] {
        let hz = binner.calc_freq(FreqUnits::Hz, coh).unwrap();
        let rad = binner.calc_freq(FreqUnits::RadPerSec, coh).unwrap();
        assert_eq!(hz.len(), if coh { 64 } else { 128 });
        for (f, w) in hz.iter().zip(rad.iter()) {
            assert_relative_eq!(*f, w / (2.0 * PI), epsilon = 1e-12);
        }
    }
}

#[test]
fn test_psd_integrates_to_variance() {
    let n = 8192;
    let fs = 16.0;
    let ds = noise_dataset(n, fs);
    let binner = VelBinner::new(n, fs).with_n_fft(256);
    let psd = binner
        .calc_vel_psd(&ds, &PsdOptions::default().with_n_pad(0))
        .unwrap();
    let tke = binner.calc_tke(&ds, [0.0; 3]).unwrap();

    let df = psd.freq[1] - psd.freq[0];
    for i in 0..3 {
        let integral: f64 = (0..psd.freq.len())
            .map(|k| psd.values[[i, 0, 0, k]] as f64 * df)
            .sum();
        let var = tke.values[[i, 0, 0]] as f64;
        assert!(
            (integral / var - 1.0).abs() < 0.1,
            "component {i}: PSD integral {integral:.5} vs variance {var:.5}"
        );
    }
}

#[test]
fn test_psd_of_sine_peaks_at_frequency() {
    let n = 1024;
    let fs = 8.0;
    let f0 = 1.0;
    let time = Array1::from_iter((0..n).map(|i| i as f64 / fs));
    let vel = Array2::from_shape_fn((3, n), |(_, t)| (2.0 * PI * f0 * t as f64 / fs).sin());
    let ds = Dataset::from_series(time, vel, fs, CoordSys::Earth).unwrap();
    let psd = VelBinner::new(512, fs)
        .with_n_fft(128)
        .calc_vel_psd(&ds, &PsdOptions::default())
        .unwrap();

    assert_eq!(psd.values.dim(), (3, 1, 2, 64));
    for b in 0..2 {
        let row: Vec<f32> = (0..64).map(|k| psd.values[[0, 0, b, k]]).collect();
        let imax = row
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(k, _)| k)
            .unwrap();
        assert_relative_eq!(psd.freq[imax], f0);
    }
}

#[test]
fn test_psd_noise_floor_stays_positive() {
    let ds = noise_dataset(2048, 16.0);
    let binner = VelBinner::new(1024, 16.0).with_n_fft(128);
    let psd = binner
        .calc_vel_psd(&ds, &PsdOptions::default().with_noise([1.0, 1.0, 1.0]))
        .unwrap();
    assert!(psd.values.iter().all(|&x| x > 0.0));
}

#[test]
fn test_csd_of_identical_components_equals_psd() {
    let n = 1024;
    let fs = 8.0;
    let x = white_noise(n, 99);
    let time = Array1::from_iter((0..n).map(|i| i as f64 / fs));
    let vel = Array2::from_shape_fn((3, n), |(_, t)| x[t]);
    let ds = Dataset::from_series(time, vel, fs, CoordSys::Earth).unwrap();

    let binner = VelBinner::new(512, fs).with_n_fft(64);
    for units in [FreqUnits::Hz, FreqUnits::RadPerSec] {
        let psd = binner
            .calc_vel_psd(
                &ds,
                &PsdOptions::default().with_n_pad(0).with_freq_units(units),
            )
            .unwrap();
        let csd = binner
            .calc_vel_csd(&ds, &CsdOptions::default().with_freq_units(units))
            .unwrap();
        assert_eq!(csd.freq, psd.freq);
        assert_eq!(csd.units(), psd.units());
        for (c, p) in csd.values.iter().zip(psd.values.iter()) {
            assert_relative_eq!(c.re as f32, *p, max_relative = 1e-5);
            assert!(c.im.abs() < 1e-9);
        }
    }
}

#[test]
fn test_rotate_u_noise_guard() {
    let ds = noise_dataset(2048, 16.0);
    let binner = VelBinner::new(1024, 16.0).with_n_fft(128);
    let rotated = PsdOptions::default().with_rotate_u(true);

    let none = binner.calc_vel_psd(&ds, &rotated).unwrap();
    let equal = binner
        .calc_vel_psd(&ds, &rotated.clone().with_noise([0.01, 0.01, 0.0]))
        .unwrap();
    let unequal = binner
        .calc_vel_psd(&ds, &rotated.clone().with_noise([0.01, 0.02, 0.0]))
        .unwrap();

    // Equal noise levels are still corrected, unequal ones are dropped
    assert_ne!(none.values, equal.values);
    assert_eq!(none.values, unequal.values);
}

#[test]
fn test_csd_rotate_u_has_no_noise_correction() {
    // The cross-spectrum path never corrects for noise, rotated or not:
    // rotating inside the binner equals rotating the data beforehand.
    let n = 512;
    let ds = noise_dataset(n, 8.0);
    let binner = VelBinner::new(n, 8.0).with_n_fft(64);

    let inside = binner
        .calc_vel_csd(&ds, &CsdOptions::default().with_rotate_u(true))
        .unwrap();

    let mut pre = ds.clone();
    let mean = (0..n).fold(Complex64::new(0.0, 0.0), |acc, t| {
        acc + Complex64::new(ds.vel[[0, 0, t]], ds.vel[[1, 0, t]])
    }) / n as f64;
    let rot = Complex64::from_polar(1.0, -mean.arg());
    for t in 0..n {
        let z = Complex64::new(ds.vel[[0, 0, t]], ds.vel[[1, 0, t]]) * rot;
        pre.vel[[0, 0, t]] = z.re;
        pre.vel[[1, 0, t]] = z.im;
    }
    let outside = binner.calc_vel_csd(&pre, &CsdOptions::default()).unwrap();

    for (a, b) in inside.values.iter().zip(outside.values.iter()) {
        assert!((a - b).norm() < 1e-12);
    }
}

#[test]
fn test_spectra_reject_zero_bin_size() {
    let ds = noise_dataset(64, 1.0);
    let binner = VelBinner::new(32, 1.0);

    for rotate_u in [false, true] {
        let psd = binner.calc_vel_psd(
            &ds,
            &PsdOptions::default().with_n_bin(0).with_rotate_u(rotate_u),
        );
        assert!(
            matches!(psd, Err(VelocityError::InvalidParameter(_))),
            "PSD with n_bin = 0 should be rejected (rotate_u = {rotate_u})"
        );

        let csd = binner.calc_vel_csd(
            &ds,
            &CsdOptions::default().with_n_bin(0).with_rotate_u(rotate_u),
        );
        assert!(
            matches!(csd, Err(VelocityError::InvalidParameter(_))),
            "CSD with n_bin = 0 should be rejected (rotate_u = {rotate_u})"
        );
    }
}

#[test]
fn test_binned_pipeline() {
    let n = 2048;
    let fs = 16.0;
    let raw = noise_dataset(n, fs);
    let binner = VelBinner::new(512, fs).with_n_fft(128);

    let mut avg = binner.do_tke(&raw, None).unwrap();
    avg.psd = Some(
        binner
            .calc_vel_psd(&raw, &PsdOptions::default().with_window(Window::Hann))
            .unwrap(),
    );

    assert_eq!(avg.n_time(), 4);
    assert_eq!(avg.attrs.fs, fs);
    assert_eq!(avg.attrs.n_fft, Some(128));

    let view = avg.velocity();
    let report = view.tau_is_pd().unwrap();
    assert_eq!(report.n_checked, 4);
    assert!(report.all_pd());

    // Covariance matrices of real data satisfy Cauchy-Schwarz
    let e_coh = view.e_coh().unwrap();
    let tke = view.tke().unwrap();
    assert!(e_coh.iter().zip(tke.iter()).all(|(e, k)| *e <= 2.0 * k));

    let i_tke = view.i_tke(0.0).unwrap();
    let u_mag = view.u_mag();
    for ((i, k), m) in i_tke.iter().zip(tke.iter()).zip(u_mag.iter()) {
        assert_relative_eq!(*i, (2.0 * k).sqrt() / m, epsilon = 1e-12);
    }

    let k = view.wavenumber().unwrap();
    let psd = avg.psd.as_ref().unwrap();
    assert_eq!(k.dim(), (3, 1, 4, 64));
    assert_relative_eq!(
        k[[0, 0, 1, 5]],
        2.0 * PI * psd.freq[5] / avg.vel[[0, 0, 1]],
        epsilon = 1e-12
    );

    assert!(view.intensity(0.0).unwrap().iter().all(|x| *x > 0.0));
}

#[test]
fn test_userdata_file_applied() {
    let n = 16;
    let time = Array1::from_iter((0..n).map(|i| i as f64));
    let mut om = Array3::zeros((3, 3, n));
    for t in 0..n {
        for i in 0..3 {
            om[[i, i, t]] = 1.0;
        }
    }
    let mut vel = Array2::zeros((3, n));
    vel.row_mut(1).fill(1.0);
    let mut ds = Dataset::from_series(time, vel, 4.0, CoordSys::Earth)
        .unwrap()
        .with_orientmat(om)
        .unwrap();

    let path = std::env::temp_dir().join(format!("velocity_rs_userdata_{}.json", std::process::id()));
    std::fs::write(&path, r#"{"declination": 90.0, "fs": 8.0}"#).unwrap();
    let userdata = read_userdata(&path).unwrap();
    std::fs::remove_file(&path).unwrap();

    userdata.apply(&mut ds).unwrap();
    assert_eq!(ds.attrs.fs, 8.0);
    // Magnetic north becomes true east
    assert_relative_eq!(ds.vel[[0, 0, 0]], 1.0, epsilon = 1e-12);
    assert!(ds.vel[[1, 0, 0]].abs() < 1e-12);

    assert!(parse_userdata("not json").is_err());
}
