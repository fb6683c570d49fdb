//! Velocity auto- and cross-spectra.

use ndarray::{Array1, Array3, Array4, s};
use num_complex::Complex64;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{CROSS_PAIRS, VelBinner};
use crate::binning::{SegmentOptions, Window, fft_frequency};
use crate::dataset::Dataset;
use crate::error::Result;
use crate::types::FreqUnits;

/// Options for [`VelBinner::calc_vel_psd`].
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PsdOptions {
    pub freq_units: FreqUnits,
    /// Sample rate override (Hz); defaults to the binner's.
    pub fs: Option<f64>,
    pub window: Window,
    /// White-noise level of each component (m/s).
    pub noise: [f64; 3],
    pub n_bin: Option<usize>,
    pub n_fft: Option<usize>,
    pub n_pad: Option<usize>,
    /// Rotate each bin of horizontal velocity onto its mean direction first.
    pub rotate_u: bool,
    /// Ensemble step; defaults to at least 50% overlap.
    pub step: Option<usize>,
}

impl PsdOptions {
    pub fn with_freq_units(mut self, units: FreqUnits) -> Self {
        self.freq_units = units;
        self
    }

    pub fn with_fs(mut self, fs: f64) -> Self {
        self.fs = Some(fs);
        self
    }

    pub fn with_window(mut self, window: Window) -> Self {
        self.window = window;
        self
    }

    pub fn with_noise(mut self, noise: [f64; 3]) -> Self {
        self.noise = noise;
        self
    }

    pub fn with_n_bin(mut self, n_bin: usize) -> Self {
        self.n_bin = Some(n_bin);
        self
    }

    pub fn with_n_fft(mut self, n_fft: usize) -> Self {
        self.n_fft = Some(n_fft);
        self
    }

    pub fn with_n_pad(mut self, n_pad: usize) -> Self {
        self.n_pad = Some(n_pad);
        self
    }

    pub fn with_rotate_u(mut self, rotate_u: bool) -> Self {
        self.rotate_u = rotate_u;
        self
    }

    pub fn with_step(mut self, step: usize) -> Self {
        self.step = Some(step);
        self
    }
}

/// Options for [`VelBinner::calc_vel_csd`].
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CsdOptions {
    pub freq_units: FreqUnits,
    pub fs: Option<f64>,
    pub window: Window,
    pub n_bin: Option<usize>,
    /// FFT length; defaults to the binner's `n_fft_coh`.
    pub n_fft: Option<usize>,
    pub rotate_u: bool,
}

impl CsdOptions {
    pub fn with_freq_units(mut self, units: FreqUnits) -> Self {
        self.freq_units = units;
        self
    }

    pub fn with_fs(mut self, fs: f64) -> Self {
        self.fs = Some(fs);
        self
    }

    pub fn with_window(mut self, window: Window) -> Self {
        self.window = window;
        self
    }

    pub fn with_n_bin(mut self, n_bin: usize) -> Self {
        self.n_bin = Some(n_bin);
        self
    }

    pub fn with_n_fft(mut self, n_fft: usize) -> Self {
        self.n_fft = Some(n_fft);
        self
    }

    pub fn with_rotate_u(mut self, rotate_u: bool) -> Self {
        self.rotate_u = rotate_u;
        self
    }
}

/// Velocity power spectra `[3, cell, bin, freq]`, labelled by [`Spectrum::LABELS`].
#[derive(Clone, Debug, PartialEq)]
pub struct Spectrum {
    /// Bin-mean time.
    pub time: Array1<f64>,
    /// Frequency axis, in `freq_units`.
    pub freq: Array1<f64>,
    pub freq_units: FreqUnits,
    pub n_fft: usize,
    pub values: Array4<f32>,
}

impl Spectrum {
    pub const LABELS: [&'static str; 3] = ["Suu", "Svv", "Sww"];

    /// Units of the spectral density.
    pub fn units(&self) -> &'static str {
        self.freq_units.spectral_units()
    }

    /// Name of the frequency axis, `f` or `omega`.
    pub fn freq_key(&self) -> &'static str {
        self.freq_units.key()
    }
}

/// Velocity cross-spectra `[3, cell, bin, freq]` for [`CROSS_PAIRS`].
#[derive(Clone, Debug, PartialEq)]
pub struct CrossSpectrum {
    pub time: Array1<f64>,
    pub freq: Array1<f64>,
    pub freq_units: FreqUnits,
    pub n_fft: usize,
    pub values: Array4<Complex64>,
}

impl CrossSpectrum {
    pub const LABELS: [&'static str; 3] = ["Suv", "Suw", "Svw"];

    pub fn units(&self) -> &'static str {
        self.freq_units.spectral_units()
    }

    pub fn freq_key(&self) -> &'static str {
        self.freq_units.key()
    }
}

/// Rotate each bin of `u + iv` so that its mean direction lies along `u`.
///
/// Samples past the last whole bin are left as they are. With `skip_nan`
/// the bin mean ignores non-finite samples.
fn rotate_bins(vel: &mut Array3<f64>, n_bin: usize, skip_nan: bool) {
    let (_, n_cells, n_time) = vel.dim();
    let n_bins = n_time / n_bin;
    for cell in 0..n_cells {
        for b in 0..n_bins {
            let range = b * n_bin..(b + 1) * n_bin;
            let (mut sum, mut n) = (Complex64::new(0.0, 0.0), 0usize);
            for t in range.clone() {
                let z = Complex64::new(vel[[0, cell, t]], vel[[1, cell, t]]);
                if skip_nan && !z.is_finite() {
                    continue;
                }
                sum += z;
                n += 1;
            }
            let mean = sum / n as f64;
            let rot = Complex64::from_polar(1.0, -mean.arg());
            for t in range {
                let z = Complex64::new(vel[[0, cell, t]], vel[[1, cell, t]]) * rot;
                vel[[0, cell, t]] = z.re;
                vel[[1, cell, t]] = z.im;
            }
        }
    }
}

impl VelBinner {
    /// Power spectral density of the first three velocity components.
    ///
    /// Angular units scale the sample rate by 2π, so densities are per rad/s.
    /// With `rotate_u` each bin is rotated onto its mean horizontal
    /// direction; since the rotation mixes `u` and `v`, unequal `u` and `v`
    /// noise levels cannot be corrected and both are dropped with a warning.
    pub fn calc_vel_psd(&self, ds: &Dataset, opts: &PsdOptions) -> Result<Spectrum> {
        let binner = self.binner();
        let units = opts.freq_units;
        let fs = binner.parse_fs(opts.fs) * units.fs_scale();
        let n_bin = binner.parse_nbin(opts.n_bin)?;
        let n_fft = opts.n_fft.unwrap_or(binner.n_fft);
        let time = binner.mean_with(ds.time.view(), Some(n_bin))?;

        let mut vel = ds.vel.slice(s![..3, .., ..]).to_owned();
        let mut noise = opts.noise;
        if opts.rotate_u {
            rotate_bins(&mut vel, n_bin, true);
            if noise[0] != noise[1] {
                warn!(
                    noise_u = noise[0],
                    noise_v = noise[1],
                    "Noise levels differ for u and v; skipping noise correction of rotated velocity"
                );
                noise[0] = 0.0;
                noise[1] = 0.0;
            }
        }

        let seg = SegmentOptions {
            n_bin: Some(n_bin),
            n_fft: Some(n_fft),
            n_pad: opts.n_pad,
            step: opts.step,
        };
        let n_cells = vel.dim().1;
        let mut values = Array4::zeros((3, n_cells, time.len(), n_fft / 2));
        for i in 0..3 {
            for cell in 0..n_cells {
                let p = binner.psd(vel.slice(s![i, cell, ..]), fs, noise[i], &opts.window, &seg)?;
                values
                    .slice_mut(s![i, cell, .., ..])
                    .assign(&p.mapv(|x| x as f32));
            }
        }
        debug!(n_fft, n_bin, fs, units = %units, "Computed velocity PSD");

        Ok(Spectrum {
            time,
            freq: Array1::from(fft_frequency(n_fft, fs)),
            freq_units: units,
            n_fft,
            values,
        })
    }

    /// Cross-spectral density of the component pairs in [`CROSS_PAIRS`].
    ///
    /// Uses the cross-spectrum FFT length and no noise correction.
    /// Densities are scaled by the unit-adjusted sample rate (`2π·fs` for
    /// rad/s), so the self cross-spectrum matches [`VelBinner::calc_vel_psd`].
    pub fn calc_vel_csd(&self, ds: &Dataset, opts: &CsdOptions) -> Result<CrossSpectrum> {
        let binner = self.binner();
        let units = opts.freq_units;
        let fs = binner.parse_fs(opts.fs) * units.fs_scale();
        let n_bin = binner.parse_nbin(opts.n_bin)?;
        let n_fft = opts.n_fft.unwrap_or(binner.n_fft_coh);
        let time = binner.mean_with(ds.time.view(), Some(n_bin))?;

        let mut vel = ds.vel.slice(s![..3, .., ..]).to_owned();
        if opts.rotate_u {
            rotate_bins(&mut vel, n_bin, false);
        }

        let n_cells = vel.dim().1;
        let mut values =
            Array4::from_elem((3, n_cells, time.len(), n_fft / 2), Complex64::new(0.0, 0.0));
        for (idx, &(a, b)) in CROSS_PAIRS.iter().enumerate() {
            for cell in 0..n_cells {
                let c = binner.cpsd(
                    vel.slice(s![a, cell, ..]),
                    vel.slice(s![b, cell, ..]),
                    fs,
                    &opts.window,
                    Some(n_fft),
                    Some(n_bin),
                )?;
                values.slice_mut(s![idx, cell, .., ..]).assign(&c);
            }
        }
        debug!(n_fft, n_bin, fs, units = %units, "Computed velocity CSD");

        Ok(CrossSpectrum {
            time,
            freq: Array1::from(fft_frequency(n_fft, fs)),
            freq_units: units,
            n_fft,
            values,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CoordSys;
    use approx::assert_relative_eq;
    use ndarray::Array2;
    use std::f64::consts::PI;

    fn noisy(n: usize) -> Dataset {
        // Deterministic pseudo-random samples
        let mut state = 12345u64;
        let mut next = move || {
            state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            ((state >> 11) as f64 / (1u64 << 53) as f64) - 0.5
        };
        let time = Array1::from_iter((0..n).map(|i| i as f64 / 16.0));
        let vel = Array2::from_shape_fn((3, n), |(c, _)| 0.2 * (c + 1) as f64 + next());
        Dataset::from_series(time, vel, 16.0, CoordSys::Earth).unwrap()
    }

    #[test]
    fn test_psd_shape_and_units() {
        let ds = noisy(256);
        let binner = VelBinner::new(128, 16.0).with_n_fft(32);
        let psd = binner.calc_vel_psd(&ds, &PsdOptions::default()).unwrap();
        assert_eq!(psd.values.dim(), (3, 1, 2, 16));
        assert_eq!(psd.freq_key(), "f");
        assert_eq!(psd.units(), "m^2/s^2/Hz");
        assert_relative_eq!(psd.freq[15], 8.0);

        let rad = binner
            .calc_vel_psd(&ds, &PsdOptions::default().with_freq_units(FreqUnits::RadPerSec))
            .unwrap();
        assert_eq!(rad.freq_key(), "omega");
        assert_eq!(rad.units(), "m^2/s/rad");
        for (f, w) in psd.freq.iter().zip(rad.freq.iter()) {
            assert_relative_eq!(*f, w / (2.0 * PI), epsilon = 1e-12);
        }
        // Same variance, spread over a 2π wider axis
        for (p, r) in psd.values.iter().zip(rad.values.iter()) {
            assert_relative_eq!(*p, r * (2.0 * PI) as f32, max_relative = 1e-4);
        }
    }

    #[test]
    fn test_rotate_bins_aligns_mean() {
        let ds = noisy(64);
        let mut vel = ds.vel.clone();
        rotate_bins(&mut vel, 32, true);
        for b in 0..2 {
            let v_mean = vel.slice(s![1, 0, b * 32..(b + 1) * 32]).mean().unwrap();
            let u_mean = vel.slice(s![0, 0, b * 32..(b + 1) * 32]).mean().unwrap();
            assert!(v_mean.abs() < 1e-12);
            assert!(u_mean > 0.0);
        }
    }

    #[test]
    fn test_rotate_u_drops_unequal_noise() {
        let ds = noisy(256);
        let binner = VelBinner::new(128, 16.0).with_n_fft(32);
        let opts = PsdOptions::default().with_rotate_u(true);
        let clean = binner.calc_vel_psd(&ds, &opts).unwrap();
        let noisy = binner
            .calc_vel_psd(&ds, &opts.clone().with_noise([0.05, 0.01, 0.0]))
            .unwrap();
        assert_eq!(clean.values, noisy.values);
    }

    #[test]
    fn test_csd_uses_coherence_fft_length() {
        let ds = noisy(256);
        let binner = VelBinner::new(128, 16.0).with_n_fft(64).with_n_fft_coh(32);
        let csd = binner.calc_vel_csd(&ds, &CsdOptions::default()).unwrap();
        assert_eq!(csd.values.dim(), (3, 1, 2, 16));
        assert_eq!(csd.freq.len(), 16);
    }
}
