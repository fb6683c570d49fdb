//! Welch-style spectral estimation on a single segment of data.
//!
//! A segment is split into `nens` overlapping ensembles of length `nfft`.
//! Each ensemble is linearly detrended, windowed and transformed; the
//! one-sided spectrum keeps FFT indices `1..=nfft/2` (DC dropped,
//! Nyquist kept) and is scaled as
//!
//! ```text
//! S(f_k) = 2 / Σ w² / nens / fs · Σ_ens A_k · conj(B_k)
//! ```
//!
//! so that integrating a PSD over frequency returns the variance of the
//! detrended signal.

use std::fmt;
use std::sync::Arc;

use rustfft::{Fft, FftPlanner, num_complex::Complex64};
use serde::{Deserialize, Serialize};

use crate::error::{Result, VelocityError};

/// Taper applied to each ensemble before the FFT.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Window {
    /// Symmetric Hann window.
    #[default]
    Hann,
    /// No taper.
    Boxcar,
    /// User-supplied coefficients, length must equal `nfft`.
    Custom(Vec<f64>),
}

impl Window {
    /// Window coefficients for an ensemble of length `n`.
    pub fn coefficients(&self, n: usize) -> Result<Vec<f64>> {
        match self {
            Window::Hann => Ok(hann(n)),
            Window::Boxcar => Ok(vec![1.0; n]),
            Window::Custom(w) if w.len() == n => Ok(w.clone()),
            Window::Custom(w) => Err(VelocityError::dimension_mismatch(
                format!("window of length {n}"),
                format!("length {}", w.len()),
            )),
        }
    }
}

/// Symmetric Hann window, `0.5 - 0.5 cos(2πk/(n-1))`.
pub fn hann(n: usize) -> Vec<f64> {
    if n == 1 {
        return vec![1.0];
    }
    let denom = (n - 1) as f64;
    (0..n)
        .map(|k| 0.5 - 0.5 * (2.0 * std::f64::consts::PI * k as f64 / denom).cos())
        .collect()
}

/// Remove the least-squares straight line from `x`.
pub fn detrend_linear(x: &[f64]) -> Vec<f64> {
    let n = x.len();
    if n < 2 {
        return vec![0.0; n];
    }
    let nf = n as f64;
    let t_mean = (nf - 1.0) / 2.0;
    let x_mean = x.iter().sum::<f64>() / nf;

    let mut sxy = 0.0;
    let mut sxx = 0.0;
    for (i, &xi) in x.iter().enumerate() {
        let dt = i as f64 - t_mean;
        sxy += dt * (xi - x_mean);
        sxx += dt * dt;
    }
    let slope = sxy / sxx;

    x.iter()
        .enumerate()
        .map(|(i, &xi)| xi - x_mean - slope * (i as f64 - t_mean))
        .collect()
}

/// Layout of ensembles within a segment.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Ensembles {
    /// Offset between consecutive ensemble starts.
    pub step: usize,
    /// Number of ensembles averaged.
    pub nens: usize,
    /// Ensemble length.
    pub nfft: usize,
}

/// Choose the ensemble step for a segment of length `len`.
///
/// With `step` unset the step maximises data use with at least 50% overlap:
/// `nens = floor(2·len/nfft)` and `step = floor((len - nfft)/(nens - 1))`.
/// `nens` is always the number of whole ensembles that fit at that step.
pub fn stepsize(len: usize, nfft: usize, step: Option<usize>) -> Ensembles {
    if len <= nfft {
        return Ensembles {
            step: 0,
            nens: 1,
            nfft,
        };
    }
    let step = match step {
        Some(s) if s > 0 => s,
        Some(_) => {
            return Ensembles {
                step: 0,
                nens: 1,
                nfft,
            };
        }
        None => {
            let nens = 2 * len / nfft;
            ((len - nfft) / (nens - 1)).max(1)
        }
    };
    Ensembles {
        step,
        nens: (len - nfft) / step + 1,
        nfft,
    }
}

/// One-sided frequencies `k·fs/nfft` for `k = 1..=nfft/2`.
pub fn fft_frequency(nfft: usize, fs: f64) -> Vec<f64> {
    (1..=nfft / 2)
        .map(|k| k as f64 * fs / nfft as f64)
        .collect()
}

/// Reusable FFT plan, window and scratch for one ensemble length.
pub struct SpectralEstimator {
    nfft: usize,
    window: Vec<f64>,
    weight: f64,
    fft: Arc<dyn Fft<f64>>,
    scratch: Vec<Complex64>,
}

impl fmt::Debug for SpectralEstimator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpectralEstimator")
            .field("nfft", &self.nfft)
            .finish()
    }
}

impl SpectralEstimator {
    /// Plan an estimator for ensembles of length `nfft`.
    pub fn new(nfft: usize, window: &Window) -> Result<Self> {
        if nfft < 2 {
            return Err(VelocityError::InvalidParameter(format!(
                "n_fft must be at least 2, got {nfft}"
            )));
        }
        let window = window.coefficients(nfft)?;
        let weight = 2.0 / window.iter().map(|w| w * w).sum::<f64>();

        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(nfft);
        let scratch = vec![Complex64::new(0.0, 0.0); fft.get_inplace_scratch_len()];

        Ok(Self {
            nfft,
            window,
            weight,
            fft,
            scratch,
        })
    }

    /// Number of frequencies returned, `nfft / 2`.
    pub fn n_freq(&self) -> usize {
        self.nfft / 2
    }

    fn transform(&mut self, x: &[f64]) -> Vec<Complex64> {
        let detrended = detrend_linear(x);
        let mut buffer: Vec<Complex64> = detrended
            .iter()
            .zip(self.window.iter())
            .map(|(&v, &w)| Complex64::new(v * w, 0.0))
            .collect();
        buffer.resize(self.nfft, Complex64::new(0.0, 0.0));
        self.fft.process_with_scratch(&mut buffer, &mut self.scratch);
        buffer
    }

    /// Cross-spectral density of two equal-length segments.
    pub fn cpsd(&mut self, a: &[f64], b: &[f64], fs: f64, step: Option<usize>) -> Vec<Complex64> {
        debug_assert_eq!(a.len(), b.len());
        let ens = stepsize(a.len(), self.nfft, step);
        let n_freq = self.n_freq();
        let mut pwr = vec![Complex64::new(0.0, 0.0); n_freq];

        for e in 0..ens.nens {
            let start = e * ens.step;
            let end = (start + self.nfft).min(a.len());
            let fa = self.transform(&a[start..end]);
            let fb = self.transform(&b[start..end]);
            for k in 0..n_freq {
                pwr[k] += fa[k + 1] * fb[k + 1].conj();
            }
        }

        let scale = self.weight / ens.nens as f64 / fs;
        pwr.iter_mut().for_each(|p| *p *= scale);
        pwr
    }

    /// Power spectral density of a segment.
    pub fn psd(&mut self, a: &[f64], fs: f64, step: Option<usize>) -> Vec<f64> {
        let ens = stepsize(a.len(), self.nfft, step);
        let n_freq = self.n_freq();
        let mut pwr = vec![0.0; n_freq];

        for e in 0..ens.nens {
            let start = e * ens.step;
            let end = (start + self.nfft).min(a.len());
            let fa = self.transform(&a[start..end]);
            for k in 0..n_freq {
                pwr[k] += fa[k + 1].norm_sqr();
            }
        }

        let scale = self.weight / ens.nens as f64 / fs;
        pwr.iter_mut().for_each(|p| *p *= scale);
        pwr
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_hann_symmetric() {
        let w = hann(5);
        assert_relative_eq!(w[0], 0.0);
        assert_relative_eq!(w[2], 1.0);
        assert_relative_eq!(w[1], w[3]);
        assert_eq!(hann(1), vec![1.0]);
    }

    #[test]
    fn test_detrend_removes_line() {
        let x: Vec<f64> = (0..20).map(|i| 3.0 + 0.5 * i as f64).collect();
        for v in detrend_linear(&x) {
            assert!(v.abs() < 1e-12);
        }
    }

    #[test]
    fn test_stepsize_default_overlap() {
        let ens = stepsize(100, 40, None);
        assert_eq!(ens.nens, 5);
        assert_eq!(ens.step, 15);
        // at least 50% overlap
        assert!(ens.step <= 20);

        let single = stepsize(32, 32, None);
        assert_eq!(single.nens, 1);
        assert_eq!(single.step, 0);

        let fixed = stepsize(100, 40, Some(30));
        assert_eq!(fixed.nens, 3);
    }

    #[test]
    fn test_fft_frequency() {
        let f = fft_frequency(32, 32.0);
        assert_eq!(f.len(), 16);
        assert_relative_eq!(f[0], 1.0);
        assert_relative_eq!(f[15], 16.0);
    }

    #[test]
    fn test_sine_peak() {
        let fs = 16.0;
        let nfft = 64;
        let x: Vec<f64> = (0..nfft)
            .map(|i| (2.0 * std::f64::consts::PI * 2.0 * i as f64 / fs).sin())
            .collect();
        let mut est = SpectralEstimator::new(nfft, &Window::Hann).unwrap();
        let p = est.psd(&x, fs, None);
        let freq = fft_frequency(nfft, fs);
        let imax = p
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap())
            .map(|(i, _)| i)
            .unwrap();
        assert_relative_eq!(freq[imax], 2.0);
    }

    #[test]
    fn test_cpsd_of_self_is_psd() {
        let x: Vec<f64> = (0..128).map(|i| ((i * 37 % 17) as f64).sin()).collect();
        let mut est = SpectralEstimator::new(32, &Window::Hann).unwrap();
        let p = est.psd(&x, 4.0, None);
        let c = est.cpsd(&x, &x, 4.0, None);
        for (pi, ci) in p.iter().zip(c.iter()) {
            assert_relative_eq!(*pi, ci.re, epsilon = 1e-12);
            assert!(ci.im.abs() < 1e-12);
        }
    }

    #[test]
    fn test_custom_window_length_checked() {
        assert!(Window::Custom(vec![1.0; 8]).coefficients(8).is_ok());
        assert!(Window::Custom(vec![1.0; 8]).coefficients(16).is_err());
    }
}
