//! Time binning primitives.
//!
//! A [`TimeBinner`] splits a uniformly sampled series into contiguous bins
//! of `n_bin` samples (the trailing remainder is dropped) and provides the
//! per-bin reductions used by the turbulence engine: means, demeaning,
//! padded reshaping, and Welch spectra.
//!
//! # Example
//!
//! ```
//! use ndarray::Array1;
//! use velocity_rs::binning::TimeBinner;
//!
//! let binner = TimeBinner::new(4, 2.0);
//! let x = Array1::from(vec![1.0, 2.0, 3.0, 4.0, 10.0, 10.0, 10.0, 10.0, 99.0]);
//! let means = binner.mean(x.view());
//! assert_eq!(means.to_vec(), vec![2.5, 10.0]);
//! ```

mod spectral;

pub use spectral::{
    Ensembles, SpectralEstimator, Window, detrend_linear, fft_frequency, hann, stepsize,
};

use ndarray::{Array1, Array2, ArrayView1, Axis, s};
use num_complex::Complex64;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, VelocityError};
use crate::types::FreqUnits;

/// Serializable binner settings.
///
/// ```
/// use velocity_rs::binning::BinnerConfig;
///
/// let cfg: BinnerConfig = serde_json::from_str(r#"{"n_bin": 600, "fs": 32.0, "n_fft": 256}"#).unwrap();
/// assert!(cfg.validate().is_ok());
/// assert_eq!(cfg.n_fft_coh, None);
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BinnerConfig {
    /// Samples per bin.
    pub n_bin: usize,
    /// Sample rate (Hz).
    pub fs: f64,
    /// FFT length for auto-spectra (default `n_bin`).
    #[serde(default)]
    pub n_fft: Option<usize>,
    /// FFT length for cross-spectra and coherence (default `n_fft`).
    #[serde(default)]
    pub n_fft_coh: Option<usize>,
}

impl BinnerConfig {
    /// Bins of `n_bin` samples at `fs`, with default FFT lengths.
    pub fn new(n_bin: usize, fs: f64) -> Self {
        Self {
            n_bin,
            fs,
            n_fft: None,
            n_fft_coh: None,
        }
    }

    /// Ten-minute averaging bins at `fs`.
    pub fn ten_minute(fs: f64) -> Self {
        Self::new((600.0 * fs).round() as usize, fs)
    }

    /// Nortek Vector burst at 32 Hz.
    ///
    /// Ten-minute bins with 4096-point spectra (about two minutes per FFT).
    pub fn vector_32hz() -> Self {
        Self {
            n_fft: Some(4096),
            ..Self::ten_minute(32.0)
        }
    }

    /// Check the settings are self-consistent.
    pub fn validate(&self) -> Result<()> {
        if self.n_bin == 0 {
            return Err(VelocityError::InvalidParameter("n_bin must be > 0".into()));
        }
        if !(self.fs > 0.0 && self.fs.is_finite()) {
            return Err(VelocityError::InvalidParameter(format!(
                "fs must be positive, got {}",
                self.fs
            )));
        }
        let n_fft = self.n_fft.unwrap_or(self.n_bin);
        if n_fft > self.n_bin {
            return Err(VelocityError::InvalidParameter(format!(
                "n_fft ({n_fft}) must not exceed n_bin ({})",
                self.n_bin
            )));
        }
        let n_fft_coh = self.n_fft_coh.unwrap_or(n_fft);
        if n_fft_coh > self.n_bin {
            return Err(VelocityError::InvalidParameter(format!(
                "n_fft_coh ({n_fft_coh}) must not exceed n_bin ({})",
                self.n_bin
            )));
        }
        Ok(())
    }
}

/// Per-call overrides of the binner's segment layout.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SegmentOptions {
    pub n_bin: Option<usize>,
    pub n_fft: Option<usize>,
    pub n_pad: Option<usize>,
    pub step: Option<usize>,
}

/// Bins a time series and computes per-bin statistics and spectra.
#[derive(Clone, Debug, PartialEq)]
pub struct TimeBinner {
    /// Samples per bin.
    pub n_bin: usize,
    /// Sample rate (Hz).
    pub fs: f64,
    /// FFT length for auto-spectra.
    pub n_fft: usize,
    /// FFT length for cross-spectra.
    pub n_fft_coh: usize,
}

impl TimeBinner {
    /// Create a binner with `n_fft = n_fft_coh = n_bin`.
    ///
    /// # Panics
    ///
    /// Panics if `n_bin` is zero or `fs` is not positive.
    pub fn new(n_bin: usize, fs: f64) -> Self {
        assert!(n_bin > 0, "n_bin must be positive");
        assert!(fs > 0.0, "fs must be positive");
        Self {
            n_bin,
            fs,
            n_fft: n_bin,
            n_fft_coh: n_bin,
        }
    }

    /// Build a binner from validated settings.
    pub fn from_config(config: &BinnerConfig) -> Result<Self> {
        config.validate()?;
        let n_fft = config.n_fft.unwrap_or(config.n_bin);
        let binner = Self {
            n_bin: config.n_bin,
            fs: config.fs,
            n_fft,
            n_fft_coh: config.n_fft_coh.unwrap_or(n_fft),
        };
        debug!(
            n_bin = binner.n_bin,
            fs = binner.fs,
            n_fft = binner.n_fft,
            n_fft_coh = binner.n_fft_coh,
            "Configured time binner"
        );
        Ok(binner)
    }

    /// Set the auto-spectrum FFT length; the cross-spectrum length follows
    /// unless set separately afterwards.
    pub fn with_n_fft(mut self, n_fft: usize) -> Self {
        self.n_fft = n_fft;
        self.n_fft_coh = n_fft;
        self
    }

    /// Set the cross-spectrum FFT length.
    pub fn with_n_fft_coh(mut self, n_fft_coh: usize) -> Self {
        self.n_fft_coh = n_fft_coh;
        self
    }

    // =========================================================================
    // Parameter defaults
    // =========================================================================

    pub fn parse_fs(&self, fs: Option<f64>) -> f64 {
        fs.unwrap_or(self.fs)
    }

    /// Bin size override; zero is rejected.
    pub fn parse_nbin(&self, n_bin: Option<usize>) -> Result<usize> {
        match n_bin.unwrap_or(self.n_bin) {
            0 => Err(VelocityError::InvalidParameter("n_bin must be > 0".into())),
            n => Ok(n),
        }
    }

    /// Auto-spectrum FFT length; must not exceed the bin size.
    pub fn parse_nfft(&self, n_fft: Option<usize>) -> Result<usize> {
        let n_fft = n_fft.unwrap_or(self.n_fft);
        self.check_nfft(n_fft, self.n_bin)?;
        Ok(n_fft)
    }

    /// Cross-spectrum FFT length; must not exceed the bin size.
    pub fn parse_nfft_coh(&self, n_fft: Option<usize>) -> Result<usize> {
        let n_fft = n_fft.unwrap_or(self.n_fft_coh);
        self.check_nfft(n_fft, self.n_bin)?;
        Ok(n_fft)
    }

    fn check_nfft(&self, n_fft: usize, n_bin: usize) -> Result<()> {
        if n_fft < 2 || n_fft > n_bin {
            return Err(VelocityError::InvalidParameter(format!(
                "n_fft must be in 2..={n_bin}, got {n_fft}"
            )));
        }
        Ok(())
    }

    // =========================================================================
    // Shapes
    // =========================================================================

    /// Number of whole bins in a series of length `len`.
    #[inline]
    pub fn n_bins(&self, len: usize, n_bin: Option<usize>) -> Result<usize> {
        Ok(len / self.parse_nbin(n_bin)?)
    }

    /// Shape after binning the last axis: `[..., n_bins, n_bin + n_pad]`.
    pub fn outshape(
        &self,
        shape: &[usize],
        n_pad: usize,
        n_bin: Option<usize>,
    ) -> Result<Vec<usize>> {
        let n_bin = self.parse_nbin(n_bin)?;
        let mut out = shape.to_vec();
        let len = out.pop().unwrap_or(0);
        out.push(len / n_bin);
        out.push(n_bin + n_pad);
        Ok(out)
    }

    /// Shape of a binned spectrum: `[..., n_bins, n_fft / 2]`.
    pub fn outshape_fft(
        &self,
        shape: &[usize],
        n_fft: Option<usize>,
        n_bin: Option<usize>,
    ) -> Result<Vec<usize>> {
        let n_fft = self.parse_nfft(n_fft)?;
        let mut out = self.outshape(shape, 0, n_bin)?;
        if let Some(last) = out.last_mut() {
            *last = n_fft / 2;
        }
        Ok(out)
    }

    // =========================================================================
    // Reductions
    // =========================================================================

    /// Split a series into bins `[n_bins, n_bin + n_pad]`.
    ///
    /// Padding is split `n_pad/2` before and `(n_pad+1)/2` after each bin and
    /// filled from the neighbouring bins; it is zero before the first bin
    /// and after the last whole bin.
    pub fn reshape_with(
        &self,
        series: ArrayView1<f64>,
        n_pad: usize,
        n_bin: Option<usize>,
    ) -> Result<Array2<f64>> {
        Ok(self.bin_rows(series, n_pad, self.parse_nbin(n_bin)?))
    }

    /// Split a series into unpadded bins `[n_bins, n_bin]`.
    pub fn reshape(&self, series: ArrayView1<f64>) -> Array2<f64> {
        self.bin_rows(series, 0, self.n_bin)
    }

    fn bin_rows(&self, series: ArrayView1<f64>, n_pad: usize, n_bin: usize) -> Array2<f64> {
        let n_bins = series.len() / n_bin;
        let pad_before = n_pad / 2;
        let used = (n_bins * n_bin) as isize;

        let mut out = Array2::zeros((n_bins, n_bin + n_pad));
        for (b, mut row) in out.axis_iter_mut(Axis(0)).enumerate() {
            let origin = (b * n_bin) as isize - pad_before as isize;
            for (k, val) in row.iter_mut().enumerate() {
                let idx = origin + k as isize;
                if idx >= 0 && idx < used {
                    *val = series[idx as usize];
                }
            }
        }
        out
    }

    /// Per-bin mean.
    pub fn mean_with(&self, series: ArrayView1<f64>, n_bin: Option<usize>) -> Result<Array1<f64>> {
        Ok(row_means(self.reshape_with(series, 0, n_bin)?))
    }

    /// Per-bin mean using the binner's bin size.
    pub fn mean(&self, series: ArrayView1<f64>) -> Array1<f64> {
        row_means(self.reshape(series))
    }

    /// Bins with their own mean removed, `[n_bins, n_bin]`.
    pub fn demean_with(&self, series: ArrayView1<f64>, n_bin: Option<usize>) -> Result<Array2<f64>> {
        Ok(demean_rows(self.reshape_with(series, 0, n_bin)?))
    }

    /// Demean using the binner's bin size.
    pub fn demean(&self, series: ArrayView1<f64>) -> Array2<f64> {
        demean_rows(self.reshape(series))
    }

    /// Per-bin population variance.
    pub fn var(&self, series: ArrayView1<f64>) -> Array1<f64> {
        self.demean(series)
            .map_axis(Axis(1), |row| row.mapv(|x| x * x).mean().unwrap_or(0.0))
    }

    /// Per-bin circular mean of an angle series in degrees, in [0, 360).
    pub fn mean_angle_deg(&self, series: ArrayView1<f64>) -> Array1<f64> {
        let binned = self.reshape(series);
        binned.map_axis(Axis(1), |row| {
            let (s, c) = row.iter().fold((0.0, 0.0), |(s, c), a| {
                let r = a.to_radians();
                (s + r.sin(), c + r.cos())
            });
            s.atan2(c).to_degrees().rem_euclid(360.0)
        })
    }

    // =========================================================================
    // Spectra
    // =========================================================================

    /// Frequency vector for auto (`coh = false`) or cross spectra.
    pub fn calc_freq(&self, units: FreqUnits, n_fft: Option<usize>, coh: bool) -> Result<Array1<f64>> {
        let n_fft = if coh {
            self.parse_nfft_coh(n_fft)?
        } else {
            self.parse_nfft(n_fft)?
        };
        Ok(Array1::from(fft_frequency(n_fft, self.fs * units.fs_scale())))
    }

    /// Per-bin power spectral density `[n_bins, n_fft/2]`.
    ///
    /// Bins are padded by `n_pad` samples (default `min(n_bin - n_fft, n_fft)`)
    /// before ensemble averaging. A non-zero `noise` subtracts the white noise
    /// floor `noise² / (fs/2)`; values driven negative are replaced by a
    /// hundredth of the smallest magnitude so the spectrum stays positive.
    pub fn psd(
        &self,
        series: ArrayView1<f64>,
        fs: f64,
        noise: f64,
        window: &Window,
        opts: &SegmentOptions,
    ) -> Result<Array2<f64>> {
        let n_bin = self.parse_nbin(opts.n_bin)?;
        let n_fft = opts.n_fft.unwrap_or(self.n_fft);
        self.check_nfft(n_fft, n_bin)?;
        let n_pad = opts.n_pad.unwrap_or((n_bin - n_fft).min(n_fft));

        let binned = self.bin_rows(series, n_pad, n_bin);
        let mut estimator = SpectralEstimator::new(n_fft, window)?;
        let mut out = Array2::zeros((binned.nrows(), n_fft / 2));

        for (row, mut dst) in binned.axis_iter(Axis(0)).zip(out.axis_iter_mut(Axis(0))) {
            let seg = row.to_vec();
            let p = estimator.psd(&seg, fs, opts.step);
            dst.assign(&Array1::from(p));
        }

        if noise != 0.0 {
            out.mapv_inplace(|x| x - noise * noise / (fs / 2.0));
            let floor = out.iter().fold(f64::INFINITY, |m, x| m.min(x.abs())) / 100.0;
            out.mapv_inplace(|x| if x < 0.0 { floor } else { x });
        }
        Ok(out)
    }

    /// Per-bin cross-spectral density `[n_bins, n_fft/2]` of two series.
    ///
    /// Each bin is demeaned (no padding) before ensemble averaging. The
    /// number of bins is that of the shorter series.
    pub fn cpsd(
        &self,
        a: ArrayView1<f64>,
        b: ArrayView1<f64>,
        fs: f64,
        window: &Window,
        n_fft: Option<usize>,
        n_bin: Option<usize>,
    ) -> Result<Array2<Complex64>> {
        let n_bin = self.parse_nbin(n_bin)?;
        let n_fft = n_fft.unwrap_or(self.n_fft_coh);
        self.check_nfft(n_fft, n_bin)?;

        let da = demean_rows(self.bin_rows(a, 0, n_bin));
        let db = demean_rows(self.bin_rows(b, 0, n_bin));
        let n_bins = da.nrows().min(db.nrows());

        let mut estimator = SpectralEstimator::new(n_fft, window)?;
        let mut out = Array2::from_elem((n_bins, n_fft / 2), Complex64::new(0.0, 0.0));
        for i in 0..n_bins {
            let sa = da.row(i).to_vec();
            let sb = db.row(i).to_vec();
            let c = estimator.cpsd(&sa, &sb, fs, None);
            out.row_mut(i).assign(&Array1::from(c));
        }
        Ok(out)
    }

    /// Magnitude-squared coherence `|Sab|² / (Saa·Sbb)` per bin.
    pub fn coherence(
        &self,
        a: ArrayView1<f64>,
        b: ArrayView1<f64>,
        window: &Window,
        n_fft: Option<usize>,
    ) -> Result<Array2<f64>> {
        let sab = self.cpsd(a, b, self.fs, window, n_fft, None)?;
        let saa = self.cpsd(a, a, self.fs, window, n_fft, None)?;
        let sbb = self.cpsd(b, b, self.fs, window, n_fft, None)?;
        let mut out = Array2::zeros(sab.dim());
        for ((i, k), val) in out.indexed_iter_mut() {
            *val = sab[[i, k]].norm_sqr() / (saa[[i, k]].re * sbb[[i, k]].re);
        }
        Ok(out)
    }

    /// Phase of the cross spectrum per bin (radians).
    pub fn phase_angle(
        &self,
        a: ArrayView1<f64>,
        b: ArrayView1<f64>,
        window: &Window,
        n_fft: Option<usize>,
    ) -> Result<Array2<f64>> {
        let sab = self.cpsd(a, b, self.fs, window, n_fft, None)?;
        Ok(sab.mapv(|c| c.arg()))
    }

    /// Biased auto-covariance per bin for lags `0..n_bin/4`.
    pub fn acov(&self, series: ArrayView1<f64>) -> Array2<f64> {
        self.xcov(series, series)
    }

    /// Biased cross-covariance `mean(a'(t)·b'(t+lag))` per bin for lags
    /// `0..n_bin/4`.
    pub fn xcov(&self, a: ArrayView1<f64>, b: ArrayView1<f64>) -> Array2<f64> {
        let da = self.demean(a);
        let db = self.demean(b);
        let n_bins = da.nrows().min(db.nrows());
        let n_lag = (self.n_bin / 4).max(1);
        let n = self.n_bin as f64;

        let mut out = Array2::zeros((n_bins, n_lag));
        for i in 0..n_bins {
            let ra = da.row(i);
            let rb = db.row(i);
            for lag in 0..n_lag {
                let sum: f64 = ra
                    .slice(s![..self.n_bin - lag])
                    .iter()
                    .zip(rb.slice(s![lag..]).iter())
                    .map(|(x, y)| x * y)
                    .sum();
                out[[i, lag]] = sum / n;
            }
        }
        out
    }
}

fn row_means(binned: Array2<f64>) -> Array1<f64> {
    binned.map_axis(Axis(1), |row| row.mean().unwrap_or(0.0))
}

fn demean_rows(mut binned: Array2<f64>) -> Array2<f64> {
    for mut row in binned.axis_iter_mut(Axis(0)) {
        let m = row.mean().unwrap_or(0.0);
        row.mapv_inplace(|x| x - m);
    }
    binned
}
