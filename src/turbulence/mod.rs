//! Binned turbulence statistics.
//!
//! [`VelBinner`] reduces a raw velocity [`Dataset`] to per-bin averages,
//! turbulent kinetic energy (TKE), Reynolds stresses, spectra and
//! covariances. Results are plain structs carrying their bin-mean time axis;
//! [`VelBinner::do_tke`] attaches them to a binned dataset.
//!
//! # Example
//!
//! ```
//! use ndarray::{Array1, Array2};
//! use velocity_rs::{CoordSys, Dataset, VelBinner};
//!
//! let n = 64;
//! let time = Array1::from_iter((0..n).map(|i| i as f64 / 8.0));
//! let vel = Array2::from_shape_fn((3, n), |(c, t)| ((t * (c + 3)) % 7) as f64 * 0.01);
//! let raw = Dataset::from_series(time, vel, 8.0, CoordSys::Earth).unwrap();
//!
//! let binner = VelBinner::new(32, 8.0);
//! let avg = binner.do_tke(&raw, None).unwrap();
//! assert_eq!(avg.n_time(), 2);
//! assert!(avg.has_turbulence());
//! ```

mod spectra;

pub use spectra::{CrossSpectrum, CsdOptions, PsdOptions, Spectrum};

use ndarray::{Array1, Array2, Array3, Array4, ArrayView1, Zip, s};
use tracing::debug;

use crate::binning::{BinnerConfig, TimeBinner, Window};
use crate::dataset::{Attrs, Dataset};
use crate::error::{Result, VelocityError};
use crate::types::FreqUnits;

/// Component pairs for stresses and cross-spectra, in output order.
pub const CROSS_PAIRS: [(usize, usize); 3] = [(0, 1), (0, 2), (1, 2)];

/// Per-bin velocity variances `[u'u', v'v', w'w']`.
#[derive(Clone, Debug, PartialEq)]
pub struct TkeVector {
    /// Bin-mean time.
    pub time: Array1<f64>,
    /// `[3, cell, bin]`.
    pub values: Array3<f32>,
}

impl TkeVector {
    pub const LABELS: [&'static str; 3] = ["u'u'_", "v'v'_", "w'w'_"];
    pub const UNITS: &'static str = "m^2/s^2";
}

/// Per-bin Reynolds stresses `[u'v', u'w', v'w']`.
#[derive(Clone, Debug, PartialEq)]
pub struct StressVector {
    /// Bin-mean time.
    pub time: Array1<f64>,
    /// `[3, cell, bin]`.
    pub values: Array3<f32>,
}

impl StressVector {
    pub const LABELS: [&'static str; 3] = ["u'v'_", "u'w'_", "v'w'_"];
    pub const UNITS: &'static str = "m^2/s^2";
}

/// A single-component binned statistic, e.g. fifth-beam variance.
#[derive(Clone, Debug, PartialEq)]
pub struct BinnedSeries {
    pub time: Array1<f64>,
    /// `[cell, bin]`.
    pub values: Array2<f32>,
}

/// Per-bin velocity variance of every component.
#[derive(Clone, Debug, PartialEq)]
pub struct VelocityVariance {
    pub time: Array1<f64>,
    /// `[component, cell, bin]`.
    pub values: Array3<f64>,
}

/// Averaging and turbulence tool for velocity datasets.
#[derive(Clone, Debug, PartialEq)]
pub struct VelBinner {
    binner: TimeBinner,
}

impl VelBinner {
    /// Create a binner of `n_bin` samples at sample rate `fs`.
    ///
    /// # Panics
    ///
    /// Panics if `n_bin` is zero or `fs` is not positive.
    pub fn new(n_bin: usize, fs: f64) -> Self {
        Self {
            binner: TimeBinner::new(n_bin, fs),
        }
    }

    pub fn from_config(config: &BinnerConfig) -> Result<Self> {
        Ok(Self {
            binner: TimeBinner::from_config(config)?,
        })
    }

    pub fn with_n_fft(mut self, n_fft: usize) -> Self {
        self.binner = self.binner.with_n_fft(n_fft);
        self
    }

    pub fn with_n_fft_coh(mut self, n_fft_coh: usize) -> Self {
        self.binner = self.binner.with_n_fft_coh(n_fft_coh);
        self
    }

    /// The underlying time binner.
    pub fn binner(&self) -> &TimeBinner {
        &self.binner
    }

    pub fn n_bin(&self) -> usize {
        self.binner.n_bin
    }

    pub fn fs(&self) -> f64 {
        self.binner.fs
    }

    /// Frequency vector of the auto (`coh = false`) or cross spectra.
    pub fn calc_freq(&self, units: FreqUnits, coh: bool) -> Result<Array1<f64>> {
        self.binner.calc_freq(units, None, coh)
    }

    fn n_bins(&self, len: usize) -> Result<usize> {
        let n = self.binner.n_bins(len, None)?;
        if n == 0 {
            return Err(VelocityError::InvalidParameter(format!(
                "record of {len} samples is shorter than one bin ({})",
                self.binner.n_bin
            )));
        }
        Ok(n)
    }

    /// Per-bin mean of the product of demeaned samples, accumulated in `f64`.
    fn bin_covariance(&self, a: ArrayView1<f64>, b: ArrayView1<f64>) -> Array1<f64> {
        let da = self.binner.demean(a);
        let db = self.binner.demean(b);
        Zip::from(da.rows())
            .and(db.rows())
            .map_collect(|ra, rb| ra.dot(&rb) / ra.len() as f64)
    }

    // =========================================================================
    // TKE and stress
    // =========================================================================

    /// Per-bin variances of the first three components, minus `noise²`.
    ///
    /// The noise correction is not clamped: bins with little turbulence can
    /// come out slightly negative.
    pub fn calc_tke(&self, ds: &Dataset, noise: [f64; 3]) -> Result<TkeVector> {
        let n_bins = self.n_bins(ds.n_time())?;
        let n_cells = ds.n_cells();
        let time = self.binner.mean(ds.time.view());

        let mut values = Array3::zeros((3, n_cells, n_bins));
        for i in 0..3 {
            let n2 = (noise[i] * noise[i]) as f32;
            for cell in 0..n_cells {
                let x = ds.vel.slice(s![i, cell, ..]);
                let var = self.bin_covariance(x, x);
                values
                    .slice_mut(s![i, cell, ..])
                    .assign(&var.mapv(|v| v as f32 - n2));
            }
        }
        Ok(TkeVector { time, values })
    }

    /// Per-bin variance of the fifth (vertical) beam on its own time axis.
    pub fn calc_tke_b5(&self, ds: &Dataset, noise: f64) -> Result<BinnedSeries> {
        let (Some(time_b5), Some(vel_b5)) = (&ds.time_b5, &ds.vel_b5) else {
            return Err(VelocityError::Configuration(
                "dataset has no fifth-beam data".into(),
            ));
        };
        let n_bins = self.n_bins(time_b5.len())?;
        let time = self.binner.mean(time_b5.view());
        let n2 = (noise * noise) as f32;

        let mut values = Array2::zeros((vel_b5.nrows(), n_bins));
        for (x, mut dst) in vel_b5.rows().into_iter().zip(values.rows_mut()) {
            let var = self.bin_covariance(x, x);
            dst.assign(&var.mapv(|v| v as f32 - n2));
        }
        Ok(BinnedSeries { time, values })
    }

    /// Per-bin covariances of the pairs in [`CROSS_PAIRS`].
    pub fn calc_stress(&self, ds: &Dataset) -> Result<StressVector> {
        let n_bins = self.n_bins(ds.n_time())?;
        let n_cells = ds.n_cells();
        let time = self.binner.mean(ds.time.view());

        let mut values = Array3::zeros((3, n_cells, n_bins));
        for (idx, &(a, b)) in CROSS_PAIRS.iter().enumerate() {
            for cell in 0..n_cells {
                let cov = self.bin_covariance(
                    ds.vel.slice(s![a, cell, ..]),
                    ds.vel.slice(s![b, cell, ..]),
                );
                values
                    .slice_mut(s![idx, cell, ..])
                    .assign(&cov.mapv(|v| v as f32));
            }
        }
        Ok(StressVector { time, values })
    }

    /// Compute TKE and stress of `ds` and attach them to `out`.
    ///
    /// Without `out` the bin averages of `ds` ([`do_avg`](Self::do_avg))
    /// are used as the output dataset.
    pub fn do_tke(&self, ds: &Dataset, out: Option<Dataset>) -> Result<Dataset> {
        let mut out = match out {
            Some(out) => out,
            None => self.do_avg(ds)?,
        };
        if out.coord_sys() != ds.coord_sys() {
            return Err(VelocityError::Configuration(format!(
                "output dataset is in '{}' but the raw data is in '{}'",
                out.coord_sys(),
                ds.coord_sys()
            )));
        }

        let tke = self.calc_tke(ds, [0.0; 3])?;
        let stress = self.calc_stress(ds)?;
        let shape = (out.n_cells(), out.n_time());
        let (_, n_cells, n_bins) = tke.values.dim();
        if shape != (n_cells, n_bins) {
            return Err(VelocityError::dimension_mismatch(
                format!("output with (cells, bins) = ({n_cells}, {n_bins})"),
                format!("{shape:?}"),
            ));
        }

        out.tke_vec = Some(tke.values);
        out.stress_vec = Some(stress.values);
        Ok(out)
    }

    // =========================================================================
    // Averages
    // =========================================================================

    /// Bin-average a raw dataset.
    ///
    /// Velocity, time and orientation matrices are averaged element-wise,
    /// heading with a circular mean. `u_std` is the spread of horizontal
    /// speed within each bin. Calibration data and frame metadata carry over.
    pub fn do_avg(&self, ds: &Dataset) -> Result<Dataset> {
        let n_bins = self.n_bins(ds.n_time())?;
        let (n_comp, n_cells, _) = ds.vel.dim();
        debug!(n_bins, n_bin = self.binner.n_bin, "Averaging dataset");

        let time = self.binner.mean(ds.time.view());
        let mut vel = Array3::zeros((n_comp, n_cells, n_bins));
        for c in 0..n_comp {
            for cell in 0..n_cells {
                let m = self.binner.mean(ds.vel.slice(s![c, cell, ..]));
                vel.slice_mut(s![c, cell, ..]).assign(&m);
            }
        }

        let u_mag = ds.velocity().u_mag();
        let mut u_std = Array2::zeros((n_cells, n_bins));
        for (row, mut dst) in u_mag.rows().into_iter().zip(u_std.rows_mut()) {
            dst.assign(&self.binner.var(row).mapv(f64::sqrt));
        }

        let mut out = Dataset::new(time, vel, self.binner.fs, ds.coord_sys())?;
        out.u_std = Some(u_std);

        if let Some(om) = &ds.orientmat {
            let mut avg = Array3::zeros((3, 3, n_bins));
            for i in 0..3 {
                for j in 0..3 {
                    let m = self.binner.mean(om.slice(s![i, j, ..]));
                    avg.slice_mut(s![i, j, ..]).assign(&m);
                }
            }
            out.orientmat = Some(avg);
        }
        if let Some(heading) = &ds.heading {
            out.heading = Some(self.binner.mean_angle_deg(heading.view()));
        }
        if let (Some(time_b5), Some(vel_b5)) = (&ds.time_b5, &ds.vel_b5) {
            let nb = self.binner.n_bins(time_b5.len(), None)?;
            let mut avg = Array2::zeros((vel_b5.nrows(), nb));
            for (row, mut dst) in vel_b5.rows().into_iter().zip(avg.rows_mut()) {
                dst.assign(&self.binner.mean(row));
            }
            out.time_b5 = Some(self.binner.mean(time_b5.view()));
            out.vel_b5 = Some(avg);
        }

        out.beam2inst_orientmat = ds.beam2inst_orientmat.clone();
        out.inst2head_rotmat = ds.inst2head_rotmat.clone();
        out.attrs = Attrs {
            coord_sys: ds.coord_sys(),
            fs: self.binner.fs,
            n_bin: Some(self.binner.n_bin),
            n_fft: Some(self.binner.n_fft),
            ..ds.attrs.clone()
        };
        Ok(out)
    }

    /// Per-bin variance of every velocity component.
    pub fn do_var(&self, ds: &Dataset) -> Result<VelocityVariance> {
        let n_bins = self.n_bins(ds.n_time())?;
        let (n_comp, n_cells, _) = ds.vel.dim();
        let mut values = Array3::zeros((n_comp, n_cells, n_bins));
        for c in 0..n_comp {
            for cell in 0..n_cells {
                let v = self.binner.var(ds.vel.slice(s![c, cell, ..]));
                values.slice_mut(s![c, cell, ..]).assign(&v);
            }
        }
        Ok(VelocityVariance {
            time: self.binner.mean(ds.time.view()),
            values,
        })
    }

    // =========================================================================
    // Coherence and covariance
    // =========================================================================

    fn paired_components(&self, a: &Dataset, b: &Dataset) -> Result<(usize, usize)> {
        let (na, ca, ta) = a.vel.dim();
        let (nb, cb, tb) = b.vel.dim();
        if (na, ca) != (nb, cb) {
            return Err(VelocityError::dimension_mismatch(
                format!("{na} components x {ca} cells"),
                format!("{nb} components x {cb} cells"),
            ));
        }
        self.n_bins(ta.min(tb))?;
        Ok((na, ca))
    }

    /// Magnitude-squared coherence between matching components of two
    /// records, `[component, cell, bin, freq]`.
    pub fn calc_coh(&self, a: &Dataset, b: &Dataset, window: &Window) -> Result<Array4<f64>> {
        let (n_comp, n_cells) = self.paired_components(a, b)?;
        self.per_component(n_comp, n_cells, |c, cell| {
            self.binner.coherence(
                a.vel.slice(s![c, cell, ..]),
                b.vel.slice(s![c, cell, ..]),
                window,
                None,
            )
        })
    }

    /// Cross-spectral phase between matching components (radians).
    pub fn calc_phase_angle(
        &self,
        a: &Dataset,
        b: &Dataset,
        window: &Window,
    ) -> Result<Array4<f64>> {
        let (n_comp, n_cells) = self.paired_components(a, b)?;
        self.per_component(n_comp, n_cells, |c, cell| {
            self.binner.phase_angle(
                a.vel.slice(s![c, cell, ..]),
                b.vel.slice(s![c, cell, ..]),
                window,
                None,
            )
        })
    }

    /// Auto-covariance per bin, `[component, cell, bin, lag]`.
    pub fn calc_acov(&self, ds: &Dataset) -> Result<Array4<f64>> {
        self.n_bins(ds.n_time())?;
        let (n_comp, n_cells, _) = ds.vel.dim();
        self.per_component(n_comp, n_cells, |c, cell| {
            Ok(self.binner.acov(ds.vel.slice(s![c, cell, ..])))
        })
    }

    /// Cross-covariance between matching components of two records.
    pub fn calc_xcov(&self, a: &Dataset, b: &Dataset) -> Result<Array4<f64>> {
        let (n_comp, n_cells) = self.paired_components(a, b)?;
        self.per_component(n_comp, n_cells, |c, cell| {
            Ok(self
                .binner
                .xcov(a.vel.slice(s![c, cell, ..]), b.vel.slice(s![c, cell, ..])))
        })
    }

    /// Stack per-(component, cell) `[bin, k]` results into
    /// `[component, cell, bin, k]`.
    fn per_component(
        &self,
        n_comp: usize,
        n_cells: usize,
        mut f: impl FnMut(usize, usize) -> Result<Array2<f64>>,
    ) -> Result<Array4<f64>> {
        let mut out: Option<Array4<f64>> = None;
        for c in 0..n_comp {
            for cell in 0..n_cells {
                let r = f(c, cell)?;
                let dst = out.get_or_insert_with(|| {
                    Array4::zeros((n_comp, n_cells, r.nrows(), r.ncols()))
                });
                dst.slice_mut(s![c, cell, .., ..]).assign(&r);
            }
        }
        Ok(out.unwrap_or_else(|| Array4::zeros((n_comp, n_cells, 0, 0))))
    }
}
