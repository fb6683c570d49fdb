//! Turbulence quantities derived from a binned dataset.
//!
//! These accessors read the `tke_vec`, `stress_vec`, `u_std` and `psd`
//! fields attached by [`VelBinner`](crate::turbulence::VelBinner) and
//! combine them with the bin-mean velocity.

use ndarray::{Array2, Array3, Array4, ArrayView2, Axis, Zip, s};
use tracing::warn;

use super::VelocityView;
use crate::error::{Result, VelocityError};
use crate::rotate::matrix::{Mat3, is_positive_definite, symmetric_eigenvalues, tau_from_vectors};

/// Outcome of a positive-definiteness check over all bins.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PdReport {
    /// Number of `(cell, bin)` tensors checked.
    pub n_checked: usize,
    /// Number that were not positive semi-definite.
    pub n_not_pd: usize,
    /// Smallest eigenvalue found over all tensors.
    pub min_eigenvalue: f64,
}

impl PdReport {
    pub fn all_pd(&self) -> bool {
        self.n_not_pd == 0
    }
}

fn missing(what: &str) -> VelocityError {
    VelocityError::Configuration(format!("dataset has no {what}; run the turbulence binner first"))
}

impl<'a> VelocityView<'a> {
    fn tke_vec(&self) -> Result<&'a Array3<f32>> {
        self.ds.tke_vec.as_ref().ok_or_else(|| missing("tke_vec"))
    }

    fn stress_vec(&self) -> Result<&'a Array3<f32>> {
        self.ds.stress_vec.as_ref().ok_or_else(|| missing("stress_vec"))
    }

    /// Reynolds stress tensor of one `(cell, bin)`.
    pub fn tau_ij(&self, cell: usize, bin: usize) -> Result<Mat3> {
        let tke = self.tke_vec()?;
        let stress = self.stress_vec()?;
        let (_, n_cells, n_bins) = tke.dim();
        if cell >= n_cells || bin >= n_bins {
            return Err(VelocityError::InvalidParameter(format!(
                "(cell {cell}, bin {bin}) out of range ({n_cells}, {n_bins})"
            )));
        }
        let diag = [0, 1, 2].map(|i| tke[[i, cell, bin]] as f64);
        let off = [0, 1, 2].map(|i| stress[[i, cell, bin]] as f64);
        Ok(tau_from_vectors(diag, off))
    }

    /// Total turbulent kinetic energy, `½ (u'u' + v'v' + w'w')`.
    pub fn tke(&self) -> Result<Array2<f64>> {
        let tke = self.tke_vec()?;
        Ok(tke.map_axis(Axis(0), |c| 0.5 * c.iter().map(|&x| x as f64).sum::<f64>()))
    }

    pub fn upup_(&self) -> Result<ArrayView2<'a, f32>> {
        Ok(self.tke_vec()?.slice(s![0, .., ..]))
    }

    pub fn vpvp_(&self) -> Result<ArrayView2<'a, f32>> {
        Ok(self.tke_vec()?.slice(s![1, .., ..]))
    }

    pub fn wpwp_(&self) -> Result<ArrayView2<'a, f32>> {
        Ok(self.tke_vec()?.slice(s![2, .., ..]))
    }

    pub fn upvp_(&self) -> Result<ArrayView2<'a, f32>> {
        Ok(self.stress_vec()?.slice(s![0, .., ..]))
    }

    pub fn upwp_(&self) -> Result<ArrayView2<'a, f32>> {
        Ok(self.stress_vec()?.slice(s![1, .., ..]))
    }

    pub fn vpwp_(&self) -> Result<ArrayView2<'a, f32>> {
        Ok(self.stress_vec()?.slice(s![2, .., ..]))
    }

    /// Coherent TKE, `sqrt(u'w'² + u'v'² + v'w'²)`.
    pub fn e_coh(&self) -> Result<Array2<f64>> {
        let stress = self.stress_vec()?;
        Ok(stress.map_axis(Axis(0), |c| {
            c.iter().map(|&x| (x as f64).powi(2)).sum::<f64>().sqrt()
        }))
    }

    /// Turbulence intensity from TKE, `sqrt(2·tke) / |U|`.
    ///
    /// Bins with `|U| < thresh` are NaN.
    pub fn i_tke(&self, thresh: f64) -> Result<Array2<f64>> {
        let tke = self.tke()?;
        let u_mag = self.u_mag();
        self.check_shape(tke.dim(), u_mag.dim(), "tke")?;
        Ok(Zip::from(&tke).and(&u_mag).map_collect(|&k, &m| {
            if m < thresh { f64::NAN } else { (2.0 * k).sqrt() / m }
        }))
    }

    /// Turbulence intensity from the speed spread, `u_std / |U|`.
    ///
    /// Bins with `|U| < thresh` are NaN.
    pub fn intensity(&self, thresh: f64) -> Result<Array2<f64>> {
        let u_std = self.ds.u_std.as_ref().ok_or_else(|| missing("u_std"))?;
        let u_mag = self.u_mag();
        self.check_shape(u_std.dim(), u_mag.dim(), "u_std")?;
        Ok(Zip::from(u_std).and(&u_mag).map_collect(|&s, &m| {
            if m < thresh { f64::NAN } else { s / m }
        }))
    }

    /// Wavenumber `k_i = c·freq / vel_i` per component `[3, cell, bin, freq]`,
    /// with `c = 2π` for Hz spectra and 1 for rad/s spectra.
    pub fn wavenumber(&self) -> Result<Array4<f64>> {
        let psd = self.ds.psd.as_ref().ok_or_else(|| missing("psd"))?;
        let (_, n_cells, n_bins) = self.ds.vel.dim();
        if psd.time.len() != n_bins {
            return Err(VelocityError::dimension_mismatch(
                format!("psd with {n_bins} bins"),
                format!("{}", psd.time.len()),
            ));
        }
        let c = 2.0 * std::f64::consts::PI / psd.freq_units.fs_scale();
        let n_freq = psd.freq.len();
        Ok(Array4::from_shape_fn((3, n_cells, n_bins, n_freq), |(i, cell, bin, k)| {
            c * psd.freq[k] / self.ds.vel[[i, cell, bin]]
        }))
    }

    /// Check every `(cell, bin)` stress tensor is positive semi-definite.
    ///
    /// Failures are logged, not returned as errors.
    pub fn tau_is_pd(&self) -> Result<PdReport> {
        let (_, n_cells, n_bins) = self.tke_vec()?.dim();
        let mut report = PdReport {
            n_checked: 0,
            n_not_pd: 0,
            min_eigenvalue: f64::INFINITY,
        };
        for cell in 0..n_cells {
            for bin in 0..n_bins {
                let tau = self.tau_ij(cell, bin)?;
                if tau.iter().flatten().any(|x| !x.is_finite()) {
                    continue;
                }
                report.n_checked += 1;
                report.min_eigenvalue = report.min_eigenvalue.min(symmetric_eigenvalues(&tau)?[0]);
                if !is_positive_definite(&tau)? {
                    report.n_not_pd += 1;
                }
            }
        }
        if report.n_not_pd > 0 {
            warn!(
                n_not_pd = report.n_not_pd,
                n_checked = report.n_checked,
                min_eigenvalue = report.min_eigenvalue,
                "Reynolds stress tensor is not positive definite"
            );
        }
        Ok(report)
    }

    fn check_shape(&self, a: (usize, usize), b: (usize, usize), what: &str) -> Result<()> {
        if a != b {
            return Err(VelocityError::dimension_mismatch(
                format!("{what} shape {b:?}"),
                format!("{a:?}"),
            ));
        }
        Ok(())
    }
}
