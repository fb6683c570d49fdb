//! The measurement record: velocity, orientation and metadata.
//!
//! A [`Dataset`] holds velocity as `[component, cell, time]`. Point
//! velocimeters (ADVs) have a single cell; profilers have one cell per depth
//! bin. Orientation data, calibration matrices and attached turbulence
//! statistics are optional fields that the rotation and analysis code reads
//! and updates.
//!
//! # Example
//!
//! ```
//! use ndarray::{Array1, Array2};
//! use velocity_rs::{CoordSys, Dataset};
//!
//! let time = Array1::from_iter((0..8).map(|i| i as f64 / 4.0));
//! let vel = Array2::<f64>::zeros((3, 8));
//! let ds = Dataset::from_series(time, vel, 4.0, CoordSys::Inst).unwrap();
//! assert_eq!(ds.n_cells(), 1);
//! assert_eq!(ds.n_time(), 8);
//! ```

use ndarray::{Array1, Array2, Array3, Axis};

use crate::error::{Result, VelocityError};
use crate::rotate::FrameManager;
use crate::turbulence::{CrossSpectrum, Spectrum};
use crate::types::{CoordSys, Instrument};
use crate::velocity::VelocityView;

/// Scalar metadata carried by a dataset.
#[derive(Clone, Debug, PartialEq)]
pub struct Attrs {
    /// Frame the velocity array is currently expressed in.
    pub coord_sys: CoordSys,
    /// Sample rate of the raw record (Hz).
    pub fs: f64,
    /// Instrument that recorded the data.
    pub instrument: Instrument,
    /// Magnetic declination applied to `orientmat` (degrees, positive when
    /// magnetic north is clockwise of true north).
    pub declination: Option<f64>,
    /// Whether `orientmat` references true rather than magnetic north.
    pub declination_in_orientmat: bool,
    /// Heading of the principal axis (degrees clockwise from north).
    pub principal_heading: Option<f64>,
    /// Marker for the write-once head rotation calibration.
    pub inst2head_rotmat_was_set: bool,
    /// Bin size, for binned datasets.
    pub n_bin: Option<usize>,
    /// FFT length, for binned datasets.
    pub n_fft: Option<usize>,
}

impl Attrs {
    fn new(coord_sys: CoordSys, fs: f64) -> Self {
        Self {
            coord_sys,
            fs,
            instrument: Instrument::unknown(),
            declination: None,
            declination_in_orientmat: false,
            principal_heading: None,
            inst2head_rotmat_was_set: false,
            n_bin: None,
            n_fft: None,
        }
    }
}

/// A velocity record with its orientation data and metadata.
#[derive(Clone, Debug, PartialEq)]
pub struct Dataset {
    /// Sample times (s).
    pub time: Array1<f64>,
    /// Velocity `[component, cell, time]` (m/s).
    pub vel: Array3<f64>,
    /// Sample times of the fifth (vertical) beam.
    pub time_b5: Option<Array1<f64>>,
    /// Fifth-beam velocity `[cell, time_b5]`; never rotated.
    pub vel_b5: Option<Array2<f64>>,
    /// Earth-to-instrument rotation per sample `[3, 3, time]`.
    pub orientmat: Option<Array3<f64>>,
    /// Compass heading per sample (degrees).
    pub heading: Option<Array1<f64>>,
    /// Beam-to-instrument transformation matrix (N×N).
    pub beam2inst_orientmat: Option<Array2<f64>>,
    /// Instrument-to-head rotation for cable-head instruments (3×3).
    pub inst2head_rotmat: Option<Array2<f64>>,
    /// Attached TKE vector `[3, cell, time]`.
    pub tke_vec: Option<Array3<f32>>,
    /// Attached Reynolds stress vector `[3, cell, time]`.
    pub stress_vec: Option<Array3<f32>>,
    /// Standard deviation of horizontal speed per bin `[cell, time]`.
    pub u_std: Option<Array2<f64>>,
    /// Attached velocity auto-spectra.
    pub psd: Option<Spectrum>,
    /// Attached velocity cross-spectra.
    pub csd: Option<CrossSpectrum>,
    /// Scalar metadata.
    pub attrs: Attrs,
}

impl Dataset {
    /// Create a dataset from time and `[component, cell, time]` velocity.
    pub fn new(time: Array1<f64>, vel: Array3<f64>, fs: f64, coord_sys: CoordSys) -> Result<Self> {
        let (n_comp, _, n_time) = vel.dim();
        if n_comp < 3 {
            return Err(VelocityError::dimension_mismatch(
                "at least 3 velocity components",
                format!("{n_comp}"),
            ));
        }
        if n_time != time.len() {
            return Err(VelocityError::dimension_mismatch(
                format!("{} time samples in vel", time.len()),
                format!("{n_time}"),
            ));
        }
        Ok(Self {
            time,
            vel,
            time_b5: None,
            vel_b5: None,
            orientmat: None,
            heading: None,
            beam2inst_orientmat: None,
            inst2head_rotmat: None,
            tke_vec: None,
            stress_vec: None,
            u_std: None,
            psd: None,
            csd: None,
            attrs: Attrs::new(coord_sys, fs),
        })
    }

    /// Create a single-cell dataset from `[component, time]` velocity.
    pub fn from_series(
        time: Array1<f64>,
        vel: Array2<f64>,
        fs: f64,
        coord_sys: CoordSys,
    ) -> Result<Self> {
        Self::new(time, vel.insert_axis(Axis(1)), fs, coord_sys)
    }

    /// Set the instrument record.
    pub fn with_instrument(mut self, instrument: Instrument) -> Self {
        self.attrs.instrument = instrument;
        self
    }

    /// Attach an earth-to-instrument orientation matrix `[3, 3, time]`.
    pub fn with_orientmat(mut self, orientmat: Array3<f64>) -> Result<Self> {
        let expected = (3, 3, self.n_time());
        if orientmat.dim() != expected {
            return Err(VelocityError::dimension_mismatch(
                format!("orientmat {expected:?}"),
                format!("{:?}", orientmat.dim()),
            ));
        }
        self.orientmat = Some(orientmat);
        Ok(self)
    }

    /// Attach a heading series (degrees).
    pub fn with_heading(mut self, heading: Array1<f64>) -> Result<Self> {
        if heading.len() != self.n_time() {
            return Err(VelocityError::dimension_mismatch(
                format!("{} heading samples", self.n_time()),
                format!("{}", heading.len()),
            ));
        }
        self.heading = Some(heading);
        Ok(self)
    }

    /// Attach the beam-to-instrument transformation matrix.
    pub fn with_beam2inst(mut self, matrix: Array2<f64>) -> Result<Self> {
        let (r, c) = matrix.dim();
        if r != c || r < 3 || r > self.n_components() {
            return Err(VelocityError::dimension_mismatch(
                format!("square matrix of size 3..={}", self.n_components()),
                format!("{r}x{c}"),
            ));
        }
        self.beam2inst_orientmat = Some(matrix);
        Ok(self)
    }

    /// Attach fifth-beam data with its own time axis.
    pub fn with_beam5(mut self, time_b5: Array1<f64>, vel_b5: Array2<f64>) -> Result<Self> {
        if vel_b5.ncols() != time_b5.len() {
            return Err(VelocityError::dimension_mismatch(
                format!("{} fifth-beam samples", time_b5.len()),
                format!("{}", vel_b5.ncols()),
            ));
        }
        self.time_b5 = Some(time_b5);
        self.vel_b5 = Some(vel_b5);
        Ok(self)
    }

    /// Record an established principal-axis heading (degrees).
    pub fn with_principal_heading(mut self, heading: f64) -> Self {
        self.attrs.principal_heading = Some(heading);
        self
    }

    /// Number of time samples.
    #[inline]
    pub fn n_time(&self) -> usize {
        self.time.len()
    }

    /// Number of cells (1 for point measurements).
    #[inline]
    pub fn n_cells(&self) -> usize {
        self.vel.dim().1
    }

    /// Number of velocity components.
    #[inline]
    pub fn n_components(&self) -> usize {
        self.vel.dim().0
    }

    /// Current coordinate system.
    #[inline]
    pub fn coord_sys(&self) -> CoordSys {
        self.attrs.coord_sys
    }

    /// Whether turbulence statistics are attached.
    pub fn has_turbulence(&self) -> bool {
        self.tke_vec.is_some() && self.stress_vec.is_some()
    }

    /// Read-only derived quantities over the current velocity.
    pub fn velocity(&self) -> VelocityView<'_> {
        VelocityView::new(self)
    }

    /// Frame operations that mutate this dataset in place.
    pub fn frames(&mut self) -> FrameManager<'_> {
        FrameManager::new(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn series(n: usize) -> (Array1<f64>, Array2<f64>) {
        let time = Array1::from_iter((0..n).map(|i| i as f64));
        let vel = Array2::from_shape_fn((3, n), |(c, t)| (c * 10 + t) as f64);
        (time, vel)
    }

    #[test]
    fn test_from_series_adds_cell_axis() {
        let (time, vel) = series(5);
        let ds = Dataset::from_series(time, vel, 1.0, CoordSys::Inst).unwrap();
        assert_eq!(ds.vel.dim(), (3, 1, 5));
        assert_eq!(ds.vel[[2, 0, 4]], 24.0);
        assert_eq!(ds.coord_sys(), CoordSys::Inst);
    }

    #[test]
    fn test_time_length_checked() {
        let (_, vel) = series(5);
        let time = Array1::zeros(4);
        assert!(Dataset::from_series(time, vel, 1.0, CoordSys::Inst).is_err());
    }

    #[test]
    fn test_too_few_components() {
        let time = Array1::zeros(4);
        let vel = Array2::zeros((2, 4));
        assert!(matches!(
            Dataset::from_series(time, vel, 1.0, CoordSys::Inst),
            Err(VelocityError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn test_orientmat_shape_checked() {
        let (time, vel) = series(5);
        let ds = Dataset::from_series(time, vel, 1.0, CoordSys::Inst).unwrap();
        assert!(ds.clone().with_orientmat(Array3::zeros((3, 3, 4))).is_err());
        assert!(ds.with_orientmat(Array3::zeros((3, 3, 5))).is_ok());
    }

    #[test]
    fn test_beam2inst_must_be_square() {
        let (time, vel) = series(5);
        let ds = Dataset::from_series(time, vel, 1.0, CoordSys::Beam).unwrap();
        assert!(ds.clone().with_beam2inst(Array2::zeros((3, 4))).is_err());
        assert!(ds.clone().with_beam2inst(Array2::zeros((4, 4))).is_err());
        assert!(ds.with_beam2inst(Array2::eye(3)).is_ok());
    }
}
