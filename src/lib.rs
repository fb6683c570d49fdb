//! # velocity-rs
//!
//! Processing of acoustic current meter (ADV/ADCP) velocity records.
//!
//! This crate provides:
//! - Coordinate frame rotations (beam, instrument, earth, principal axes)
//! - Magnetic declination and head rotation calibration
//! - Time binning, Welch power and cross spectra
//! - Turbulent kinetic energy and Reynolds stress estimation
//! - Derived velocity quantities (speed, direction, turbulence intensity)
//!
//! # Example
//!
//! ```
//! use ndarray::{Array1, Array2, Array3};
//! use velocity_rs::{CoordSys, Dataset, PsdOptions, VelBinner};
//!
//! let n = 512;
//! let fs = 16.0;
//! let time = Array1::from_iter((0..n).map(|i| i as f64 / fs));
//! let vel = Array2::from_shape_fn((3, n), |(c, t)| {
//!     0.5 + 0.05 * ((t as f64) * 0.37 * (c + 1) as f64).sin()
//! });
//! let mut orientmat = Array3::zeros((3, 3, n));
//! for t in 0..n {
//!     for i in 0..3 {
//!         orientmat[[i, i, t]] = 1.0;
//!     }
//! }
//! let mut raw = Dataset::from_series(time, vel, fs, CoordSys::Inst)
//!     .unwrap()
//!     .with_orientmat(orientmat)
//!     .unwrap();
//!
//! raw.frames().set_declination(10.0).unwrap();
//! raw.frames().rotate2(CoordSys::Earth).unwrap();
//!
//! let binner = VelBinner::new(256, fs).with_n_fft(128);
//! let mut avg = binner.do_tke(&raw, None).unwrap();
//! avg.psd = Some(binner.calc_vel_psd(&raw, &PsdOptions::default()).unwrap());
//!
//! let tke = avg.velocity().tke().unwrap();
//! assert_eq!(tke.dim(), (1, 2));
//! ```

pub mod binning;
pub mod dataset;
pub mod error;
pub mod io;
pub mod rotate;
pub mod turbulence;
pub mod types;
pub mod velocity;

// Re-export main types for convenience
pub use binning::{BinnerConfig, TimeBinner, Window};
pub use dataset::{Attrs, Dataset};
pub use error::{Result, VelocityError};
pub use io::{UserData, UserDataError, read_userdata};
pub use rotate::{FrameManager, rotate2};
pub use turbulence::{
    CrossSpectrum, CsdOptions, PsdOptions, Spectrum, StressVector, TkeVector, VelBinner,
};
pub use types::{CoordSys, FreqUnits, Instrument, InstrumentModel};
pub use velocity::{PdReport, VelocityView};
