//! Derived velocity quantities.
//!
//! [`VelocityView`] is obtained from [`Dataset::velocity`](crate::dataset::Dataset::velocity)
//! and exposes components, horizontal speed and direction of the current
//! frame. On a binned dataset it also exposes the turbulence statistics
//! (stress tensor, TKE, intensities, wavenumber).
//!
//! # Example
//!
//! ```
//! use ndarray::{Array1, Array2};
//! use velocity_rs::{CoordSys, Dataset};
//!
//! let vel = Array2::from_shape_vec((3, 1), vec![3.0, 4.0, 0.0]).unwrap();
//! let ds = Dataset::from_series(Array1::zeros(1), vel, 1.0, CoordSys::Earth).unwrap();
//! assert_eq!(ds.velocity().u_mag()[[0, 0]], 5.0);
//! ```

mod turbulence;
mod view;

pub use turbulence::PdReport;
pub use view::VelocityView;
