//! Read-only velocity accessors.

use ndarray::{Array2, ArrayView2, Zip, s};
use num_complex::Complex64;

use crate::dataset::Dataset;

/// Borrowing view over a dataset's velocity.
///
/// Derived quantities are computed on demand from the current frame; an
/// in-place rotation needs `&mut Dataset`, so a view can never observe a
/// half-rotated array.
#[derive(Clone, Copy, Debug)]
pub struct VelocityView<'a> {
    pub(crate) ds: &'a Dataset,
}

impl<'a> VelocityView<'a> {
    pub fn new(ds: &'a Dataset) -> Self {
        Self { ds }
    }

    /// First component `[cell, time]`.
    pub fn u(&self) -> ArrayView2<'a, f64> {
        self.ds.vel.slice(s![0, .., ..])
    }

    /// Second component `[cell, time]`.
    pub fn v(&self) -> ArrayView2<'a, f64> {
        self.ds.vel.slice(s![1, .., ..])
    }

    /// Third component `[cell, time]`.
    pub fn w(&self) -> ArrayView2<'a, f64> {
        self.ds.vel.slice(s![2, .., ..])
    }

    /// Horizontal velocity as `u + iv`.
    pub fn horizontal(&self) -> Array2<Complex64> {
        Zip::from(self.u())
            .and(self.v())
            .map_collect(|&u, &v| Complex64::new(u, v))
    }

    /// Horizontal speed `|u + iv|`.
    pub fn u_mag(&self) -> Array2<f64> {
        Zip::from(self.u())
            .and(self.v())
            .map_collect(|&u, &v| u.hypot(v))
    }

    /// Horizontal direction `arg(u + iv)` in radians, counter-clockwise from
    /// the first axis.
    pub fn u_dir(&self) -> Array2<f64> {
        Zip::from(self.u())
            .and(self.v())
            .map_collect(|&u, &v| v.atan2(u))
    }
}
