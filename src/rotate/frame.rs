//! Coordinate-frame transitions for a [`Dataset`].
//!
//! [`FrameManager`] borrows a dataset mutably and moves it along the frame
//! chain `beam <-> inst <-> earth <-> principal`. Every rotation plans the
//! whole path first, so a missing matrix or heading fails before any array
//! is touched and `coord_sys` always matches the velocity data.
//!
//! # Example
//!
//! ```ignore
//! let mut ds = load_vector_record()?;
//! ds.frames().set_declination(12.5)?;
//! ds.frames().rotate2(CoordSys::Earth)?;
//! ```

use ndarray::{Array1, Array2, s};
use tracing::debug;

use super::matrix::{
    Mat3, calc_principal_heading, earth2principal, from_mat3, invert, orientmat_at,
    rotate_turbulence, rotate_vectors, rotate_vectors_orient, rotation_z, to_mat3, transpose,
};
use crate::dataset::Dataset;
use crate::error::{Result, VelocityError};
use crate::types::CoordSys;

/// Rotation applied by one step of a path.
#[derive(Debug)]
enum StepRotation {
    /// Constant N×N matrix on the first N components.
    Constant(Array2<f64>),
    /// Per-sample orientation matrix; `transpose` maps inst → earth.
    Orient { transpose: bool },
}

#[derive(Debug)]
struct Step {
    from: CoordSys,
    to: CoordSys,
    rotation: StepRotation,
}

/// Mutating frame operations on a borrowed dataset.
#[derive(Debug)]
pub struct FrameManager<'a> {
    ds: &'a mut Dataset,
}

impl<'a> FrameManager<'a> {
    pub fn new(ds: &'a mut Dataset) -> Self {
        Self { ds }
    }

    /// Current frame of the velocity data.
    pub fn coord_sys(&self) -> CoordSys {
        self.ds.attrs.coord_sys
    }

    /// Rotate the dataset to `target` in place.
    ///
    /// Does nothing if the dataset is already in `target`. Attached TKE and
    /// stress vectors are rotated as a tensor with the same matrices.
    pub fn rotate2(&mut self, target: CoordSys) -> Result<()> {
        let from = self.coord_sys();
        if from == target {
            return Ok(());
        }

        let steps = from
            .path_to(target)
            .into_iter()
            .map(|(a, b)| plan_step(&*self.ds, a, b))
            .collect::<Result<Vec<_>>>()?;

        for step in &steps {
            debug!(from = %step.from, to = %step.to, "Rotating velocity");
            apply_step(self.ds, step);
            self.ds.attrs.coord_sys = step.to;
        }
        Ok(())
    }

    /// Run `body` with the dataset temporarily in `frame`.
    ///
    /// The original frame is restored whether or not `body` succeeds; an
    /// error from `body` takes precedence over one from the restore.
    fn with_frame<T>(
        &mut self,
        frame: CoordSys,
        body: impl FnOnce(&mut Self) -> Result<T>,
    ) -> Result<T> {
        let original = self.coord_sys();
        self.rotate2(frame)?;
        let result = body(self);
        let restored = self.rotate2(original);
        let value = result?;
        restored?;
        Ok(value)
    }

    // =========================================================================
    // Calibration
    // =========================================================================

    /// Set the instrument-to-head rotation of a cable-head instrument.
    ///
    /// The matrix can only be set once. Data already in the instrument frame
    /// (or beyond) is corrected by `v ← Hᵀ v`; data in beam coordinates
    /// picks the matrix up on its next rotation to `inst`.
    pub fn set_inst2head_rotmat(&mut self, rotmat: Array2<f64>) -> Result<()> {
        let kind = self.ds.attrs.instrument.kind;
        if !kind.supports_head_offset() {
            return Err(VelocityError::Configuration(format!(
                "inst2head_rotmat is only supported for Nortek Vector instruments, not {kind:?}"
            )));
        }
        if self.ds.attrs.inst2head_rotmat_was_set {
            return Err(VelocityError::Configuration(
                "inst2head_rotmat has already been set".into(),
            ));
        }
        let h = to_mat3(rotmat.view())?;

        if self.coord_sys() == CoordSys::Beam {
            self.store_inst2head(rotmat);
            return Ok(());
        }

        self.with_frame(CoordSys::Inst, |fm| {
            let ht = transpose(&h);
            rotate_vectors(&mut fm.ds.vel, from_mat3(&ht).view());
            if let (Some(tke), Some(stress)) =
                (fm.ds.tke_vec.as_mut(), fm.ds.stress_vec.as_mut())
            {
                rotate_turbulence(tke, stress, |_| ht);
            }
            fm.store_inst2head(rotmat);
            Ok(())
        })
    }

    fn store_inst2head(&mut self, rotmat: Array2<f64>) {
        debug!("Setting inst2head_rotmat");
        self.ds.inst2head_rotmat = Some(rotmat);
        self.ds.attrs.inst2head_rotmat_was_set = true;
    }

    /// Set the magnetic declination (degrees, positive clockwise of true
    /// north).
    ///
    /// Only the difference from the current declination is applied, so
    /// repeated calls do not accumulate. `orientmat`, `heading` and
    /// `principal_heading` are updated to reference true north; earth-frame
    /// velocity is re-expressed in true ENU.
    pub fn set_declination(&mut self, declination: f64) -> Result<()> {
        if self.ds.orientmat.is_none() {
            return Err(VelocityError::Configuration(
                "declination requires an orientation matrix".into(),
            ));
        }
        let delta = declination - self.ds.attrs.declination.unwrap_or(0.0);
        let rdec = rotation_z((-delta).to_radians());
        debug!(declination, delta, "Applying declination");

        let apply = |fm: &mut Self| -> Result<()> {
            if let Some(om) = fm.ds.orientmat.as_mut() {
                let n_time = om.dim().2;
                for t in 0..n_time {
                    let o = orientmat_at(om.view(), t, false);
                    for k in 0..3 {
                        for i in 0..3 {
                            om[[k, i, t]] = (0..3).map(|j| o[k][j] * rdec[i][j]).sum();
                        }
                    }
                }
            }
            if let Some(heading) = fm.ds.heading.as_mut() {
                heading.mapv_inplace(|h| h + delta);
            }
            Ok(())
        };

        if self.coord_sys() == CoordSys::Earth {
            self.with_frame(CoordSys::Inst, apply)?;
        } else {
            apply(self)?;
        }

        if let Some(ph) = self.ds.attrs.principal_heading.as_mut() {
            *ph += delta;
        }
        self.ds.attrs.declination = Some(declination);
        self.ds.attrs.declination_in_orientmat = true;
        Ok(())
    }

    /// Set the principal-axis heading (degrees clockwise from north).
    ///
    /// Principal-frame data is re-expressed about the new axis.
    pub fn set_principal_heading(&mut self, heading: f64) -> Result<()> {
        if self.coord_sys() == CoordSys::Principal {
            self.with_frame(CoordSys::Earth, |fm| {
                fm.ds.attrs.principal_heading = Some(heading);
                Ok(())
            })
        } else {
            self.ds.attrs.principal_heading = Some(heading);
            Ok(())
        }
    }

    /// Estimate the principal heading from the earth-frame horizontal
    /// velocity of all cells. The dataset is left in its original frame.
    pub fn estimate_principal_heading(&mut self, tidal_mode: bool) -> Result<f64> {
        self.with_frame(CoordSys::Earth, |fm| {
            let u: Array1<f64> = fm.ds.vel.slice(s![0, .., ..]).iter().copied().collect();
            let v: Array1<f64> = fm.ds.vel.slice(s![1, .., ..]).iter().copied().collect();
            Ok(calc_principal_heading(u.view(), v.view(), tidal_mode))
        })
    }
}

/// Return a copy of `ds` rotated to `target`, leaving `ds` untouched.
pub fn rotate2(ds: &Dataset, target: CoordSys) -> Result<Dataset> {
    let mut out = ds.clone();
    out.frames().rotate2(target)?;
    Ok(out)
}

// =============================================================================
// Planning
// =============================================================================

fn plan_step(ds: &Dataset, from: CoordSys, to: CoordSys) -> Result<Step> {
    use CoordSys::*;

    let rotation = match (from, to) {
        (Beam, Inst) => StepRotation::Constant(beam2inst_matrix(ds, from, to)?),
        (Inst, Beam) => StepRotation::Constant(invert(beam2inst_matrix(ds, from, to)?.view())?),
        (Inst, Earth) | (Earth, Inst) => {
            let om = ds.orientmat.as_ref().ok_or_else(|| {
                VelocityError::unsupported(from, to, "no orientation matrix (orientmat)")
            })?;
            if om.dim().2 != ds.n_time() {
                return Err(VelocityError::dimension_mismatch(
                    format!("orientmat with {} time samples", ds.n_time()),
                    format!("{}", om.dim().2),
                ));
            }
            if let Some(tke) = &ds.tke_vec {
                if tke.dim().2 != ds.n_time() {
                    return Err(VelocityError::dimension_mismatch(
                        format!("turbulence vectors with {} time samples", ds.n_time()),
                        format!("{}", tke.dim().2),
                    ));
                }
            }
            StepRotation::Orient {
                transpose: from == Inst,
            }
        }
        (Earth, Principal) | (Principal, Earth) => {
            let heading = ds.attrs.principal_heading.ok_or_else(|| {
                VelocityError::unsupported(from, to, "principal_heading is not set")
            })?;
            let r = earth2principal(heading);
            let r = if from == Earth { r } else { transpose(&r) };
            StepRotation::Constant(from_mat3(&r))
        }
        _ => {
            return Err(VelocityError::unsupported(
                from,
                to,
                "frames are not adjacent",
            ));
        }
    };

    if let StepRotation::Constant(m) = &rotation {
        if ds.has_turbulence() && m.nrows() != 3 {
            return Err(VelocityError::unsupported(
                from,
                to,
                format!(
                    "cannot rotate stress tensors with a {}-beam transformation",
                    m.nrows()
                ),
            ));
        }
    }

    Ok(Step { from, to, rotation })
}

/// `Hᵀ · T`, with `H` embedded in the upper-left block when the beam
/// transform has more than three rows.
fn beam2inst_matrix(ds: &Dataset, from: CoordSys, to: CoordSys) -> Result<Array2<f64>> {
    let t = ds.beam2inst_orientmat.as_ref().ok_or_else(|| {
        VelocityError::unsupported(from, to, "no beam transformation matrix (beam2inst_orientmat)")
    })?;
    let Some(h) = &ds.inst2head_rotmat else {
        return Ok(t.clone());
    };
    let n = t.nrows();
    let mut ht = Array2::eye(n);
    ht.slice_mut(s![..3, ..3]).assign(&h.t());
    Ok(ht.dot(t))
}

fn apply_step(ds: &mut Dataset, step: &Step) {
    match &step.rotation {
        StepRotation::Constant(m) => {
            rotate_vectors(&mut ds.vel, m.view());
            if let (Some(tke), Some(stress)) = (ds.tke_vec.as_mut(), ds.stress_vec.as_mut()) {
                // Planning rejects non-3x3 matrices when tensors are attached
                if let Ok(r) = to_mat3(m.view()) {
                    rotate_turbulence(tke, stress, |_| r);
                }
            }
        }
        StepRotation::Orient { transpose } => {
            let Some(om) = ds.orientmat.as_ref() else {
                return;
            };
            rotate_vectors_orient(&mut ds.vel, om.view(), *transpose);
            if let (Some(tke), Some(stress)) = (ds.tke_vec.as_mut(), ds.stress_vec.as_mut()) {
                let om = om.view();
                rotate_turbulence(tke, stress, |t| -> Mat3 { orientmat_at(om, t, *transpose) });
            }
        }
    }
}
