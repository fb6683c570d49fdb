//! Rotation matrix algebra.
//!
//! Vectors are rotated with `v' = R · v`; rank-2 tensors with
//! `τ' = R · τ · Rᵀ`, i.e. contracted on both indices. The same rule is the
//! covariance transform for any linear map, so it also holds for the
//! (non-orthogonal) beam transformation matrix.
//!
//! Orientation matrices are stored as `[3, 3, time]` and map earth to
//! instrument coordinates; instrument to earth uses the transpose.

use faer::{Mat, Side, linalg::solvers::Solve};
use ndarray::{Array2, Array3, ArrayView1, ArrayView2, ArrayView3};
use num_complex::Complex64;

use crate::error::{Result, VelocityError};

/// A 3×3 matrix in row-major nested arrays.
pub type Mat3 = [[f64; 3]; 3];

/// Identity matrix.
pub const IDENTITY: Mat3 = [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]];

/// Counter-clockwise rotation by `angle` radians about the vertical axis.
///
/// A clockwise rotation is a negative `angle`.
pub fn rotation_z(angle: f64) -> Mat3 {
    let (s, c) = angle.sin_cos();
    [[c, -s, 0.0], [s, c, 0.0], [0.0, 0.0, 1.0]]
}

/// Rotation from earth (ENU) into the principal frame.
///
/// `heading` is the direction of the principal axis in degrees clockwise
/// from north. The streamwise axis becomes the first component.
pub fn earth2principal(heading: f64) -> Mat3 {
    let (s, c) = (90.0 - heading).to_radians().sin_cos();
    [[c, s, 0.0], [-s, c, 0.0], [0.0, 0.0, 1.0]]
}

pub fn transpose(m: &Mat3) -> Mat3 {
    let mut t = [[0.0; 3]; 3];
    for i in 0..3 {
        for j in 0..3 {
            t[i][j] = m[j][i];
        }
    }
    t
}

pub fn matmul(a: &Mat3, b: &Mat3) -> Mat3 {
    let mut out = [[0.0; 3]; 3];
    for i in 0..3 {
        for j in 0..3 {
            out[i][j] = (0..3).map(|k| a[i][k] * b[k][j]).sum();
        }
    }
    out
}

/// Convert a 3×3 array into a [`Mat3`].
pub fn to_mat3(a: ArrayView2<f64>) -> Result<Mat3> {
    if a.dim() != (3, 3) {
        return Err(VelocityError::dimension_mismatch(
            "3x3 matrix",
            format!("{}x{}", a.nrows(), a.ncols()),
        ));
    }
    let mut m = [[0.0; 3]; 3];
    for i in 0..3 {
        for j in 0..3 {
            m[i][j] = a[[i, j]];
        }
    }
    Ok(m)
}

pub fn from_mat3(m: &Mat3) -> Array2<f64> {
    Array2::from_shape_fn((3, 3), |(i, j)| m[i][j])
}

/// Orientation matrix at time index `t`, transposed if `transpose`.
pub fn orientmat_at(orientmat: ArrayView3<f64>, t: usize, transpose: bool) -> Mat3 {
    let mut m = [[0.0; 3]; 3];
    for i in 0..3 {
        for j in 0..3 {
            m[i][j] = if transpose {
                orientmat[[j, i, t]]
            } else {
                orientmat[[i, j, t]]
            };
        }
    }
    m
}

// =============================================================================
// Vectors
// =============================================================================

/// Apply a constant N×N matrix to the first N components of
/// `vel[component, cell, time]`.
pub fn rotate_vectors(vel: &mut Array3<f64>, rmat: ArrayView2<f64>) {
    let n = rmat.nrows();
    let (_, n_cells, n_time) = vel.dim();
    let mut buf = vec![0.0; n];
    for cell in 0..n_cells {
        for t in 0..n_time {
            for (j, b) in buf.iter_mut().enumerate() {
                *b = vel[[j, cell, t]];
            }
            for i in 0..n {
                vel[[i, cell, t]] = (0..n).map(|j| rmat[[i, j]] * buf[j]).sum();
            }
        }
    }
}

/// Apply a per-sample orientation matrix to the first three components.
///
/// `transpose = false` maps earth → instrument, `true` instrument → earth.
pub fn rotate_vectors_orient(vel: &mut Array3<f64>, orientmat: ArrayView3<f64>, transpose: bool) {
    let (_, n_cells, n_time) = vel.dim();
    for t in 0..n_time {
        let r = orientmat_at(orientmat, t, transpose);
        for cell in 0..n_cells {
            let v = [vel[[0, cell, t]], vel[[1, cell, t]], vel[[2, cell, t]]];
            for i in 0..3 {
                vel[[i, cell, t]] = r[i][0] * v[0] + r[i][1] * v[1] + r[i][2] * v[2];
            }
        }
    }
}

// =============================================================================
// Tensors
// =============================================================================

/// Symmetric Reynolds stress tensor from TKE `[u'u', v'v', w'w']` and
/// stress `[u'v', u'w', v'w']` vectors.
pub fn tau_from_vectors(tke: [f64; 3], stress: [f64; 3]) -> Mat3 {
    [
        [tke[0], stress[0], stress[1]],
        [stress[0], tke[1], stress[2]],
        [stress[1], stress[2], tke[2]],
    ]
}

/// Split a tensor back into its diagonal and upper off-diagonal entries.
pub fn vectors_from_tau(tau: &Mat3) -> ([f64; 3], [f64; 3]) {
    (
        [tau[0][0], tau[1][1], tau[2][2]],
        [tau[0][1], tau[0][2], tau[1][2]],
    )
}

/// `R · τ · Rᵀ`.
pub fn rotate_tensor(tau: &Mat3, rmat: &Mat3) -> Mat3 {
    matmul(&matmul(rmat, tau), &transpose(rmat))
}

/// Rotate attached `[3, cell, time]` TKE and stress arrays in place.
///
/// `rmat_at(t)` supplies the rotation for each time index.
pub fn rotate_turbulence(
    tke_vec: &mut Array3<f32>,
    stress_vec: &mut Array3<f32>,
    rmat_at: impl Fn(usize) -> Mat3,
) {
    let (_, n_cells, n_time) = tke_vec.dim();
    for t in 0..n_time {
        let r = rmat_at(t);
        for cell in 0..n_cells {
            let tke = [0, 1, 2].map(|i| tke_vec[[i, cell, t]] as f64);
            let stress = [0, 1, 2].map(|i| stress_vec[[i, cell, t]] as f64);
            let rotated = rotate_tensor(&tau_from_vectors(tke, stress), &r);
            let (tke, stress) = vectors_from_tau(&rotated);
            for i in 0..3 {
                tke_vec[[i, cell, t]] = tke[i] as f32;
                stress_vec[[i, cell, t]] = stress[i] as f32;
            }
        }
    }
}

/// Eigenvalues of a symmetric 3×3 matrix, ascending.
pub fn symmetric_eigenvalues(tau: &Mat3) -> Result<[f64; 3]> {
    let m = Mat::from_fn(3, 3, |i, j| tau[i][j]);
    let eig = m
        .self_adjoint_eigenvalues(Side::Lower)
        .map_err(|e| VelocityError::Numerical(format!("eigenvalue solve failed: {e:?}")))?;
    let mut out = [eig[0], eig[1], eig[2]];
    out.sort_by(|a, b| a.total_cmp(b));
    Ok(out)
}

/// Whether a stress tensor is positive semi-definite.
///
/// Eigenvalues down to `-tol · max|λ|` are accepted as round-off.
pub fn is_positive_definite(tau: &Mat3) -> Result<bool> {
    const TOL: f64 = 1e-10;
    let eig = symmetric_eigenvalues(tau)?;
    let scale = eig.iter().fold(0.0_f64, |m, l| m.max(l.abs()));
    Ok(eig[0] >= -TOL * scale)
}

/// Inverse of a square matrix via full-pivot LU.
pub fn invert(a: ArrayView2<f64>) -> Result<Array2<f64>> {
    let (n, c) = a.dim();
    if n != c {
        return Err(VelocityError::dimension_mismatch(
            "square matrix",
            format!("{n}x{c}"),
        ));
    }

    let mut m = Mat::zeros(n, n);
    for i in 0..n {
        for j in 0..n {
            m[(i, j)] = a[[i, j]];
        }
    }
    let lu = m.as_ref().full_piv_lu();

    // Solve A * A_inv = I column by column
    let mut inv = Array2::zeros((n, n));
    for j in 0..n {
        let mut rhs = Mat::zeros(n, 1);
        rhs[(j, 0)] = 1.0;
        let col = lu.solve(&rhs);
        for i in 0..n {
            inv[[i, j]] = col[(i, 0)];
        }
    }

    if inv.iter().any(|x: &f64| !x.is_finite()) {
        return Err(VelocityError::Numerical("matrix is singular".into()));
    }
    Ok(inv)
}

/// Heading of the principal flow axis (degrees clockwise from north,
/// in [0, 360), rounded to 4 decimals).
///
/// In `tidal_mode` samples in the lower half of the `u + iv` plane are
/// reflected through the origin so that ebb and flood along the same axis
/// reinforce each other. Non-finite samples are skipped.
pub fn calc_principal_heading(u: ArrayView1<f64>, v: ArrayView1<f64>, tidal_mode: bool) -> f64 {
    let mut sum = Complex64::new(0.0, 0.0);
    let mut n = 0usize;
    for (&ui, &vi) in u.iter().zip(v.iter()) {
        if !(ui.is_finite() && vi.is_finite()) {
            continue;
        }
        let mut z = Complex64::new(ui, vi);
        if tidal_mode && z.im <= 0.0 {
            z = -z;
        }
        sum += z;
        n += 1;
    }
    if n == 0 {
        return f64::NAN;
    }
    let pang = (sum / n as f64).arg();
    let heading = (90.0 - pang.to_degrees()).rem_euclid(360.0);
    (heading * 1e4).round() / 1e4
}
