//! Per-deployment calibration ("userdata") files.
//!
//! A userdata file is a JSON object with any of the keys below; unknown
//! keys are rejected so typos do not silently go unapplied.
//!
//! ```text
//! {
//!     "declination": 15.8,
//!     "inst2head_rotmat": "identity",
//!     "fs": 32,
//!     "principal_heading": 212.4
//! }
//! ```
//!
//! `inst2head_rotmat` is either `"identity"` (or `"eye"`) or a 3×3 array of
//! rows.

use std::fs;
use std::path::Path;

use ndarray::Array2;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::dataset::Dataset;
use crate::error::VelocityError;

/// Error type for userdata files.
#[derive(Debug, Error)]
pub enum UserDataError {
    /// IO error reading the file.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The file is not valid userdata JSON.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A value is out of range.
    #[error("Invalid userdata: {0}")]
    Invalid(String),

    /// Applying a value to the dataset failed.
    #[error(transparent)]
    Velocity(#[from] VelocityError),
}

/// Named or explicit head rotation matrix.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HeadRotation {
    /// `"identity"` or `"eye"`.
    Named(String),
    /// Rows of a 3×3 matrix.
    Matrix([[f64; 3]; 3]),
}

impl HeadRotation {
    /// The rotation as a 3×3 array.
    pub fn to_matrix(&self) -> Result<Array2<f64>, UserDataError> {
        match self {
            HeadRotation::Named(name) => match name.as_str() {
                "identity" | "eye" => Ok(Array2::eye(3)),
                other => Err(UserDataError::Invalid(format!(
                    "unknown inst2head_rotmat '{other}'"
                ))),
            },
            HeadRotation::Matrix(rows) => Ok(Array2::from_shape_fn((3, 3), |(i, j)| rows[i][j])),
        }
    }
}

/// Calibration values from a userdata file.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UserData {
    /// Magnetic declination (degrees).
    #[serde(default)]
    pub declination: Option<f64>,
    /// Instrument-to-head rotation of a cable-head instrument.
    #[serde(default)]
    pub inst2head_rotmat: Option<HeadRotation>,
    /// Corrected sample rate (Hz).
    #[serde(default)]
    pub fs: Option<f64>,
    /// Heading of the principal axis (degrees).
    #[serde(default)]
    pub principal_heading: Option<f64>,
}

impl UserData {
    /// Apply the calibration to a dataset.
    ///
    /// The head rotation, declination and principal heading go through the
    /// dataset's frame operations, then the sample rate is set. All of it
    /// is staged on a copy; on error `ds` is left unchanged.
    pub fn apply(&self, ds: &mut Dataset) -> Result<(), UserDataError> {
        let mut staged = ds.clone();
        if let Some(rot) = &self.inst2head_rotmat {
            staged.frames().set_inst2head_rotmat(rot.to_matrix()?)?;
        }
        if let Some(declination) = self.declination {
            staged.frames().set_declination(declination)?;
        }
        if let Some(heading) = self.principal_heading {
            staged.frames().set_principal_heading(heading)?;
        }
        if let Some(fs) = self.fs {
            staged.attrs.fs = fs;
        }
        *ds = staged;
        debug!(userdata = ?self, "Applied userdata");
        Ok(())
    }

    fn validate(&self) -> Result<(), UserDataError> {
        if let Some(fs) = self.fs {
            if !(fs > 0.0 && fs.is_finite()) {
                return Err(UserDataError::Invalid(format!("fs must be positive, got {fs}")));
            }
        }
        for (name, value) in [
            ("declination", self.declination),
            ("principal_heading", self.principal_heading),
        ] {
            if value.is_some_and(|v| !v.is_finite()) {
                return Err(UserDataError::Invalid(format!("{name} must be finite")));
            }
        }
        if let Some(rot) = &self.inst2head_rotmat {
            rot.to_matrix()?;
        }
        Ok(())
    }
}

/// Parse userdata from a JSON string.
pub fn parse_userdata(text: &str) -> Result<UserData, UserDataError> {
    let userdata: UserData = serde_json::from_str(text)?;
    userdata.validate()?;
    Ok(userdata)
}

/// Read a userdata JSON file.
pub fn read_userdata(path: &Path) -> Result<UserData, UserDataError> {
    let text = fs::read_to_string(path)?;
    parse_userdata(&text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CoordSys, Instrument};
    use ndarray::{Array1, Array3};

    #[test]
    fn test_parse_named_and_matrix() {
        let ud = parse_userdata(r#"{"declination": 10.0, "inst2head_rotmat": "eye"}"#).unwrap();
        assert_eq!(ud.declination, Some(10.0));
        assert_eq!(ud.inst2head_rotmat.unwrap().to_matrix().unwrap(), Array2::<f64>::eye(3));

        let ud = parse_userdata(
            r#"{"inst2head_rotmat": [[0, 1, 0], [1, 0, 0], [0, 0, -1]], "fs": 16}"#,
        )
        .unwrap();
        let m = ud.inst2head_rotmat.unwrap().to_matrix().unwrap();
        assert_eq!(m[[0, 1]], 1.0);
        assert_eq!(m[[2, 2]], -1.0);
        assert_eq!(ud.fs, Some(16.0));
    }

    #[test]
    fn test_rejects_bad_input() {
        assert!(matches!(
            parse_userdata(r#"{"inst2head_rotmat": "rotated"}"#),
            Err(UserDataError::Invalid(_))
        ));
        assert!(matches!(
            parse_userdata(r#"{"fs": -1}"#),
            Err(UserDataError::Invalid(_))
        ));
        assert!(matches!(
            parse_userdata(r#"{"declinaton": 3}"#),
            Err(UserDataError::Json(_))
        ));
    }

    #[test]
    fn test_apply() {
        let n = 4;
        let time = Array1::from_iter((0..n).map(|i| i as f64));
        let mut om = Array3::zeros((3, 3, n));
        for t in 0..n {
            for i in 0..3 {
                om[[i, i, t]] = 1.0;
            }
        }
        let mut ds = Dataset::from_series(time, ndarray::Array2::zeros((3, n)), 8.0, CoordSys::Inst)
            .unwrap()
            .with_instrument(Instrument::new("Nortek", "Vector"))
            .with_orientmat(om)
            .unwrap();

        let ud = parse_userdata(
            r#"{"fs": 16, "inst2head_rotmat": "identity", "declination": 5, "principal_heading": 40}"#,
        )
        .unwrap();
        ud.apply(&mut ds).unwrap();

        assert_eq!(ds.attrs.fs, 16.0);
        assert!(ds.attrs.inst2head_rotmat_was_set);
        assert_eq!(ds.attrs.declination, Some(5.0));
        assert_eq!(ds.attrs.principal_heading, Some(40.0));

        // Second application hits the write-once guard
        let before = ds.clone();
        assert!(matches!(
            ud.apply(&mut ds),
            Err(UserDataError::Velocity(VelocityError::Configuration(_)))
        ));
        assert_eq!(ds, before);
    }

    #[test]
    fn test_failed_apply_leaves_dataset_untouched() {
        let n = 4;
        let time = Array1::from_iter((0..n).map(|i| i as f64));
        let mut ds = Dataset::from_series(time, ndarray::Array2::ones((3, n)), 8.0, CoordSys::Inst)
            .unwrap()
            .with_instrument(Instrument::new("Nortek", "Vector"));

        // Head rotation succeeds, declination fails without an orientation matrix
        let ud = parse_userdata(r#"{"fs": 16, "inst2head_rotmat": "eye", "declination": 5}"#)
            .unwrap();
        assert!(matches!(
            ud.apply(&mut ds),
            Err(UserDataError::Velocity(VelocityError::Configuration(_)))
        ));
        assert_eq!(ds.attrs.fs, 8.0);
        assert!(!ds.attrs.inst2head_rotmat_was_set);
        assert!(ds.inst2head_rotmat.is_none());
        assert_eq!(ds.attrs.declination, None);
    }
}
