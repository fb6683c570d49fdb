//! Coordinate frames a velocity array can be expressed in.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::VelocityError;

/// Coordinate system of a velocity array.
///
/// The frames form a chain; rotations only move between neighbours:
///
/// ```text
/// beam <-> inst <-> earth <-> principal
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CoordSys {
    /// Along each transducer's beam.
    Beam,
    /// Instrument body axes (XYZ).
    Inst,
    /// East, North, Up (magnetic or true, depending on declination).
    Earth,
    /// Streamwise, cross-stream, up.
    Principal,
}

impl CoordSys {
    /// All frames in chain order.
    pub const ALL: [CoordSys; 4] = [
        CoordSys::Beam,
        CoordSys::Inst,
        CoordSys::Earth,
        CoordSys::Principal,
    ];

    /// Position of this frame along the rotation chain.
    #[inline]
    pub fn rank(self) -> usize {
        match self {
            CoordSys::Beam => 0,
            CoordSys::Inst => 1,
            CoordSys::Earth => 2,
            CoordSys::Principal => 3,
        }
    }

    /// The neighbouring frame one step toward `target`, or `None` if
    /// already there.
    pub fn step_toward(self, target: CoordSys) -> Option<CoordSys> {
        let (from, to) = (self.rank(), target.rank());
        if from == to {
            None
        } else if from < to {
            Some(Self::ALL[from + 1])
        } else {
            Some(Self::ALL[from - 1])
        }
    }

    /// Sequence of single-step transitions from `self` to `target`.
    pub fn path_to(self, target: CoordSys) -> Vec<(CoordSys, CoordSys)> {
        let mut steps = Vec::new();
        let mut current = self;
        while let Some(next) = current.step_toward(target) {
            steps.push((current, next));
            current = next;
        }
        steps
    }

    /// Lowercase name as stored in dataset attributes.
    pub fn as_str(self) -> &'static str {
        match self {
            CoordSys::Beam => "beam",
            CoordSys::Inst => "inst",
            CoordSys::Earth => "earth",
            CoordSys::Principal => "principal",
        }
    }
}

impl fmt::Display for CoordSys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CoordSys {
    type Err = VelocityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "beam" => Ok(CoordSys::Beam),
            "inst" | "xyz" => Ok(CoordSys::Inst),
            "earth" | "enu" => Ok(CoordSys::Earth),
            "principal" => Ok(CoordSys::Principal),
            other => Err(VelocityError::InvalidParameter(format!(
                "unknown coordinate system '{other}'"
            ))),
        }
    }
}
