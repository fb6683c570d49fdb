//! Frequency unit bookkeeping for spectra.

use std::f64::consts::PI;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Units of a spectral frequency axis.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum FreqUnits {
    /// Linear frequency `f` in Hz.
    #[default]
    #[serde(rename = "Hz")]
    Hz,
    /// Angular frequency `omega` in rad/s.
    #[serde(rename = "rad/s")]
    RadPerSec,
}

impl FreqUnits {
    /// Parse a unit string. Anything mentioning `rad` is angular,
    /// everything else is Hz.
    pub fn parse(units: &str) -> Self {
        if units.contains("rad") {
            FreqUnits::RadPerSec
        } else {
            FreqUnits::Hz
        }
    }

    /// Factor applied to the sample rate: 1 for Hz, 2π for rad/s.
    #[inline]
    pub fn fs_scale(self) -> f64 {
        match self {
            FreqUnits::Hz => 1.0,
            FreqUnits::RadPerSec => 2.0 * PI,
        }
    }

    /// Name of the frequency axis.
    pub fn key(self) -> &'static str {
        match self {
            FreqUnits::Hz => "f",
            FreqUnits::RadPerSec => "omega",
        }
    }

    /// Units of the frequency axis itself.
    pub fn label(self) -> &'static str {
        match self {
            FreqUnits::Hz => "Hz",
            FreqUnits::RadPerSec => "rad/s",
        }
    }

    /// Units of a velocity spectral density on this axis.
    pub fn spectral_units(self) -> &'static str {
        match self {
            FreqUnits::Hz => "m^2/s^2/Hz",
            FreqUnits::RadPerSec => "m^2/s/rad",
        }
    }
}

impl fmt::Display for FreqUnits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
