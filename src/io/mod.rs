//! File input.
//!
//! Instrument binary formats are read elsewhere; this module handles the
//! small JSON "userdata" files that carry per-deployment calibration.
//!
//! # Example
//!
//! ```ignore
//! use std::path::Path;
//! use velocity_rs::io::read_userdata;
//!
//! let userdata = read_userdata(Path::new("deployment.userdata.json"))?;
//! userdata.apply(&mut ds)?;
//! ```

mod userdata;

pub use userdata::{HeadRotation, UserData, UserDataError, parse_userdata, read_userdata};
