//! Strongly-typed metadata for velocity datasets.
//!
//! String-valued attributes in the raw instrument metadata (coordinate
//! system names, make/model strings, frequency unit names) are parsed once
//! into enums so that later code matches on variants instead of comparing
//! strings.
//!
//! # Example
//!
//! ```
//! use velocity_rs::types::{CoordSys, FreqUnits, InstrumentModel};
//!
//! let cs: CoordSys = "earth".parse().unwrap();
//! assert_eq!(cs, CoordSys::Earth);
//!
//! let model = InstrumentModel::from_make_model("Nortek", "Vector");
//! assert!(model.supports_head_offset());
//!
//! assert_eq!(FreqUnits::parse("rad/s"), FreqUnits::RadPerSec);
//! ```

mod coord_sys;
mod instrument;
mod units;

pub use coord_sys::CoordSys;
pub use instrument::{Instrument, InstrumentModel};
pub use units::FreqUnits;
