//! Instrument identification and capabilities.

use serde::{Deserialize, Serialize};

/// Instrument families with distinct processing capabilities.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstrumentModel {
    /// Nortek Vector ADV (cable-mounted head possible).
    NortekVector,
    /// Nortek Signature AD2CP.
    NortekSignature,
    /// Nortek AWAC.
    NortekAwac,
    /// Teledyne RDI Workhorse or similar.
    RdiWorkhorse,
    /// Anything else.
    Other,
}

impl InstrumentModel {
    /// Resolve a make/model pair as written in instrument headers.
    pub fn from_make_model(make: &str, model: &str) -> Self {
        let make = make.trim().to_lowercase();
        let model = model.trim().to_lowercase();
        match make.as_str() {
            "nortek" if model.starts_with("vector") => InstrumentModel::NortekVector,
            "nortek" if model.starts_with("signature") => InstrumentModel::NortekSignature,
            "nortek" if model.starts_with("awac") => InstrumentModel::NortekAwac,
            "trdi" | "rdi" | "teledyne rdi" => InstrumentModel::RdiWorkhorse,
            _ => InstrumentModel::Other,
        }
    }

    /// Whether the transducer head can be mounted apart from the housing,
    /// which requires an `inst2head_rotmat` calibration.
    #[inline]
    pub fn supports_head_offset(self) -> bool {
        matches!(self, InstrumentModel::NortekVector)
    }
}

/// Instrument make and model as recorded, plus the resolved family.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Instrument {
    pub make: String,
    pub model: String,
    pub kind: InstrumentModel,
}

impl Instrument {
    /// Create an instrument record, resolving the family once.
    pub fn new(make: impl Into<String>, model: impl Into<String>) -> Self {
        let make = make.into();
        let model = model.into();
        let kind = InstrumentModel::from_make_model(&make, &model);
        Self { make, model, kind }
    }

    /// Placeholder for synthetic or unidentified data.
    pub fn unknown() -> Self {
        Self {
            make: String::new(),
            model: String::new(),
            kind: InstrumentModel::Other,
        }
    }
}
