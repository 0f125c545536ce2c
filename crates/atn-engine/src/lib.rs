//! # ATN Engine
//!
//! Pure biomarker logic for the ATN staging workflow:
//! - hippocampal volume normalisation
//! - method-specific threshold lookup
//! - per-axis classification with conflict reporting
//! - mapping of the A/T/N profile to a diagnosis label, severity and recommendations
//!
//! **No I/O and no workflow state**: the controller in `atn-core` and the reference backend in
//! `atn-backend` both call into this crate so that client and server derive identical results.

pub mod axis;
pub mod classify;
pub mod diagnosis;
pub mod method;
pub mod normalize;
pub mod thresholds;

pub use axis::{AtnTriple, AxisStatus, BiomarkerAxis, Sign};
pub use classify::{
    classify_axis, classify_patient, AtnProfile, AxisCall, AxisConflict, AxisReading,
    BiomarkerPanel,
};
pub use diagnosis::{
    map_to_diagnosis, severity_from_mmse, CognitiveContext, DiagnosisLabel, DiagnosisResult,
    RiskFactor, SeverityTier, MMSE_IMPAIRMENT_MAX, MOCA_IMPAIRMENT_MAX,
};
pub use method::{AssayMethod, Marker};
pub use normalize::{normalize_hippocampal_volume, Reading, HIPPOCAMPAL_SCALE_FACTOR};
pub use thresholds::{Comparator, ThresholdRow, ThresholdRule, ThresholdTable, DEFAULT_ROWS};

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("unknown assay method: {0}")]
    UnknownMethod(String),
    #[error("invalid threshold table: {0}")]
    InvalidThresholds(String),
}

pub type EngineResult<T> = std::result::Result<T, EngineError>;
