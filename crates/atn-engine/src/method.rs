//! Assay platforms and the markers they report.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::EngineError;

/// Measurement platform that produced a biomarker reading.
///
/// The serialised names are the platform names clinicians select in the intake form.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AssayMethod {
    /// Automated CSF immunoassay.
    Elecsys,
    /// ELISA-based CSF assay.
    Innotest,
    /// Automated CSF chemiluminescence assay.
    Lumipulse,
    /// Volumetric MRI segmentation.
    #[serde(rename = "MRIFreesurfer")]
    MriFreesurfer,
    /// Blood-based single-molecule assay.
    PlasmaSimoa,
}

impl AssayMethod {
    pub const ALL: [AssayMethod; 5] = [
        AssayMethod::Elecsys,
        AssayMethod::Innotest,
        AssayMethod::Lumipulse,
        AssayMethod::MriFreesurfer,
        AssayMethod::PlasmaSimoa,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            AssayMethod::Elecsys => "Elecsys",
            AssayMethod::Innotest => "Innotest",
            AssayMethod::Lumipulse => "Lumipulse",
            AssayMethod::MriFreesurfer => "MRIFreesurfer",
            AssayMethod::PlasmaSimoa => "PlasmaSimoa",
        }
    }

    /// Names accepted by [`FromStr`], in declaration order.
    pub fn names() -> [&'static str; 5] {
        Self::ALL.map(AssayMethod::as_str)
    }
}

impl fmt::Display for AssayMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AssayMethod {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AssayMethod::ALL
            .into_iter()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| EngineError::UnknownMethod(s.to_owned()))
    }
}

/// A concrete measurement that a threshold row reads.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Marker {
    /// CSF Aβ42/Aβ40 ratio.
    CsfAbeta42_40Ratio,
    /// CSF Aβ42 concentration, pg/mL.
    CsfAbeta42,
    /// CSF phosphorylated tau / Aβ42 ratio.
    CsfPtauAbeta42Ratio,
    /// CSF p-tau181 concentration, pg/mL.
    CsfPtau181,
    /// CSF total tau concentration, pg/mL.
    CsfTotalTau,
    /// Plasma Aβ42/Aβ40 ratio.
    PlasmaAbeta42_40Ratio,
    /// Plasma p-tau181 concentration, pg/mL.
    PlasmaPtau181,
    /// (left + right hippocampus) / intracranial volume, per mille.
    NormalizedHippocampalVolume,
}

impl Marker {
    pub fn unit(self) -> &'static str {
        match self {
            Marker::CsfAbeta42 | Marker::CsfPtau181 | Marker::CsfTotalTau | Marker::PlasmaPtau181 => {
                "pg/mL"
            }
            Marker::CsfAbeta42_40Ratio
            | Marker::CsfPtauAbeta42Ratio
            | Marker::PlasmaAbeta42_40Ratio => "ratio",
            Marker::NormalizedHippocampalVolume => "per mille of ICV",
        }
    }
}

impl fmt::Display for Marker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Marker::CsfAbeta42_40Ratio => "CSF Aβ42/40 ratio",
            Marker::CsfAbeta42 => "CSF Aβ42",
            Marker::CsfPtauAbeta42Ratio => "CSF p-tau/Aβ42 ratio",
            Marker::CsfPtau181 => "CSF p-tau181",
            Marker::CsfTotalTau => "CSF t-tau",
            Marker::PlasmaAbeta42_40Ratio => "plasma Aβ42/40 ratio",
            Marker::PlasmaPtau181 => "plasma p-tau181",
            Marker::NormalizedHippocampalVolume => "normalized hippocampal volume",
        };
        f.write_str(name)
    }
}
