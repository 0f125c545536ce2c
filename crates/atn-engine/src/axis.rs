//! Biomarker axes and the three-valued status each axis resolves to.

use serde::{Deserialize, Serialize};
use std::fmt;

/// One of the three ATN axes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BiomarkerAxis {
    Amyloid,
    Tau,
    Neurodegeneration,
}

impl BiomarkerAxis {
    pub const ALL: [BiomarkerAxis; 3] = [
        BiomarkerAxis::Amyloid,
        BiomarkerAxis::Tau,
        BiomarkerAxis::Neurodegeneration,
    ];

    /// Single-letter code used in ATN profile strings.
    pub fn letter(self) -> char {
        match self {
            BiomarkerAxis::Amyloid => 'A',
            BiomarkerAxis::Tau => 'T',
            BiomarkerAxis::Neurodegeneration => 'N',
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            BiomarkerAxis::Amyloid => "amyloid",
            BiomarkerAxis::Tau => "tau",
            BiomarkerAxis::Neurodegeneration => "neurodegeneration",
        }
    }
}

impl fmt::Display for BiomarkerAxis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Status of a single axis.
///
/// `Indeterminate` means the axis has no usable reading under any selected method, or the
/// readings it has disagree.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AxisStatus {
    Positive,
    Negative,
    Indeterminate,
}

impl AxisStatus {
    /// The definite sign of this status, if it has one.
    pub fn sign(self) -> Option<Sign> {
        match self {
            AxisStatus::Positive => Some(Sign::Positive),
            AxisStatus::Negative => Some(Sign::Negative),
            AxisStatus::Indeterminate => None,
        }
    }

    fn symbol(self) -> char {
        match self {
            AxisStatus::Positive => '+',
            AxisStatus::Negative => '-',
            AxisStatus::Indeterminate => '?',
        }
    }
}

/// A definite axis outcome.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Sign {
    Positive,
    Negative,
}

impl From<Sign> for AxisStatus {
    fn from(sign: Sign) -> Self {
        match sign {
            Sign::Positive => AxisStatus::Positive,
            Sign::Negative => AxisStatus::Negative,
        }
    }
}

/// The A/T/N status triple.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AtnTriple {
    pub amyloid: AxisStatus,
    pub tau: AxisStatus,
    pub neurodegeneration: AxisStatus,
}

impl AtnTriple {
    pub fn new(amyloid: AxisStatus, tau: AxisStatus, neurodegeneration: AxisStatus) -> Self {
        Self {
            amyloid,
            tau,
            neurodegeneration,
        }
    }

    pub fn get(&self, axis: BiomarkerAxis) -> AxisStatus {
        match axis {
            BiomarkerAxis::Amyloid => self.amyloid,
            BiomarkerAxis::Tau => self.tau,
            BiomarkerAxis::Neurodegeneration => self.neurodegeneration,
        }
    }

    pub fn any_positive(&self) -> bool {
        BiomarkerAxis::ALL
            .iter()
            .any(|axis| self.get(*axis) == AxisStatus::Positive)
    }

    pub fn all_positive(&self) -> bool {
        BiomarkerAxis::ALL
            .iter()
            .all(|axis| self.get(*axis) == AxisStatus::Positive)
    }

    pub fn any_indeterminate(&self) -> bool {
        BiomarkerAxis::ALL
            .iter()
            .any(|axis| self.get(*axis) == AxisStatus::Indeterminate)
    }
}

impl fmt::Display for AtnTriple {
    /// Renders the compact profile, e.g. `A+T+N-` or `A+T?N+`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for axis in BiomarkerAxis::ALL {
            write!(f, "{}{}", axis.letter(), self.get(axis).symbol())?;
        }
        Ok(())
    }
}
