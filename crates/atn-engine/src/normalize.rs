//! Biomarker normalisation.
//!
//! Only the composite volumetric measure is normalised; every other marker is classified on
//! its raw value.

use serde::{Deserialize, Serialize};

/// Scale applied to `(left + right) / icv`.
///
/// Volumes are taken in mm³, so the result is hippocampal volume per mille of intracranial
/// volume (typically 4–6 in adults).
pub const HIPPOCAMPAL_SCALE_FACTOR: f64 = 1000.0;

/// A value ready for thresholding, or the absence of one.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Reading {
    Value(f64),
    Indeterminate,
}

impl Reading {
    /// Wraps an optional raw value. Missing and non-finite values are `Indeterminate`.
    pub fn from_raw(raw: Option<f64>) -> Self {
        match raw {
            Some(v) if v.is_finite() => Reading::Value(v),
            _ => Reading::Indeterminate,
        }
    }

    pub fn value(self) -> Option<f64> {
        match self {
            Reading::Value(v) => Some(v),
            Reading::Indeterminate => None,
        }
    }
}

/// Combines left/right hippocampal volumes with intracranial volume.
///
/// Computes `(left + right) / icv * HIPPOCAMPAL_SCALE_FACTOR`. Returns
/// [`Reading::Indeterminate`] if any input is missing or non-finite, or if `icv <= 0`.
pub fn normalize_hippocampal_volume(
    left: Option<f64>,
    right: Option<f64>,
    intracranial_volume: Option<f64>,
) -> Reading {
    let (Some(left), Some(right), Some(icv)) = (left, right, intracranial_volume) else {
        return Reading::Indeterminate;
    };
    if !(left.is_finite() && right.is_finite() && icv.is_finite()) || icv <= 0.0 {
        return Reading::Indeterminate;
    }

    Reading::from_raw(Some((left + right) / icv * HIPPOCAMPAL_SCALE_FACTOR))
}
