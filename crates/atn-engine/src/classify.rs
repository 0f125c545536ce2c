//! ATN classification.
//!
//! Each selected method that has a threshold row for an axis contributes one reading when
//! its marker value is present. Agreeing readings decide the axis; disagreeing readings make
//! the axis `Indeterminate` and are reported as an [`AxisConflict`]. Nothing is resolved by
//! vote or platform priority.

use crate::axis::{AtnTriple, AxisStatus, BiomarkerAxis};
use crate::method::{AssayMethod, Marker};
use crate::normalize::{normalize_hippocampal_volume, Reading};
use crate::thresholds::ThresholdTable;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Raw biomarker inputs for one patient, plus the methods the clinician selected.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BiomarkerPanel {
    pub methods: BTreeSet<AssayMethod>,
    pub csf_abeta42_40_ratio: Option<f64>,
    pub csf_abeta42: Option<f64>,
    pub csf_ptau_abeta42_ratio: Option<f64>,
    pub csf_ptau181: Option<f64>,
    pub csf_total_tau: Option<f64>,
    pub plasma_abeta42_40_ratio: Option<f64>,
    pub plasma_ptau181: Option<f64>,
    /// Left hippocampal volume, mm³.
    pub hippocampal_left: Option<f64>,
    /// Right hippocampal volume, mm³.
    pub hippocampal_right: Option<f64>,
    /// Intracranial volume, mm³.
    pub intracranial_volume: Option<f64>,
}

impl BiomarkerPanel {
    /// The thresholdable value for `marker`.
    pub fn reading(&self, marker: Marker) -> Reading {
        let raw = match marker {
            Marker::CsfAbeta42_40Ratio => self.csf_abeta42_40_ratio,
            Marker::CsfAbeta42 => self.csf_abeta42,
            Marker::CsfPtauAbeta42Ratio => self.csf_ptau_abeta42_ratio,
            Marker::CsfPtau181 => self.csf_ptau181,
            Marker::CsfTotalTau => self.csf_total_tau,
            Marker::PlasmaAbeta42_40Ratio => self.plasma_abeta42_40_ratio,
            Marker::PlasmaPtau181 => self.plasma_ptau181,
            Marker::NormalizedHippocampalVolume => {
                return normalize_hippocampal_volume(
                    self.hippocampal_left,
                    self.hippocampal_right,
                    self.intracranial_volume,
                )
            }
        };
        Reading::from_raw(raw)
    }
}

/// One classified measurement.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AxisReading {
    pub method: AssayMethod,
    pub marker: Marker,
    pub value: f64,
    pub status: AxisStatus,
}

/// The outcome for one axis together with the evidence behind it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AxisCall {
    pub axis: BiomarkerAxis,
    pub status: AxisStatus,
    /// Readings that produced a definite sign.
    pub readings: Vec<AxisReading>,
    /// Selected methods with a row for this axis but no usable value.
    pub missing: Vec<AssayMethod>,
}

impl AxisCall {
    /// True when the readings disagree.
    pub fn is_conflicted(&self) -> bool {
        let mut statuses = self.readings.iter().map(|r| r.status);
        match statuses.next() {
            Some(first) => statuses.any(|s| s != first),
            None => false,
        }
    }
}

/// Disagreeing readings for one axis, surfaced for clinical review.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AxisConflict {
    pub axis: BiomarkerAxis,
    pub readings: Vec<AxisReading>,
}

/// Per-axis calls for a patient.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AtnProfile {
    pub amyloid: AxisCall,
    pub tau: AxisCall,
    pub neurodegeneration: AxisCall,
}

impl AtnProfile {
    pub fn call(&self, axis: BiomarkerAxis) -> &AxisCall {
        match axis {
            BiomarkerAxis::Amyloid => &self.amyloid,
            BiomarkerAxis::Tau => &self.tau,
            BiomarkerAxis::Neurodegeneration => &self.neurodegeneration,
        }
    }

    pub fn triple(&self) -> AtnTriple {
        AtnTriple::new(
            self.amyloid.status,
            self.tau.status,
            self.neurodegeneration.status,
        )
    }

    pub fn conflicts(&self) -> Vec<AxisConflict> {
        BiomarkerAxis::ALL
            .iter()
            .map(|axis| self.call(*axis))
            .filter(|call| call.is_conflicted())
            .map(|call| AxisConflict {
                axis: call.axis,
                readings: call.readings.clone(),
            })
            .collect()
    }
}

/// Classifies a single value for `(axis, method)`.
///
/// Returns `Indeterminate` when the table has no row for the key or the reading is
/// indeterminate.
pub fn classify_axis(
    table: &ThresholdTable,
    axis: BiomarkerAxis,
    method: AssayMethod,
    reading: Reading,
) -> AxisStatus {
    match (table.rule(axis, method), reading) {
        (Some(rule), Reading::Value(value)) => rule.positive_when.evaluate(value, rule.cutoff).into(),
        _ => AxisStatus::Indeterminate,
    }
}

fn call_axis(table: &ThresholdTable, panel: &BiomarkerPanel, axis: BiomarkerAxis) -> AxisCall {
    let mut readings = Vec::new();
    let mut missing = Vec::new();

    for &method in &panel.methods {
        let Some(rule) = table.rule(axis, method) else {
            continue;
        };
        let reading = panel.reading(rule.marker);
        match reading.value() {
            Some(value) => readings.push(AxisReading {
                method,
                marker: rule.marker,
                value,
                status: classify_axis(table, axis, method, reading),
            }),
            None => missing.push(method),
        }
    }

    let mut statuses = readings.iter().map(|r| r.status);
    let status = match statuses.next() {
        None => AxisStatus::Indeterminate,
        Some(first) if statuses.all(|s| s == first) => first,
        Some(_) => {
            tracing::warn!(
                axis = %axis,
                readings = readings.len(),
                "conflicting {} readings, axis left indeterminate",
                axis
            );
            AxisStatus::Indeterminate
        }
    };

    tracing::debug!(axis = %axis, ?status, readings = readings.len(), missing = missing.len(), "axis classified");

    AxisCall {
        axis,
        status,
        readings,
        missing,
    }
}

/// Classifies all three axes for a patient.
///
/// Pure: identical panels and tables always produce identical profiles.
pub fn classify_patient(panel: &BiomarkerPanel, table: &ThresholdTable) -> AtnProfile {
    AtnProfile {
        amyloid: call_axis(table, panel, BiomarkerAxis::Amyloid),
        tau: call_axis(table, panel, BiomarkerAxis::Tau),
        neurodegeneration: call_axis(table, panel, BiomarkerAxis::Neurodegeneration),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::thresholds::{Comparator, DEFAULT_ROWS};
    use AxisStatus::*;

    fn table() -> ThresholdTable {
        ThresholdTable::default()
    }

    fn panel(methods: &[AssayMethod]) -> BiomarkerPanel {
        BiomarkerPanel {
            methods: methods.iter().copied().collect(),
            ..Default::default()
        }
    }

    /// Nudges a value just across the cutoff in the given direction.
    fn nudge(cutoff: f64, up: bool) -> f64 {
        let step = cutoff.abs().max(1.0) * 1e-6;
        if up {
            cutoff + step
        } else {
            cutoff - step
        }
    }

    #[test]
    fn every_default_row_honours_its_boundary() {
        let table = table();
        for row in DEFAULT_ROWS {
            let at = classify_axis(&table, row.axis, row.method, Reading::Value(row.cutoff));
            let (below, above) = (
                classify_axis(&table, row.axis, row.method, Reading::Value(nudge(row.cutoff, false))),
                classify_axis(&table, row.axis, row.method, Reading::Value(nudge(row.cutoff, true))),
            );
            match row.positive_when {
                Comparator::AtMost => assert_eq!((below, at, above), (Positive, Positive, Negative)),
                Comparator::Below => assert_eq!((below, at, above), (Positive, Negative, Negative)),
                Comparator::AtLeast => assert_eq!((below, at, above), (Negative, Positive, Positive)),
                Comparator::Above => assert_eq!((below, at, above), (Negative, Negative, Positive)),
            }
        }
    }

    #[test]
    fn default_table_covers_every_comparator_kind() {
        for kind in [Comparator::AtMost, Comparator::Below, Comparator::AtLeast, Comparator::Above] {
            assert!(DEFAULT_ROWS.iter().any(|r| r.positive_when == kind), "{kind} missing");
        }
    }

    #[test]
    fn missing_row_or_value_is_indeterminate() {
        let table = table();
        assert_eq!(
            classify_axis(&table, BiomarkerAxis::Tau, AssayMethod::MriFreesurfer, Reading::Value(1.0)),
            Indeterminate
        );
        assert_eq!(
            classify_axis(&table, BiomarkerAxis::Amyloid, AssayMethod::Elecsys, Reading::Indeterminate),
            Indeterminate
        );
    }

    #[test]
    fn reference_patient_is_triple_positive() {
        let mut p = panel(&[AssayMethod::Elecsys, AssayMethod::MriFreesurfer]);
        p.csf_abeta42_40_ratio = Some(0.045);
        p.csf_ptau_abeta42_ratio = Some(0.09);
        p.hippocampal_left = Some(3000.0);
        p.hippocampal_right = Some(3100.0);
        p.intracranial_volume = Some(1_400_000.0);

        let profile = classify_patient(&p, &table());
        assert_eq!(profile.triple(), AtnTriple::new(Positive, Positive, Positive));
        assert!(profile.conflicts().is_empty());
    }

    #[test]
    fn agreeing_methods_decide_the_axis() {
        let mut p = panel(&[AssayMethod::Elecsys, AssayMethod::Innotest]);
        p.csf_abeta42_40_ratio = Some(0.05);
        p.csf_abeta42 = Some(420.0);

        let profile = classify_patient(&p, &table());
        assert_eq!(profile.amyloid.status, Positive);
        assert_eq!(profile.amyloid.readings.len(), 2);
    }

    #[test]
    fn disagreeing_methods_are_surfaced_not_resolved() {
        let mut p = panel(&[AssayMethod::Elecsys, AssayMethod::Innotest, AssayMethod::PlasmaSimoa]);
        p.csf_abeta42_40_ratio = Some(0.05); // positive
        p.csf_abeta42 = Some(900.0); // negative
        p.plasma_abeta42_40_ratio = Some(0.08); // positive

        let profile = classify_patient(&p, &table());
        assert_eq!(profile.amyloid.status, Indeterminate);
        let conflicts = profile.conflicts();
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].axis, BiomarkerAxis::Amyloid);
        assert_eq!(conflicts[0].readings.len(), 3);
    }

    #[test]
    fn unselected_methods_are_ignored() {
        let mut p = panel(&[AssayMethod::Elecsys]);
        p.csf_abeta42 = Some(100.0); // Innotest/Lumipulse marker, not selected

        let profile = classify_patient(&p, &table());
        assert_eq!(profile.amyloid.status, Indeterminate);
        assert!(profile.amyloid.readings.is_empty());
        assert_eq!(profile.amyloid.missing, vec![AssayMethod::Elecsys]);
    }

    #[test]
    fn volumetric_without_icv_is_indeterminate() {
        let mut p = panel(&[AssayMethod::MriFreesurfer]);
        p.hippocampal_left = Some(3000.0);
        p.hippocampal_right = Some(3100.0);
        p.intracranial_volume = Some(0.0);

        let profile = classify_patient(&p, &table());
        assert_eq!(profile.neurodegeneration.status, Indeterminate);
        assert_eq!(profile.neurodegeneration.missing, vec![AssayMethod::MriFreesurfer]);
    }

    #[test]
    fn classification_is_idempotent() {
        let mut p = panel(&[AssayMethod::Lumipulse, AssayMethod::Innotest]);
        p.csf_abeta42 = Some(575.0);
        p.csf_ptau181 = Some(56.5);
        p.csf_total_tau = Some(380.0);

        let t = table();
        let first = classify_patient(&p, &t);
        let second = classify_patient(&p, &t);
        assert_eq!(first, second);
    }
}
