//! Projection of stage snapshots onto the engine's inputs.

use crate::constants::*;
use crate::record::{PatientRecord, StageSnapshot};
use crate::schema::Stage;
use atn_engine::{
    classify_patient, map_to_diagnosis, AssayMethod, BiomarkerPanel, CognitiveContext,
    DiagnosisResult, ThresholdTable,
};

/// Builds the biomarker panel from a Stage 2 snapshot.
///
/// Method names the engine does not know are skipped; the stage gate has already reported
/// them.
pub fn panel_from_snapshot(biomarkers: &StageSnapshot) -> BiomarkerPanel {
    BiomarkerPanel {
        methods: biomarkers
            .choices(FIELD_ASSAY_METHODS)
            .iter()
            .filter_map(|name| name.parse::<AssayMethod>().ok())
            .collect(),
        csf_abeta42_40_ratio: biomarkers.number(FIELD_ABETA42_40_RATIO),
        csf_abeta42: biomarkers.number(FIELD_ABETA42),
        csf_ptau_abeta42_ratio: biomarkers.number(FIELD_PTAU_ABETA42_RATIO),
        csf_ptau181: biomarkers.number(FIELD_PTAU181),
        csf_total_tau: biomarkers.number(FIELD_T_TAU),
        plasma_abeta42_40_ratio: biomarkers.number(FIELD_PLASMA_ABETA42_40_RATIO),
        plasma_ptau181: biomarkers.number(FIELD_PLASMA_PTAU181),
        hippocampal_left: biomarkers.number(FIELD_HIPPOCAMPAL_LEFT),
        hippocampal_right: biomarkers.number(FIELD_HIPPOCAMPAL_RIGHT),
        intracranial_volume: biomarkers.number(FIELD_INTRACRANIAL_VOLUME),
    }
}

/// Cognitive scores and intake findings from the intake and biomarker snapshots.
pub fn cognitive_context_from(
    intake: Option<&StageSnapshot>,
    biomarkers: &StageSnapshot,
) -> CognitiveContext {
    CognitiveContext {
        mmse_score: intake.and_then(|s| s.number(FIELD_MMSE)),
        moca_score: intake.and_then(|s| s.number(FIELD_MOCA)),
        faq_score: biomarkers.number(FIELD_FAQ),
        ad8_score: biomarkers.number(FIELD_AD8),
        mta_score: biomarkers.number(FIELD_MTA),
        family_history: intake.and_then(|s| s.boolean(FIELD_FAMILY_HISTORY)),
        is_independent: intake.and_then(|s| s.boolean(FIELD_IS_INDEPENDENT)),
        behavior_change: intake.and_then(|s| s.boolean(FIELD_BEHAVIOR_CHANGE)),
    }
}

/// Runs normalise, classify and map over the given snapshots.
pub fn diagnose_snapshots(
    intake: Option<&StageSnapshot>,
    biomarkers: &StageSnapshot,
    table: &ThresholdTable,
) -> DiagnosisResult {
    let panel = panel_from_snapshot(biomarkers);
    let profile = classify_patient(&panel, table);
    map_to_diagnosis(&profile, &cognitive_context_from(intake, biomarkers))
}

/// Diagnosis for a record whose biomarker stage is finalized; `None` otherwise.
pub fn classify_record(record: &PatientRecord, table: &ThresholdTable) -> Option<DiagnosisResult> {
    let biomarkers = record.finalized(Stage::Biomarkers)?;
    Some(diagnose_snapshots(
        record.finalized(Stage::Intake),
        biomarkers,
        table,
    ))
}
