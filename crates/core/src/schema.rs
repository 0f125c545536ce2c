//! Stage definitions and the canonical field schema.
//!
//! Every stage owns a fixed list of [`FieldSpec`]s. The workflow rejects writes to fields that
//! are not listed for the current stage, and the validator checks the listed constraints when
//! the user tries to advance.

use crate::constants::*;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One of the four ordered assessment stages.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Intake,
    Biomarkers,
    Diagnosis,
    Plan,
}

impl Stage {
    pub const ALL: [Stage; 4] = [Stage::Intake, Stage::Biomarkers, Stage::Diagnosis, Stage::Plan];

    /// 1-based stage number used on the wire.
    pub fn number(self) -> u8 {
        match self {
            Stage::Intake => 1,
            Stage::Biomarkers => 2,
            Stage::Diagnosis => 3,
            Stage::Plan => 4,
        }
    }

    pub fn from_number(number: u8) -> Option<Self> {
        Stage::ALL.into_iter().find(|s| s.number() == number)
    }

    /// 0-based position in the finalized snapshot log.
    pub fn index(self) -> usize {
        usize::from(self.number() - 1)
    }

    pub fn next(self) -> Option<Self> {
        Stage::from_number(self.number() + 1)
    }

    pub fn previous(self) -> Option<Self> {
        self.number().checked_sub(1).and_then(Stage::from_number)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Intake => "Stage 1 (intake)",
            Stage::Biomarkers => "Stage 2 (biomarkers)",
            Stage::Diagnosis => "Stage 3 (diagnosis)",
            Stage::Plan => "Stage 4 (plan)",
        };
        f.write_str(name)
    }
}

/// Position of the workflow.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "state", content = "stage", rename_all = "snake_case")]
pub enum WorkflowState {
    Editing(Stage),
    Summary,
    Submitted,
}

impl WorkflowState {
    pub const INITIAL: WorkflowState = WorkflowState::Editing(Stage::Intake);

    /// The stage being edited, if any.
    pub fn stage(self) -> Option<Stage> {
        match self {
            WorkflowState::Editing(stage) => Some(stage),
            WorkflowState::Summary | WorkflowState::Submitted => None,
        }
    }
}

impl fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkflowState::Editing(stage) => write!(f, "{stage}"),
            WorkflowState::Summary => f.write_str("Summary"),
            WorkflowState::Submitted => f.write_str("Submitted"),
        }
    }
}

/// Type of value a field accepts.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    Number,
    Boolean,
    Enumerated,
    Text,
    /// Multi-select of enumerated values.
    Choices,
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FieldKind::Number => "number",
            FieldKind::Boolean => "boolean",
            FieldKind::Enumerated => "enumerated",
            FieldKind::Text => "text",
            FieldKind::Choices => "choices",
        };
        f.write_str(name)
    }
}

/// Declared constraints for one field.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
    pub required: bool,
    /// Inclusive bounds for numeric fields.
    pub min: Option<f64>,
    pub max: Option<f64>,
    /// Allowed values for enumerated and choice fields. Empty means unrestricted.
    pub allowed: &'static [&'static str],
}

impl FieldSpec {
    const fn new(name: &'static str, kind: FieldKind, required: bool) -> Self {
        Self {
            name,
            kind,
            required,
            min: None,
            max: None,
            allowed: &[],
        }
    }

    const fn number(name: &'static str, required: bool, min: f64, max: Option<f64>) -> Self {
        Self {
            name,
            kind: FieldKind::Number,
            required,
            min: Some(min),
            max,
            allowed: &[],
        }
    }

    const fn choices(name: &'static str, allowed: &'static [&'static str]) -> Self {
        Self {
            name,
            kind: FieldKind::Choices,
            required: true,
            min: None,
            max: None,
            allowed,
        }
    }
}

const INTAKE_FIELDS: &[FieldSpec] = &[
    FieldSpec::number(FIELD_AGE, true, 0.0, Some(120.0)),
    FieldSpec::number(FIELD_MMSE, true, 0.0, Some(30.0)),
    FieldSpec::number(FIELD_MOCA, true, 0.0, Some(30.0)),
    FieldSpec::new(FIELD_BEHAVIOR_CHANGE, FieldKind::Boolean, true),
    FieldSpec::new(FIELD_IS_INDEPENDENT, FieldKind::Boolean, true),
    FieldSpec::new(FIELD_FAMILY_HISTORY, FieldKind::Boolean, false),
    FieldSpec::new(FIELD_CLINICAL_NOTES, FieldKind::Text, false),
];

const BIOMARKER_FIELDS: &[FieldSpec] = &[
    FieldSpec::choices(FIELD_ASSAY_METHODS, ASSAY_METHOD_NAMES),
    FieldSpec::number(FIELD_FAQ, false, 0.0, Some(30.0)),
    FieldSpec::number(FIELD_AD8, false, 0.0, Some(8.0)),
    FieldSpec::number(FIELD_MTA, false, 0.0, Some(4.0)),
    FieldSpec::number(FIELD_ABETA42_40_RATIO, false, 0.0, None),
    FieldSpec::number(FIELD_ABETA42, false, 0.0, None),
    FieldSpec::number(FIELD_PTAU_ABETA42_RATIO, false, 0.0, None),
    FieldSpec::number(FIELD_PTAU181, false, 0.0, None),
    FieldSpec::number(FIELD_T_TAU, false, 0.0, None),
    FieldSpec::number(FIELD_PLASMA_ABETA42_40_RATIO, false, 0.0, None),
    FieldSpec::number(FIELD_PLASMA_PTAU181, false, 0.0, None),
    FieldSpec::number(FIELD_HIPPOCAMPAL_LEFT, false, 0.0, None),
    FieldSpec::number(FIELD_HIPPOCAMPAL_RIGHT, false, 0.0, None),
    FieldSpec::number(FIELD_INTRACRANIAL_VOLUME, false, 0.0, None),
];

const DIAGNOSIS_FIELDS: &[FieldSpec] = &[FieldSpec::new(FIELD_CLINICIAN_NOTES, FieldKind::Text, false)];

const PLAN_FIELDS: &[FieldSpec] = &[
    FieldSpec::new(FIELD_MEDICATION_PLAN, FieldKind::Text, false),
    FieldSpec::new(FIELD_THERAPY_PLAN, FieldKind::Text, false),
    FieldSpec::number(FIELD_FOLLOW_UP_MONTHS, false, 1.0, Some(24.0)),
    FieldSpec::new(FIELD_PLAN_NOTES, FieldKind::Text, false),
];

/// Field list for `stage`, in display order.
pub fn stage_schema(stage: Stage) -> &'static [FieldSpec] {
    match stage {
        Stage::Intake => INTAKE_FIELDS,
        Stage::Biomarkers => BIOMARKER_FIELDS,
        Stage::Diagnosis => DIAGNOSIS_FIELDS,
        Stage::Plan => PLAN_FIELDS,
    }
}

pub fn field_spec(stage: Stage, name: &str) -> Option<&'static FieldSpec> {
    stage_schema(stage).iter().find(|f| f.name == name)
}
