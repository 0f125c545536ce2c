//! The patient record a workflow builds up.
//!
//! Finalized stage snapshots form an append-only log: stage *n* can only be finalized once
//! stages 1..n are, and moving back truncates the log. Drafts are kept per stage and are never
//! treated as finalized.

use crate::schema::{FieldKind, Stage, WorkflowState};
use atn_engine::DiagnosisResult;
use atn_types::SessionId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A typed field value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum FieldValue {
    Number(f64),
    Boolean(bool),
    Enumerated(String),
    Text(String),
    Choices(Vec<String>),
}

impl FieldValue {
    pub fn kind(&self) -> FieldKind {
        match self {
            FieldValue::Number(_) => FieldKind::Number,
            FieldValue::Boolean(_) => FieldKind::Boolean,
            FieldValue::Enumerated(_) => FieldKind::Enumerated,
            FieldValue::Text(_) => FieldKind::Text,
            FieldValue::Choices(_) => FieldKind::Choices,
        }
    }
}

/// A field that has been touched. Untouched fields are simply absent from the snapshot.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "entry", content = "value", rename_all = "snake_case")]
pub enum FieldEntry {
    /// Explicitly set to empty.
    Empty,
    Value(FieldValue),
}

/// Field name to entry, ordered by name.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StageSnapshot {
    fields: BTreeMap<String, FieldEntry>,
}

impl StageSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&FieldEntry> {
        self.fields.get(name)
    }

    pub fn set(&mut self, name: impl Into<String>, value: FieldValue) {
        self.fields.insert(name.into(), FieldEntry::Value(value));
    }

    pub fn clear(&mut self, name: impl Into<String>) {
        self.fields.insert(name.into(), FieldEntry::Empty);
    }

    pub fn unset(&mut self, name: &str) {
        self.fields.remove(name);
    }

    pub fn value(&self, name: &str) -> Option<&FieldValue> {
        match self.fields.get(name) {
            Some(FieldEntry::Value(value)) => Some(value),
            Some(FieldEntry::Empty) | None => None,
        }
    }

    pub fn number(&self, name: &str) -> Option<f64> {
        match self.value(name) {
            Some(FieldValue::Number(n)) => Some(*n),
            _ => None,
        }
    }

    pub fn boolean(&self, name: &str) -> Option<bool> {
        match self.value(name) {
            Some(FieldValue::Boolean(b)) => Some(*b),
            _ => None,
        }
    }

    pub fn choices(&self, name: &str) -> &[String] {
        match self.value(name) {
            Some(FieldValue::Choices(items)) => items,
            _ => &[],
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldEntry)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl<K: Into<String>> FromIterator<(K, FieldEntry)> for StageSnapshot {
    fn from_iter<I: IntoIterator<Item = (K, FieldEntry)>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}

/// All data gathered for one patient across the stages.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PatientRecord {
    session_id: Option<SessionId>,
    state: WorkflowState,
    finalized: Vec<StageSnapshot>,
    drafts: [StageSnapshot; 4],
    diagnosis: Option<DiagnosisResult>,
    revision: u64,
}

impl Default for PatientRecord {
    fn default() -> Self {
        Self::new()
    }
}

impl PatientRecord {
    pub fn new() -> Self {
        Self {
            session_id: None,
            state: WorkflowState::INITIAL,
            finalized: Vec::new(),
            drafts: Default::default(),
            diagnosis: None,
            revision: 0,
        }
    }

    pub fn session_id(&self) -> Option<&SessionId> {
        self.session_id.as_ref()
    }

    pub fn state(&self) -> WorkflowState {
        self.state
    }

    /// Bumped on every mutation.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn diagnosis(&self) -> Option<&DiagnosisResult> {
        self.diagnosis.as_ref()
    }

    pub fn finalized(&self, stage: Stage) -> Option<&StageSnapshot> {
        self.finalized.get(stage.index())
    }

    /// Number of stages with a finalized snapshot.
    pub fn finalized_count(&self) -> usize {
        self.finalized.len()
    }

    /// The working draft for `stage`; empty if the stage was never touched.
    pub fn draft(&self, stage: Stage) -> &StageSnapshot {
        &self.drafts[stage.index()]
    }

    pub(crate) fn draft_mut(&mut self, stage: Stage) -> &mut StageSnapshot {
        self.revision += 1;
        &mut self.drafts[stage.index()]
    }

    pub(crate) fn set_session(&mut self, session_id: SessionId) {
        if let Some(existing) = &self.session_id {
            assert_eq!(
                existing, &session_id,
                "session id must not change once assigned"
            );
        }
        self.session_id = Some(session_id);
        self.revision += 1;
    }

    pub(crate) fn set_state(&mut self, state: WorkflowState) {
        self.state = state;
        self.revision += 1;
    }

    /// Appends the snapshot for `stage` to the log.
    ///
    /// # Panics
    ///
    /// Panics if stages before `stage` are not finalized or `stage` already is.
    pub(crate) fn finalize(&mut self, stage: Stage, snapshot: StageSnapshot) {
        assert_eq!(
            self.finalized.len(),
            stage.index(),
            "finalized log must be contiguous: cannot finalize {stage} with {} finalized stages",
            self.finalized.len()
        );
        self.drafts[stage.index()] = snapshot.clone();
        self.finalized.push(snapshot);
        self.revision += 1;
    }

    pub(crate) fn attach_diagnosis(&mut self, diagnosis: DiagnosisResult) {
        assert!(
            self.finalized(Stage::Biomarkers).is_some(),
            "diagnosis requires a finalized biomarker stage"
        );
        self.diagnosis = Some(diagnosis);
        self.revision += 1;
    }

    /// Drops every finalized snapshot from `stage` onward together with the diagnosis.
    ///
    /// The dropped snapshots stay behind as drafts.
    pub(crate) fn truncate_from(&mut self, stage: Stage) {
        self.finalized.truncate(stage.index());
        self.diagnosis = None;
        self.revision += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(age: f64) -> StageSnapshot {
        let mut s = StageSnapshot::new();
        s.set("age", FieldValue::Number(age));
        s
    }

    #[test]
    fn snapshot_distinguishes_empty_from_unset() {
        let mut s = StageSnapshot::new();
        s.clear("clinical_notes");
        assert_eq!(s.get("clinical_notes"), Some(&FieldEntry::Empty));
        assert_eq!(s.value("clinical_notes"), None);
        s.unset("clinical_notes");
        assert_eq!(s.get("clinical_notes"), None);
    }

    #[test]
    fn typed_accessors_ignore_other_kinds() {
        let mut s = StageSnapshot::new();
        s.set("mmse_score", FieldValue::Text("22".into()));
        assert_eq!(s.number("mmse_score"), None);
        s.set("mmse_score", FieldValue::Number(22.0));
        assert_eq!(s.number("mmse_score"), Some(22.0));
        assert!(s.choices("assay_methods").is_empty());
    }

    #[test]
    fn finalize_appends_in_order() {
        let mut record = PatientRecord::new();
        record.finalize(Stage::Intake, snapshot(72.0));
        assert_eq!(record.finalized_count(), 1);
        assert_eq!(record.finalized(Stage::Intake), Some(&snapshot(72.0)));
        assert_eq!(record.finalized(Stage::Biomarkers), None);
    }

    #[test]
    #[should_panic(expected = "finalized log must be contiguous")]
    fn finalize_out_of_order_panics() {
        let mut record = PatientRecord::new();
        record.finalize(Stage::Biomarkers, StageSnapshot::new());
    }

    #[test]
    fn truncate_keeps_drafts() {
        let mut record = PatientRecord::new();
        record.finalize(Stage::Intake, snapshot(72.0));
        record.finalize(Stage::Biomarkers, StageSnapshot::new());
        record.truncate_from(Stage::Intake);

        assert_eq!(record.finalized_count(), 0);
        assert_eq!(record.draft(Stage::Intake), &snapshot(72.0));
        assert!(record.diagnosis().is_none());
    }

    #[test]
    fn every_mutation_bumps_revision() {
        let mut record = PatientRecord::new();
        let r0 = record.revision();
        record.draft_mut(Stage::Intake).set("age", FieldValue::Number(70.0));
        let r1 = record.revision();
        record.set_state(WorkflowState::Editing(Stage::Biomarkers));
        assert!(r0 < r1 && r1 < record.revision());
    }

    #[test]
    fn field_value_serializes_with_kind_tag() {
        let json = serde_json::to_value(FieldValue::Number(4.5)).unwrap();
        assert_eq!(json, serde_json::json!({"kind": "number", "value": 4.5}));
    }
}
