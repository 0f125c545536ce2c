//! Stage completeness and field validation.
//!
//! Kind mismatches and unknown fields are rejected as soon as a field is written. Required
//! fields, empty entries, ranges and allowed values are only checked at the advance gate so a
//! user can work through a form in any order.

use crate::error::{FieldIssue, IssueKind, ValidationError, WorkflowError, WorkflowResult};
use crate::record::{FieldEntry, FieldValue, PatientRecord, StageSnapshot};
use crate::schema::{field_spec, stage_schema, FieldKind, FieldSpec, Stage};

/// Field name used for the diagnosis precondition of the review stage.
pub const DIAGNOSIS_FIELD: &str = "diagnosis";

/// Checks a write against the stage schema.
///
/// # Errors
///
/// - [`WorkflowError::UnknownField`] if `name` is not declared for `stage`
/// - [`WorkflowError::FieldKind`] if `value` has the wrong kind
pub fn check_field_write(
    stage: Stage,
    name: &str,
    value: Option<&FieldValue>,
) -> WorkflowResult<&'static FieldSpec> {
    let spec = field_spec(stage, name).ok_or_else(|| WorkflowError::UnknownField {
        stage,
        field: name.to_owned(),
    })?;
    if let Some(value) = value {
        if value.kind() != spec.kind {
            return Err(WorkflowError::FieldKind {
                field: name.to_owned(),
                expected: spec.kind,
                found: value.kind(),
            });
        }
    }
    Ok(spec)
}

fn check_value(spec: &FieldSpec, value: &FieldValue, issues: &mut Vec<FieldIssue>) {
    if value.kind() != spec.kind {
        issues.push(FieldIssue::new(
            spec.name,
            IssueKind::WrongKind {
                expected: spec.kind,
                found: value.kind(),
            },
        ));
        return;
    }

    match value {
        FieldValue::Number(n) => {
            if !n.is_finite() {
                issues.push(FieldIssue::new(spec.name, IssueKind::NotFinite));
            } else if spec.min.is_some_and(|min| *n < min) || spec.max.is_some_and(|max| *n > max) {
                issues.push(FieldIssue::new(
                    spec.name,
                    IssueKind::OutOfRange {
                        value: *n,
                        min: spec.min,
                        max: spec.max,
                    },
                ));
            }
        }
        FieldValue::Enumerated(item) => {
            if !spec.allowed.is_empty() && !spec.allowed.contains(&item.as_str()) {
                issues.push(FieldIssue::new(
                    spec.name,
                    IssueKind::NotAllowed {
                        value: item.clone(),
                    },
                ));
            }
        }
        FieldValue::Choices(items) => {
            if items.is_empty() && spec.required {
                issues.push(FieldIssue::new(spec.name, IssueKind::NoSelection));
            }
            if !spec.allowed.is_empty() {
                for item in items.iter().filter(|i| !spec.allowed.contains(&i.as_str())) {
                    issues.push(FieldIssue::new(
                        spec.name,
                        IssueKind::NotAllowed {
                            value: item.clone(),
                        },
                    ));
                }
            }
        }
        FieldValue::Boolean(_) | FieldValue::Text(_) => {}
    }
}

/// Every issue in `snapshot` under the schema for `stage`, in schema order.
///
/// Fields not declared for the stage are reported last.
pub fn check_snapshot(stage: Stage, snapshot: &StageSnapshot) -> Vec<FieldIssue> {
    let mut issues = Vec::new();

    for spec in stage_schema(stage) {
        match snapshot.get(spec.name) {
            None if spec.required => issues.push(FieldIssue::new(spec.name, IssueKind::Missing)),
            Some(FieldEntry::Empty) if spec.required => {
                let kind = if spec.kind == FieldKind::Choices {
                    IssueKind::NoSelection
                } else {
                    IssueKind::Empty
                };
                issues.push(FieldIssue::new(spec.name, kind));
            }
            None | Some(FieldEntry::Empty) => {}
            Some(FieldEntry::Value(value)) => check_value(spec, value, &mut issues),
        }
    }

    for (name, _) in snapshot.iter() {
        if field_spec(stage, name).is_none() {
            issues.push(FieldIssue::new(name, IssueKind::UnknownField));
        }
    }

    issues
}

/// The gate applied before a stage can be left forwards.
pub struct StageValidator;

impl StageValidator {
    /// Checks the draft of `stage` in `record`.
    ///
    /// The diagnosis stage additionally requires a computed diagnosis.
    pub fn check(stage: Stage, record: &PatientRecord) -> Result<(), ValidationError> {
        let mut issues = check_snapshot(stage, record.draft(stage));
        if stage == Stage::Diagnosis && record.diagnosis().is_none() {
            issues.push(FieldIssue::new(DIAGNOSIS_FIELD, IssueKind::DiagnosisMissing));
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(ValidationError { stage, issues })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::*;

    fn complete_intake() -> StageSnapshot {
        let mut s = StageSnapshot::new();
        s.set(FIELD_AGE, FieldValue::Number(72.0));
        s.set(FIELD_MMSE, FieldValue::Number(22.0));
        s.set(FIELD_MOCA, FieldValue::Number(19.0));
        s.set(FIELD_BEHAVIOR_CHANGE, FieldValue::Boolean(true));
        s.set(FIELD_IS_INDEPENDENT, FieldValue::Boolean(false));
        s
    }

    fn fields(issues: &[FieldIssue]) -> Vec<&str> {
        issues.iter().map(|i| i.field.as_str()).collect()
    }

    #[test]
    fn complete_intake_passes() {
        assert!(check_snapshot(Stage::Intake, &complete_intake()).is_empty());
    }

    #[test]
    fn empty_intake_reports_every_required_field() {
        let issues = check_snapshot(Stage::Intake, &StageSnapshot::new());
        assert_eq!(
            fields(&issues),
            vec![
                FIELD_AGE,
                FIELD_MMSE,
                FIELD_MOCA,
                FIELD_BEHAVIOR_CHANGE,
                FIELD_IS_INDEPENDENT
            ]
        );
        assert!(issues.iter().all(|i| i.kind == IssueKind::Missing));
    }

    #[test]
    fn empty_required_differs_from_missing() {
        let mut s = complete_intake();
        s.clear(FIELD_AGE);
        let issues = check_snapshot(Stage::Intake, &s);
        assert_eq!(issues, vec![FieldIssue::new(FIELD_AGE, IssueKind::Empty)]);
    }

    #[test]
    fn empty_optional_is_fine() {
        let mut s = complete_intake();
        s.clear(FIELD_CLINICAL_NOTES);
        assert!(check_snapshot(Stage::Intake, &s).is_empty());
    }

    #[test]
    fn range_bounds_are_inclusive() {
        let mut s = complete_intake();
        s.set(FIELD_MMSE, FieldValue::Number(30.0));
        s.set(FIELD_AGE, FieldValue::Number(0.0));
        assert!(check_snapshot(Stage::Intake, &s).is_empty());

        s.set(FIELD_MMSE, FieldValue::Number(30.5));
        let issues = check_snapshot(Stage::Intake, &s);
        assert!(matches!(issues[0].kind, IssueKind::OutOfRange { .. }));
    }

    #[test]
    fn nan_is_not_finite() {
        let mut s = complete_intake();
        s.set(FIELD_AGE, FieldValue::Number(f64::NAN));
        let issues = check_snapshot(Stage::Intake, &s);
        assert_eq!(issues, vec![FieldIssue::new(FIELD_AGE, IssueKind::NotFinite)]);
    }

    #[test]
    fn biomarkers_need_a_method() {
        let issues = check_snapshot(Stage::Biomarkers, &StageSnapshot::new());
        assert_eq!(fields(&issues), vec![FIELD_ASSAY_METHODS]);

        let mut s = StageSnapshot::new();
        s.set(FIELD_ASSAY_METHODS, FieldValue::Choices(vec![]));
        let issues = check_snapshot(Stage::Biomarkers, &s);
        assert_eq!(issues[0].kind, IssueKind::NoSelection);
    }

    #[test]
    fn unknown_method_is_not_allowed() {
        let mut s = StageSnapshot::new();
        s.set(
            FIELD_ASSAY_METHODS,
            FieldValue::Choices(vec!["Elecsys".into(), "PET".into()]),
        );
        let issues = check_snapshot(Stage::Biomarkers, &s);
        assert_eq!(
            issues,
            vec![FieldIssue::new(
                FIELD_ASSAY_METHODS,
                IssueKind::NotAllowed {
                    value: "PET".into()
                }
            )]
        );
    }

    #[test]
    fn undeclared_fields_are_reported() {
        let mut s = complete_intake();
        s.set("shoe_size", FieldValue::Number(42.0));
        let issues = check_snapshot(Stage::Intake, &s);
        assert_eq!(issues, vec![FieldIssue::new("shoe_size", IssueKind::UnknownField)]);
    }

    #[test]
    fn write_checks_reject_unknown_fields_and_wrong_kinds() {
        assert!(matches!(
            check_field_write(Stage::Intake, FIELD_MTA, None),
            Err(WorkflowError::UnknownField { .. })
        ));
        assert!(matches!(
            check_field_write(Stage::Intake, FIELD_AGE, Some(&FieldValue::Text("old".into()))),
            Err(WorkflowError::FieldKind {
                expected: FieldKind::Number,
                found: FieldKind::Text,
                ..
            })
        ));
        assert!(check_field_write(Stage::Intake, FIELD_AGE, Some(&FieldValue::Number(-5.0))).is_ok());
    }

    #[test]
    fn diagnosis_stage_requires_a_result() {
        let record = PatientRecord::new();
        let err = StageValidator::check(Stage::Diagnosis, &record).unwrap_err();
        assert_eq!(
            err.issues,
            vec![FieldIssue::new(DIAGNOSIS_FIELD, IssueKind::DiagnosisMissing)]
        );
    }

    #[test]
    fn plan_stage_is_always_complete_when_untouched() {
        assert!(StageValidator::check(Stage::Plan, &PatientRecord::new()).is_ok());
    }

    #[test]
    fn plan_stage_accepts_treatment_text() {
        let mut s = StageSnapshot::new();
        s.set(FIELD_MEDICATION_PLAN, FieldValue::Text("donepezil 5 mg nightly".into()));
        s.set(FIELD_THERAPY_PLAN, FieldValue::Text("cognitive stimulation".into()));
        s.set(FIELD_FOLLOW_UP_MONTHS, FieldValue::Number(6.0));
        assert!(check_snapshot(Stage::Plan, &s).is_empty());

        s.clear(FIELD_MEDICATION_PLAN);
        assert!(check_snapshot(Stage::Plan, &s).is_empty());

        assert!(matches!(
            check_field_write(Stage::Plan, FIELD_THERAPY_PLAN, Some(&FieldValue::Boolean(true))),
            Err(WorkflowError::FieldKind {
                expected: FieldKind::Text,
                found: FieldKind::Boolean,
                ..
            })
        ));
    }
}
