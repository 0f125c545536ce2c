use crate::schema::{FieldKind, Stage, WorkflowState};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Startup configuration failures.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("failed to read threshold file {path}: {source}", path = path.display())]
    ThresholdFileRead {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("engine error: {0}")]
    Engine(#[from] atn_engine::EngineError),
}

pub type CoreResult<T> = std::result::Result<T, CoreError>;

/// Why a single field failed the stage gate.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "problem", rename_all = "snake_case")]
pub enum IssueKind {
    Missing,
    Empty,
    WrongKind { expected: FieldKind, found: FieldKind },
    OutOfRange { value: f64, min: Option<f64>, max: Option<f64> },
    NotAllowed { value: String },
    NoSelection,
    NotFinite,
    UnknownField,
    DiagnosisMissing,
}

/// One failing field.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FieldIssue {
    pub field: String,
    #[serde(flatten)]
    pub kind: IssueKind,
}

impl FieldIssue {
    pub fn new(field: impl Into<String>, kind: IssueKind) -> Self {
        Self {
            field: field.into(),
            kind,
        }
    }
}

impl fmt::Display for FieldIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let field = &self.field;
        match &self.kind {
            IssueKind::Missing => write!(f, "{field} is required"),
            IssueKind::Empty => write!(f, "{field} must not be empty"),
            IssueKind::WrongKind { expected, found } => {
                write!(f, "{field} must be {expected}, got {found}")
            }
            IssueKind::OutOfRange { value, min, max } => match (min, max) {
                (Some(min), Some(max)) => write!(f, "{field} = {value} is outside {min}..={max}"),
                (Some(min), None) => write!(f, "{field} = {value} is below {min}"),
                (None, Some(max)) => write!(f, "{field} = {value} is above {max}"),
                (None, None) => write!(f, "{field} = {value} is out of range"),
            },
            IssueKind::NotAllowed { value } => write!(f, "{field} does not accept {value:?}"),
            IssueKind::NoSelection => write!(f, "{field} needs at least one selection"),
            IssueKind::NotFinite => write!(f, "{field} must be a finite number"),
            IssueKind::UnknownField => write!(f, "{field} is not a field of this stage"),
            IssueKind::DiagnosisMissing => write!(f, "{field}: no diagnosis has been computed"),
        }
    }
}

/// A stage failed its completeness gate.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, thiserror::Error)]
#[error("{stage} is incomplete: {}", join_issues(.issues))]
pub struct ValidationError {
    pub stage: Stage,
    pub issues: Vec<FieldIssue>,
}

fn join_issues(issues: &[FieldIssue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// A backend call failed.
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum CollaboratorError {
    #[error("backend did not answer within {0:?}")]
    Timeout(std::time::Duration),
    #[error("backend unavailable: {0}")]
    Unavailable(String),
    #[error("backend rejected the submission: {0}")]
    Rejected(String),
    #[error("backend derived {field} = {remote}, local engine computed {local}")]
    DerivedMismatch {
        field: String,
        local: String,
        remote: String,
    },
}

impl CollaboratorError {
    /// True when repeating the same call may succeed.
    pub fn retryable(&self) -> bool {
        match self {
            CollaboratorError::Timeout(_) | CollaboratorError::Unavailable(_) => true,
            CollaboratorError::Rejected(_) | CollaboratorError::DerivedMismatch { .. } => false,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Collaborator(#[from] CollaboratorError),
    #[error("{action} is not allowed in state {state}")]
    InvalidTransition {
        action: &'static str,
        state: WorkflowState,
    },
    #[error("{field} is not a field of {stage}")]
    UnknownField { stage: Stage, field: String },
    #[error("{field} expects a {expected} value, got {found}")]
    FieldKind {
        field: String,
        expected: FieldKind,
        found: FieldKind,
    },
    #[error("record changed while the request was in flight (revision {expected} -> {actual})")]
    Superseded { expected: u64, actual: u64 },
}

pub type WorkflowResult<T> = std::result::Result<T, WorkflowError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn retryable_classification() {
        assert!(CollaboratorError::Timeout(Duration::from_secs(30)).retryable());
        assert!(CollaboratorError::Unavailable("down".into()).retryable());
        assert!(!CollaboratorError::Rejected("bad".into()).retryable());
        assert!(!CollaboratorError::DerivedMismatch {
            field: "label".into(),
            local: "a".into(),
            remote: "b".into(),
        }
        .retryable());
    }

    #[test]
    fn validation_error_lists_every_issue() {
        let err = ValidationError {
            stage: Stage::Intake,
            issues: vec![
                FieldIssue::new("age", IssueKind::Missing),
                FieldIssue::new(
                    "mmse_score",
                    IssueKind::OutOfRange {
                        value: 31.0,
                        min: Some(0.0),
                        max: Some(30.0),
                    },
                ),
            ],
        };
        let msg = err.to_string();
        assert!(msg.contains("age is required"), "{msg}");
        assert!(msg.contains("mmse_score = 31 is outside 0..=30"), "{msg}");
    }

    #[test]
    fn field_issue_serializes_flat() {
        let issue = FieldIssue::new("assay_methods", IssueKind::NoSelection);
        let json = serde_json::to_value(&issue).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"field": "assay_methods", "problem": "no_selection"})
        );
    }
}
