//! # ATN Core
//!
//! The staged decision workflow around the pure engine in `atn-engine`:
//! - the canonical per-stage field schema and its validator
//! - the patient record with its append-only log of finalized stages
//! - the workflow controller and the backend collaborator contract it calls
//!
//! **No transport concerns**: HTTP servers and the reference backend live in `api-rest` and
//! `atn-backend`.

pub mod backend;
pub mod classification;
pub mod config;
pub mod constants;
pub mod error;
pub mod record;
pub mod schema;
pub mod validation;
pub mod workflow;

pub use backend::{DerivedFields, FinalizeAck, StageAck, StageBackend, StageSubmission};
pub use classification::{classify_record, diagnose_snapshots};
pub use config::CoreConfig;
pub use error::{
    CollaboratorError, CoreError, CoreResult, FieldIssue, IssueKind, ValidationError,
    WorkflowError, WorkflowResult,
};
pub use record::{FieldEntry, FieldValue, PatientRecord, StageSnapshot};
pub use schema::{FieldKind, FieldSpec, Stage, WorkflowState};
pub use validation::StageValidator;
pub use workflow::{AdvanceOutcome, PendingAdvance, WorkflowController, WorkflowView};
