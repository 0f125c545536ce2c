//! Staged workflow controller.
//!
//! The controller owns one [`PatientRecord`] and walks it through
//! `Stage 1 → Stage 2 → Stage 3 → Stage 4 → Summary → Submitted`.
//!
//! ## Mutation model
//!
//! - Field writes go to the draft of the current stage only.
//! - `advance()` validates the draft, sends it to the backend and, only once the backend has
//!   accepted it, appends the draft to the finalized log. Leaving Stage 2 computes the
//!   diagnosis synchronously with the shared engine.
//! - `retreat()` reopens the previous stage and truncates the log from there. Drafts of later
//!   stages survive as unvalidated input.
//!
//! ## Cancellation
//!
//! Backend calls are the only await points and the record is untouched until they return, so
//! dropping an `advance()` or `submit()` future leaves the record exactly as it was. Callers
//! that keep editing while a call is in flight use [`WorkflowController::prepare_advance`] and
//! [`WorkflowController::complete_advance`]; an outcome prepared against an older revision is
//! discarded with [`WorkflowError::Superseded`].

use crate::backend::{StageAck, StageBackend, StageSubmission};
use crate::classification::{classify_record, diagnose_snapshots};
use crate::config::CoreConfig;
use crate::error::{CollaboratorError, FieldIssue, WorkflowError, WorkflowResult};
use crate::record::{FieldValue, PatientRecord, StageSnapshot};
use crate::schema::{Stage, WorkflowState};
use crate::validation::{check_field_write, StageValidator};
use atn_engine::DiagnosisResult;
use atn_types::{IdempotencyKey, SessionId};
use serde::Serialize;
use std::time::Duration;

// ============================================================================
// VIEW
// ============================================================================

/// Read-only copy of the workflow for presentation.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct WorkflowView {
    pub state: WorkflowState,
    pub session_id: Option<SessionId>,
    pub revision: u64,
    /// Stages whose snapshot is in the finalized log, in order.
    pub finalized_stages: Vec<Stage>,
    /// Draft of the stage being edited.
    pub draft: Option<StageSnapshot>,
    /// What currently blocks `advance()`; empty when it would pass the gate.
    pub blocking_issues: Vec<FieldIssue>,
    pub diagnosis: Option<DiagnosisResult>,
    pub can_retreat: bool,
}

// ============================================================================
// TWO-PHASE ADVANCE
// ============================================================================

/// A validated advance waiting for the backend.
#[derive(Clone, Debug)]
pub struct PendingAdvance {
    stage: Stage,
    revision: u64,
    submission: StageSubmission,
    local_diagnosis: Option<DiagnosisResult>,
    timeout: Duration,
}

impl PendingAdvance {
    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Revision of the record this advance was prepared against.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Sends the stage to `backend`, bounded by the configured timeout.
    pub async fn run<B: StageBackend + ?Sized>(self, backend: &B) -> AdvanceOutcome {
        let result =
            match tokio::time::timeout(self.timeout, backend.submit_stage(self.submission.clone()))
                .await
            {
                Ok(result) => result,
                Err(_) => Err(CollaboratorError::Timeout(self.timeout)),
            };
        AdvanceOutcome {
            pending: self,
            result,
        }
    }
}

/// The backend's answer to a [`PendingAdvance`].
#[derive(Debug)]
pub struct AdvanceOutcome {
    pending: PendingAdvance,
    result: Result<StageAck, CollaboratorError>,
}

// ============================================================================
// CONTROLLER
// ============================================================================

/// Drives one patient record through the stages.
pub struct WorkflowController<B> {
    backend: B,
    config: CoreConfig,
    record: PatientRecord,
}

impl<B: StageBackend> WorkflowController<B> {
    /// Starts a new workflow with an empty record at Stage 1.
    pub fn new(backend: B, config: CoreConfig) -> Self {
        Self {
            backend,
            config,
            record: PatientRecord::new(),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn record(&self) -> &PatientRecord {
        &self.record
    }

    pub fn state(&self) -> WorkflowState {
        self.record.state()
    }

    pub fn view(&self) -> WorkflowView {
        let state = self.record.state();
        let draft = state.stage().map(|stage| self.record.draft(stage).clone());
        let blocking_issues = match state.stage() {
            Some(stage) => StageValidator::check(stage, &self.record)
                .err()
                .map(|e| e.issues)
                .unwrap_or_default(),
            None => Vec::new(),
        };
        let can_retreat = match state {
            WorkflowState::Editing(stage) => stage.previous().is_some(),
            WorkflowState::Summary => true,
            WorkflowState::Submitted => false,
        };

        WorkflowView {
            state,
            session_id: self.record.session_id().cloned(),
            revision: self.record.revision(),
            finalized_stages: Stage::ALL
                .into_iter()
                .take(self.record.finalized_count())
                .collect(),
            draft,
            blocking_issues,
            diagnosis: self.record.diagnosis().cloned(),
            can_retreat,
        }
    }

    fn editing_stage(&self, action: &'static str) -> WorkflowResult<Stage> {
        self.record
            .state()
            .stage()
            .ok_or(WorkflowError::InvalidTransition {
                action,
                state: self.record.state(),
            })
    }

    // ------------------------------------------------------------------------
    // Field editing
    // ------------------------------------------------------------------------

    /// Sets a field of the current stage.
    ///
    /// # Errors
    ///
    /// - [`WorkflowError::InvalidTransition`] outside an editable stage
    /// - [`WorkflowError::UnknownField`] / [`WorkflowError::FieldKind`] per the stage schema
    pub fn set_field(&mut self, name: &str, value: FieldValue) -> WorkflowResult<()> {
        let stage = self.editing_stage("set_field")?;
        let spec = check_field_write(stage, name, Some(&value))?;
        tracing::debug!(%stage, field = spec.name, "field set");
        self.record.draft_mut(stage).set(spec.name, value);
        Ok(())
    }

    /// Marks a field of the current stage as explicitly empty.
    pub fn clear_field(&mut self, name: &str) -> WorkflowResult<()> {
        let stage = self.editing_stage("clear_field")?;
        let spec = check_field_write(stage, name, None)?;
        self.record.draft_mut(stage).clear(spec.name);
        Ok(())
    }

    /// Removes a field from the current stage's draft.
    pub fn unset_field(&mut self, name: &str) -> WorkflowResult<()> {
        let stage = self.editing_stage("unset_field")?;
        let spec = check_field_write(stage, name, None)?;
        self.record.draft_mut(stage).unset(spec.name);
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Forward navigation
    // ------------------------------------------------------------------------

    /// Validates the current stage and submits it to the backend.
    ///
    /// On success the stage is finalized and the workflow moves on. On any error the record
    /// is left unchanged.
    pub async fn advance(&mut self) -> WorkflowResult<WorkflowState> {
        let pending = self.prepare_advance()?;
        let outcome = pending.run(&self.backend).await;
        self.complete_advance(outcome)
    }

    /// First half of [`WorkflowController::advance`]: gate the current stage and build the
    /// submission without touching the record.
    ///
    /// # Errors
    ///
    /// - [`WorkflowError::InvalidTransition`] outside an editable stage
    /// - [`WorkflowError::Validation`] if the stage gate fails
    pub fn prepare_advance(&self) -> WorkflowResult<PendingAdvance> {
        let stage = self.editing_stage("advance")?;
        StageValidator::check(stage, &self.record)?;

        // Stage 1 carries a session only when it is being resubmitted.
        let session_id = self.record.session_id().cloned();
        assert!(
            session_id.is_some() || stage == Stage::Intake,
            "{stage} reached without a session id"
        );

        let draft = self.record.draft(stage).clone();
        let local_diagnosis = (stage == Stage::Biomarkers).then(|| {
            diagnose_snapshots(
                self.record.finalized(Stage::Intake),
                &draft,
                self.config.thresholds(),
            )
        });

        Ok(PendingAdvance {
            stage,
            revision: self.record.revision(),
            submission: StageSubmission {
                stage_number: stage.number(),
                fields: draft,
                session_id,
            },
            local_diagnosis,
            timeout: self.config.backend_timeout(),
        })
    }

    /// Second half of [`WorkflowController::advance`]: apply the backend's answer.
    ///
    /// # Errors
    ///
    /// - [`WorkflowError::Superseded`] if the record changed since the advance was prepared
    /// - [`WorkflowError::Collaborator`] if the call failed, was rejected, or the backend's
    ///   derived values disagree with the local engine
    pub fn complete_advance(&mut self, outcome: AdvanceOutcome) -> WorkflowResult<WorkflowState> {
        let AdvanceOutcome { pending, result } = outcome;
        let stage = pending.stage;

        if pending.revision != self.record.revision() {
            tracing::warn!(
                %stage,
                expected = pending.revision,
                actual = self.record.revision(),
                "discarding stale advance outcome"
            );
            return Err(WorkflowError::Superseded {
                expected: pending.revision,
                actual: self.record.revision(),
            });
        }

        let ack = result.inspect_err(|e| {
            tracing::warn!(%stage, retryable = e.retryable(), "stage submission failed: {e}");
        })?;

        if !ack.accepted {
            let reason = ack
                .rejection_reason
                .unwrap_or_else(|| "no reason given".to_owned());
            tracing::warn!(%stage, %reason, "backend rejected stage");
            return Err(CollaboratorError::Rejected(reason).into());
        }

        let assigned_session = match (self.record.session_id(), ack.session_id) {
            (None, Some(session)) => Some(session),
            (None, None) => {
                return Err(CollaboratorError::Rejected(
                    "backend accepted Stage 1 without assigning a session".into(),
                )
                .into())
            }
            (Some(current), Some(session)) if *current != session => {
                return Err(CollaboratorError::DerivedMismatch {
                    field: "session_id".into(),
                    local: current.to_string(),
                    remote: session.to_string(),
                }
                .into())
            }
            (Some(_), _) => None,
        };

        if let (Some(local), Some(derived)) = (&pending.local_diagnosis, &ack.derived) {
            derived.verify_against(local)?;
        }

        if let Some(session) = assigned_session {
            tracing::info!(session_id = %session, "session assigned");
            self.record.set_session(session);
        }
        self.record.finalize(stage, pending.submission.fields);
        if let Some(diagnosis) = pending.local_diagnosis {
            tracing::info!(atn = %diagnosis.atn, label = %diagnosis.label, "diagnosis attached");
            self.record.attach_diagnosis(diagnosis);
        }

        let next = match stage.next() {
            Some(next) => WorkflowState::Editing(next),
            None => WorkflowState::Summary,
        };
        self.record.set_state(next);
        tracing::info!(from = %stage, to = %next, "advanced");
        Ok(next)
    }

    // ------------------------------------------------------------------------
    // Backward navigation
    // ------------------------------------------------------------------------

    /// Reopens the previous stage, truncating the finalized log from there.
    ///
    /// # Errors
    ///
    /// [`WorkflowError::InvalidTransition`] at Stage 1 or after submission.
    pub fn retreat(&mut self) -> WorkflowResult<WorkflowState> {
        let state = self.record.state();
        let target = match state {
            WorkflowState::Editing(stage) => stage.previous(),
            WorkflowState::Summary => Some(Stage::Plan),
            WorkflowState::Submitted => None,
        }
        .ok_or(WorkflowError::InvalidTransition {
            action: "retreat",
            state,
        })?;

        self.record.truncate_from(target);
        // Stages after Biomarkers keep a diagnosis; rebuild it from the surviving log.
        if let Some(diagnosis) = classify_record(&self.record, self.config.thresholds()) {
            self.record.attach_diagnosis(diagnosis);
        }

        let next = WorkflowState::Editing(target);
        self.record.set_state(next);
        tracing::info!(from = %state, to = %next, "retreated");
        Ok(next)
    }

    /// Jumps from the summary back to `stage`; same as retreating repeatedly.
    ///
    /// # Errors
    ///
    /// [`WorkflowError::InvalidTransition`] unless the workflow is at the summary.
    pub fn edit(&mut self, stage: Stage) -> WorkflowResult<WorkflowState> {
        let state = self.record.state();
        if state != WorkflowState::Summary {
            return Err(WorkflowError::InvalidTransition {
                action: "edit",
                state,
            });
        }
        while self.record.state() != WorkflowState::Editing(stage) {
            self.retreat()?;
        }
        Ok(self.record.state())
    }

    // ------------------------------------------------------------------------
    // Submission
    // ------------------------------------------------------------------------

    /// Finalizes the episode with the backend.
    ///
    /// Idempotent: once submitted, further calls return [`WorkflowState::Submitted`] without
    /// contacting the backend.
    ///
    /// # Errors
    ///
    /// - [`WorkflowError::InvalidTransition`] unless at the summary
    /// - [`WorkflowError::Collaborator`] if finalization fails or is refused
    pub async fn submit(&mut self) -> WorkflowResult<WorkflowState> {
        match self.record.state() {
            WorkflowState::Submitted => return Ok(WorkflowState::Submitted),
            WorkflowState::Summary => {}
            state @ WorkflowState::Editing(_) => {
                return Err(WorkflowError::InvalidTransition {
                    action: "submit",
                    state,
                })
            }
        }

        let session = self
            .record
            .session_id()
            .cloned()
            .unwrap_or_else(|| panic!("summary reached without a session id"));
        let key = IdempotencyKey::for_session(&session);
        let timeout = self.config.backend_timeout();

        let ack = match tokio::time::timeout(
            timeout,
            self.backend.finalize_submission(&session, &key),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(CollaboratorError::Timeout(timeout)),
        }
        .inspect_err(|e| {
            tracing::warn!(session_id = %session, retryable = e.retryable(), "finalization failed: {e}");
        })?;

        if !ack.accepted {
            return Err(CollaboratorError::Rejected("finalization was not accepted".into()).into());
        }

        self.record.set_state(WorkflowState::Submitted);
        tracing::info!(session_id = %session, %key, "episode submitted");
        Ok(WorkflowState::Submitted)
    }

    /// Discards the workflow and its record.
    pub fn abandon(self) {
        tracing::info!(
            state = %self.record.state(),
            session_id = ?self.record.session_id(),
            "workflow abandoned"
        );
    }
}
