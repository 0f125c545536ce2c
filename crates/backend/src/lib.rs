//! # ATN Backend
//!
//! In-memory implementation of the [`StageBackend`] contract.
//!
//! The backend keeps one session per patient episode behind a single mutex. It re-validates
//! every stage against the same schema the client uses, classifies Stage 2 with the shared
//! engine and returns the derived values so the client can cross-check them. Final
//! submissions are deduplicated by idempotency key.
//!
//! A finalized session is evicted and only its [`Finalization`] is kept. Sessions nobody
//! touches for a while are dropped by [`InMemoryBackend::evict_idle`]. Nothing is persisted
//! beyond the process.

use async_trait::async_trait;
use atn_core::validation::check_snapshot;
use atn_core::{
    diagnose_snapshots, CollaboratorError, DerivedFields, FinalizeAck, Stage, StageAck,
    StageBackend, StageSnapshot, StageSubmission,
};
use atn_engine::{DiagnosisResult, ThresholdTable};
use atn_types::{IdempotencyKey, SessionId};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Everything the backend holds for one episode.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SessionRecord {
    pub session_id: SessionId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Accepted stages keyed by stage number.
    pub stages: BTreeMap<u8, StageSnapshot>,
    pub diagnosis: Option<DiagnosisResult>,
}

impl SessionRecord {
    fn new(session_id: SessionId) -> Self {
        let now = Utc::now();
        Self {
            session_id,
            created_at: now,
            updated_at: now,
            stages: BTreeMap::new(),
            diagnosis: None,
        }
    }

    /// Stores `snapshot` for `stage` and drops everything accepted after it.
    fn accept(&mut self, stage: Stage, snapshot: StageSnapshot) {
        self.stages.retain(|number, _| *number < stage.number());
        self.stages.insert(stage.number(), snapshot);
        if stage <= Stage::Biomarkers {
            self.diagnosis = None;
        }
        self.updated_at = Utc::now();
    }
}

/// A persisted final submission.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Finalization {
    pub session_id: SessionId,
    pub key: IdempotencyKey,
    pub finalized_at: DateTime<Utc>,
}

#[derive(Default)]
struct BackendState {
    sessions: HashMap<SessionId, SessionRecord>,
    finalizations: HashMap<IdempotencyKey, Finalization>,
}

impl BackendState {
    fn finalization_for(&self, session_id: &SessionId) -> Option<&Finalization> {
        self.finalizations
            .values()
            .find(|f| &f.session_id == session_id)
    }
}

/// Reference backend holding sessions in memory.
#[derive(Clone)]
pub struct InMemoryBackend {
    thresholds: Arc<ThresholdTable>,
    state: Arc<Mutex<BackendState>>,
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new(Arc::new(ThresholdTable::default()))
    }
}

impl InMemoryBackend {
    pub fn new(thresholds: Arc<ThresholdTable>) -> Self {
        Self {
            thresholds,
            state: Arc::new(Mutex::new(BackendState::default())),
        }
    }

    pub fn thresholds(&self) -> &ThresholdTable {
        &self.thresholds
    }

    /// Snapshot of a session, if it exists.
    pub async fn session(&self, session_id: &SessionId) -> Option<SessionRecord> {
        self.state.lock().await.sessions.get(session_id).cloned()
    }

    /// The final submission of a session, once it has been finalized.
    pub async fn finalization_for(&self, session_id: &SessionId) -> Option<Finalization> {
        self.state.lock().await.finalization_for(session_id).cloned()
    }

    /// Drops open sessions not updated within `max_idle`. Returns how many were dropped.
    ///
    /// Finalizations are kept.
    pub async fn evict_idle(&self, max_idle: Duration) -> usize {
        let Ok(max_idle) = chrono::Duration::from_std(max_idle) else {
            return 0;
        };
        let Some(cutoff) = Utc::now().checked_sub_signed(max_idle) else {
            return 0;
        };

        let mut state = self.state.lock().await;
        let before = state.sessions.len();
        state.sessions.retain(|_, session| session.updated_at > cutoff);
        let evicted = before - state.sessions.len();
        if evicted > 0 {
            tracing::info!(evicted, remaining = state.sessions.len(), "idle sessions evicted");
        }
        evicted
    }

    /// Drops a session. Returns `false` if it did not exist.
    pub async fn remove_session(&self, session_id: &SessionId) -> bool {
        let removed = self.state.lock().await.sessions.remove(session_id).is_some();
        if removed {
            tracing::info!(%session_id, "session removed");
        }
        removed
    }

    pub async fn session_count(&self) -> usize {
        self.state.lock().await.sessions.len()
    }

    /// Number of distinct final submissions persisted.
    pub async fn finalization_count(&self) -> usize {
        self.state.lock().await.finalizations.len()
    }

    fn reject(stage_number: u8, reason: String) -> Result<StageAck, CollaboratorError> {
        tracing::warn!(stage_number, %reason, "stage rejected");
        Ok(StageAck::rejected(reason))
    }
}

#[async_trait]
impl StageBackend for InMemoryBackend {
    async fn submit_stage(
        &self,
        submission: StageSubmission,
    ) -> Result<StageAck, CollaboratorError> {
        let StageSubmission {
            stage_number,
            fields,
            session_id,
        } = submission;

        let Some(stage) = Stage::from_number(stage_number) else {
            return Self::reject(stage_number, format!("unknown stage {stage_number}"));
        };

        let issues = check_snapshot(stage, &fields);
        if !issues.is_empty() {
            let reason = issues
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("; ");
            return Self::reject(stage_number, reason);
        }

        let mut state = self.state.lock().await;

        let session_id = match (stage, session_id) {
            (Stage::Intake, None) => {
                let session_id = SessionId::generate();
                state
                    .sessions
                    .insert(session_id.clone(), SessionRecord::new(session_id.clone()));
                tracing::info!(%session_id, "session opened");
                session_id
            }
            (_, Some(session_id)) => session_id,
            (_, None) => {
                return Self::reject(stage_number, format!("{stage} requires a session id"));
            }
        };

        if state.finalization_for(&session_id).is_some() {
            return Self::reject(stage_number, format!("session {session_id} is already submitted"));
        }
        let Some(session) = state.sessions.get_mut(&session_id) else {
            return Self::reject(stage_number, format!("unknown session {session_id}"));
        };
        if let Some(previous) = stage.previous() {
            if !session.stages.contains_key(&previous.number()) {
                return Self::reject(stage_number, format!("{previous} has not been accepted"));
            }
        }

        let derived = match stage {
            Stage::Biomarkers => {
                let diagnosis = diagnose_snapshots(
                    session.stages.get(&Stage::Intake.number()),
                    &fields,
                    &self.thresholds,
                );
                let derived = DerivedFields::from_diagnosis(&diagnosis);
                session.accept(stage, fields);
                session.diagnosis = Some(diagnosis);
                Some(derived)
            }
            _ => {
                session.accept(stage, fields);
                None
            }
        };

        tracing::info!(%session_id, %stage, "stage accepted");
        Ok(StageAck {
            derived,
            ..StageAck::accepted(Some(session_id))
        })
    }

    async fn finalize_submission(
        &self,
        session_id: &SessionId,
        key: &IdempotencyKey,
    ) -> Result<FinalizeAck, CollaboratorError> {
        let mut state = self.state.lock().await;

        if let Some(existing) = state.finalizations.get(key) {
            if &existing.session_id != session_id {
                return Err(CollaboratorError::Rejected(format!(
                    "idempotency key {key} belongs to another session"
                )));
            }
            tracing::debug!(%session_id, %key, "duplicate finalization ignored");
            return Ok(FinalizeAck { accepted: true });
        }

        if state.finalization_for(session_id).is_some() {
            return Err(CollaboratorError::Rejected(format!(
                "session {session_id} was finalized under another key"
            )));
        }
        let Some(session) = state.sessions.get(session_id) else {
            return Err(CollaboratorError::Rejected(format!(
                "unknown session {session_id}"
            )));
        };
        if !session.stages.contains_key(&Stage::Plan.number()) {
            tracing::warn!(%session_id, "finalization before all stages were accepted");
            return Ok(FinalizeAck { accepted: false });
        }

        let finalized_at = Utc::now();
        state.sessions.remove(session_id);
        state.finalizations.insert(
            key.clone(),
            Finalization {
                session_id: session_id.clone(),
                key: key.clone(),
                finalized_at,
            },
        );
        tracing::info!(%session_id, %key, "episode finalized");
        Ok(FinalizeAck { accepted: true })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use atn_core::constants::*;
    use atn_core::{CoreConfig, FieldValue, WorkflowController, WorkflowState};
    use atn_engine::DiagnosisLabel;

    fn intake() -> StageSnapshot {
        let mut s = StageSnapshot::new();
        s.set(FIELD_AGE, FieldValue::Number(72.0));
        s.set(FIELD_MMSE, FieldValue::Number(22.0));
        s.set(FIELD_MOCA, FieldValue::Number(19.0));
        s.set(FIELD_BEHAVIOR_CHANGE, FieldValue::Boolean(true));
        s.set(FIELD_IS_INDEPENDENT, FieldValue::Boolean(false));
        s
    }

    fn biomarkers() -> StageSnapshot {
        let mut s = StageSnapshot::new();
        s.set(
            FIELD_ASSAY_METHODS,
            FieldValue::Choices(vec!["Elecsys".into(), "MRIFreesurfer".into()]),
        );
        s.set(FIELD_ABETA42_40_RATIO, FieldValue::Number(0.05));
        s.set(FIELD_PTAU_ABETA42_RATIO, FieldValue::Number(0.09));
        s.set(FIELD_HIPPOCAMPAL_LEFT, FieldValue::Number(3000.0));
        s.set(FIELD_HIPPOCAMPAL_RIGHT, FieldValue::Number(3100.0));
        s.set(FIELD_INTRACRANIAL_VOLUME, FieldValue::Number(1_400_000.0));
        s
    }

    fn submission(stage: Stage, fields: StageSnapshot, session: Option<&SessionId>) -> StageSubmission {
        StageSubmission {
            stage_number: stage.number(),
            fields,
            session_id: session.cloned(),
        }
    }

    async fn open(backend: &InMemoryBackend) -> SessionId {
        let ack = backend
            .submit_stage(submission(Stage::Intake, intake(), None))
            .await
            .unwrap();
        assert!(ack.accepted);
        ack.session_id.unwrap()
    }

    #[tokio::test]
    async fn intake_opens_a_canonical_session() {
        let backend = InMemoryBackend::default();
        let session = open(&backend).await;
        assert!(SessionId::is_canonical(session.as_str()));
        assert_eq!(backend.session_count().await, 1);
    }

    #[tokio::test]
    async fn invalid_stage_is_rejected_with_reasons() {
        let backend = InMemoryBackend::default();
        let ack = backend
            .submit_stage(submission(Stage::Intake, StageSnapshot::new(), None))
            .await
            .unwrap();
        assert!(!ack.accepted);
        assert!(ack.rejection_reason.unwrap().contains("age is required"));
        assert_eq!(backend.session_count().await, 0);
    }

    #[tokio::test]
    async fn stages_must_arrive_in_order() {
        let backend = InMemoryBackend::default();
        let session = open(&backend).await;
        let ack = backend
            .submit_stage(submission(Stage::Diagnosis, StageSnapshot::new(), Some(&session)))
            .await
            .unwrap();
        assert!(!ack.accepted);
    }

    #[tokio::test]
    async fn unknown_session_is_rejected() {
        let backend = InMemoryBackend::default();
        let ghost = SessionId::generate();
        let ack = backend
            .submit_stage(submission(Stage::Biomarkers, biomarkers(), Some(&ghost)))
            .await
            .unwrap();
        assert!(!ack.accepted);
    }

    #[tokio::test]
    async fn biomarker_stage_returns_derived_diagnosis() {
        let backend = InMemoryBackend::default();
        let session = open(&backend).await;
        let ack = backend
            .submit_stage(submission(Stage::Biomarkers, biomarkers(), Some(&session)))
            .await
            .unwrap();

        let derived = ack.derived.unwrap();
        assert_eq!(derived.label, Some(DiagnosisLabel::AlzheimersContinuum));
        let stored = backend.session(&session).await.unwrap();
        assert_eq!(stored.diagnosis.unwrap().label, DiagnosisLabel::AlzheimersContinuum);
    }

    #[tokio::test]
    async fn resubmitting_intake_drops_later_stages() {
        let backend = InMemoryBackend::default();
        let session = open(&backend).await;
        backend
            .submit_stage(submission(Stage::Biomarkers, biomarkers(), Some(&session)))
            .await
            .unwrap();
        backend
            .submit_stage(submission(Stage::Intake, intake(), Some(&session)))
            .await
            .unwrap();

        let stored = backend.session(&session).await.unwrap();
        assert_eq!(stored.stages.keys().copied().collect::<Vec<_>>(), vec![1]);
        assert!(stored.diagnosis.is_none());
    }

    #[tokio::test]
    async fn finalization_is_deduplicated_by_key() {
        let backend = Arc::new(InMemoryBackend::default());
        let mut ctl = WorkflowController::new(backend.clone(), CoreConfig::default());

        for (name, value) in intake().iter() {
            if let atn_core::FieldEntry::Value(v) = value {
                ctl.set_field(name, v.clone()).unwrap();
            }
        }
        ctl.advance().await.unwrap();
        for (name, value) in biomarkers().iter() {
            if let atn_core::FieldEntry::Value(v) = value {
                ctl.set_field(name, v.clone()).unwrap();
            }
        }
        ctl.advance().await.unwrap();
        ctl.advance().await.unwrap();
        ctl.advance().await.unwrap();

        let session = ctl.record().session_id().cloned().unwrap();
        let key = IdempotencyKey::for_session(&session);
        assert_eq!(ctl.submit().await.unwrap(), WorkflowState::Submitted);

        // A retry from a second client with the same key must not persist twice.
        let again = backend.finalize_submission(&session, &key).await.unwrap();
        assert!(again.accepted);
        assert_eq!(backend.finalization_count().await, 1);
    }

    async fn open_through_plan(backend: &InMemoryBackend) -> SessionId {
        let session = open(backend).await;
        backend
            .submit_stage(submission(Stage::Biomarkers, biomarkers(), Some(&session)))
            .await
            .unwrap();
        for stage in [Stage::Diagnosis, Stage::Plan] {
            let ack = backend
                .submit_stage(submission(stage, StageSnapshot::new(), Some(&session)))
                .await
                .unwrap();
            assert!(ack.accepted);
        }
        session
    }

    #[tokio::test]
    async fn finalized_session_is_evicted_but_still_deduplicated() {
        let backend = InMemoryBackend::default();
        let session = open_through_plan(&backend).await;
        let key = IdempotencyKey::for_session(&session);

        assert!(backend.finalize_submission(&session, &key).await.unwrap().accepted);
        assert!(backend.session(&session).await.is_none());
        assert_eq!(backend.session_count().await, 0);
        assert_eq!(backend.finalization_for(&session).await.unwrap().key, key);

        assert!(backend.finalize_submission(&session, &key).await.unwrap().accepted);
        assert_eq!(backend.finalization_count().await, 1);

        let ack = backend
            .submit_stage(submission(Stage::Plan, StageSnapshot::new(), Some(&session)))
            .await
            .unwrap();
        assert!(!ack.accepted);
        assert!(ack.rejection_reason.unwrap().contains("already submitted"));
    }

    #[tokio::test]
    async fn finalized_session_refuses_a_second_key() {
        let backend = InMemoryBackend::default();
        let session = open_through_plan(&backend).await;
        backend
            .finalize_submission(&session, &IdempotencyKey::for_session(&session))
            .await
            .unwrap();

        let other = IdempotencyKey::for_session(&SessionId::generate());
        assert!(backend.finalize_submission(&session, &other).await.is_err());
        assert_eq!(backend.finalization_count().await, 1);
    }

    #[tokio::test]
    async fn idle_sessions_are_evicted() {
        let backend = InMemoryBackend::default();
        let orphan = open(&backend).await;
        let finalized = open_through_plan(&backend).await;
        backend
            .finalize_submission(&finalized, &IdempotencyKey::for_session(&finalized))
            .await
            .unwrap();

        assert_eq!(backend.evict_idle(Duration::from_secs(3600)).await, 0);
        assert!(backend.session(&orphan).await.is_some());

        assert_eq!(backend.evict_idle(Duration::ZERO).await, 1);
        assert_eq!(backend.session_count().await, 0);
        assert!(backend.finalization_for(&finalized).await.is_some());
    }

    #[tokio::test]
    async fn finalization_before_plan_is_not_accepted() {
        let backend = InMemoryBackend::default();
        let session = open(&backend).await;
        let ack = backend
            .finalize_submission(&session, &IdempotencyKey::for_session(&session))
            .await
            .unwrap();
        assert!(!ack.accepted);
        assert_eq!(backend.finalization_count().await, 0);
    }

    #[tokio::test]
    async fn removed_session_is_gone() {
        let backend = InMemoryBackend::default();
        let session = open(&backend).await;
        assert!(backend.remove_session(&session).await);
        assert!(!backend.remove_session(&session).await);
        assert!(backend.session(&session).await.is_none());
    }
}
