//! The backend collaborator contract.
//!
//! The workflow controller talks to a backend through [`StageBackend`]. The reference
//! in-memory backend lives in `atn-backend`; tests use scripted implementations.

use crate::error::CollaboratorError;
use crate::record::StageSnapshot;
use async_trait::async_trait;
use atn_engine::{AtnTriple, DiagnosisLabel, DiagnosisResult};
use atn_types::{IdempotencyKey, SessionId};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// One stage's fields sent to the backend.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StageSubmission {
    /// 1-based stage number.
    pub stage_number: u8,
    pub fields: StageSnapshot,
    /// Absent for Stage 1; the backend assigns one on acceptance.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<SessionId>,
}

/// Values the backend derived on its side.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DerivedFields {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub atn: Option<AtnTriple>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<DiagnosisLabel>,
}

impl DerivedFields {
    pub fn from_diagnosis(result: &DiagnosisResult) -> Self {
        Self {
            atn: Some(result.atn),
            label: Some(result.label),
        }
    }

    /// Compares against a locally computed diagnosis.
    ///
    /// # Errors
    ///
    /// [`CollaboratorError::DerivedMismatch`] naming the first field that disagrees.
    pub fn verify_against(&self, local: &DiagnosisResult) -> Result<(), CollaboratorError> {
        if let Some(remote) = self.atn {
            if remote != local.atn {
                return Err(CollaboratorError::DerivedMismatch {
                    field: "atn".into(),
                    local: local.atn.to_string(),
                    remote: remote.to_string(),
                });
            }
        }
        if let Some(remote) = self.label {
            if remote != local.label {
                return Err(CollaboratorError::DerivedMismatch {
                    field: "label".into(),
                    local: local.label.to_string(),
                    remote: remote.to_string(),
                });
            }
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StageAck {
    pub accepted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<SessionId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejection_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub derived: Option<DerivedFields>,
}

impl StageAck {
    pub fn accepted(session_id: Option<SessionId>) -> Self {
        Self {
            accepted: true,
            session_id,
            ..Default::default()
        }
    }

    pub fn rejected(reason: impl Into<String>) -> Self {
        Self {
            accepted: false,
            rejection_reason: Some(reason.into()),
            ..Default::default()
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalizeAck {
    pub accepted: bool,
}

/// Remote party that accepts stages and the final submission.
#[async_trait]
pub trait StageBackend: Send + Sync {
    async fn submit_stage(&self, submission: StageSubmission)
        -> Result<StageAck, CollaboratorError>;

    /// Must be idempotent per `key`.
    async fn finalize_submission(
        &self,
        session_id: &SessionId,
        key: &IdempotencyKey,
    ) -> Result<FinalizeAck, CollaboratorError>;
}

#[async_trait]
impl<T: StageBackend + ?Sized> StageBackend for Arc<T> {
    async fn submit_stage(
        &self,
        submission: StageSubmission,
    ) -> Result<StageAck, CollaboratorError> {
        (**self).submit_stage(submission).await
    }

    async fn finalize_submission(
        &self,
        session_id: &SessionId,
        key: &IdempotencyKey,
    ) -> Result<FinalizeAck, CollaboratorError> {
        (**self).finalize_submission(session_id, key).await
    }
}
