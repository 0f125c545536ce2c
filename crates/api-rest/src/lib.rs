//! # API REST
//!
//! REST API over the in-memory ATN backend.
//!
//! Handles:
//! - HTTP endpoints with axum
//! - OpenAPI/Swagger documentation
//! - REST-specific concerns (JSON serialization, CORS, status codes)
//!
//! Both the standalone `atn-api-rest` binary and the workspace's `atn-run` binary build their
//! server from [`router`].

#![warn(rust_2018_idioms)]

use atn_backend::{InMemoryBackend, SessionRecord};
use atn_core::{CoreConfig, StageBackend, StageSnapshot, StageSubmission};
use atn_engine::{classify_patient, map_to_diagnosis, BiomarkerPanel, CognitiveContext};
use atn_types::{IdempotencyKey, SessionId};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use utoipa::{OpenApi, ToSchema};
use utoipa_swagger_ui::SwaggerUi;

/// Application state shared across REST API handlers
///
/// Holds the backend that owns every session. Cloning is cheap; all clones share one store.
#[derive(Clone, Default)]
pub struct AppState {
    backend: InMemoryBackend,
}

impl AppState {
    pub fn new(cfg: &CoreConfig) -> Self {
        Self {
            backend: InMemoryBackend::new(cfg.thresholds_arc()),
        }
    }

    pub fn backend(&self) -> &InMemoryBackend {
        &self.backend
    }
}

// ============================================================================
// WIRE TYPES
// ============================================================================

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthRes {
    pub ok: bool,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct StageReq {
    /// Field name to `{ "entry": "value", "value": { "kind": ..., "value": ... } }`.
    #[schema(value_type = Object)]
    pub fields: StageSnapshot,
    /// Omitted when opening a session with Stage 1.
    #[serde(default)]
    #[schema(value_type = Option<String>, example = "sess_1a2b3c4d")]
    pub session_id: Option<SessionId>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct StageRes {
    pub accepted: bool,
    #[schema(value_type = Option<String>)]
    pub session_id: Option<SessionId>,
    pub rejection_reason: Option<String>,
    /// A/T/N statuses and label derived on the server for Stage 2.
    #[schema(value_type = Option<Object>)]
    pub derived: Option<atn_core::DerivedFields>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct FinalizeRes {
    pub accepted: bool,
    pub idempotency_key: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SessionRes {
    #[schema(value_type = String)]
    pub session_id: SessionId,
    pub created_at: String,
    pub updated_at: String,
    /// Accepted stage numbers, ascending.
    pub accepted_stages: Vec<u8>,
    #[schema(value_type = Option<Object>)]
    pub diagnosis: Option<atn_engine::DiagnosisResult>,
}

impl From<SessionRecord> for SessionRes {
    fn from(record: SessionRecord) -> Self {
        Self {
            session_id: record.session_id,
            created_at: record.created_at.to_rfc3339(),
            updated_at: record.updated_at.to_rfc3339(),
            accepted_stages: record.stages.keys().copied().collect(),
            diagnosis: record.diagnosis,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ClassifyReq {
    #[schema(value_type = Object)]
    pub panel: BiomarkerPanel,
    #[serde(default)]
    #[schema(value_type = Option<Object>)]
    pub cognitive: CognitiveContext,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ClassifyRes {
    #[schema(value_type = Object)]
    pub diagnosis: atn_engine::DiagnosisResult,
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health,
        submit_stage,
        finalize_session,
        read_session,
        delete_session,
        classify,
    ),
    components(schemas(
        HealthRes,
        StageReq,
        StageRes,
        FinalizeRes,
        SessionRes,
        ClassifyReq,
        ClassifyRes,
    ))
)]
pub struct ApiDoc;

/// Builds the REST application with Swagger UI and permissive CORS.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/stages/:stage", post(submit_stage))
        .route("/sessions/:id", get(read_session).delete(delete_session))
        .route("/sessions/:id/finalize", post(finalize_session))
        .route("/classify", post(classify))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn parse_session(id: &str) -> Result<SessionId, (StatusCode, &'static str)> {
    SessionId::parse(id).map_err(|e| {
        tracing::warn!("Invalid session id {id:?}: {e}");
        (StatusCode::BAD_REQUEST, "Invalid session id")
    })
}

// ============================================================================
// HANDLERS
// ============================================================================

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Health check response", body = HealthRes)
    )
)]
/// Health check endpoint for the REST API
///
/// Used for monitoring and load balancer health checks.
#[axum::debug_handler]
async fn health(State(_state): State<AppState>) -> Json<HealthRes> {
    Json(HealthRes {
        ok: true,
        message: "ATN REST API is alive".into(),
    })
}

#[utoipa::path(
    post,
    path = "/stages/{stage}",
    params(("stage" = u8, Path, description = "Stage number, 1 to 4")),
    request_body = StageReq,
    responses(
        (status = 200, description = "Stage accepted", body = StageRes),
        (status = 422, description = "Stage rejected", body = StageRes),
        (status = 503, description = "Backend unavailable")
    )
)]
/// Submit one stage of a patient episode
///
/// Stage 1 without a session opens a new one. Later stages must name the session and arrive
/// in order. Accepting Stage 2 classifies the biomarkers and returns the derived diagnosis.
///
/// # Returns
/// * `Ok((200, Json<StageRes>))` - Stage accepted
/// * `Ok((422, Json<StageRes>))` - Stage rejected, with the reason
///
/// # Errors
/// Returns `503 Service Unavailable` if the backend call fails.
#[axum::debug_handler]
async fn submit_stage(
    State(state): State<AppState>,
    Path(stage): Path<u8>,
    Json(req): Json<StageReq>,
) -> Result<(StatusCode, Json<StageRes>), (StatusCode, &'static str)> {
    let submission = StageSubmission {
        stage_number: stage,
        fields: req.fields,
        session_id: req.session_id,
    };
    match state.backend.submit_stage(submission).await {
        Ok(ack) => {
            let status = if ack.accepted {
                StatusCode::OK
            } else {
                StatusCode::UNPROCESSABLE_ENTITY
            };
            Ok((
                status,
                Json(StageRes {
                    accepted: ack.accepted,
                    session_id: ack.session_id,
                    rejection_reason: ack.rejection_reason,
                    derived: ack.derived,
                }),
            ))
        }
        Err(e) => {
            tracing::error!("Submit stage error: {:?}", e);
            Err((StatusCode::SERVICE_UNAVAILABLE, "Backend unavailable"))
        }
    }
}

#[utoipa::path(
    post,
    path = "/sessions/{id}/finalize",
    params(("id" = String, Path, description = "Session id")),
    responses(
        (status = 200, description = "Episode finalized", body = FinalizeRes),
        (status = 400, description = "Invalid session id"),
        (status = 404, description = "Unknown session"),
        (status = 409, description = "Episode incomplete", body = FinalizeRes)
    )
)]
/// Finalize a completed episode
///
/// The idempotency key is derived from the session, so repeating the call never persists a
/// second finalization.
///
/// # Errors
/// Returns `400 Bad Request` for a malformed id, `404 Not Found` for an unknown session and
/// `409 Conflict` if Stage 4 has not been accepted yet.
#[axum::debug_handler]
async fn finalize_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<(StatusCode, Json<FinalizeRes>), (StatusCode, &'static str)> {
    let session_id = parse_session(&id)?;
    if state.backend.session(&session_id).await.is_none()
        && state.backend.finalization_for(&session_id).await.is_none()
    {
        return Err((StatusCode::NOT_FOUND, "Unknown session"));
    }

    let key = IdempotencyKey::for_session(&session_id);
    match state.backend.finalize_submission(&session_id, &key).await {
        Ok(ack) => {
            let status = if ack.accepted {
                StatusCode::OK
            } else {
                StatusCode::CONFLICT
            };
            Ok((
                status,
                Json(FinalizeRes {
                    accepted: ack.accepted,
                    idempotency_key: key.to_string(),
                }),
            ))
        }
        Err(e) => {
            tracing::error!("Finalize error: {:?}", e);
            Err((StatusCode::CONFLICT, "Finalization rejected"))
        }
    }
}

#[utoipa::path(
    get,
    path = "/sessions/{id}",
    params(("id" = String, Path, description = "Session id")),
    responses(
        (status = 200, description = "Session state", body = SessionRes),
        (status = 400, description = "Invalid session id"),
        (status = 404, description = "Unknown session"),
        (status = 410, description = "Session finalized and evicted")
    )
)]
/// Read an open session's accepted stages and diagnosis
///
/// Finalized sessions are no longer held and answer `410 Gone`.
#[axum::debug_handler]
async fn read_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SessionRes>, (StatusCode, &'static str)> {
    let session_id = parse_session(&id)?;
    if let Some(record) = state.backend.session(&session_id).await {
        return Ok(Json(record.into()));
    }
    if state.backend.finalization_for(&session_id).await.is_some() {
        return Err((StatusCode::GONE, "Session already finalized"));
    }
    Err((StatusCode::NOT_FOUND, "Unknown session"))
}

#[utoipa::path(
    delete,
    path = "/sessions/{id}",
    params(("id" = String, Path, description = "Session id")),
    responses(
        (status = 204, description = "Session removed"),
        (status = 400, description = "Invalid session id"),
        (status = 404, description = "Unknown session")
    )
)]
/// Abandon a session
#[axum::debug_handler]
async fn delete_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, (StatusCode, &'static str)> {
    let session_id = parse_session(&id)?;
    if state.backend.remove_session(&session_id).await {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err((StatusCode::NOT_FOUND, "Unknown session"))
    }
}

#[utoipa::path(
    post,
    path = "/classify",
    request_body = ClassifyReq,
    responses(
        (status = 200, description = "Diagnosis for the panel", body = ClassifyRes)
    )
)]
/// Classify a biomarker panel without opening a session
///
/// Uses the same threshold table as the staged workflow.
#[axum::debug_handler]
async fn classify(
    State(state): State<AppState>,
    Json(req): Json<ClassifyReq>,
) -> Json<ClassifyRes> {
    let profile = classify_patient(&req.panel, state.backend.thresholds());
    Json(ClassifyRes {
        diagnosis: map_to_diagnosis(&profile, &req.cognitive),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use atn_core::constants::*;
    use atn_core::FieldValue;
    use axum::body::Body;
    use axum::http::{Method, Request};
    use serde_json::{json, Value};
    use tower::util::ServiceExt;

    async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    fn stage_body(fields: StageSnapshot, session: Option<&str>) -> Value {
        json!({ "fields": fields, "session_id": session })
    }

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

    #[tokio::test]
    async fn health_reports_ok() {
        let app = router(AppState::default());
        let (status, body) = send(&app, Method::GET, "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["ok"], json!(true));
    }

    #[tokio::test]
    async fn full_episode_over_http() {
        let app = router(AppState::default());

        let (status, body) = send(&app, Method::POST, "/stages/1", Some(stage_body(intake(), None))).await;
        assert_eq!(status, StatusCode::OK);
        let session = body["session_id"].as_str().unwrap().to_string();

        let (status, body) = send(
            &app,
            Method::POST,
            "/stages/2",
            Some(stage_body(biomarkers(), Some(&session))),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["derived"]["label"], json!("Alzheimer's Disease continuum"));

        for stage in [3, 4] {
            let (status, _) = send(
                &app,
                Method::POST,
                &format!("/stages/{stage}"),
                Some(stage_body(StageSnapshot::new(), Some(&session))),
            )
            .await;
            assert_eq!(status, StatusCode::OK);
        }

        let (status, body) = send(&app, Method::GET, &format!("/sessions/{session}"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["accepted_stages"], json!([1, 2, 3, 4]));

        let uri = format!("/sessions/{session}/finalize");
        let (status, body) = send(&app, Method::POST, &uri, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["idempotency_key"], json!(format!("finalize:{session}")));

        let (status, _) = send(&app, Method::POST, &uri, None).await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = send(&app, Method::GET, &format!("/sessions/{session}"), None).await;
        assert_eq!(status, StatusCode::GONE);
    }

    #[tokio::test]
    async fn incomplete_stage_is_unprocessable() {
        let app = router(AppState::default());
        let (status, body) = send(
            &app,
            Method::POST,
            "/stages/1",
            Some(stage_body(StageSnapshot::new(), None)),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["accepted"], json!(false));
        assert!(body["rejection_reason"].as_str().unwrap().contains("age"));
    }

    #[tokio::test]
    async fn finalizing_early_conflicts() {
        let app = router(AppState::default());
        let (_, body) = send(&app, Method::POST, "/stages/1", Some(stage_body(intake(), None))).await;
        let session = body["session_id"].as_str().unwrap();

        let (status, body) = send(&app, Method::POST, &format!("/sessions/{session}/finalize"), None).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["accepted"], json!(false));
    }

    #[tokio::test]
    async fn malformed_and_unknown_sessions() {
        let app = router(AppState::default());
        let (status, _) = send(&app, Method::GET, "/sessions/not-a-session", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let ghost = SessionId::generate();
        let (status, _) = send(&app, Method::GET, &format!("/sessions/{ghost}"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = send(&app, Method::DELETE, &format!("/sessions/{ghost}"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn deleted_session_is_gone() {
        let app = router(AppState::default());
        let (_, body) = send(&app, Method::POST, "/stages/1", Some(stage_body(intake(), None))).await;
        let session = body["session_id"].as_str().unwrap();

        let (status, _) = send(&app, Method::DELETE, &format!("/sessions/{session}"), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _) = send(&app, Method::GET, &format!("/sessions/{session}"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn classify_is_stateless() {
        let state = AppState::default();
        let app = router(state.clone());
        let request = json!({
            "panel": {
                "methods": ["Elecsys", "MRIFreesurfer"],
                "csf_abeta42_40_ratio": 0.05,
                "csf_ptau_abeta42_ratio": 0.09,
                "hippocampal_left": 3000.0,
                "hippocampal_right": 3100.0,
                "intracranial_volume": 1400000.0
            },
            "cognitive": { "mmse_score": 22.0 }
        });
        let (status, body) = send(&app, Method::POST, "/classify", Some(request)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["diagnosis"]["label"], json!("Alzheimer's Disease continuum"));
        assert_eq!(body["diagnosis"]["severity"], json!("mild"));
        assert_eq!(state.backend().session_count().await, 0);
    }

    #[test]
    fn openapi_lists_every_route() {
        let doc = serde_json::to_value(ApiDoc::openapi()).unwrap();
        let paths = doc["paths"].as_object().unwrap();
        for path in [
            "/health",
            "/stages/{stage}",
            "/sessions/{id}",
            "/sessions/{id}/finalize",
            "/classify",
        ] {
            assert!(paths.contains_key(path), "missing {path}");
        }
    }
}
