use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Extension, Json,
};
use serde_json::json;
use std::sync::Arc;

use crate::extractors::AppJson;
use crate::middlewares::auth::JwtClaims;
use crate::models::{PhaseReview, PhaseView, QuizSummary, SubmitAnswersRequest};
use crate::services::quiz_service::{QuizError, QuizService};
use crate::services::quiz_state::ValidationError;
use crate::services::AppState;

/// Quiz failure bound to the topic it happened on, so the player can be sent
/// back to that topic's overview.
#[derive(Debug)]
pub struct QuizApiError {
    topic_id: String,
    error: QuizError,
}

impl QuizApiError {
    fn new(topic_id: &str, error: QuizError) -> Self {
        Self {
            topic_id: topic_id.to_string(),
            error,
        }
    }
}

fn validation_status(reason: &ValidationError) -> StatusCode {
    match reason {
        ValidationError::NoSession
        | ValidationError::TopicMismatch
        | ValidationError::StepMismatch { .. } => StatusCode::CONFLICT,
        ValidationError::Expired { .. } => StatusCode::GONE,
        ValidationError::InsufficientEvents { .. } => StatusCode::UNPROCESSABLE_ENTITY,
    }
}

impl IntoResponse for QuizApiError {
    fn into_response(self) -> Response {
        let message = self.error.to_string();
        match self.error {
            QuizError::Validation { phase, reason } => (
                validation_status(&reason),
                Json(json!({
                    "error": reason.code(),
                    "phase": phase,
                    "message": message,
                    "redirect": format!("/topics/{}", self.topic_id),
                })),
            )
                .into_response(),
            QuizError::NotFound(_) => (
                StatusCode::NOT_FOUND,
                Json(json!({ "error": "topic_not_found", "message": message })),
            )
                .into_response(),
            QuizError::UnknownPhase(_) => (
                StatusCode::NOT_FOUND,
                Json(json!({ "error": "unknown_phase", "message": message })),
            )
                .into_response(),
            QuizError::Storage(e) => {
                tracing::error!("Quiz storage failure on topic {}: {:#}", self.topic_id, e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({
                        "error": "internal",
                        "message": "Ein interner Fehler ist aufgetreten.",
                    })),
                )
                    .into_response()
            }
        }
    }
}

fn parse_phase(phase: &str) -> Result<u8, QuizError> {
    phase
        .parse::<u8>()
        .ok()
        .filter(|p| (1..=3).contains(p))
        .ok_or(QuizError::UnknownPhase(phase.parse().unwrap_or(0)))
}

/// POST /{phase}: starts the quiz (phase 1) or prepares phase 2 or 3.
pub async fn prepare_phase(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path((topic_id, phase)): Path<(String, String)>,
) -> Result<impl IntoResponse, QuizApiError> {
    tracing::info!(
        "Preparing quiz phase {}: user={}, topic={}",
        phase,
        claims.sub,
        topic_id
    );

    let service = QuizService::from_state(&state);
    let user_id = claims.sub.as_str();

    let view: PhaseView = match parse_phase(&phase) {
        Ok(1) => service.start_phase1(user_id, &topic_id).await,
        Ok(2) => service.prepare_phase2(user_id, &topic_id).await,
        Ok(_) => service.prepare_phase3(user_id, &topic_id).await,
        Err(e) => Err(e),
    }
    .map_err(|e| QuizApiError::new(&topic_id, e))?;

    Ok((StatusCode::CREATED, Json(view)))
}

/// POST /{phase}/submit
pub async fn submit_phase(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path((topic_id, phase)): Path<(String, String)>,
    AppJson(payload): AppJson<SubmitAnswersRequest>,
) -> Result<Json<PhaseReview>, QuizApiError> {
    tracing::info!(
        "Submitting quiz phase {}: user={}, topic={}",
        phase,
        claims.sub,
        topic_id
    );

    let service = QuizService::from_state(&state);
    let user_id = claims.sub.as_str();

    let review = match parse_phase(&phase) {
        Ok(1) => {
            service
                .submit_phase1(user_id, &topic_id, &payload.answers)
                .await
        }
        Ok(2) => {
            service
                .submit_phase2(user_id, &topic_id, &payload.answers)
                .await
        }
        Ok(_) => service.submit_phase3(user_id, &topic_id, &payload.order).await,
        Err(e) => Err(e),
    }
    .map_err(|e| QuizApiError::new(&topic_id, e))?;

    Ok(Json(review))
}

/// GET /{phase}: the prepared questions again, unchanged.
pub async fn view_phase(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path((topic_id, phase)): Path<(String, String)>,
) -> Result<Json<PhaseView>, QuizApiError> {
    let service = QuizService::from_state(&state);

    let view = async {
        let phase = parse_phase(&phase)?;
        service.view_phase(&claims.sub, &topic_id, phase).await
    }
    .await
    .map_err(|e| QuizApiError::new(&topic_id, e))?;

    Ok(Json(view))
}

/// GET /{phase}/review
pub async fn review_phase(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path((topic_id, phase)): Path<(String, String)>,
) -> Result<Json<PhaseReview>, QuizApiError> {
    let service = QuizService::from_state(&state);

    let review = async {
        let phase = parse_phase(&phase)?;
        service.review_phase(&claims.sub, &topic_id, phase).await
    }
    .await
    .map_err(|e| QuizApiError::new(&topic_id, e))?;

    Ok(Json(review))
}

/// GET /summary
pub async fn summary(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path(topic_id): Path<String>,
) -> Result<Json<QuizSummary>, QuizApiError> {
    let service = QuizService::from_state(&state);

    let summary = service
        .summary(&claims.sub, &topic_id)
        .await
        .map_err(|e| QuizApiError::new(&topic_id, e))?;

    Ok(Json(summary))
}
