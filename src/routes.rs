use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use axum_extra::{
    headers::{self, Header},
    TypedHeader,
};
use http::{HeaderName, HeaderValue};
use uuid::Uuid;

use crate::{engine::ExamEngine, error::ExamResult, models::*};

static X_USER_ID: HeaderName = HeaderName::from_static("x-user-id");

/// Authenticated user id, set by the auth layer in front of this service.
#[derive(Debug, Clone, Copy)]
pub struct UserId(pub Uuid);

impl Header for UserId {
    fn name() -> &'static HeaderName {
        &X_USER_ID
    }

    fn decode<'i, I>(values: &mut I) -> Result<Self, headers::Error>
    where
        I: Iterator<Item = &'i HeaderValue>,
    {
        let value = values.next().ok_or_else(headers::Error::invalid)?;
        let raw = value.to_str().map_err(|_| headers::Error::invalid())?;
        Uuid::parse_str(raw.trim())
            .map(UserId)
            .map_err(|_| headers::Error::invalid())
    }

    fn encode<E: Extend<HeaderValue>>(&self, values: &mut E) {
        if let Ok(value) = HeaderValue::from_str(&self.0.to_string()) {
            values.extend(std::iter::once(value));
        }
    }
}

pub fn router(engine: ExamEngine) -> Router {
    Router::new()
        .route("/api/modules/:module_id/eligibility", get(eligibility))
        .route("/api/modules/:module_id/attempts", post(start_attempt).get(history))
        .route("/api/modules/:module_id/attempts/submit", post(submit_attempt))
        .route("/api/modules/:module_id/cooldown", get(cooldown))
        .route("/api/lessons/:lesson_id/complete", post(complete_lesson))
        .with_state(engine)
}

async fn eligibility(
    State(engine): State<ExamEngine>,
    TypedHeader(UserId(user_id)): TypedHeader<UserId>,
    Path(module_id): Path<Uuid>,
) -> ExamResult<Json<Eligibility>> {
    Ok(Json(engine.can_start(user_id, module_id).await?))
}

async fn start_attempt(
    State(engine): State<ExamEngine>,
    TypedHeader(UserId(user_id)): TypedHeader<UserId>,
    Path(module_id): Path<Uuid>,
) -> ExamResult<(StatusCode, Json<StartedAttempt>)> {
    let started = engine.start(user_id, module_id).await?;
    Ok((StatusCode::CREATED, Json(started)))
}

async fn submit_attempt(
    State(engine): State<ExamEngine>,
    TypedHeader(UserId(user_id)): TypedHeader<UserId>,
    Path(module_id): Path<Uuid>,
    Json(req): Json<SubmitReq>,
) -> ExamResult<Json<SubmitResult>> {
    let answers = req.answer_map();
    let result = engine
        .submit_in_module(user_id, module_id, req.attempt_id, answers)
        .await?;
    Ok(Json(result))
}

async fn history(
    State(engine): State<ExamEngine>,
    TypedHeader(UserId(user_id)): TypedHeader<UserId>,
    Path(module_id): Path<Uuid>,
) -> ExamResult<Json<Vec<Attempt>>> {
    Ok(Json(engine.history(user_id, module_id).await?))
}

async fn cooldown(
    State(engine): State<ExamEngine>,
    TypedHeader(UserId(user_id)): TypedHeader<UserId>,
    Path(module_id): Path<Uuid>,
) -> ExamResult<Json<CooldownStatus>> {
    Ok(Json(engine.remaining_cooldown(user_id, module_id).await?))
}

async fn complete_lesson(
    State(engine): State<ExamEngine>,
    TypedHeader(UserId(user_id)): TypedHeader<UserId>,
    Path(lesson_id): Path<Uuid>,
) -> ExamResult<StatusCode> {
    engine.mark_lesson_complete(user_id, lesson_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
