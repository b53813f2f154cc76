use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    Json,
};
use serde_json::{json, Value};

use crate::error::AppError;
use crate::lesson_plan::{allocate_topics, build_payload};
use crate::models::{
    AllocateRequest, AllocateResponse, EndSessionInput, LessonPlanRecord, LessonPlanRequest,
    NewSession, PlanEntryUpdate, Session, SessionDetail, SessionListQuery, SessionPlanEntry,
    SessionReport,
};
use crate::{reports, sessions, AppState};

// Extractors are taken as `Result` so a rejection becomes an `AppError` body
// instead of axum's plain-text default.
type JsonBody<T> = Result<Json<T>, JsonRejection>;
type PathParam<T> = Result<Path<T>, PathRejection>;

/// Split each topic's time across its concepts without calling upstream.
pub async fn allocate_plan(body: JsonBody<AllocateRequest>) -> Result<Json<AllocateResponse>, AppError> {
    let Json(request) = body?;
    let topics = allocate_topics(&request.topics, request.duration)?;
    Ok(Json(AllocateResponse {
        topics,
        duration: request.duration,
    }))
}

/// Allocate, forward to the lesson-plan service, store what comes back.
pub async fn generate_plan(
    State(state): State<AppState>,
    body: JsonBody<LessonPlanRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let Json(request) = body?;
    let payload = build_payload(request, state.lesson_plans.default_sub_subject())?;
    let generated = state.lesson_plans.generate(&payload).await?;
    let record = state
        .db
        .insert_lesson_plan(&payload.chapter, &payload, &generated)?;

    tracing::info!(lesson_plan_id = record.id, chapter = %record.chapter, "lesson plan generated");

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "id": record.id,
            "lessonPlan": record.generated,
        })),
    ))
}

pub async fn get_lesson_plan(
    State(state): State<AppState>,
    id: PathParam<i64>,
) -> Result<Json<LessonPlanRecord>, AppError> {
    let Path(id) = id?;
    state
        .db
        .get_lesson_plan(id)?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("lesson plan {id}")))
}

pub async fn create_session(
    State(state): State<AppState>,
    body: JsonBody<NewSession>,
) -> Result<(StatusCode, Json<SessionDetail>), AppError> {
    let Json(input) = body?;
    let detail = sessions::create_session(&state.db, &input)?;
    Ok((StatusCode::CREATED, Json(detail)))
}

pub async fn list_sessions(
    State(state): State<AppState>,
    query: Result<Query<SessionListQuery>, QueryRejection>,
) -> Result<Json<Vec<Session>>, AppError> {
    let Query(query) = query?;
    Ok(Json(sessions::list_sessions(&state.db, &query)?))
}

pub async fn get_session(
    State(state): State<AppState>,
    id: PathParam<i64>,
) -> Result<Json<SessionDetail>, AppError> {
    let Path(id) = id?;
    Ok(Json(sessions::get_session(&state.db, id)?))
}

pub async fn start_session(
    State(state): State<AppState>,
    id: PathParam<i64>,
) -> Result<Json<Session>, AppError> {
    let Path(id) = id?;
    Ok(Json(sessions::start_session(&state.db, id)?))
}

pub async fn update_plan_entry(
    State(state): State<AppState>,
    ids: PathParam<(i64, i64)>,
    body: JsonBody<PlanEntryUpdate>,
) -> Result<Json<SessionPlanEntry>, AppError> {
    let Path((id, entry_id)) = ids?;
    let Json(update) = body?;
    Ok(Json(sessions::update_plan_entry(&state.db, id, entry_id, &update)?))
}

pub async fn end_session(
    State(state): State<AppState>,
    id: PathParam<i64>,
    body: JsonBody<EndSessionInput>,
) -> Result<(StatusCode, Json<SessionReport>), AppError> {
    let Path(id) = id?;
    let Json(input) = body?;
    let report = reports::end_session(&state.db, id, &input)?;
    Ok((StatusCode::CREATED, Json(report)))
}

pub async fn get_session_report(
    State(state): State<AppState>,
    session_id: PathParam<i64>,
) -> Result<Json<SessionReport>, AppError> {
    let Path(session_id) = session_id?;
    Ok(Json(reports::get_report(&state.db, session_id)?))
}
