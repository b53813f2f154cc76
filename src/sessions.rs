use chrono::Utc;

use crate::db::Database;
use crate::error::AppError;
use crate::models::{NewSession, PlanEntryUpdate, Session, SessionDetail, SessionListQuery, SessionPlanEntry, SessionStatus};

pub fn create_session(db: &Database, input: &NewSession) -> Result<SessionDetail, AppError> {
    if input.plan.is_empty() {
        return Err(AppError::InvalidInput(
            "a session needs at least one planned topic".to_string(),
        ));
    }
    if input.plan.iter().any(|t| t.topic_name.trim().is_empty()) {
        return Err(AppError::InvalidInput("topic names must not be blank".to_string()));
    }

    let detail = db.create_session(input)?;
    tracing::info!(
        session_id = detail.session.id,
        entries = detail.plan.len(),
        "session planned"
    );
    Ok(detail)
}

pub fn get_session(db: &Database, id: i64) -> Result<SessionDetail, AppError> {
    db.get_session(id)?
        .ok_or_else(|| AppError::NotFound(format!("session {id}")))
}

pub fn list_sessions(db: &Database, query: &SessionListQuery) -> Result<Vec<Session>, AppError> {
    Ok(db.list_sessions(query.status)?)
}

/// Planned -> InProgress.
pub fn start_session(db: &Database, id: i64) -> Result<Session, AppError> {
    if db.mark_started(id, Utc::now())? {
        tracing::info!(session_id = id, "session started");
        return Ok(get_session(db, id)?.session);
    }

    let current = get_session(db, id)?.session;
    Err(AppError::Validation(format!(
        "session {id} cannot start from state '{}'",
        current.status.as_str()
    )))
}

pub fn update_plan_entry(
    db: &Database,
    session_id: i64,
    entry_id: i64,
    update: &PlanEntryUpdate,
) -> Result<SessionPlanEntry, AppError> {
    if let Some(entry) = db.update_plan_entry(session_id, entry_id, update)? {
        return Ok(entry);
    }

    // work out why nothing changed
    let session = get_session(db, session_id)?;
    if session.session.status == SessionStatus::Ended {
        return Err(AppError::Validation(format!(
            "session {session_id} has ended; its plan is read-only"
        )));
    }
    Err(AppError::NotFound(format!(
        "plan entry {entry_id} in session {session_id}"
    )))
}
