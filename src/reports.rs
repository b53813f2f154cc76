//! Session report assembly.
//!
//! Ending a session freezes what was covered: topics the teacher marked done,
//! the rest of the plan in plan order, observations and absentees. The
//! report is written once and never touched again.

use std::collections::HashSet;

use chrono::{Local, NaiveDate, Utc};

use crate::db::{Database, NewReport, ReportInsert};
use crate::error::AppError;
use crate::models::{EndSessionInput, SessionDetail, SessionReport, SessionStatus};

fn nothing_completed() -> AppError {
    AppError::Validation("at least one topic must be marked completed before a session may end".to_string())
}

/// Partition the planned topics by whether they were completed.
///
/// Both halves keep plan order. Completed names that are not in the plan are
/// rejected.
pub fn split_topics(
    completed: &HashSet<String>,
    planned: &[String],
) -> Result<(Vec<String>, Vec<String>), AppError> {
    if completed.is_empty() {
        return Err(nothing_completed());
    }

    let mut unknown: Vec<&str> = completed
        .iter()
        .filter(|name| !planned.contains(name))
        .map(String::as_str)
        .collect();
    if !unknown.is_empty() {
        unknown.sort_unstable();
        return Err(AppError::Validation(format!(
            "completed topics not in the session plan: {}",
            unknown.join(", ")
        )));
    }

    let (done, pending): (Vec<String>, Vec<String>) = planned
        .iter()
        .cloned()
        .partition(|topic| completed.contains(topic));
    Ok((done, pending))
}

fn clean_names(names: &[String]) -> Vec<String> {
    names
        .iter()
        .map(|n| n.trim())
        .filter(|n| !n.is_empty())
        .map(str::to_string)
        .collect()
}

/// Build the report row for a session from the teacher's end-of-session input.
pub fn assemble(
    session: &SessionDetail,
    input: &EndSessionInput,
    date: NaiveDate,
) -> Result<NewReport, AppError> {
    let completed: HashSet<String> = clean_names(&input.completed_topics).into_iter().collect();
    let planned = session.planned_topics();
    let (completed_topics, incomplete_topics) = split_topics(&completed, &planned)?;

    if !input.incomplete_topics.is_empty() && clean_names(&input.incomplete_topics) != incomplete_topics {
        tracing::debug!(
            session_id = session.session.id,
            client = ?input.incomplete_topics,
            computed = ?incomplete_topics,
            "client incomplete topics differ from plan, using plan"
        );
    }

    let meta = &session.session;
    Ok(NewReport {
        session_id: meta.id,
        date,
        day: date.format("%A").to_string(),
        teacher_name: meta.teacher_name.clone(),
        school_name: meta.school_name.clone(),
        class_name: meta.class_name.clone(),
        section_name: meta.section_name.clone(),
        subject_name: meta.subject_name.clone(),
        completed_topics,
        incomplete_topics,
        observations: input.observations.trim().to_string(),
        absent_students: clean_names(&input.absentees),
        assignment_details: input
            .assignment_details
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string),
    })
}

/// End an in-progress session and persist its report.
pub fn end_session(db: &Database, session_id: i64, input: &EndSessionInput) -> Result<SessionReport, AppError> {
    if clean_names(&input.completed_topics).is_empty() {
        return Err(nothing_completed());
    }

    let session = db
        .get_session(session_id)?
        .ok_or_else(|| AppError::NotFound(format!("session {session_id}")))?;

    match session.session.status {
        SessionStatus::Ended => return Err(AppError::DuplicateReport(session_id)),
        SessionStatus::Planned => {
            return Err(AppError::Validation(format!(
                "session {session_id} has not been started"
            )))
        }
        SessionStatus::InProgress => {}
    }

    // date and weekday follow the server's local clock
    let now = Utc::now();
    let report = assemble(&session, input, now.with_timezone(&Local).date_naive())?;

    match db.insert_report(&report, now)? {
        ReportInsert::Inserted(stored) => {
            tracing::info!(
                session_id,
                completed = stored.completed_topics.len(),
                incomplete = stored.incomplete_topics.len(),
                absent = stored.absent_students.len(),
                "session ended"
            );
            Ok(stored)
        }
        ReportInsert::Duplicate => Err(AppError::DuplicateReport(session_id)),
        ReportInsert::NotInProgress => Err(AppError::Validation(format!(
            "session {session_id} is no longer in progress"
        ))),
    }
}

pub fn get_report(db: &Database, session_id: i64) -> Result<SessionReport, AppError> {
    db.get_report(session_id)?
        .ok_or_else(|| AppError::NotFound(format!("session report for session {session_id}")))
}
