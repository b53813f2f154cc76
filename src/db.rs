//! SQLite persistence for sessions, plans, reports and lesson plans.
//!
//! The connection lives behind a mutex; every method takes the lock for the
//! duration of one statement or one transaction.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row};
use serde::Serialize;
use serde_json::Value;

use crate::error::DatabaseError;
use crate::models::{
    LessonPlanRecord, NewSession, PlanEntryUpdate, Session, SessionDetail, SessionPlanEntry,
    SessionReport, SessionStatus,
};

const SCHEMA_VERSION: i32 = 1;

impl ToSql for SessionStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(self.as_str().into())
    }
}

impl FromSql for SessionStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let raw = value.as_str()?;
        SessionStatus::parse(raw)
            .ok_or_else(|| FromSqlError::Other(format!("unknown session status '{raw}'").into()))
    }
}

/// Report fields decided by the assembler, before the row exists.
#[derive(Debug, Clone)]
pub struct NewReport {
    pub session_id: i64,
    pub date: NaiveDate,
    pub day: String,
    pub teacher_name: Option<String>,
    pub school_name: Option<String>,
    pub class_name: Option<String>,
    pub section_name: Option<String>,
    pub subject_name: Option<String>,
    pub completed_topics: Vec<String>,
    pub incomplete_topics: Vec<String>,
    pub observations: String,
    pub absent_students: Vec<String>,
    pub assignment_details: Option<String>,
}

/// What happened when a report insert was attempted.
#[derive(Debug)]
pub enum ReportInsert {
    Inserted(SessionReport),
    /// A report for the session is already stored.
    Duplicate,
    /// The session was not in progress when the transaction ran.
    NotInProgress,
}

pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open (creating if needed) the database file and bring the schema up to date.
    pub fn open(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir).map_err(|source| DatabaseError::CreateDir {
                path: dir.to_path_buf(),
                source,
            })?;
        }
        let conn = Connection::open(path).map_err(|source| DatabaseError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        Self::init(conn)
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self, DatabaseError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, DatabaseError> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        migrate(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, DatabaseError> {
        self.conn.lock().map_err(|_| DatabaseError::Poisoned)
    }

    pub fn create_session(&self, input: &NewSession) -> Result<SessionDetail, DatabaseError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let now = Utc::now();

        tx.execute(
            "INSERT INTO sessions (chapter_name, teacher_name, school_name, class_name,
                                   section_name, subject_name, status, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                input.chapter_name,
                input.teacher_name,
                input.school_name,
                input.class_name,
                input.section_name,
                input.subject_name,
                SessionStatus::Planned,
                now,
            ],
        )?;
        let session_id = tx.last_insert_rowid();

        {
            let mut stmt = tx.prepare(
                "INSERT INTO session_plan_entries (session_id, position, topic_name, concept_name)
                 VALUES (?1, ?2, ?3, ?4)",
            )?;
            let mut position = 0_i64;
            for topic in &input.plan {
                let topic_name = topic.topic_name.trim();
                if topic.concepts.is_empty() {
                    stmt.execute(params![session_id, position, topic_name, ""])?;
                    position += 1;
                }
                for concept in &topic.concepts {
                    stmt.execute(params![session_id, position, topic_name, concept.trim()])?;
                    position += 1;
                }
            }
        }

        let detail = load_session(&tx, session_id)?;
        tx.commit()?;

        detail.ok_or(DatabaseError::Query(rusqlite::Error::QueryReturnedNoRows))
    }

    pub fn get_session(&self, id: i64) -> Result<Option<SessionDetail>, DatabaseError> {
        let conn = self.conn()?;
        load_session(&conn, id)
    }

    pub fn list_sessions(&self, status: Option<SessionStatus>) -> Result<Vec<Session>, DatabaseError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, chapter_name, teacher_name, school_name, class_name, section_name,
                    subject_name, status, created_at, started_at, ended_at
             FROM sessions
             WHERE ?1 IS NULL OR status = ?1
             ORDER BY id",
        )?;
        let sessions = stmt
            .query_map(params![status], session_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(sessions)
    }

    /// Move a planned session to in-progress.
    ///
    /// Returns `false` when the session was not in the planned state.
    pub fn mark_started(&self, id: i64, at: DateTime<Utc>) -> Result<bool, DatabaseError> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE sessions SET status = ?1, started_at = ?2 WHERE id = ?3 AND status = ?4",
            params![SessionStatus::InProgress, at, id, SessionStatus::Planned],
        )?;
        Ok(changed == 1)
    }

    /// Apply a check/uncheck or observation edit, unless the session has ended.
    ///
    /// Returns `None` when no entry with that id belongs to a non-ended session.
    pub fn update_plan_entry(
        &self,
        session_id: i64,
        entry_id: i64,
        update: &PlanEntryUpdate,
    ) -> Result<Option<SessionPlanEntry>, DatabaseError> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE session_plan_entries
             SET planned_completed = COALESCE(?1, planned_completed),
                 observations = COALESCE(?2, observations)
             WHERE id = ?3 AND session_id = ?4
               AND EXISTS (SELECT 1 FROM sessions WHERE id = ?4 AND status != ?5)",
            params![
                update.planned_completed,
                update.observations,
                entry_id,
                session_id,
                SessionStatus::Ended,
            ],
        )?;
        if changed == 0 {
            return Ok(None);
        }

        let entry = conn
            .query_row(
                "SELECT id, session_id, position, topic_name, concept_name, planned_completed, observations
                 FROM session_plan_entries WHERE id = ?1",
                params![entry_id],
                entry_from_row,
            )
            .optional()?;
        Ok(entry)
    }

    /// Store the report and end the session in one transaction.
    pub fn insert_report(&self, report: &NewReport, at: DateTime<Utc>) -> Result<ReportInsert, DatabaseError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let ended = tx.execute(
            "UPDATE sessions SET status = ?1, ended_at = ?2 WHERE id = ?3 AND status = ?4",
            params![
                SessionStatus::Ended,
                at,
                report.session_id,
                SessionStatus::InProgress
            ],
        )?;

        let inserted = tx.execute(
            "INSERT INTO session_reports (session_id, date, day, teacher_name, school_name,
                                          class_name, section_name, subject_name,
                                          completed_topics, incomplete_topics, observations,
                                          absent_students, assignment_details, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
            params![
                report.session_id,
                report.date,
                report.day,
                report.teacher_name,
                report.school_name,
                report.class_name,
                report.section_name,
                report.subject_name,
                serde_json::to_string(&report.completed_topics)?,
                serde_json::to_string(&report.incomplete_topics)?,
                report.observations,
                serde_json::to_string(&report.absent_students)?,
                report.assignment_details,
                at,
            ],
        );

        match inserted {
            Ok(_) => {}
            Err(rusqlite::Error::SqliteFailure(err, _)) if err.code == ErrorCode::ConstraintViolation => {
                return Ok(ReportInsert::Duplicate);
            }
            Err(e) => return Err(e.into()),
        }

        // the report row exists but the session was not live; drop both changes
        if ended == 0 {
            return Ok(ReportInsert::NotInProgress);
        }

        let stored = load_report(&tx, report.session_id)?
            .ok_or(DatabaseError::Query(rusqlite::Error::QueryReturnedNoRows))?;
        tx.commit()?;

        tracing::debug!(report_id = stored.id, session_id = stored.session_id, "session report stored");
        Ok(ReportInsert::Inserted(stored))
    }

    pub fn get_report(&self, session_id: i64) -> Result<Option<SessionReport>, DatabaseError> {
        let conn = self.conn()?;
        load_report(&conn, session_id)
    }

    pub fn insert_lesson_plan<T: Serialize>(
        &self,
        chapter: &str,
        request: &T,
        generated: &Value,
    ) -> Result<LessonPlanRecord, DatabaseError> {
        let request = serde_json::to_value(request)?;
        let conn = self.conn()?;
        let now = Utc::now();
        conn.execute(
            "INSERT INTO lesson_plans (chapter, request, generated, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                chapter,
                serde_json::to_string(&request)?,
                serde_json::to_string(generated)?,
                now,
            ],
        )?;

        Ok(LessonPlanRecord {
            id: conn.last_insert_rowid(),
            chapter: chapter.to_string(),
            request,
            generated: generated.clone(),
            created_at: now,
        })
    }

    pub fn get_lesson_plan(&self, id: i64) -> Result<Option<LessonPlanRecord>, DatabaseError> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                "SELECT id, chapter, request, generated, created_at FROM lesson_plans WHERE id = ?1",
                params![id],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, DateTime<Utc>>(4)?,
                    ))
                },
            )
            .optional()?;

        row.map(|(id, chapter, request, generated, created_at)| {
            Ok(LessonPlanRecord {
                id,
                chapter,
                request: serde_json::from_str(&request)?,
                generated: serde_json::from_str(&generated)?,
                created_at,
            })
        })
        .transpose()
    }
}

fn migrate(conn: &Connection) -> Result<(), DatabaseError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        );",
    )?;

    let current: i32 = conn
        .query_row("SELECT version FROM schema_version", [], |row| row.get(0))
        .optional()?
        .unwrap_or(0);

    if current < 1 {
        migrate_v1(conn)?;
    }
    if current < SCHEMA_VERSION {
        conn.execute("DELETE FROM schema_version", [])?;
        conn.execute(
            "INSERT INTO schema_version (version) VALUES (?1)",
            params![SCHEMA_VERSION],
        )?;
        tracing::info!(from = current, to = SCHEMA_VERSION, "database schema migrated");
    }
    Ok(())
}

fn migrate_v1(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS sessions (
            id           INTEGER PRIMARY KEY AUTOINCREMENT,
            chapter_name TEXT,
            teacher_name TEXT,
            school_name  TEXT,
            class_name   TEXT,
            section_name TEXT,
            subject_name TEXT,
            status       TEXT NOT NULL DEFAULT 'planned',
            created_at   TEXT NOT NULL,
            started_at   TEXT,
            ended_at     TEXT
        );

        CREATE TABLE IF NOT EXISTS session_plan_entries (
            id                INTEGER PRIMARY KEY AUTOINCREMENT,
            session_id        INTEGER NOT NULL REFERENCES sessions(id) ON DELETE CASCADE,
            position          INTEGER NOT NULL,
            topic_name        TEXT NOT NULL,
            concept_name      TEXT NOT NULL DEFAULT '',
            planned_completed INTEGER NOT NULL DEFAULT 0,
            observations      TEXT NOT NULL DEFAULT ''
        );

        -- session_id is UNIQUE: a session ends at most once
        CREATE TABLE IF NOT EXISTS session_reports (
            id                 INTEGER PRIMARY KEY AUTOINCREMENT,
            session_id         INTEGER NOT NULL UNIQUE,
            date               TEXT NOT NULL,
            day                TEXT NOT NULL,
            teacher_name       TEXT,
            school_name        TEXT,
            class_name         TEXT,
            section_name       TEXT,
            subject_name       TEXT,
            completed_topics   TEXT NOT NULL,
            incomplete_topics  TEXT NOT NULL,
            observations       TEXT NOT NULL DEFAULT '',
            absent_students    TEXT NOT NULL,
            assignment_details TEXT,
            created_at         TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS lesson_plans (
            id         INTEGER PRIMARY KEY AUTOINCREMENT,
            chapter    TEXT NOT NULL,
            request    TEXT NOT NULL,
            generated  TEXT NOT NULL,
            created_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_plan_entries_session ON session_plan_entries(session_id, position);
        CREATE INDEX IF NOT EXISTS idx_sessions_status ON sessions(status);",
    )
}

fn session_from_row(row: &Row<'_>) -> rusqlite::Result<Session> {
    Ok(Session {
        id: row.get(0)?,
        chapter_name: row.get(1)?,
        teacher_name: row.get(2)?,
        school_name: row.get(3)?,
        class_name: row.get(4)?,
        section_name: row.get(5)?,
        subject_name: row.get(6)?,
        status: row.get(7)?,
        created_at: row.get(8)?,
        started_at: row.get(9)?,
        ended_at: row.get(10)?,
    })
}

fn entry_from_row(row: &Row<'_>) -> rusqlite::Result<SessionPlanEntry> {
    Ok(SessionPlanEntry {
        id: row.get(0)?,
        session_id: row.get(1)?,
        position: row.get(2)?,
        topic_name: row.get(3)?,
        concept_name: row.get(4)?,
        planned_completed: row.get(5)?,
        observations: row.get(6)?,
    })
}

fn load_session(conn: &Connection, id: i64) -> Result<Option<SessionDetail>, DatabaseError> {
    let session = conn
        .query_row(
            "SELECT id, chapter_name, teacher_name, school_name, class_name, section_name,
                    subject_name, status, created_at, started_at, ended_at
             FROM sessions WHERE id = ?1",
            params![id],
            session_from_row,
        )
        .optional()?;

    let Some(session) = session else {
        return Ok(None);
    };

    let mut stmt = conn.prepare(
        "SELECT id, session_id, position, topic_name, concept_name, planned_completed, observations
         FROM session_plan_entries
         WHERE session_id = ?1
         ORDER BY position",
    )?;
    let plan = stmt
        .query_map(params![id], entry_from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Some(SessionDetail { session, plan }))
}

fn load_report(conn: &Connection, session_id: i64) -> Result<Option<SessionReport>, DatabaseError> {
    let row = conn
        .query_row(
            "SELECT id, session_id, date, day, teacher_name, school_name, class_name,
                    section_name, subject_name, completed_topics, incomplete_topics,
                    observations, absent_students, assignment_details, created_at
             FROM session_reports WHERE session_id = ?1",
            params![session_id],
            |row| {
                Ok((
                    SessionReport {
                        id: row.get(0)?,
                        session_id: row.get(1)?,
                        date: row.get(2)?,
                        day: row.get(3)?,
                        teacher_name: row.get(4)?,
                        school_name: row.get(5)?,
                        class_name: row.get(6)?,
                        section_name: row.get(7)?,
                        subject_name: row.get(8)?,
                        completed_topics: Vec::new(),
                        incomplete_topics: Vec::new(),
                        observations: row.get(11)?,
                        absent_students: Vec::new(),
                        assignment_details: row.get(13)?,
                        created_at: row.get(14)?,
                    },
                    row.get::<_, String>(9)?,
                    row.get::<_, String>(10)?,
                    row.get::<_, String>(12)?,
                ))
            },
        )
        .optional()?;

    row.map(|(mut report, completed, incomplete, absent)| {
        report.completed_topics = serde_json::from_str(&completed)?;
        report.incomplete_topics = serde_json::from_str(&incomplete)?;
        report.absent_students = serde_json::from_str(&absent)?;
        Ok(report)
    })
    .transpose()
}
