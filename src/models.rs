use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Topic as submitted by the lesson-plan form.
///
/// `concepts` and `conceptDetails` are parallel arrays. Anything else on the
/// topic is carried through to the enriched output untouched.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicInput {
    #[serde(default)]
    pub topic: Option<String>,
    #[serde(default)]
    pub concepts: Vec<String>,
    #[serde(default)]
    pub concept_details: Vec<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AllocatedConcept {
    pub concept: String,
    pub detail: String,
    pub duration: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct AllocatedTopic {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    pub concepts: Vec<AllocatedConcept>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
pub struct AllocateRequest {
    pub topics: Vec<TopicInput>,
    pub duration: u32,
}

#[derive(Debug, Serialize)]
pub struct AllocateResponse {
    pub topics: Vec<AllocatedTopic>,
    pub duration: u32,
}

/// Lesson-plan generation request from the teacher frontend.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LessonPlanRequest {
    #[serde(default)]
    pub board: String,
    #[serde(default)]
    pub grade: String,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub sub_subject: Option<String>,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub chapter: String,
    #[serde(default)]
    pub topics: Vec<TopicInput>,
    #[serde(default)]
    pub session_type: Option<String>,
    #[serde(default)]
    pub no_of_session: Option<u32>,
    pub duration: u32,
}

/// Payload forwarded to the lesson-plan service, with durations filled in.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LessonPlanPayload {
    pub board: String,
    pub grade: String,
    pub subject: String,
    pub sub_subject: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    pub chapter: String,
    pub topics: Vec<AllocatedTopic>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub no_of_session: Option<u32>,
    pub duration: u32,
}

/// A generated lesson plan as stored, upstream output kept verbatim.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LessonPlanRecord {
    pub id: i64,
    pub chapter: String,
    pub request: Value,
    pub generated: Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Planned,
    InProgress,
    Ended,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Planned => "planned",
            SessionStatus::InProgress => "in_progress",
            SessionStatus::Ended => "ended",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "planned" => Some(SessionStatus::Planned),
            "in_progress" => Some(SessionStatus::InProgress),
            "ended" => Some(SessionStatus::Ended),
            _ => None,
        }
    }
}

/// One scheduled teaching period.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: i64,
    pub chapter_name: Option<String>,
    pub teacher_name: Option<String>,
    pub school_name: Option<String>,
    pub class_name: Option<String>,
    pub section_name: Option<String>,
    pub subject_name: Option<String>,
    pub status: SessionStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionPlanEntry {
    pub id: i64,
    pub session_id: i64,
    pub position: i64,
    pub topic_name: String,
    pub concept_name: String,
    pub planned_completed: bool,
    pub observations: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionDetail {
    #[serde(flatten)]
    pub session: Session,
    pub plan: Vec<SessionPlanEntry>,
}

impl SessionDetail {
    /// Distinct topic names in plan order.
    pub fn planned_topics(&self) -> Vec<String> {
        let mut topics: Vec<String> = Vec::new();
        for entry in &self.plan {
            if !topics.contains(&entry.topic_name) {
                topics.push(entry.topic_name.clone());
            }
        }
        topics
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlannedTopic {
    pub topic_name: String,
    #[serde(default)]
    pub concepts: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewSession {
    #[serde(default)]
    pub chapter_name: Option<String>,
    #[serde(default)]
    pub teacher_name: Option<String>,
    #[serde(default)]
    pub school_name: Option<String>,
    #[serde(default)]
    pub class_name: Option<String>,
    #[serde(default)]
    pub section_name: Option<String>,
    #[serde(default)]
    pub subject_name: Option<String>,
    pub plan: Vec<PlannedTopic>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanEntryUpdate {
    #[serde(default)]
    pub planned_completed: Option<bool>,
    #[serde(default)]
    pub observations: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SessionListQuery {
    pub status: Option<SessionStatus>,
}

/// Body of `POST /sessions/{id}/end`.
///
/// `incompleteTopics` is accepted for compatibility with the frontend but
/// recomputed from the plan.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndSessionInput {
    #[serde(default)]
    pub completed_topics: Vec<String>,
    #[serde(default)]
    pub incomplete_topics: Vec<String>,
    #[serde(default)]
    pub observations: String,
    #[serde(default)]
    pub absentees: Vec<String>,
    #[serde(default)]
    pub assignment_details: Option<String>,
}

/// Immutable record of how a session went.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionReport {
    pub id: i64,
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
    pub created_at: DateTime<Utc>,
}
