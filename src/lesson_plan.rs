use std::time::Duration;

use reqwest::Client;
use serde_json::Value;
use thiserror::Error;

use crate::allocation::allocate_topic;
use crate::config::LessonPlanConfig;
use crate::error::AppError;
use crate::models::{AllocatedTopic, LessonPlanPayload, LessonPlanRequest, TopicInput};

#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("failed to build lesson-plan client: {0}")]
    Build(#[source] reqwest::Error),

    #[error("lesson-plan service timed out")]
    Timeout,

    #[error("lesson-plan service unreachable: {0}")]
    Unreachable(#[source] reqwest::Error),

    #[error("lesson-plan service returned status {0}")]
    HttpStatus(u16),

    #[error("lesson-plan service returned an unreadable body: {0}")]
    InvalidBody(#[source] reqwest::Error),

    #[error("lesson-plan service returned an empty response")]
    EmptyResponse,
}

impl UpstreamError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, UpstreamError::Timeout)
    }

    fn from_send(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            UpstreamError::Timeout
        } else {
            UpstreamError::Unreachable(err)
        }
    }

    fn from_body(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            UpstreamError::Timeout
        } else {
            UpstreamError::InvalidBody(err)
        }
    }
}

/// Allocate every topic's concepts across `duration` minutes.
///
/// Errors name the offending topic by its name, or its position when it has none.
pub fn allocate_topics(topics: &[TopicInput], duration: u32) -> Result<Vec<AllocatedTopic>, AppError> {
    if topics.is_empty() {
        return Err(AppError::InvalidInput("at least one topic is required".to_string()));
    }

    topics
        .iter()
        .enumerate()
        .map(|(idx, topic)| {
            allocate_topic(topic, duration).map_err(|err| {
                let label = topic
                    .topic
                    .clone()
                    .unwrap_or_else(|| format!("#{}", idx + 1));
                AppError::InvalidInput(format!("topic {label}: {err}"))
            })
        })
        .collect()
}

/// Validate a generation request and fill in per-concept durations.
pub fn build_payload(request: LessonPlanRequest, default_sub_subject: &str) -> Result<LessonPlanPayload, AppError> {
    let missing: Vec<&str> = [
        ("board", &request.board),
        ("grade", &request.grade),
        ("subject", &request.subject),
        ("chapter", &request.chapter),
    ]
    .into_iter()
    .filter(|(_, value)| value.trim().is_empty())
    .map(|(name, _)| name)
    .collect();
    if !missing.is_empty() {
        return Err(AppError::InvalidInput(format!(
            "missing required fields: {}",
            missing.join(", ")
        )));
    }

    let topics = allocate_topics(&request.topics, request.duration)?;

    Ok(LessonPlanPayload {
        board: request.board,
        grade: request.grade,
        subject: request.subject,
        sub_subject: request
            .sub_subject
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| default_sub_subject.to_string()),
        unit: request.unit,
        chapter: request.chapter,
        topics,
        session_type: request.session_type,
        no_of_session: request.no_of_session,
        duration: request.duration,
    })
}

/// Client for the external lesson-plan generation service.
///
/// Built once at startup and shared through the app state.
#[derive(Clone, Debug)]
pub struct LessonPlanClient {
    client: Client,
    endpoint: String,
    sub_subject: String,
}

impl LessonPlanClient {
    pub fn new(config: &LessonPlanConfig) -> Result<Self, UpstreamError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(UpstreamError::Build)?;

        Ok(Self {
            client,
            endpoint: format!(
                "{}/generate-lesson-plan",
                config.base_url.trim_end_matches('/')
            ),
            sub_subject: config.sub_subject.clone(),
        })
    }

    /// Sub-subject sent when the request does not name one.
    pub fn default_sub_subject(&self) -> &str {
        &self.sub_subject
    }

    /// Forward an allocated payload and hand back whatever JSON the service
    /// produced.
    pub async fn generate(&self, payload: &LessonPlanPayload) -> Result<Value, UpstreamError> {
        tracing::debug!(endpoint = %self.endpoint, chapter = %payload.chapter, "requesting lesson plan");

        let response = self
            .client
            .post(&self.endpoint)
            .json(payload)
            .send()
            .await
            .map_err(UpstreamError::from_send)?;

        let status = response.status();
        if !status.is_success() {
            return Err(UpstreamError::HttpStatus(status.as_u16()));
        }

        let body: Value = response.json().await.map_err(UpstreamError::from_body)?;
        if body.is_null() {
            return Err(UpstreamError::EmptyResponse);
        }

        Ok(body)
    }
}
