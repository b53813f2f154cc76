use thiserror::Error;

use crate::models::{AllocatedConcept, AllocatedTopic, TopicInput};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AllocationError {
    #[error("cannot allocate {0} minutes across an empty concept list")]
    NoConcepts(u32),

    #[error("total duration must be greater than zero")]
    ZeroDuration,

    #[error("topic '{topic}' has {details} concept details for {concepts} concepts")]
    DetailMismatch {
        topic: String,
        concepts: usize,
        details: usize,
    },
}

/// A concept paired with the free-text detail that weights its share of time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Concept {
    pub name: String,
    pub detail: String,
}

impl Concept {
    pub fn new(name: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            detail: detail.into(),
        }
    }

    /// Word count of the detail text, or 1 when there is no detail.
    pub fn weight(&self) -> u64 {
        match self.detail.split_whitespace().count() {
            0 => 1,
            words => words as u64,
        }
    }
}

/// Splits `total_duration` minutes across `concepts` in proportion to their
/// weights.
///
/// Every share is floored; whatever the flooring leaves over goes to the last
/// concept, so the result always sums to `total_duration`.
pub fn allocate(concepts: &[Concept], total_duration: u32) -> Result<Vec<u32>, AllocationError> {
    if total_duration == 0 {
        return Err(AllocationError::ZeroDuration);
    }
    if concepts.is_empty() {
        return Err(AllocationError::NoConcepts(total_duration));
    }

    let weights: Vec<u64> = concepts.iter().map(Concept::weight).collect();
    let total_weight: u64 = weights.iter().sum();
    let total = u64::from(total_duration);

    // share <= total_duration, so the narrowing cannot truncate
    let mut durations: Vec<u32> = weights
        .iter()
        .map(|weight| (weight * total / total_weight) as u32)
        .collect();

    let allocated: u32 = durations.iter().sum();
    if allocated < total_duration {
        if let Some(last) = durations.last_mut() {
            *last += total_duration - allocated;
        }
    }

    Ok(durations)
}

/// Allocates a topic's concepts, pairing each name with its detail by index.
///
/// Missing trailing details count as empty; surplus details are rejected.
pub fn allocate_topic(topic: &TopicInput, total_duration: u32) -> Result<AllocatedTopic, AllocationError> {
    if topic.concept_details.len() > topic.concepts.len() {
        return Err(AllocationError::DetailMismatch {
            topic: topic.topic.clone().unwrap_or_default(),
            concepts: topic.concepts.len(),
            details: topic.concept_details.len(),
        });
    }

    let concepts: Vec<Concept> = topic
        .concepts
        .iter()
        .enumerate()
        .map(|(idx, name)| {
            let detail = topic.concept_details.get(idx).cloned().unwrap_or_default();
            Concept::new(name.clone(), detail)
        })
        .collect();

    let durations = allocate(&concepts, total_duration)?;

    Ok(AllocatedTopic {
        topic: topic.topic.clone(),
        concepts: concepts
            .into_iter()
            .zip(durations)
            .map(|(concept, duration)| AllocatedConcept {
                concept: concept.name,
                detail: concept.detail,
                duration,
            })
            .collect(),
        extra: topic.extra.clone(),
    })
}
