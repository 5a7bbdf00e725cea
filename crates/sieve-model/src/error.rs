//! Error types for the document model

use crate::ids::CriterionId;
use crate::span::{Span, SpanError};

/// Document and rubric construction errors
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    /// Document has no content
    #[error("document is empty")]
    EmptyDocument,

    /// A structural tag points past the end of the content
    #[error("{kind} span {span} exceeds document length {len}")]
    SpanOutOfBounds {
        kind: &'static str,
        span: Span,
        len: usize,
    },

    /// A structural tag splits a UTF-8 character
    #[error("{kind} span {span} is not on a character boundary")]
    NotCharBoundary { kind: &'static str, span: Span },

    /// Invalid span
    #[error("invalid span: {0}")]
    Span(#[from] SpanError),

    /// Rubric has no criteria
    #[error("rubric has no criteria")]
    EmptyRubric,

    /// Two criteria share an id
    #[error("duplicate criterion id: {0}")]
    DuplicateCriterion(CriterionId),

    /// A criterion's settings are unusable
    #[error("invalid criterion {criterion}: {reason}")]
    InvalidCriterion {
        criterion: CriterionId,
        reason: String,
    },

    /// Rubric TOML could not be parsed
    #[error("rubric parse error: {0}")]
    Toml(#[from] toml::de::Error),
}
