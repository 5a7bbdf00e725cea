//! The opaque scoring capability handed to disposable workers
//!
//! A scorer sees segment text and the criterion's instructions. It never
//! sees offsets, sequence indices, worker ids, the ledger or other workers.

use serde::{Deserialize, Serialize};
use sieve_model::{Criterion, CriterionId, Focus};

/// Read-only view of one fragment's content
///
/// Borrows the worker's content slot; it cannot outlive the worker.
#[derive(Debug, Clone, Copy)]
pub struct FragmentView<'a> {
    segments: &'a [&'a str],
}

impl<'a> FragmentView<'a> {
    /// View over segments in presentation order
    #[inline]
    #[must_use]
    pub fn new(segments: &'a [&'a str]) -> Self {
        Self { segments }
    }

    /// Segment texts; order is presentation order, possibly shuffled
    #[inline]
    #[must_use]
    pub fn segments(&self) -> &'a [&'a str] {
        self.segments
    }

    /// Number of segments
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// True when the view holds nothing
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Total bytes visible
    #[must_use]
    pub fn units(&self) -> usize {
        self.segments.iter().map(|s| s.len()).sum()
    }
}

/// What the scorer is asked to judge
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriterionSpec {
    /// Criterion
    pub criterion_id: CriterionId,
    /// Selection focus
    pub focus: Focus,
    /// Scoring instructions
    pub description: String,
    /// Whether the segments were shuffled
    pub order_erased: bool,
}

impl From<&Criterion> for CriterionSpec {
    fn from(criterion: &Criterion) -> Self {
        Self {
            criterion_id: criterion.id.clone(),
            focus: criterion.focus,
            description: criterion.description.clone(),
            order_erased: criterion.order_erased,
        }
    }
}

/// Scorer output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Score {
    /// Value in `[0, 1]`
    pub value: f64,
    /// Optional feedback text
    pub comment: Option<String>,
}

impl Score {
    /// Score without comment
    #[inline]
    #[must_use]
    pub fn new(value: f64) -> Self {
        Self { value, comment: None }
    }

    /// Attach a comment
    #[inline]
    #[must_use]
    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    /// True for finite values in `[0, 1]`
    #[inline]
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.value.is_finite() && (0.0..=1.0).contains(&self.value)
    }
}

/// Scorer failures
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ScoringError {
    /// Scorer reported failure
    #[error("scoring failed: {0}")]
    Failed(String),

    /// Scorer could not handle the input
    #[error("input rejected: {0}")]
    Rejected(String),
}

/// The text-scoring model, treated as a black box
#[async_trait::async_trait]
pub trait ScoringFunction: Send + Sync {
    /// Score one fragment against one criterion
    async fn score(
        &self,
        fragment: &FragmentView<'_>,
        criterion: &CriterionSpec,
    ) -> Result<Score, ScoringError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct LengthScorer;

    #[async_trait::async_trait]
    impl ScoringFunction for LengthScorer {
        async fn score(
            &self,
            fragment: &FragmentView<'_>,
            _criterion: &CriterionSpec,
        ) -> Result<Score, ScoringError> {
            if fragment.is_empty() {
                return Err(ScoringError::Rejected("empty".into()));
            }
            Ok(Score::new((fragment.units() as f64 / 100.0).min(1.0)))
        }
    }

    #[tokio::test]
    async fn scorer_sees_only_segment_text() {
        let segments = ["Alpha.", "Beta."];
        let view = FragmentView::new(&segments);
        let spec = CriterionSpec::from(&Criterion::new("clarity", Focus::Clarity, 0.2));

        let score = LengthScorer.score(&view, &spec).await.unwrap();
        assert!(score.is_valid());
        assert!((score.value - 0.11).abs() < 1e-12);
    }

    #[test]
    fn score_validity() {
        assert!(Score::new(0.0).is_valid());
        assert!(Score::new(1.0).is_valid());
        assert!(!Score::new(1.5).is_valid());
        assert!(!Score::new(f64::NAN).is_valid());
    }
}
