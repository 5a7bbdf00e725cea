//! Rubrics and criteria
//!
//! A rubric is an ordered list of criteria. Definition order is the order
//! feedback is reported in, whatever order the scoring finishes in.

use crate::document::SectionTag;
use crate::error::ModelError;
use crate::ids::CriterionId;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// What part of the document a criterion looks at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Focus {
    /// Introduction section
    Introduction,
    /// Methodology section
    Methodology,
    /// Analysis section
    Analysis,
    /// Discussion section
    Discussion,
    /// Conclusion section
    Conclusion,
    /// Sentences carrying in-text citations
    CitationContext,
    /// Random sentence sample, for clarity checks
    Clarity,
    /// Random sentence sample, for grammar checks
    Grammar,
    /// Sentences dense in the document's most frequent terms
    Coherence,
}

impl Focus {
    /// Section tag this focus selects, if it is section-scoped
    #[must_use]
    pub fn section_tag(self) -> Option<SectionTag> {
        match self {
            Focus::Introduction => Some(SectionTag::Introduction),
            Focus::Methodology => Some(SectionTag::Methodology),
            Focus::Analysis => Some(SectionTag::Analysis),
            Focus::Discussion => Some(SectionTag::Discussion),
            Focus::Conclusion => Some(SectionTag::Conclusion),
            Focus::CitationContext | Focus::Clarity | Focus::Grammar | Focus::Coherence => None,
        }
    }

    /// True when selection is a fixed function of the structure
    /// (section tags, citation markers) rather than sampled
    #[inline]
    #[must_use]
    pub fn is_structural(self) -> bool {
        self.section_tag().is_some() || self == Focus::CitationContext
    }
}

/// Deterministic (non-AI) analyzers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AnalyzerKind {
    /// Citation/bibliography cross-check
    References,
    /// Sentence and paragraph shape
    Structure,
    /// Rule-based grammar checks
    Grammar,
    /// Readability metrics
    Readability,
    /// Keyword frequency analysis
    Keywords,
}

impl AnalyzerKind {
    /// Whether this analyzer needs (and may be handed) a fragment of `focus`
    #[must_use]
    pub fn accepts(self, focus: Focus) -> bool {
        match self {
            AnalyzerKind::References => focus == Focus::CitationContext,
            AnalyzerKind::Structure => focus.section_tag().is_some(),
            AnalyzerKind::Grammar => matches!(focus, Focus::Grammar | Focus::Clarity),
            AnalyzerKind::Readability => {
                matches!(focus, Focus::Clarity | Focus::Grammar) || focus.section_tag().is_some()
            }
            AnalyzerKind::Keywords => focus == Focus::Coherence || focus.section_tag().is_some(),
        }
    }

    /// Whether the analyzer's report may quote its input
    #[inline]
    #[must_use]
    pub fn may_echo_input(self) -> bool {
        self == AnalyzerKind::Grammar
    }
}

/// Who receives a criterion's fragment
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "analyzer", rename_all = "kebab-case")]
pub enum Consumer {
    /// A pure analyzer with zero exposure cost by policy
    Deterministic(AnalyzerKind),
    /// A disposable scoring worker; exposure is metered
    #[default]
    DisposableWorker,
}

fn default_passes() -> u16 {
    1
}

fn default_weight() -> f64 {
    1.0
}

/// One rubric criterion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Criterion {
    /// Unique id within the rubric
    pub id: CriterionId,
    /// Selection focus
    pub focus: Focus,
    /// Largest fraction of the document this criterion may be shown
    pub max_exposure_fraction: f64,
    /// Shuffle sub-spans before handing them out
    #[serde(default)]
    pub order_erased: bool,
    /// Allow spans shared with other criteria
    #[serde(default)]
    pub overlap_allowed: bool,
    /// Receiving consumer
    #[serde(default)]
    pub consumer: Consumer,
    /// Number of disjoint fragments (one worker each)
    #[serde(default = "default_passes")]
    pub passes: u16,
    /// Target sample size for sampled foci; defaults to `max_exposure_fraction`
    #[serde(default)]
    pub sample_fraction: Option<f64>,
    /// Weight in the overall score
    #[serde(default = "default_weight")]
    pub weight: f64,
    /// Instructions passed to the scoring function
    #[serde(default)]
    pub description: String,
}

impl Criterion {
    /// Criterion scored by a disposable worker, single pass, no overlap
    #[must_use]
    pub fn new(id: impl Into<String>, focus: Focus, max_exposure_fraction: f64) -> Self {
        Self {
            id: CriterionId::new(id),
            focus,
            max_exposure_fraction,
            order_erased: false,
            overlap_allowed: false,
            consumer: Consumer::DisposableWorker,
            passes: 1,
            sample_fraction: None,
            weight: 1.0,
            description: String::new(),
        }
    }

    /// Shuffle sub-spans
    #[inline]
    #[must_use]
    pub fn order_erased(mut self) -> Self {
        self.order_erased = true;
        self
    }

    /// Permit overlap with other criteria
    #[inline]
    #[must_use]
    pub fn allow_overlap(mut self) -> Self {
        self.overlap_allowed = true;
        self
    }

    /// Route to a deterministic analyzer
    #[inline]
    #[must_use]
    pub fn analyzed_by(mut self, analyzer: AnalyzerKind) -> Self {
        self.consumer = Consumer::Deterministic(analyzer);
        self
    }

    /// Split into several passes
    #[inline]
    #[must_use]
    pub fn with_passes(mut self, passes: u16) -> Self {
        self.passes = passes;
        self
    }

    /// Override the sample size for sampled foci
    #[inline]
    #[must_use]
    pub fn with_sample_fraction(mut self, fraction: f64) -> Self {
        self.sample_fraction = Some(fraction);
        self
    }

    /// Set the overall-score weight
    #[inline]
    #[must_use]
    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }

    /// Set scoring instructions
    #[inline]
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Sample fraction actually used for sampled foci
    #[inline]
    #[must_use]
    pub fn effective_sample_fraction(&self) -> f64 {
        self.sample_fraction.unwrap_or(self.max_exposure_fraction)
    }

    fn validate(&self) -> Result<(), ModelError> {
        let in_unit = |v: f64| v.is_finite() && v > 0.0 && v <= 1.0;
        if !in_unit(self.max_exposure_fraction) {
            return Err(ModelError::InvalidCriterion {
                criterion: self.id.clone(),
                reason: format!(
                    "max_exposure_fraction {} outside (0, 1]",
                    self.max_exposure_fraction
                ),
            });
        }
        if let Some(sample) = self.sample_fraction {
            if !in_unit(sample) {
                return Err(ModelError::InvalidCriterion {
                    criterion: self.id.clone(),
                    reason: format!("sample_fraction {sample} outside (0, 1]"),
                });
            }
        }
        if self.passes == 0 {
            return Err(ModelError::InvalidCriterion {
                criterion: self.id.clone(),
                reason: "passes must be at least 1".to_string(),
            });
        }
        if !self.weight.is_finite() || self.weight < 0.0 {
            return Err(ModelError::InvalidCriterion {
                criterion: self.id.clone(),
                reason: format!("weight {} must be finite and non-negative", self.weight),
            });
        }
        if let Consumer::Deterministic(analyzer) = self.consumer {
            if !analyzer.accepts(self.focus) {
                return Err(ModelError::InvalidCriterion {
                    criterion: self.id.clone(),
                    reason: format!("analyzer {analyzer:?} does not need focus {:?}", self.focus),
                });
            }
            if self.passes != 1 {
                return Err(ModelError::InvalidCriterion {
                    criterion: self.id.clone(),
                    reason: "deterministic analyzers run a single pass".to_string(),
                });
            }
        }
        Ok(())
    }
}

/// Ordered set of criteria
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rubric {
    /// Criteria in definition order
    pub criteria: Vec<Criterion>,
}

impl Rubric {
    /// Create from criteria, validating them
    ///
    /// # Errors
    /// See [`Rubric::validate`]
    pub fn new(criteria: Vec<Criterion>) -> Result<Self, ModelError> {
        let rubric = Self { criteria };
        rubric.validate()?;
        Ok(rubric)
    }

    /// Parse a TOML rubric (`[[criteria]]` tables)
    ///
    /// # Errors
    /// Returns parse errors or validation errors
    pub fn from_toml_str(source: &str) -> Result<Self, ModelError> {
        let rubric: Rubric = toml::from_str(source)?;
        rubric.validate()?;
        Ok(rubric)
    }

    /// Check ids, fractions, passes and analyzer/focus pairing
    ///
    /// # Errors
    /// - [`ModelError::EmptyRubric`]
    /// - [`ModelError::DuplicateCriterion`]
    /// - [`ModelError::InvalidCriterion`]
    pub fn validate(&self) -> Result<(), ModelError> {
        if self.criteria.is_empty() {
            return Err(ModelError::EmptyRubric);
        }
        let mut seen = HashSet::new();
        for criterion in &self.criteria {
            if !seen.insert(&criterion.id) {
                return Err(ModelError::DuplicateCriterion(criterion.id.clone()));
            }
            criterion.validate()?;
        }
        Ok(())
    }

    /// Look up a criterion by id
    #[must_use]
    pub fn get(&self, id: &CriterionId) -> Option<&Criterion> {
        self.criteria.iter().find(|c| &c.id == id)
    }

    /// Definition index of a criterion
    #[must_use]
    pub fn ordinal(&self, id: &CriterionId) -> Option<usize> {
        self.criteria.iter().position(|c| &c.id == id)
    }

    /// Number of criteria
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.criteria.len()
    }

    /// True for a rubric with no criteria
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.criteria.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_rubric() {
        assert!(matches!(Rubric::new(vec![]), Err(ModelError::EmptyRubric)));
    }

    #[test]
    fn rejects_duplicate_ids() {
        let result = Rubric::new(vec![
            Criterion::new("intro", Focus::Introduction, 0.2),
            Criterion::new("intro", Focus::Conclusion, 0.2),
        ]);
        assert!(matches!(result, Err(ModelError::DuplicateCriterion(_))));
    }

    #[test]
    fn rejects_fraction_out_of_range() {
        for bad in [0.0, -0.1, 1.5, f64::NAN] {
            let result = Rubric::new(vec![Criterion::new("c", Focus::Analysis, bad)]);
            assert!(matches!(result, Err(ModelError::InvalidCriterion { .. })), "{bad}");
        }
    }

    #[test]
    fn rejects_analyzer_outside_its_focus() {
        let result = Rubric::new(vec![Criterion::new("refs", Focus::Introduction, 0.2)
            .analyzed_by(AnalyzerKind::References)]);
        assert!(matches!(result, Err(ModelError::InvalidCriterion { .. })));
    }

    #[test]
    fn parses_toml_with_defaults() {
        let rubric = Rubric::from_toml_str(
            r#"
            [[criteria]]
            id = "intro"
            focus = "introduction"
            max_exposure_fraction = 0.2

            [[criteria]]
            id = "refs"
            focus = "citation-context"
            max_exposure_fraction = 0.1
            consumer = { kind = "deterministic", analyzer = "references" }

            [[criteria]]
            id = "grammar"
            focus = "grammar"
            max_exposure_fraction = 0.1
            order_erased = true
            passes = 2
            "#,
        )
        .unwrap();

        assert_eq!(rubric.len(), 3);
        assert_eq!(rubric.criteria[0].consumer, Consumer::DisposableWorker);
        assert_eq!(
            rubric.criteria[1].consumer,
            Consumer::Deterministic(AnalyzerKind::References)
        );
        assert!(rubric.criteria[2].order_erased);
        assert_eq!(rubric.criteria[2].passes, 2);
        assert_eq!(rubric.ordinal(&CriterionId::new("grammar")), Some(2));
    }

    #[test]
    fn structural_foci() {
        assert!(Focus::Introduction.is_structural());
        assert!(Focus::CitationContext.is_structural());
        assert!(!Focus::Grammar.is_structural());
        assert!(!Focus::Coherence.is_structural());
    }
}
