//! Testing utilities for the Sieve workspace
//!
//! Synthetic essays with exact sizes, standard rubrics, scripted scorers and
//! misbehaving isolation backends.

#![allow(missing_docs)]

use parking_lot::Mutex;
use sieve_core::{
    Confinement, CriterionSpec, FragmentView, IsolationBackend, IsolationError, IsolationPolicy, Score,
    ScoringError, ScoringFunction,
};
use sieve_model::{
    Citation, Criterion, Document, DocumentStructure, Focus, Rubric, Section, SectionTag, Span,
    TermOccurrence, WorkerId,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

const FILLER: &[&str] = &[
    "evidence", "suggests", "the", "model", "fits", "sampling", "data", "well", "and", "results",
    "hold", "across", "each", "cohort",
];

const DEFAULT_TERMS: &[&str] = &["evidence", "model", "sampling"];

/// Builds documents with known structure
///
/// Every sentence is followed by one space, which belongs to the section but
/// not to the sentence span.
#[derive(Debug, Clone)]
pub struct EssayBuilder {
    sentence_len: usize,
    sections: Vec<(SectionTag, Vec<String>)>,
    bibliography: Vec<String>,
    terms: Vec<String>,
}

impl Default for EssayBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl EssayBuilder {
    pub fn new() -> Self {
        Self {
            sentence_len: 49,
            sections: Vec::new(),
            bibliography: Vec::new(),
            terms: DEFAULT_TERMS.iter().map(|t| (*t).to_string()).collect(),
        }
    }

    /// Bytes per generated sentence, excluding the trailing space
    pub fn sentence_len(mut self, len: usize) -> Self {
        self.sentence_len = len.max(2);
        self
    }

    /// Section of `count` generated sentences
    pub fn section(mut self, tag: SectionTag, count: usize) -> Self {
        let offset = self.sections.iter().map(|(_, s)| s.len()).sum::<usize>();
        let sentences = (0..count)
            .map(|i| generated_sentence(offset + i, self.sentence_len))
            .collect();
        self.sections.push((tag, sentences));
        self
    }

    /// Section with given sentences; `(Key)` marks a citation
    pub fn raw_section(mut self, tag: SectionTag, sentences: &[&str]) -> Self {
        self.sections
            .push((tag, sentences.iter().map(|s| (*s).to_string()).collect()));
        self
    }

    /// Bibliography keys, appended as a final section
    pub fn bibliography(mut self, keys: &[&str]) -> Self {
        self.bibliography = keys.iter().map(|k| (*k).to_string()).collect();
        self
    }

    /// Replace the tracked key terms
    pub fn terms(mut self, terms: &[&str]) -> Self {
        self.terms = terms.iter().map(|t| (*t).to_string()).collect();
        self
    }

    pub fn build(self) -> Document {
        let mut content = String::new();
        let mut structure = DocumentStructure::default();

        let mut sections = self.sections;
        if !self.bibliography.is_empty() {
            let entries = self.bibliography.iter().map(|k| format!("{k}.")).collect();
            sections.push((SectionTag::Bibliography, entries));
        }

        for (tag, sentences) in &sections {
            let start = content.len();
            for sentence in sentences {
                let sentence_start = content.len();
                content.push_str(sentence);
                let span = Span::new(sentence_start, content.len()).unwrap();
                structure.sentences.push(span);
                if *tag != SectionTag::Bibliography {
                    structure.citations.extend(citations_in(sentence, sentence_start));
                }
                content.push(' ');
            }
            structure.sections.push(Section {
                tag: *tag,
                span: Span::new(start, content.len()).unwrap(),
            });
        }

        structure.terms = term_occurrences(&content, &self.terms);
        structure.bibliography = self.bibliography;
        Document::new(content, structure).unwrap()
    }
}

fn generated_sentence(index: usize, len: usize) -> String {
    let mut text = String::new();
    let mut word = index % FILLER.len();
    while text.len() < len - 1 {
        if !text.is_empty() {
            text.push(' ');
        }
        text.push_str(FILLER[word]);
        word = (word + 1) % FILLER.len();
    }
    text.truncate(len - 1);
    if text.ends_with(' ') {
        text.pop();
        text.push('s');
    }
    let mut chars = text.chars();
    let capitalized: String = chars
        .next()
        .map(|c| c.to_ascii_uppercase())
        .into_iter()
        .chain(chars)
        .collect();
    format!("{capitalized}.")
}

fn citations_in(sentence: &str, base: usize) -> Vec<Citation> {
    let mut found = Vec::new();
    let mut rest = 0;
    while let Some(open) = sentence[rest..].find('(') {
        let open = rest + open;
        let Some(close) = sentence[open..].find(')') else {
            break;
        };
        let close = open + close;
        let inner = &sentence[open + 1..close];
        let key = (!inner.is_empty() && inner.chars().all(char::is_alphanumeric)).then(|| inner.to_string());
        found.push(Citation {
            span: Span::new(base + open, base + close + 1).unwrap(),
            key,
        });
        rest = close + 1;
    }
    found
}

fn term_occurrences(content: &str, terms: &[String]) -> Vec<TermOccurrence> {
    let lowered = content.to_ascii_lowercase();
    let bytes = lowered.as_bytes();
    let mut occurrences = Vec::new();
    for term in terms {
        let needle = term.to_ascii_lowercase();
        for (start, _) in lowered.match_indices(&needle) {
            let end = start + needle.len();
            let bounded_left = start == 0 || !bytes[start - 1].is_ascii_alphanumeric();
            let bounded_right = end == bytes.len() || !bytes[end].is_ascii_alphanumeric();
            if bounded_left && bounded_right {
                occurrences.push(TermOccurrence {
                    term: term.clone(),
                    span: Span::new(start, end).unwrap(),
                });
            }
        }
    }
    occurrences.sort_by_key(|t| t.span);
    occurrences
}

/// 2000 bytes: five sections of eight 49-byte sentences, no citations
pub fn standard_essay() -> Document {
    EssayBuilder::new()
        .section(SectionTag::Introduction, 8)
        .section(SectionTag::Methodology, 8)
        .section(SectionTag::Analysis, 8)
        .section(SectionTag::Discussion, 8)
        .section(SectionTag::Conclusion, 8)
        .build()
}

/// Essay with citations in the introduction and discussion, and a bibliography
pub fn cited_essay() -> Document {
    EssayBuilder::new()
        .raw_section(
            SectionTag::Introduction,
            &[
                "Earlier studies (Lee2019) measured the same effect.",
                "The model here extends that work.",
            ],
        )
        .section(SectionTag::Methodology, 4)
        .section(SectionTag::Analysis, 4)
        .raw_section(
            SectionTag::Discussion,
            &[
                "Our sampling agrees with (Smith2020) on variance.",
                "One result contradicts (Ghost2021) entirely.",
            ],
        )
        .section(SectionTag::Conclusion, 2)
        .bibliography(&["Lee2019", "Smith2020"])
        .build()
}

/// Four section criteria and a clarity sample, each bounded at 0.2
pub fn five_criterion_rubric() -> Rubric {
    Rubric::new(vec![
        Criterion::new("introduction", Focus::Introduction, 0.2)
            .with_description("Does the introduction state the question?"),
        Criterion::new("methodology", Focus::Methodology, 0.2)
            .order_erased()
            .with_description("Is the method sound?"),
        Criterion::new("analysis", Focus::Analysis, 0.2)
            .order_erased()
            .with_description("Does the analysis support its claims?"),
        Criterion::new("conclusion", Focus::Conclusion, 0.2)
            .with_description("Does the conclusion follow?"),
        Criterion::new("clarity", Focus::Clarity, 0.2)
            .order_erased()
            .with_description("Is the prose clear?"),
    ])
    .unwrap()
}

/// Returns the same score for everything
#[derive(Debug, Clone, Copy)]
pub struct FixedScorer(pub f64);

#[async_trait::async_trait]
impl ScoringFunction for FixedScorer {
    async fn score(&self, _: &FragmentView<'_>, _: &CriterionSpec) -> Result<Score, ScoringError> {
        Ok(Score::new(self.0))
    }
}

/// Always fails
#[derive(Debug, Clone, Copy, Default)]
pub struct FailingScorer;

#[async_trait::async_trait]
impl ScoringFunction for FailingScorer {
    async fn score(&self, _: &FragmentView<'_>, _: &CriterionSpec) -> Result<Score, ScoringError> {
        Err(ScoringError::Failed("model unavailable".into()))
    }
}

/// Never returns
#[derive(Debug, Clone, Copy, Default)]
pub struct StallingScorer;

#[async_trait::async_trait]
impl ScoringFunction for StallingScorer {
    async fn score(&self, _: &FragmentView<'_>, _: &CriterionSpec) -> Result<Score, ScoringError> {
        std::future::pending().await
    }
}

/// Panics inside the worker
#[derive(Debug, Clone, Copy, Default)]
pub struct PanickingScorer;

#[async_trait::async_trait]
impl ScoringFunction for PanickingScorer {
    async fn score(&self, _: &FragmentView<'_>, _: &CriterionSpec) -> Result<Score, ScoringError> {
        panic!("scorer crashed")
    }
}

/// Per-criterion scripted behavior
#[derive(Debug, Clone)]
pub enum Behavior {
    Score(f64),
    Fail,
    Stall,
    Sleep(Duration, f64),
    Panic,
}

/// What a scorer was shown
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observed {
    pub criterion: String,
    pub segments: Vec<String>,
    pub order_erased: bool,
}

/// Scorer driven by a per-criterion script; records what it saw
#[derive(Debug, Default)]
pub struct ScriptedScorer {
    script: HashMap<String, Behavior>,
    fallback: Option<Behavior>,
    started: AtomicUsize,
    running: AtomicUsize,
    peak: AtomicUsize,
    observed: Mutex<Vec<Observed>>,
}

/// Decrements the running count however the call ends
struct Running<'a>(&'a AtomicUsize);

impl Drop for Running<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl ScriptedScorer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(mut self, criterion: &str, behavior: Behavior) -> Self {
        self.script.insert(criterion.to_string(), behavior);
        self
    }

    pub fn otherwise(mut self, behavior: Behavior) -> Self {
        self.fallback = Some(behavior);
        self
    }

    /// Calls that reached the scorer
    pub fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    /// Most calls in flight at once
    pub fn peak_running(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn observed(&self) -> Vec<Observed> {
        self.observed.lock().clone()
    }

    /// Poll until `n` calls have started
    pub async fn wait_started(&self, n: usize) {
        while self.started() < n {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    }
}

#[async_trait::async_trait]
impl ScoringFunction for ScriptedScorer {
    async fn score(&self, fragment: &FragmentView<'_>, criterion: &CriterionSpec) -> Result<Score, ScoringError> {
        self.observed.lock().push(Observed {
            criterion: criterion.criterion_id.as_str().to_string(),
            segments: fragment.segments().iter().map(|s| (*s).to_string()).collect(),
            order_erased: criterion.order_erased,
        });
        self.started.fetch_add(1, Ordering::SeqCst);
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        let _running = Running(&self.running);

        let behavior = self
            .script
            .get(criterion.criterion_id.as_str())
            .or(self.fallback.as_ref())
            .cloned()
            .unwrap_or(Behavior::Score(0.5));
        match behavior {
            Behavior::Score(value) => Ok(Score::new(value).with_comment(format!("{} segments", fragment.len()))),
            Behavior::Fail => Err(ScoringError::Failed("scripted failure".into())),
            Behavior::Stall => std::future::pending().await,
            Behavior::Sleep(duration, value) => {
                tokio::time::sleep(duration).await;
                Ok(Score::new(value))
            }
            Behavior::Panic => panic!("scripted panic"),
        }
    }
}

/// Backend whose teardown never succeeds
#[derive(Debug, Default)]
pub struct FailingTeardownIsolation {
    confined: AtomicUsize,
}

impl FailingTeardownIsolation {
    pub fn confined(&self) -> usize {
        self.confined.load(Ordering::SeqCst)
    }
}

impl IsolationBackend for FailingTeardownIsolation {
    fn confine(&self, worker_id: WorkerId, policy: &IsolationPolicy) -> Result<Confinement, IsolationError> {
        policy.validate()?;
        self.confined.fetch_add(1, Ordering::SeqCst);
        Ok(Confinement {
            worker_id,
            backend: "failing-teardown",
        })
    }

    fn teardown(&self, _: &Confinement) -> Result<(), IsolationError> {
        Err(IsolationError::TeardownFailed("sandbox still running".into()))
    }
}

/// Backend that refuses every worker
#[derive(Debug, Default)]
pub struct RefusingIsolation;

impl IsolationBackend for RefusingIsolation {
    fn confine(&self, _: WorkerId, _: &IsolationPolicy) -> Result<Confinement, IsolationError> {
        Err(IsolationError::ConfinementRefused("no sandbox capacity".into()))
    }

    fn teardown(&self, _: &Confinement) -> Result<(), IsolationError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_essay_has_exact_sizes() {
        let essay = standard_essay();
        assert_eq!(essay.len(), 2000);
        let structure = essay.structure();
        assert_eq!(structure.sections.len(), 5);
        assert_eq!(structure.sentences.len(), 40);
        assert!(structure.sections.iter().all(|s| s.span.len() == 400));
        assert!(structure.sentences.iter().all(|s| s.len() == 49));
        assert!(structure.citations.is_empty());
        assert!(!structure.terms.is_empty());
    }

    #[test]
    fn raw_sections_detect_citations() {
        let essay = cited_essay();
        let keys: Vec<Option<&str>> = essay
            .structure()
            .citations
            .iter()
            .map(|c| c.key.as_deref())
            .collect();
        assert_eq!(keys, vec![Some("Lee2019"), Some("Smith2020"), Some("Ghost2021")]);
        assert_eq!(essay.structure().bibliography.len(), 2);
    }

    #[test]
    fn generated_sentences_end_cleanly() {
        for i in 0..20 {
            let sentence = generated_sentence(i, 49);
            assert_eq!(sentence.len(), 49);
            assert!(sentence.ends_with('.'));
            assert!(!sentence.contains(" ."));
        }
    }
}
