//! Deterministic analyzers
//!
//! Pure functions with zero exposure cost by policy. Reports carry counts,
//! rule ids and positions; the grammar report may quote a sentence only
//! under [`AnalyzerEchoPolicy::Echo`].

mod grammar;
mod keywords;
mod readability;
mod references;
mod structure;

pub use grammar::{check_grammar, GrammarIssue, GrammarReport, GrammarRule};
pub use keywords::{compute_keywords, KeywordAnalysis, KeywordCount};
pub use readability::{compute_readability, ReadabilityMetrics};
pub use references::{check_references, CitationReport};
pub use structure::{check_structure, StructureReport};

use crate::config::AnalyzerEchoPolicy;
use serde::{Deserialize, Serialize};
use sieve_model::{AnalyzerKind, Document, Fragment};

/// What an analyzer may read: the fragment's text plus citation metadata
/// inside it. No offsets, no other content.
#[derive(Debug, Clone)]
pub struct AnalyzerInput<'a> {
    segments: Vec<&'a str>,
    citation_keys: Vec<Option<&'a str>>,
    bibliography: &'a [String],
}

impl<'a> AnalyzerInput<'a> {
    /// Collect the fragment's segments from the document
    #[must_use]
    pub fn new(document: &'a Document, fragment: &Fragment) -> Self {
        let segments = fragment
            .segments
            .iter()
            .filter_map(|span| document.slice(span))
            .collect();
        let structure = document.structure();
        let citation_keys = structure
            .citations
            .iter()
            .filter(|c| fragment.spans.overlaps_span(&c.span))
            .map(|c| c.key.as_deref())
            .collect();
        Self {
            segments,
            citation_keys,
            bibliography: &structure.bibliography,
        }
    }

    /// Input from bare text segments
    #[must_use]
    pub fn from_segments(segments: Vec<&'a str>) -> Self {
        Self {
            segments,
            citation_keys: Vec::new(),
            bibliography: &[],
        }
    }

    /// Attach citation keys and a bibliography
    #[must_use]
    pub fn with_citations(mut self, keys: Vec<Option<&'a str>>, bibliography: &'a [String]) -> Self {
        self.citation_keys = keys;
        self.bibliography = bibliography;
        self
    }

    /// Segment texts in presentation order
    #[inline]
    #[must_use]
    pub fn segments(&self) -> &[&'a str] {
        &self.segments
    }
}

/// Output of one deterministic analyzer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "analyzer", rename_all = "kebab-case")]
pub enum AnalyzerReport {
    /// [`check_references`]
    References(CitationReport),
    /// [`check_structure`]
    Structure(StructureReport),
    /// [`check_grammar`]
    Grammar(GrammarReport),
    /// [`compute_readability`]
    Readability(ReadabilityMetrics),
    /// [`compute_keywords`]
    Keywords(KeywordAnalysis),
}

impl AnalyzerReport {
    /// Analyzer that produced the report
    #[must_use]
    pub fn kind(&self) -> AnalyzerKind {
        match self {
            AnalyzerReport::References(_) => AnalyzerKind::References,
            AnalyzerReport::Structure(_) => AnalyzerKind::Structure,
            AnalyzerReport::Grammar(_) => AnalyzerKind::Grammar,
            AnalyzerReport::Readability(_) => AnalyzerKind::Readability,
            AnalyzerReport::Keywords(_) => AnalyzerKind::Keywords,
        }
    }

    /// Normalized score in `[0, 1]`, when the analyzer grades anything
    #[must_use]
    pub fn score(&self) -> Option<f64> {
        match self {
            AnalyzerReport::References(r) => r.score(),
            AnalyzerReport::Structure(r) => r.score(),
            AnalyzerReport::Grammar(r) => r.score(),
            AnalyzerReport::Readability(r) => r.score(),
            AnalyzerReport::Keywords(_) => None,
        }
    }
}

/// Dispatch on the analyzer tag
#[must_use]
pub fn run_analyzer(kind: AnalyzerKind, input: &AnalyzerInput<'_>, echo: AnalyzerEchoPolicy) -> AnalyzerReport {
    match kind {
        AnalyzerKind::References => AnalyzerReport::References(check_references(input)),
        AnalyzerKind::Structure => AnalyzerReport::Structure(check_structure(input)),
        AnalyzerKind::Grammar => AnalyzerReport::Grammar(check_grammar(input, echo)),
        AnalyzerKind::Readability => AnalyzerReport::Readability(compute_readability(input)),
        AnalyzerKind::Keywords => AnalyzerReport::Keywords(compute_keywords(input)),
    }
}

/// Words: runs of alphanumerics and apostrophes
pub(crate) fn words(text: &str) -> impl Iterator<Item = &str> {
    text.split(|c: char| !(c.is_alphanumeric() || c == '\''))
        .filter(|w| !w.is_empty())
}

/// Sentences: text up to `.`, `!` or `?` followed by whitespace or the end
pub(crate) fn sentences(text: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        if matches!(c, '.' | '!' | '?') {
            let at_boundary = chars.peek().map_or(true, |(_, next)| next.is_whitespace());
            if at_boundary {
                let end = i + c.len_utf8();
                let piece = text[start..end].trim();
                if !piece.is_empty() {
                    out.push(piece);
                }
                start = end;
            }
        }
    }
    let tail = text[start..].trim();
    if !tail.is_empty() {
        out.push(tail);
    }
    out
}

#[allow(clippy::cast_precision_loss)]
pub(crate) fn ratio(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentences_split_on_terminal_punctuation() {
        let text = "First one. Second (Lee, 2019)! Version 2.5 works? trailing";
        assert_eq!(
            sentences(text),
            vec!["First one.", "Second (Lee, 2019)!", "Version 2.5 works?", "trailing"]
        );
    }

    #[test]
    fn words_keep_apostrophes() {
        let w: Vec<_> = words("It's a test, isn't it?").collect();
        assert_eq!(w, vec!["It's", "a", "test", "isn't", "it"]);
    }

    #[test]
    fn dispatch_matches_kind() {
        let input = AnalyzerInput::from_segments(vec!["A short sentence."]);
        for kind in [
            AnalyzerKind::References,
            AnalyzerKind::Structure,
            AnalyzerKind::Grammar,
            AnalyzerKind::Readability,
            AnalyzerKind::Keywords,
        ] {
            assert_eq!(run_analyzer(kind, &input, AnalyzerEchoPolicy::Redacted).kind(), kind);
        }
    }
}
