//! Surface grammar checks with policy-controlled excerpts

use super::{ratio, sentences, words, AnalyzerInput};
use crate::config::AnalyzerEchoPolicy;
use serde::{Deserialize, Serialize};

/// Rule-based checks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GrammarRule {
    /// "the the"
    DoubledWord,
    /// Sentence starts with a lowercase letter
    LowercaseStart,
    /// Sentence does not end in `.`, `!` or `?`
    MissingTerminalPunctuation,
    /// Two or more consecutive spaces
    RepeatedWhitespace,
    /// Space before `,` `.` `;` `:` `!` `?`
    SpaceBeforePunctuation,
}

/// One finding
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrammarIssue {
    /// Rule that fired
    pub rule: GrammarRule,
    /// Segment index in presentation order
    pub segment: usize,
    /// Sentence index within the segment
    pub sentence: usize,
    /// Offending sentence; only under an echo policy
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub excerpt: Option<String>,
}

/// Grammar findings for one fragment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GrammarReport {
    /// Sentences checked
    pub sentences_checked: usize,
    /// Findings in presentation order
    pub issues: Vec<GrammarIssue>,
}

impl GrammarReport {
    /// Share of sentences without findings
    #[must_use]
    pub fn score(&self) -> Option<f64> {
        if self.sentences_checked == 0 {
            return None;
        }
        let mut flagged: Vec<(usize, usize)> = self.issues.iter().map(|i| (i.segment, i.sentence)).collect();
        flagged.sort_unstable();
        flagged.dedup();
        Some(1.0 - ratio(flagged.len(), self.sentences_checked))
    }
}

/// Run every rule over every sentence
#[must_use]
pub fn check_grammar(input: &AnalyzerInput<'_>, echo: AnalyzerEchoPolicy) -> GrammarReport {
    let mut report = GrammarReport {
        sentences_checked: 0,
        issues: Vec::new(),
    };
    for (segment, text) in input.segments().iter().enumerate() {
        for (index, sentence) in sentences(text).into_iter().enumerate() {
            report.sentences_checked += 1;
            for rule in rules_fired(sentence) {
                report.issues.push(GrammarIssue {
                    rule,
                    segment,
                    sentence: index,
                    excerpt: echo.allows_excerpts().then(|| sentence.to_string()),
                });
            }
        }
    }
    report
}

fn rules_fired(sentence: &str) -> Vec<GrammarRule> {
    let mut fired = Vec::new();

    let tokens: Vec<&str> = words(sentence).collect();
    if tokens.windows(2).any(|w| w[0].eq_ignore_ascii_case(w[1])) {
        fired.push(GrammarRule::DoubledWord);
    }
    if sentence.chars().find(|c| c.is_alphabetic()).is_some_and(char::is_lowercase) {
        fired.push(GrammarRule::LowercaseStart);
    }
    let last = sentence
        .trim_end_matches(|c: char| matches!(c, '"' | '\'' | ')' | ']' | '\u{201d}'))
        .chars()
        .last();
    if !matches!(last, Some('.' | '!' | '?')) {
        fired.push(GrammarRule::MissingTerminalPunctuation);
    }
    if sentence.contains("  ") {
        fired.push(GrammarRule::RepeatedWhitespace);
    }
    if [" ,", " .", " ;", " :", " !", " ?"].iter().any(|p| sentence.contains(p)) {
        fired.push(GrammarRule::SpaceBeforePunctuation);
    }
    fired
}
