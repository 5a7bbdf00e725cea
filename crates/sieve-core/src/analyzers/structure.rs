//! Sentence length and fragment-sentence statistics

use super::{ratio, sentences, words, AnalyzerInput};
use serde::{Deserialize, Serialize};

/// Sentences longer than this are flagged
const LONG_SENTENCE_WORDS: usize = 40;
/// Sentences shorter than this are flagged as fragments
const FRAGMENT_SENTENCE_WORDS: usize = 4;

/// Sentence and segment shape
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructureReport {
    /// Segments examined
    pub segments: usize,
    /// Sentences found
    pub sentences: usize,
    /// Words found
    pub words: usize,
    /// Mean words per sentence
    pub mean_sentence_words: f64,
    /// Longest sentence, in words
    pub longest_sentence_words: usize,
    /// Sentences over the length limit
    pub long_sentences: usize,
    /// Sentences too short to stand alone
    pub fragmentary_sentences: usize,
}

impl StructureReport {
    /// Share of well-formed sentences
    #[must_use]
    pub fn score(&self) -> Option<f64> {
        (self.sentences > 0)
            .then(|| 1.0 - ratio(self.long_sentences + self.fragmentary_sentences, self.sentences))
    }
}

/// Measure sentence shape across the fragment
#[must_use]
pub fn check_structure(input: &AnalyzerInput<'_>) -> StructureReport {
    let mut report = StructureReport {
        segments: input.segments().len(),
        sentences: 0,
        words: 0,
        mean_sentence_words: 0.0,
        longest_sentence_words: 0,
        long_sentences: 0,
        fragmentary_sentences: 0,
    };
    for text in input.segments() {
        for sentence in sentences(text) {
            let count = words(sentence).count();
            report.sentences += 1;
            report.words += count;
            report.longest_sentence_words = report.longest_sentence_words.max(count);
            if count > LONG_SENTENCE_WORDS {
                report.long_sentences += 1;
            } else if count < FRAGMENT_SENTENCE_WORDS {
                report.fragmentary_sentences += 1;
            }
        }
    }
    report.mean_sentence_words = ratio(report.words, report.sentences);
    report
}
