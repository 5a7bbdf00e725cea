//! Flesch reading ease and grade level

use super::{ratio, sentences, words, AnalyzerInput};
use serde::{Deserialize, Serialize};

/// Flesch-family readability metrics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadabilityMetrics {
    /// Words counted
    pub words: usize,
    /// Sentences counted
    pub sentences: usize,
    /// Estimated syllables
    pub syllables: usize,
    /// Mean words per sentence
    pub words_per_sentence: f64,
    /// Mean syllables per word
    pub syllables_per_word: f64,
    /// Flesch reading ease (higher is easier)
    pub flesch_reading_ease: f64,
    /// Flesch-Kincaid grade level
    pub flesch_kincaid_grade: f64,
}

impl ReadabilityMetrics {
    /// Reading ease mapped onto `[0, 1]`
    #[must_use]
    pub fn score(&self) -> Option<f64> {
        (self.words > 0).then(|| (self.flesch_reading_ease / 100.0).clamp(0.0, 1.0))
    }
}

/// Compute metrics over all segments together
#[must_use]
pub fn compute_readability(input: &AnalyzerInput<'_>) -> ReadabilityMetrics {
    let mut word_count = 0;
    let mut sentence_count = 0;
    let mut syllables = 0;
    for text in input.segments() {
        sentence_count += sentences(text).len();
        for word in words(text) {
            word_count += 1;
            syllables += syllable_estimate(word);
        }
    }

    let words_per_sentence = ratio(word_count, sentence_count);
    let syllables_per_word = ratio(syllables, word_count);
    let (ease, grade) = if word_count == 0 || sentence_count == 0 {
        (0.0, 0.0)
    } else {
        (
            206.835 - 1.015 * words_per_sentence - 84.6 * syllables_per_word,
            0.39 * words_per_sentence + 11.8 * syllables_per_word - 15.59,
        )
    };

    ReadabilityMetrics {
        words: word_count,
        sentences: sentence_count,
        syllables,
        words_per_sentence,
        syllables_per_word,
        flesch_reading_ease: ease,
        flesch_kincaid_grade: grade,
    }
}

/// Vowel-group count with a silent trailing `e`; at least one
fn syllable_estimate(word: &str) -> usize {
    let lower = word.to_ascii_lowercase();
    let mut count = 0;
    let mut previous_vowel = false;
    for c in lower.chars() {
        let vowel = matches!(c, 'a' | 'e' | 'i' | 'o' | 'u' | 'y');
        if vowel && !previous_vowel {
            count += 1;
        }
        previous_vowel = vowel;
    }
    if count > 1 && lower.ends_with('e') && !lower.ends_with("le") {
        count -= 1;
    }
    count.max(1)
}
