//! Term frequency and lexical diversity

use super::{ratio, words, AnalyzerInput};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

const TOP_TERMS: usize = 10;
const MIN_TERM_LEN: usize = 3;

const STOPWORDS: &[&str] = &[
    "the", "and", "for", "are", "but", "not", "you", "all", "any", "can", "had", "her", "was",
    "one", "our", "out", "has", "his", "how", "its", "may", "new", "now", "see", "two", "who",
    "did", "this", "that", "with", "from", "they", "have", "were", "been", "than", "then",
    "them", "these", "those", "there", "their", "which", "while", "would", "could", "should",
    "into", "also", "such", "more", "most", "some", "what", "when", "where", "each", "other",
];

/// One term and how often it occurs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeywordCount {
    /// Lowercased term
    pub term: String,
    /// Occurrences
    pub count: usize,
}

/// Term-frequency summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeywordAnalysis {
    /// Words counted, stopwords included
    pub total_words: usize,
    /// Distinct lowercased words
    pub distinct_words: usize,
    /// `distinct_words / total_words`
    pub lexical_diversity: f64,
    /// Most frequent content terms, by count then alphabetically
    pub top_terms: Vec<KeywordCount>,
}

/// Count content terms across all segments
#[must_use]
pub fn compute_keywords(input: &AnalyzerInput<'_>) -> KeywordAnalysis {
    let mut all: HashMap<String, usize> = HashMap::new();
    let mut total_words = 0;
    for text in input.segments() {
        for word in words(text) {
            total_words += 1;
            *all.entry(word.to_lowercase()).or_default() += 1;
        }
    }

    let mut top_terms: Vec<KeywordCount> = all
        .iter()
        .filter(|(term, _)| {
            term.chars().count() >= MIN_TERM_LEN
                && !STOPWORDS.contains(&term.as_str())
                && !term.chars().all(|c| c.is_ascii_digit())
        })
        .map(|(term, count)| KeywordCount {
            term: term.clone(),
            count: *count,
        })
        .collect();
    top_terms.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.term.cmp(&b.term)));
    top_terms.truncate(TOP_TERMS);

    KeywordAnalysis {
        total_words,
        distinct_words: all.len(),
        lexical_diversity: ratio(all.len(), total_words),
        top_terms,
    }
}
