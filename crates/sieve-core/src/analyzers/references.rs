//! Citation keys checked against the bibliography

use super::{ratio, AnalyzerInput};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Citation cross-check against the extracted bibliography
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CitationReport {
    /// Citations inside the fragment
    pub citations: usize,
    /// Citations whose key is in the bibliography
    pub resolved: usize,
    /// Citations the parser could not key
    pub unkeyed: usize,
    /// Keys cited but missing from the bibliography, sorted
    pub unresolved_keys: Vec<String>,
    /// Bibliography entries
    pub bibliography_entries: usize,
    /// Bibliography entries never cited in the fragment
    pub uncited_entries: usize,
}

impl CitationReport {
    /// Share of citations that resolve
    #[must_use]
    pub fn score(&self) -> Option<f64> {
        (self.citations > 0).then(|| ratio(self.resolved, self.citations))
    }
}

/// Match every citation key against the bibliography, ignoring case
#[must_use]
pub fn check_references(input: &AnalyzerInput<'_>) -> CitationReport {
    let known: BTreeSet<String> = input.bibliography.iter().map(|k| k.to_lowercase()).collect();
    let mut cited = BTreeSet::new();
    let mut unresolved = BTreeSet::new();
    let mut resolved = 0;
    let mut unkeyed = 0;

    for key in &input.citation_keys {
        match key {
            None => unkeyed += 1,
            Some(key) => {
                let normalized = key.to_lowercase();
                if known.contains(&normalized) {
                    resolved += 1;
                    cited.insert(normalized);
                } else {
                    unresolved.insert((*key).to_string());
                }
            }
        }
    }

    CitationReport {
        citations: input.citation_keys.len(),
        resolved,
        unkeyed,
        unresolved_keys: unresolved.into_iter().collect(),
        bibliography_entries: known.len(),
        uncited_entries: known.difference(&cited).count(),
    }
}
