//! Span selection policies
//!
//! Pure functions of the upstream structural tags. Nothing here reads the
//! document text.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use sieve_model::{Document, Focus, Span, SpanSet};
use std::collections::HashMap;

/// Number of most frequent terms a coherence selection follows
const KEY_TERMS: usize = 5;

/// Units a sampled selection may collect
pub(crate) fn target_units(fraction: f64, document_len: usize) -> usize {
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
    let units = (fraction * document_len as f64).floor() as usize;
    units.min(document_len)
}

/// Section or citation-context spans for a structural focus, in document order
pub(crate) fn structural(document: &Document, focus: Focus) -> Vec<Span> {
    let structure = document.structure();
    if let Some(tag) = focus.section_tag() {
        let mut spans: Vec<Span> = structure
            .sections
            .iter()
            .filter(|s| s.tag == tag)
            .map(|s| s.span)
            .collect();
        spans.sort_unstable();
        return spans;
    }
    if focus != Focus::CitationContext {
        return Vec::new();
    }

    let citations = SpanSet::from_spans(structure.citations.iter().map(|c| c.span));
    if structure.sentences.is_empty() {
        return citations.iter().copied().collect();
    }
    let mut spans: Vec<Span> = structure
        .sentences
        .iter()
        .filter(|s| citations.overlaps_span(s))
        .copied()
        .collect();
    spans.sort_unstable();
    spans.dedup();
    spans
}

/// Clip the selection to sentence boundaries
///
/// Spans no sentence touches are kept whole.
pub(crate) fn refine_to_sentences(document: &Document, spans: &[Span]) -> Vec<Span> {
    let sentences = &document.structure().sentences;
    let mut refined = Vec::new();
    for span in spans {
        let mut pieces: Vec<Span> = sentences
            .iter()
            .filter_map(|s| s.intersect(span))
            .filter(|s| !s.is_empty())
            .collect();
        if pieces.is_empty() {
            refined.push(*span);
        } else {
            pieces.sort_unstable();
            refined.extend(pieces);
        }
    }
    let mut seen = SpanSet::new();
    refined.retain(|s| {
        let fresh = !seen.overlaps_span(s);
        seen.insert(*s);
        fresh
    });
    refined
}

fn candidates(document: &Document, excluded: &SpanSet) -> Vec<Span> {
    document
        .structure()
        .sentences
        .iter()
        .filter(|s| !s.is_empty() && !excluded.overlaps_span(s))
        .copied()
        .collect()
}

/// Random sentence sample of at most `target` units, in document order
pub(crate) fn sampled(document: &Document, target: usize, excluded: &SpanSet, seed: u64) -> Vec<Span> {
    let mut pool = candidates(document, excluded);
    pool.sort_unstable();
    pool.dedup();
    let mut rng = StdRng::seed_from_u64(seed);
    pool.shuffle(&mut rng);
    let mut picked = pack(pool, target);
    picked.sort_unstable();
    picked
}

/// Sentences densest in the document's most frequent terms, at most `target` units
pub(crate) fn keyword_dense(document: &Document, target: usize, excluded: &SpanSet) -> Vec<Span> {
    let terms = &document.structure().terms;
    let mut frequency: HashMap<String, usize> = HashMap::new();
    for occurrence in terms {
        *frequency.entry(occurrence.term.to_lowercase()).or_default() += 1;
    }
    let mut ranked: Vec<(String, usize)> = frequency.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked.truncate(KEY_TERMS);

    let key_spans: Vec<Span> = terms
        .iter()
        .filter(|t| ranked.iter().any(|(term, _)| t.term.eq_ignore_ascii_case(term)))
        .map(|t| t.span)
        .collect();

    let mut scored: Vec<(usize, Span)> = candidates(document, excluded)
        .into_iter()
        .map(|sentence| {
            let hits = key_spans.iter().filter(|k| sentence.contains(k)).count();
            (hits, sentence)
        })
        .filter(|(hits, _)| *hits > 0)
        .collect();
    scored.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(&b.1)));

    let mut picked = pack(scored.into_iter().map(|(_, s)| s).collect(), target);
    picked.sort_unstable();
    picked
}

/// Greedy fill in the given order, skipping spans that no longer fit
fn pack(ordered: Vec<Span>, target: usize) -> Vec<Span> {
    let mut total = 0;
    let mut picked = Vec::new();
    for span in ordered {
        if total + span.len() <= target {
            total += span.len();
            picked.push(span);
        }
    }
    picked
}

/// Round-robin split into `passes` disjoint groups; empty groups are dropped
pub(crate) fn split_passes(segments: &[Span], passes: u16) -> Vec<Vec<Span>> {
    let passes = usize::from(passes.max(1));
    let mut groups = vec![Vec::new(); passes];
    for (i, span) in segments.iter().enumerate() {
        groups[i % passes].push(*span);
    }
    groups.retain(|g| !g.is_empty());
    groups
}
