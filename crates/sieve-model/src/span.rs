//! Byte ranges over a document
//!
//! [`Span`] is a half-open byte range. [`SpanSet`] keeps a normalized set of
//! spans (sorted, disjoint, adjacent ranges merged) so that size and overlap
//! questions are answered on the union, never on the raw list.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Half-open byte range `[start, end)`
///
/// Deserialization goes through [`Span::new`], so an inverted range never
/// parses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawSpan")]
pub struct Span {
    /// Inclusive start offset
    pub start: usize,
    /// Exclusive end offset
    pub end: usize,
}

#[derive(Deserialize)]
struct RawSpan {
    start: usize,
    end: usize,
}

impl TryFrom<RawSpan> for Span {
    type Error = SpanError;

    fn try_from(raw: RawSpan) -> Result<Self, Self::Error> {
        Span::new(raw.start, raw.end)
    }
}

impl Span {
    /// Create a span
    ///
    /// # Errors
    /// Returns [`SpanError::Inverted`] when `start > end`
    #[inline]
    pub fn new(start: usize, end: usize) -> Result<Self, SpanError> {
        if start > end {
            return Err(SpanError::Inverted { start, end });
        }
        Ok(Self { start, end })
    }

    /// Length in content units
    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.end - self.start
    }

    /// True for zero-length spans
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// True when the two ranges share at least one unit
    #[inline]
    #[must_use]
    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// True when `other` lies entirely inside `self`
    #[inline]
    #[must_use]
    pub fn contains(&self, other: &Span) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    /// Shared range, if any
    #[must_use]
    pub fn intersect(&self, other: &Span) -> Option<Span> {
        let start = self.start.max(other.start);
        let end = self.end.min(other.end);
        (start < end).then_some(Span { start, end })
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

/// Span construction errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SpanError {
    /// Start after end
    #[error("inverted span {start}..{end}")]
    Inverted { start: usize, end: usize },
}

/// Normalized set of disjoint spans
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SpanSet {
    spans: Vec<Span>,
}

impl SpanSet {
    /// Empty set
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from arbitrary spans; empties are dropped, overlaps merged
    #[must_use]
    pub fn from_spans(spans: impl IntoIterator<Item = Span>) -> Self {
        let mut raw: Vec<Span> = spans.into_iter().filter(|s| !s.is_empty()).collect();
        raw.sort_unstable();
        let mut merged: Vec<Span> = Vec::with_capacity(raw.len());
        for span in raw {
            match merged.last_mut() {
                Some(last) if span.start <= last.end => last.end = last.end.max(span.end),
                _ => merged.push(span),
            }
        }
        Self { spans: merged }
    }

    /// Add a span, keeping the set normalized
    pub fn insert(&mut self, span: Span) {
        if span.is_empty() {
            return;
        }
        let mut spans = std::mem::take(&mut self.spans);
        spans.push(span);
        *self = Self::from_spans(spans);
    }

    /// Union of two sets
    #[must_use]
    pub fn union(&self, other: &SpanSet) -> SpanSet {
        Self::from_spans(self.spans.iter().chain(other.spans.iter()).copied())
    }

    /// Intersection of two sets
    #[must_use]
    pub fn intersection(&self, other: &SpanSet) -> SpanSet {
        let mut out = Vec::new();
        let (mut i, mut j) = (0, 0);
        while i < self.spans.len() && j < other.spans.len() {
            let (a, b) = (self.spans[i], other.spans[j]);
            if let Some(shared) = a.intersect(&b) {
                out.push(shared);
            }
            if a.end < b.end {
                i += 1;
            } else {
                j += 1;
            }
        }
        Self { spans: out }
    }

    /// Size of the intersection without allocating it
    #[must_use]
    pub fn intersection_len(&self, other: &SpanSet) -> usize {
        self.intersection(other).total_len()
    }

    /// True when the sets share at least one unit
    #[must_use]
    pub fn overlaps(&self, other: &SpanSet) -> bool {
        self.intersection_len(other) > 0
    }

    /// True when `span` shares at least one unit with the set
    #[must_use]
    pub fn overlaps_span(&self, span: &Span) -> bool {
        self.spans.iter().any(|s| s.overlaps(span))
    }

    /// Total units covered
    #[must_use]
    pub fn total_len(&self) -> usize {
        self.spans.iter().map(Span::len).sum()
    }

    /// Number of disjoint ranges
    #[inline]
    #[must_use]
    pub fn range_count(&self) -> usize {
        self.spans.len()
    }

    /// True when nothing is covered
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }

    /// Ranges in ascending order
    pub fn iter(&self) -> impl Iterator<Item = &Span> {
        self.spans.iter()
    }

    /// Parts of `span` not covered by this set
    #[must_use]
    pub fn uncovered(&self, span: &Span) -> Vec<Span> {
        let mut out = Vec::new();
        let mut cursor = span.start;
        for covered in self.spans.iter().filter(|s| s.overlaps(span)) {
            if covered.start > cursor {
                out.push(Span { start: cursor, end: covered.start });
            }
            cursor = cursor.max(covered.end);
        }
        if cursor < span.end {
            out.push(Span { start: cursor, end: span.end });
        }
        out
    }
}

impl FromIterator<Span> for SpanSet {
    fn from_iter<I: IntoIterator<Item = Span>>(iter: I) -> Self {
        Self::from_spans(iter)
    }
}
