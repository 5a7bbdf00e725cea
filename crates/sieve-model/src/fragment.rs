//! Fragments: criterion-scoped, read-only views over a document

use crate::hash::ContentHash;
use crate::ids::{CriterionId, FragmentId};
use crate::rubric::Consumer;
use crate::span::{Span, SpanSet};
use serde::{Deserialize, Serialize};

/// Tag the ledger uses to decide metered versus zero-exposure accounting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConsumerKind {
    /// Pure analyzer
    Deterministic,
    /// Disposable scoring worker
    DisposableWorker,
}

impl From<Consumer> for ConsumerKind {
    fn from(value: Consumer) -> Self {
        match value {
            Consumer::Deterministic(_) => ConsumerKind::Deterministic,
            Consumer::DisposableWorker => ConsumerKind::DisposableWorker,
        }
    }
}

/// A derived view over a document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fragment {
    /// Deterministic id (criterion + pass)
    pub id: FragmentId,
    /// Owning criterion
    pub criterion_id: CriterionId,
    /// Criterion's index in the rubric
    pub ordinal: usize,
    /// Receiving consumer
    pub consumer: Consumer,
    /// Normalized span set, used for accounting
    pub spans: SpanSet,
    /// Presentation order handed to the consumer
    pub segments: Vec<Span>,
    /// `spans.total_len() / document length`
    pub size_fraction: f64,
    /// Whether `segments` were shuffled
    pub order_erased: bool,
    /// Whether the ledger meters this fragment's spans
    pub metered: bool,
}

impl Fragment {
    /// Build a fragment from its presentation segments
    #[must_use]
    pub fn new(
        id: FragmentId,
        ordinal: usize,
        consumer: Consumer,
        segments: Vec<Span>,
        document_len: usize,
        order_erased: bool,
        metered: bool,
    ) -> Self {
        let spans = SpanSet::from_spans(segments.iter().copied());
        let size_fraction = size_fraction(spans.total_len(), document_len);
        Self {
            criterion_id: id.criterion.clone(),
            id,
            ordinal,
            consumer,
            spans,
            segments,
            size_fraction,
            order_erased,
            metered,
        }
    }

    /// Consumer tag
    #[inline]
    #[must_use]
    pub fn consumer_kind(&self) -> ConsumerKind {
        self.consumer.into()
    }

    /// Size in content units
    #[inline]
    #[must_use]
    pub fn units(&self) -> usize {
        self.spans.total_len()
    }

    /// Digest of the span layout (not the text), for attestation events
    #[must_use]
    pub fn layout_digest(&self) -> ContentHash {
        let bounds: Vec<[u8; 16]> = self
            .segments
            .iter()
            .map(|s| {
                let mut b = [0u8; 16];
                b[..8].copy_from_slice(&(s.start as u64).to_le_bytes());
                b[8..].copy_from_slice(&(s.end as u64).to_le_bytes());
                b
            })
            .collect();
        let id = self.id.to_string();
        ContentHash::compute_parts(
            std::iter::once(id.as_bytes()).chain(bounds.iter().map(<[u8; 16]>::as_slice)),
        )
    }
}

/// `units / document_len`, zero for an empty document
#[inline]
#[must_use]
pub fn size_fraction(units: usize, document_len: usize) -> f64 {
    if document_len == 0 {
        0.0
    } else {
        units as f64 / document_len as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn span(start: usize, end: usize) -> Span {
        Span::new(start, end).unwrap()
    }

    #[test]
    fn size_fraction_uses_union() {
        let fragment = Fragment::new(
            FragmentId::new(CriterionId::new("c"), 0),
            0,
            Consumer::DisposableWorker,
            vec![span(0, 50), span(25, 100)],
            1000,
            false,
            true,
        );
        assert_eq!(fragment.units(), 100);
        assert!((fragment.size_fraction - 0.1).abs() < 1e-12);
        assert_eq!(fragment.consumer_kind(), ConsumerKind::DisposableWorker);
    }

    #[test]
    fn layout_digest_depends_on_order() {
        let id = FragmentId::new(CriterionId::new("c"), 0);
        let a = Fragment::new(
            id.clone(),
            0,
            Consumer::DisposableWorker,
            vec![span(0, 5), span(10, 15)],
            100,
            true,
            true,
        );
        let b = Fragment::new(
            id,
            0,
            Consumer::DisposableWorker,
            vec![span(10, 15), span(0, 5)],
            100,
            true,
            true,
        );
        assert_eq!(a.spans, b.spans);
        assert_ne!(a.layout_digest(), b.layout_digest());
    }
}
