//! Documents and their structural tags
//!
//! The upstream parser produces the tags; this module only holds them and
//! checks that they address real content.

use crate::error::ModelError;
use crate::hash::ContentHash;
use crate::ids::DocumentId;
use crate::span::{Span, SpanError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Section tags assigned by the upstream parser
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SectionTag {
    /// Opening section
    Introduction,
    /// Method description
    Methodology,
    /// Main analysis/body
    Analysis,
    /// Discussion of results
    Discussion,
    /// Closing section
    Conclusion,
    /// Reference list
    Bibliography,
    /// Anything the parser could not classify
    Other,
}

/// A tagged section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    /// Section classification
    pub tag: SectionTag,
    /// Byte range of the section body
    pub span: Span,
}

/// An in-text citation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Citation {
    /// Byte range of the citation marker
    pub span: Span,
    /// Bibliography key the marker resolves to, if the parser found one
    pub key: Option<String>,
}

/// A normalized content term and where it occurs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TermOccurrence {
    /// Normalized term (lowercase stem or lemma)
    pub term: String,
    /// Byte range of this occurrence
    pub span: Span,
}

/// Structural metadata computed upstream
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentStructure {
    /// Tagged sections
    #[serde(default)]
    pub sections: Vec<Section>,
    /// Sentence boundaries, in document order
    #[serde(default)]
    pub sentences: Vec<Span>,
    /// In-text citations
    #[serde(default)]
    pub citations: Vec<Citation>,
    /// Content-term occurrences for keyword selection
    #[serde(default)]
    pub terms: Vec<TermOccurrence>,
    /// Keys of the extracted bibliography entries
    #[serde(default)]
    pub bibliography: Vec<String>,
}

impl DocumentStructure {
    fn all_spans(&self) -> impl Iterator<Item = (&'static str, &Span)> {
        self.sections
            .iter()
            .map(|s| ("section", &s.span))
            .chain(self.sentences.iter().map(|s| ("sentence", s)))
            .chain(self.citations.iter().map(|c| ("citation", &c.span)))
            .chain(self.terms.iter().map(|t| ("term", &t.span)))
    }
}

/// Immutable document content plus structure
///
/// Cheap to clone: the text is shared.
#[derive(Debug, Clone)]
pub struct Document {
    id: DocumentId,
    content: Arc<str>,
    structure: DocumentStructure,
}

impl Document {
    /// Create a document, checking every tagged span
    ///
    /// # Errors
    /// - [`ModelError::EmptyDocument`] for empty content
    /// - [`ModelError::Span`] for inverted spans
    /// - [`ModelError::SpanOutOfBounds`] for spans past the end
    /// - [`ModelError::NotCharBoundary`] for spans splitting a UTF-8 character
    pub fn new(
        content: impl Into<Arc<str>>,
        structure: DocumentStructure,
    ) -> Result<Self, ModelError> {
        let content = content.into();
        if content.is_empty() {
            return Err(ModelError::EmptyDocument);
        }
        for (kind, span) in structure.all_spans() {
            if span.start > span.end {
                return Err(SpanError::Inverted {
                    start: span.start,
                    end: span.end,
                }
                .into());
            }
            if span.end > content.len() {
                return Err(ModelError::SpanOutOfBounds {
                    kind,
                    span: *span,
                    len: content.len(),
                });
            }
            if !content.is_char_boundary(span.start) || !content.is_char_boundary(span.end) {
                return Err(ModelError::NotCharBoundary { kind, span: *span });
            }
        }
        Ok(Self {
            id: DocumentId::new(),
            content,
            structure,
        })
    }

    /// Document id
    #[inline]
    #[must_use]
    pub fn id(&self) -> DocumentId {
        self.id
    }

    /// Size in content units
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.content.len()
    }

    /// Always false for a constructed document
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }

    /// Structural tags
    #[inline]
    #[must_use]
    pub fn structure(&self) -> &DocumentStructure {
        &self.structure
    }

    /// Text of one span
    #[inline]
    #[must_use]
    pub fn slice(&self, span: &Span) -> Option<&str> {
        self.content.get(span.start..span.end)
    }

    /// Digest of the content, for audit records that must not carry text
    #[must_use]
    pub fn fingerprint(&self) -> ContentHash {
        ContentHash::compute(self.content.as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn span(start: usize, end: usize) -> Span {
        Span::new(start, end).unwrap()
    }

    #[test]
    fn rejects_empty_content() {
        let result = Document::new("", DocumentStructure::default());
        assert!(matches!(result, Err(ModelError::EmptyDocument)));
    }

    #[test]
    fn rejects_out_of_bounds_sentence() {
        let structure = DocumentStructure {
            sentences: vec![span(0, 50)],
            ..Default::default()
        };
        let result = Document::new("Short text.", structure);
        assert!(matches!(
            result,
            Err(ModelError::SpanOutOfBounds { kind: "sentence", .. })
        ));
    }

    #[test]
    fn rejects_split_character() {
        let structure = DocumentStructure {
            sentences: vec![span(0, 1)],
            ..Default::default()
        };
        let result = Document::new("é is two bytes.", structure);
        assert!(matches!(result, Err(ModelError::NotCharBoundary { .. })));
    }

    #[test]
    fn rejects_inverted_sentence() {
        let structure = DocumentStructure {
            sentences: vec![span(0, 10), Span { start: 15, end: 11 }],
            ..Default::default()
        };
        let result = Document::new("A sentence. Another one here.", structure);
        assert!(matches!(
            result,
            Err(ModelError::Span(SpanError::Inverted { start: 15, end: 11 }))
        ));
    }

    #[test]
    fn inverted_structure_does_not_parse() {
        let valid = r#"{"sections":[],"sentences":[{"start":0,"end":10}],"citations":[],"terms":[],"bibliography":[]}"#;
        assert!(serde_json::from_str::<DocumentStructure>(valid).is_ok());

        let inverted = r#"{"sections":[],"sentences":[{"start":0,"end":10},{"start":15,"end":11}],"citations":[],"terms":[],"bibliography":[]}"#;
        let err = serde_json::from_str::<DocumentStructure>(inverted).unwrap_err();
        assert!(err.to_string().contains("inverted span"));
    }

    #[test]
    fn slice_returns_tagged_text() {
        let structure = DocumentStructure {
            sentences: vec![span(0, 6), span(7, 13)],
            ..Default::default()
        };
        let doc = Document::new("First. Second", structure).unwrap();
        assert_eq!(doc.slice(&span(7, 13)), Some("Second"));
        assert_eq!(doc.len(), 13);
    }

    #[test]
    fn fingerprint_ignores_document_id() {
        let a = Document::new("same text", DocumentStructure::default()).unwrap();
        let b = Document::new("same text", DocumentStructure::default()).unwrap();
        assert_ne!(a.id(), b.id());
        assert_eq!(a.fingerprint(), b.fingerprint());
    }
}
