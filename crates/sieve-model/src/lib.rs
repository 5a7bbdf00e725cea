//! Sieve Model
//!
//! The data the decomposition pipeline works on:
//! - [`Document`] with upstream structural tags
//! - [`Rubric`] of [`Criterion`] entries
//! - [`Fragment`]: a criterion-scoped view over disjoint byte ranges
//! - [`Span`] / [`SpanSet`] arithmetic used by exposure accounting
//!
//! Nothing here parses raw text; tags come from an upstream parser.

#![warn(missing_docs)]
#![warn(unreachable_pub)]

pub mod document;
pub mod error;
pub mod fragment;
pub mod hash;
pub mod ids;
pub mod rubric;
pub mod span;

pub use document::{Citation, Document, DocumentStructure, Section, SectionTag, TermOccurrence};
pub use error::ModelError;
pub use fragment::{size_fraction, ConsumerKind, Fragment};
pub use hash::{ContentHash, HashError};
pub use ids::{CriterionId, DocumentId, FragmentId, RunId, WorkerId};
pub use rubric::{AnalyzerKind, Consumer, Criterion, Focus, Rubric};
pub use span::{Span, SpanError, SpanSet};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
