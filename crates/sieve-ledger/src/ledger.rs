//! The exposure ledger
//!
//! One ledger per run. Every fragment is registered before any consumer
//! sees it. Metered fragments (those bound for disposable workers, or for
//! analyzers whose output echoes input under a metered policy) extend the
//! run's span union; the union's size over the document length is the
//! run's total unique exposure.
//!
//! # Critical Invariant
//!
//! The ceiling check and the union update happen under one lock. Two
//! registrations can never both pass a check that only one of them fits.

use crate::error::{ExposureExceeded, LedgerError};
use crate::report::{CriterionExposure, ExposureReport};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sieve_model::{size_fraction, ConsumerKind, CriterionId, Fragment, FragmentId, SpanSet};
use std::collections::BTreeMap;

/// Tolerance for float comparison against the ceiling
const CEILING_EPSILON: f64 = 1e-12;

/// Whether registrations count as real exposure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LedgerMode {
    /// Fragments will be shown to consumers
    Live,
    /// Planning only; exposure is projected, never counted
    DryRun,
}

/// One registration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Registered fragment
    pub fragment_id: FragmentId,
    /// Owning criterion
    pub criterion_id: CriterionId,
    /// Fragment size over document length
    pub size_fraction: f64,
    /// Consumer tag
    pub consumer: ConsumerKind,
    /// Whether the spans were metered
    pub metered: bool,
    /// Registration time
    pub issued_at: DateTime<Utc>,
}

#[derive(Debug)]
struct CriterionTally {
    criterion_id: CriterionId,
    consumer: ConsumerKind,
    spans: SpanSet,
    metered_spans: SpanSet,
    fragments: usize,
}

#[derive(Debug, Default)]
struct LedgerState {
    entries: Vec<LedgerEntry>,
    metered_union: SpanSet,
    max_single_units: usize,
    by_ordinal: BTreeMap<usize, CriterionTally>,
}

/// Append-only, run-scoped exposure accounting
#[derive(Debug)]
pub struct ExposureLedger {
    document_len: usize,
    ceiling: f64,
    mode: LedgerMode,
    state: Mutex<LedgerState>,
}

impl ExposureLedger {
    /// Create a ledger for one run
    ///
    /// # Errors
    /// - [`LedgerError::EmptyDocument`] when `document_len` is zero
    /// - [`LedgerError::InvalidCeiling`] when `ceiling` is outside (0, 1]
    pub fn new(document_len: usize, ceiling: f64, mode: LedgerMode) -> Result<Self, LedgerError> {
        if document_len == 0 {
            return Err(LedgerError::EmptyDocument);
        }
        if !(ceiling.is_finite() && ceiling > 0.0 && ceiling <= 1.0) {
            return Err(LedgerError::InvalidCeiling(ceiling));
        }
        Ok(Self {
            document_len,
            ceiling,
            mode,
            state: Mutex::new(LedgerState::default()),
        })
    }

    /// Live ledger with the given ceiling
    ///
    /// # Errors
    /// See [`ExposureLedger::new`]
    #[inline]
    pub fn live(document_len: usize, ceiling: f64) -> Result<Self, LedgerError> {
        Self::new(document_len, ceiling, LedgerMode::Live)
    }

    /// Dry-run ledger with the given ceiling
    ///
    /// # Errors
    /// See [`ExposureLedger::new`]
    #[inline]
    pub fn dry_run(document_len: usize, ceiling: f64) -> Result<Self, LedgerError> {
        Self::new(document_len, ceiling, LedgerMode::DryRun)
    }

    /// Accounting mode
    #[inline]
    #[must_use]
    pub fn mode(&self) -> LedgerMode {
        self.mode
    }

    /// Configured ceiling
    #[inline]
    #[must_use]
    pub fn ceiling(&self) -> f64 {
        self.ceiling
    }

    /// Register a fragment before it is handed out
    ///
    /// # Errors
    /// [`ExposureExceeded`] when a metered fragment would push the union past
    /// the ceiling. Nothing is recorded in that case.
    pub fn register(&self, fragment: &Fragment) -> Result<LedgerEntry, ExposureExceeded> {
        let mut state = self.state.lock();

        if fragment.metered {
            let candidate = state.metered_union.union(&fragment.spans);
            let attempted = size_fraction(candidate.total_len(), self.document_len);
            if attempted > self.ceiling + CEILING_EPSILON {
                let current = size_fraction(state.metered_union.total_len(), self.document_len);
                tracing::warn!(
                    fragment = %fragment.id,
                    attempted,
                    ceiling = self.ceiling,
                    "exposure ceiling would be exceeded"
                );
                return Err(ExposureExceeded {
                    fragment_id: fragment.id.clone(),
                    current,
                    attempted,
                    ceiling: self.ceiling,
                });
            }
            state.metered_union = candidate;
            state.max_single_units = state.max_single_units.max(fragment.units());
        }

        let tally = state
            .by_ordinal
            .entry(fragment.ordinal)
            .or_insert_with(|| CriterionTally {
                criterion_id: fragment.criterion_id.clone(),
                consumer: fragment.consumer_kind(),
                spans: SpanSet::new(),
                metered_spans: SpanSet::new(),
                fragments: 0,
            });
        tally.spans = tally.spans.union(&fragment.spans);
        if fragment.metered {
            tally.metered_spans = tally.metered_spans.union(&fragment.spans);
        }
        tally.fragments += 1;

        let entry = LedgerEntry {
            fragment_id: fragment.id.clone(),
            criterion_id: fragment.criterion_id.clone(),
            size_fraction: fragment.size_fraction,
            consumer: fragment.consumer_kind(),
            metered: fragment.metered,
            issued_at: Utc::now(),
        };
        state.entries.push(entry.clone());
        tracing::debug!(
            fragment = %fragment.id,
            metered = fragment.metered,
            size_fraction = fragment.size_fraction,
            "fragment registered"
        );
        Ok(entry)
    }

    /// Snapshot of the accounting so far
    ///
    /// Callable at any point in a run.
    #[must_use]
    pub fn report(&self) -> ExposureReport {
        let state = self.state.lock();
        let live = self.mode == LedgerMode::Live;
        let union_units = state.metered_union.total_len();
        let projected = size_fraction(union_units, self.document_len);
        let projected_max = size_fraction(state.max_single_units, self.document_len);

        let per_criterion = state
            .by_ordinal
            .values()
            .map(|tally| CriterionExposure {
                criterion_id: tally.criterion_id.clone(),
                consumer: tally.consumer,
                fragments: tally.fragments,
                size_fraction: size_fraction(tally.spans.total_len(), self.document_len),
                metered_fraction: if live {
                    size_fraction(tally.metered_spans.total_len(), self.document_len)
                } else {
                    0.0
                },
            })
            .collect();

        ExposureReport {
            document_len: self.document_len,
            ceiling: self.ceiling,
            mode: self.mode,
            total_unique_units: if live { union_units } else { 0 },
            total_unique_exposure: if live { projected } else { 0.0 },
            max_single_consumer_exposure: if live { projected_max } else { 0.0 },
            projected_unique_exposure: projected,
            projected_max_single_consumer_exposure: projected_max,
            fragments_issued: state.entries.len(),
            metered_fragments: state.entries.iter().filter(|e| e.metered).count(),
            per_criterion,
        }
    }

    /// All registrations, in order
    #[must_use]
    pub fn entries(&self) -> Vec<LedgerEntry> {
        self.state.lock().entries.clone()
    }
}
