//! Exposure reports

use crate::ledger::LedgerMode;
use serde::{Deserialize, Serialize};
use sieve_model::{ConsumerKind, CriterionId};

/// Per-criterion exposure row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriterionExposure {
    /// Criterion
    pub criterion_id: CriterionId,
    /// Consumer tag
    pub consumer: ConsumerKind,
    /// Fragments registered for the criterion
    pub fragments: usize,
    /// Union of the criterion's spans over document length
    pub size_fraction: f64,
    /// Part of `size_fraction` counted as exposure
    pub metered_fraction: f64,
}

/// Read-only snapshot of a ledger
///
/// Contains no ids or timestamps: the same document, rubric and seed always
/// produce the same report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExposureReport {
    /// Document size in content units
    pub document_len: usize,
    /// Global ceiling in force
    pub ceiling: f64,
    /// Ledger mode that produced the report
    pub mode: LedgerMode,
    /// Units in the metered union
    pub total_unique_units: usize,
    /// Metered union over document length
    pub total_unique_exposure: f64,
    /// Largest single metered fragment over document length
    pub max_single_consumer_exposure: f64,
    /// Union that would be exposed if the plan ran (equals the total in live runs)
    pub projected_unique_exposure: f64,
    /// Largest single metered fragment that would be exposed
    pub projected_max_single_consumer_exposure: f64,
    /// Fragments registered
    pub fragments_issued: usize,
    /// Fragments registered as metered
    pub metered_fragments: usize,
    /// Rows in rubric order
    pub per_criterion: Vec<CriterionExposure>,
}

impl ExposureReport {
    /// Row for one criterion
    #[must_use]
    pub fn criterion(&self, id: &CriterionId) -> Option<&CriterionExposure> {
        self.per_criterion.iter().find(|c| &c.criterion_id == id)
    }

    /// Headroom left under the ceiling
    #[inline]
    #[must_use]
    pub fn remaining_budget(&self) -> f64 {
        (self.ceiling - self.projected_unique_exposure).max(0.0)
    }
}
