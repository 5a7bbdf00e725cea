//! Ledger errors

use sieve_model::FragmentId;

/// Registering a fragment would breach the run's exposure ceiling
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error(
    "exposure ceiling exceeded by {fragment_id}: {attempted:.4} > {ceiling:.4} (current {current:.4})"
)]
pub struct ExposureExceeded {
    /// Rejected fragment
    pub fragment_id: FragmentId,
    /// Exposure before the attempt
    pub current: f64,
    /// Exposure the attempt would have produced
    pub attempted: f64,
    /// Configured ceiling
    pub ceiling: f64,
}

/// Ledger construction errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LedgerError {
    /// Ceiling outside (0, 1]
    #[error("exposure ceiling {0} outside (0, 1]")]
    InvalidCeiling(f64),

    /// Nothing to measure exposure against
    #[error("cannot account exposure for an empty document")]
    EmptyDocument,
}
