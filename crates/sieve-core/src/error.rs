//! Error types for Sieve Core
//!
//! Run-level failures only. A single criterion's scoring fault is data
//! ([`crate::WorkerFault`], [`crate::UnavailableReason`]) and never an error.

use crate::isolation::IsolationError;
use sieve_attest::DestructionProof;
use sieve_ledger::{ExposureExceeded, LedgerError};
use sieve_model::{CriterionId, FragmentId, ModelError, WorkerId};

/// Decomposition failures; all are raised before any consumer sees content
#[derive(Debug, thiserror::Error)]
pub enum FragmentError {
    /// A criterion's selection is larger than its own exposure bound
    #[error(
        "configuration error: criterion {criterion} selects {size_fraction:.4} of the document, bound is {max_exposure_fraction:.4}"
    )]
    Configuration {
        /// Offending criterion
        criterion: CriterionId,
        /// Size of its selection
        size_fraction: f64,
        /// Its configured bound
        max_exposure_fraction: f64,
    },

    /// Two criteria select the same content without permission
    #[error("overlap error: criteria {first} and {second} share {shared_units} units")]
    Overlap {
        /// Earlier criterion in rubric order
        first: CriterionId,
        /// Later criterion in rubric order
        second: CriterionId,
        /// Units in common
        shared_units: usize,
    },

    /// Ceiling breached under [`crate::CeilingPolicy::AbortRun`]
    #[error("exposure exceeded: {0}")]
    ExposureExceeded(#[from] ExposureExceeded),

    /// Invalid rubric or document
    #[error("model error: {0}")]
    Model(#[from] ModelError),

    /// Ledger could not be created
    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),
}

/// Worker pool errors
#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    /// Run cancelled while the submission was still queued; no worker spawned
    #[error("submission cancelled before a worker was spawned")]
    Cancelled,

    /// Pool shut down
    #[error("worker pool closed")]
    Closed,

    /// Backend refused to confine a worker; no content was loaded
    #[error("isolation unavailable: {0}")]
    Isolation(#[from] IsolationError),

    /// A worker could not be confirmed destroyed
    #[error("destruction failure for worker {worker_id} ({fragment_id}): {reason}")]
    DestructionFailure {
        /// Worker that may still hold content
        worker_id: WorkerId,
        /// Fragment it held
        fragment_id: FragmentId,
        /// What went wrong
        reason: String,
    },
}

impl PoolError {
    /// Check if this error breaks the isolation guarantee
    #[inline]
    #[must_use]
    pub fn is_destruction_failure(&self) -> bool {
        matches!(self, Self::DestructionFailure { .. })
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A field failed validation
    #[error("invalid configuration {field}: {reason}")]
    Invalid {
        /// Dotted field path
        field: &'static str,
        /// Why it is invalid
        reason: String,
    },

    /// Configuration file unreadable
    #[error("configuration I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration file malformed
    #[error("configuration parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl ConfigError {
    #[inline]
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

/// Run-level failures of [`crate::FeedbackPipeline`]
///
/// None of these carry a feedback aggregate. Those raised after workers
/// spawned carry every destruction proof obtained.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Invalid configuration
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Decomposition rejected; nothing was exposed
    #[error(transparent)]
    Fragment(#[from] FragmentError),

    /// A worker could not be confirmed destroyed
    #[error("run aborted: {source}")]
    DestructionFailure {
        /// Underlying pool error
        source: PoolError,
        /// Proofs collected before and after the failure
        proofs: Vec<DestructionProof>,
    },

    /// Caller cancelled the run
    #[error("run cancelled after {} destruction proofs", .proofs.len())]
    Cancelled {
        /// One proof per spawned worker
        proofs: Vec<DestructionProof>,
    },
}

impl PipelineError {
    /// Check if the run broke its isolation guarantee
    #[inline]
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::DestructionFailure { .. })
    }

    /// Check if the run stopped before any content reached a consumer
    #[inline]
    #[must_use]
    pub fn is_pre_exposure(&self) -> bool {
        matches!(self, Self::Config(_) | Self::Fragment(_))
    }

    /// Destruction proofs obtained before the run stopped
    #[must_use]
    pub fn proofs(&self) -> &[DestructionProof] {
        match self {
            Self::DestructionFailure { proofs, .. } | Self::Cancelled { proofs } => proofs,
            Self::Config(_) | Self::Fragment(_) => &[],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configuration_errors_are_pre_exposure() {
        let err = PipelineError::from(FragmentError::Configuration {
            criterion: CriterionId::new("intro"),
            size_fraction: 0.15,
            max_exposure_fraction: 0.05,
        });
        assert!(err.is_pre_exposure());
        assert!(!err.is_fatal());
        assert!(err.proofs().is_empty());
        assert!(err.to_string().contains("configuration error"));
    }

    #[test]
    fn destruction_failure_is_fatal() {
        let err = PipelineError::DestructionFailure {
            source: PoolError::DestructionFailure {
                worker_id: WorkerId::new(),
                fragment_id: FragmentId::new(CriterionId::new("intro"), 0),
                reason: "teardown refused".into(),
            },
            proofs: Vec::new(),
        };
        assert!(err.is_fatal());
        assert!(!err.is_pre_exposure());
    }
}
