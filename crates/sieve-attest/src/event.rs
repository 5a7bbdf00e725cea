//! Attestation events handed to the external event store

use crate::proof::DestructionProof;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sieve_ledger::ExposureReport;
use sieve_model::{ConsumerKind, ContentHash, CriterionId, FragmentId, RunId, WorkerId};

/// Lifecycle events of one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AttestationEvent {
    /// Run accepted; carries a content fingerprint, never content
    RunStarted {
        /// Blake3 digest of the document
        document_fingerprint: ContentHash,
        /// Criteria in the rubric
        criteria: usize,
    },
    /// Fragment registered with the ledger and released to its consumer
    FragmentIssued {
        /// Fragment
        fragment_id: FragmentId,
        /// Owning criterion
        criterion_id: CriterionId,
        /// Consumer tag
        consumer: ConsumerKind,
        /// Fragment size over document length
        size_fraction: f64,
        /// Whether the ledger metered it
        metered: bool,
        /// Digest of the span layout
        layout_digest: ContentHash,
    },
    /// Disposable worker created for one fragment
    WorkerSpawned {
        /// Worker
        worker_id: WorkerId,
        /// The single fragment it holds
        fragment_id: FragmentId,
        /// Hard lifetime bound
        lifetime_ms: u64,
    },
    /// Disposable worker destroyed
    WorkerDestroyed {
        /// Proof of destruction
        proof: DestructionProof,
    },
    /// Run finished and produced feedback
    RunCompleted {
        /// Final ledger snapshot
        exposure_report: ExposureReport,
    },
    /// Run ended without feedback
    RunAborted {
        /// Why
        reason: String,
        /// Destruction proofs collected before the abort
        proofs_obtained: usize,
    },
}

impl AttestationEvent {
    /// Short event name for log lines
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            AttestationEvent::RunStarted { .. } => "run_started",
            AttestationEvent::FragmentIssued { .. } => "fragment_issued",
            AttestationEvent::WorkerSpawned { .. } => "worker_spawned",
            AttestationEvent::WorkerDestroyed { .. } => "worker_destroyed",
            AttestationEvent::RunCompleted { .. } => "run_completed",
            AttestationEvent::RunAborted { .. } => "run_aborted",
        }
    }
}

/// One hash-chained entry of the attestation log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttestationRecord {
    /// Position in the run's log, from zero
    pub sequence: u64,
    /// Run
    pub run_id: RunId,
    /// Emission time
    pub emitted_at: DateTime<Utc>,
    /// Payload
    pub event: AttestationEvent,
    /// Hash of the previous record (zero for the first)
    pub prev_hash: ContentHash,
    /// SHA-256 over this record's fields and `prev_hash`
    pub hash: ContentHash,
}
