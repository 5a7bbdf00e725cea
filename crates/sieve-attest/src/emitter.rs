//! Run-scoped attestation emitter
//!
//! Every event goes to the run's hash-chained log first, then to the sink.
//! A sink failure never stops a run; it is logged and the record stays in
//! the local chain.

use crate::event::AttestationEvent;
use crate::log::AttestationLog;
use crate::proof::{DestructionMethod, DestructionProof, ProofSigner};
use crate::sink::EventSink;
use sieve_ledger::ExposureReport;
use sieve_model::{ContentHash, Fragment, FragmentId, RunId, WorkerId};
use std::sync::Arc;
use std::time::Duration;

/// Emits the attestation events of one run
pub struct Attestor {
    run_id: RunId,
    log: AttestationLog,
    sink: Arc<dyn EventSink>,
    signer: Option<ProofSigner>,
}

impl Attestor {
    /// New emitter for `run_id`
    pub fn new(run_id: RunId, sink: Arc<dyn EventSink>, signer: Option<ProofSigner>) -> Self {
        Self {
            run_id,
            log: AttestationLog::new(),
            sink,
            signer,
        }
    }

    /// Run this emitter belongs to
    #[inline]
    #[must_use]
    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    /// The run's local chain
    #[inline]
    #[must_use]
    pub fn log(&self) -> &AttestationLog {
        &self.log
    }

    /// Proofs emitted so far
    #[must_use]
    pub fn proofs(&self) -> Vec<DestructionProof> {
        self.log.proofs()
    }

    /// Run accepted
    pub fn run_started(&self, document_fingerprint: ContentHash, criteria: usize) {
        self.emit(AttestationEvent::RunStarted {
            document_fingerprint,
            criteria,
        });
    }

    /// Fragment registered and released
    pub fn fragment_issued(&self, fragment: &Fragment) {
        self.emit(AttestationEvent::FragmentIssued {
            fragment_id: fragment.id.clone(),
            criterion_id: fragment.criterion_id.clone(),
            consumer: fragment.consumer_kind(),
            size_fraction: fragment.size_fraction,
            metered: fragment.metered,
            layout_digest: fragment.layout_digest(),
        });
    }

    /// Disposable worker created
    pub fn worker_spawned(&self, worker_id: WorkerId, fragment_id: &FragmentId, lifetime: Duration) {
        self.emit(AttestationEvent::WorkerSpawned {
            worker_id,
            fragment_id: fragment_id.clone(),
            lifetime_ms: u64::try_from(lifetime.as_millis()).unwrap_or(u64::MAX),
        });
    }

    /// Issue a destruction proof and emit it
    ///
    /// The proof is returned even if the sink fails.
    pub fn worker_destroyed(
        &self,
        worker_id: WorkerId,
        fragment_id: &FragmentId,
        method: DestructionMethod,
        bytes_wiped: u64,
        residue_digest: ContentHash,
    ) -> DestructionProof {
        let proof = DestructionProof::issue(
            worker_id,
            self.run_id,
            fragment_id.clone(),
            method,
            bytes_wiped,
            residue_digest,
            self.signer.as_ref(),
        );
        self.emit(AttestationEvent::WorkerDestroyed {
            proof: proof.clone(),
        });
        proof
    }

    /// Run finished with feedback
    pub fn run_completed(&self, exposure_report: ExposureReport) {
        self.emit(AttestationEvent::RunCompleted { exposure_report });
    }

    /// Run ended without feedback
    pub fn run_aborted(&self, reason: impl Into<String>) {
        let proofs_obtained = self.log.proofs().len();
        self.emit(AttestationEvent::RunAborted {
            reason: reason.into(),
            proofs_obtained,
        });
    }

    fn emit(&self, event: AttestationEvent) {
        let name = event.name();
        let record = match self.log.append(self.run_id, event) {
            Ok(record) => record,
            Err(e) => {
                tracing::error!(run = %self.run_id, event = name, error = %e, "attestation append failed");
                return;
            }
        };
        tracing::trace!(run = %self.run_id, event = name, sequence = record.sequence, "attestation emitted");
        if let Err(e) = self.sink.accept(&record) {
            tracing::warn!(
                run = %self.run_id,
                event = name,
                sequence = record.sequence,
                error = %e,
                "event sink rejected attestation record"
            );
        }
    }
}

impl std::fmt::Debug for Attestor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Attestor")
            .field("run_id", &self.run_id)
            .field("records", &self.log.len())
            .field("signed", &self.signer.is_some())
            .finish_non_exhaustive()
    }
}
