//! Hash-chained attestation log and replay verification

use crate::error::AttestError;
use crate::event::{AttestationEvent, AttestationRecord};
use crate::proof::DestructionProof;
use chrono::Utc;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use sieve_model::{ContentHash, RunId};

/// Append-only, hash-chained record of one run's events
#[derive(Debug, Default)]
pub struct AttestationLog {
    inner: Mutex<Vec<AttestationRecord>>,
}

impl AttestationLog {
    /// Empty log
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Link `event` to the previous record and store it
    ///
    /// # Errors
    /// [`AttestError::Serialization`] if the event cannot be encoded
    pub fn append(
        &self,
        run_id: RunId,
        event: AttestationEvent,
    ) -> Result<AttestationRecord, AttestError> {
        let mut guard = self.inner.lock();
        let prev_hash = guard.last().map(|r| r.hash).unwrap_or_default();
        let mut record = AttestationRecord {
            sequence: guard.len() as u64,
            run_id,
            emitted_at: Utc::now(),
            event,
            prev_hash,
            hash: ContentHash::default(),
        };
        record.hash = compute_hash(&record)?;
        guard.push(record.clone());
        Ok(record)
    }

    /// Copy of every record
    #[must_use]
    pub fn records(&self) -> Vec<AttestationRecord> {
        self.inner.lock().clone()
    }

    /// Number of records
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    /// True before the first append
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    /// Every destruction proof recorded so far, in order
    #[must_use]
    pub fn proofs(&self) -> Vec<DestructionProof> {
        self.inner
            .lock()
            .iter()
            .filter_map(|r| match &r.event {
                AttestationEvent::WorkerDestroyed { proof } => Some(proof.clone()),
                _ => None,
            })
            .collect()
    }

    /// # Errors
    /// [`AttestError::IntegrityViolation`] at the first broken link
    pub fn verify_integrity(&self) -> Result<(), AttestError> {
        verify_chain(&self.inner.lock())
    }
}

/// Check sequence numbers, back-links and hashes of a record list
///
/// # Errors
/// [`AttestError::IntegrityViolation`] at the first broken link
pub fn verify_chain(records: &[AttestationRecord]) -> Result<(), AttestError> {
    let mut prev = ContentHash::default();
    for (i, record) in records.iter().enumerate() {
        if record.sequence != i as u64 || record.prev_hash != prev {
            return Err(AttestError::IntegrityViolation {
                sequence: record.sequence,
            });
        }
        if record.hash != compute_hash(record)? {
            return Err(AttestError::IntegrityViolation {
                sequence: record.sequence,
            });
        }
        prev = record.hash;
    }
    Ok(())
}

fn compute_hash(record: &AttestationRecord) -> Result<ContentHash, AttestError> {
    let payload = serde_json::to_vec(&record.event)?;
    let mut hasher = Sha256::new();
    hasher.update(record.sequence.to_le_bytes());
    hasher.update(record.run_id.to_bytes());
    hasher.update(record.emitted_at.timestamp_micros().to_le_bytes());
    hasher.update((payload.len() as u64).to_le_bytes());
    hasher.update(&payload);
    hasher.update(record.prev_hash.as_bytes());
    Ok(ContentHash::new(hasher.finalize().into()))
}
