//! One disposable worker from spawn to destruction
//!
//! A lease owns the worker's confinement, its content slot and its pool
//! permit. Dropping a lease that was never destroyed destroys it, so a
//! cancelled or aborted submission still yields a proof.

use super::arena::{ContentSlot, Wipe};
use super::{PoolShared, WorkerState};
use crate::error::PoolError;
use crate::isolation::{Confinement, IsolationPolicy};
use sieve_attest::{DestructionMethod, DestructionProof};
use sieve_model::{Document, Fragment, FragmentId, Span, WorkerId};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OwnedSemaphorePermit;

pub(crate) struct WorkerLease {
    worker_id: WorkerId,
    fragment_id: FragmentId,
    confinement: Confinement,
    slot: Option<ContentSlot>,
    wipe: Option<Wipe>,
    shared: Arc<PoolShared>,
    proof: Option<DestructionProof>,
    destroy_attempted: bool,
    _permit: OwnedSemaphorePermit,
}

impl WorkerLease {
    /// Confine a fresh worker; it holds no content yet
    pub(crate) fn spawn(
        shared: Arc<PoolShared>,
        permit: OwnedSemaphorePermit,
        fragment_id: FragmentId,
        lifetime: Duration,
    ) -> Result<Self, PoolError> {
        let worker_id = WorkerId::new();
        let confinement = shared
            .isolation
            .confine(worker_id, &IsolationPolicy::strict(lifetime))?;
        let slot = shared.arena.checkout();

        shared.registry.insert(worker_id, WorkerState::Spawned);
        shared.attestor.worker_spawned(worker_id, &fragment_id, lifetime);
        {
            let mut stats = shared.stats.lock();
            stats.spawned += 1;
            stats.live += 1;
            stats.peak_live = stats.peak_live.max(stats.live);
        }
        tracing::debug!(worker = %worker_id, fragment = %fragment_id, backend = confinement.backend, "worker spawned");

        Ok(Self {
            worker_id,
            fragment_id,
            confinement,
            slot: Some(slot),
            wipe: None,
            shared,
            proof: None,
            destroy_attempted: false,
            _permit: permit,
        })
    }

    pub(crate) fn worker_id(&self) -> WorkerId {
        self.worker_id
    }

    /// Copy the fragment into the worker's slot
    pub(crate) fn load(&mut self, document: &Document, fragment: &Fragment) -> Result<(), Span> {
        let Some(slot) = self.slot.as_mut() else {
            return Ok(());
        };
        slot.load(document, fragment)?;
        self.shared.registry.insert(self.worker_id, WorkerState::Scoring);
        Ok(())
    }

    /// Loaded segment texts; `None` if the slot is gone or not UTF-8
    pub(crate) fn segments(&self) -> Option<Vec<&str>> {
        self.slot.as_ref().and_then(|slot| slot.segments().ok())
    }

    /// Wipe, tear down and attest; repeated calls return the same proof
    pub(crate) fn destroy(&mut self, method: DestructionMethod) -> Result<DestructionProof, PoolError> {
        if let Some(proof) = &self.proof {
            return Ok(proof.clone());
        }
        self.destroy_attempted = true;

        if let Some(slot) = self.slot.take() {
            self.wipe = Some(self.shared.arena.release(slot));
        }
        let wipe = self.wipe.unwrap_or_default();
        if !wipe.is_zeroed() {
            return Err(self.failure("content slot residue is not zero"));
        }
        if let Err(e) = self.shared.isolation.teardown(&self.confinement) {
            return Err(self.failure(e.to_string()));
        }

        let proof = self.shared.attestor.worker_destroyed(
            self.worker_id,
            &self.fragment_id,
            method,
            wipe.bytes_wiped,
            wipe.residue_digest,
        );
        self.shared.registry.remove(&self.worker_id);
        {
            let mut stats = self.shared.stats.lock();
            stats.destroyed += 1;
            stats.live = stats.live.saturating_sub(1);
        }
        tracing::debug!(worker = %self.worker_id, ?method, bytes = wipe.bytes_wiped, "worker destroyed");
        self.proof = Some(proof.clone());
        Ok(proof)
    }

    fn failure(&self, reason: impl Into<String>) -> PoolError {
        let reason = reason.into();
        tracing::error!(worker = %self.worker_id, fragment = %self.fragment_id, %reason, "worker destruction not confirmed");
        PoolError::DestructionFailure {
            worker_id: self.worker_id,
            fragment_id: self.fragment_id.clone(),
            reason,
        }
    }
}

impl Drop for WorkerLease {
    fn drop(&mut self) {
        if self.destroy_attempted {
            return;
        }
        tracing::warn!(worker = %self.worker_id, fragment = %self.fragment_id, "worker abandoned; terminating");
        // Failure is already logged and the registry entry stays behind
        let _ = self.destroy(DestructionMethod::ProcessTerminated);
    }
}

impl std::fmt::Debug for WorkerLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerLease")
            .field("worker_id", &self.worker_id)
            .field("fragment_id", &self.fragment_id)
            .field("destroyed", &self.proof.is_some())
            .finish_non_exhaustive()
    }
}
