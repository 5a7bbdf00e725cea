//! Isolation envelope for disposable workers
//!
//! The policy is fixed: no network, no shared filesystem writes, read access
//! to one fragment, no view of the ledger or of other workers. A backend
//! confines a worker before its content is loaded and tears the confinement
//! down during destruction. Sandboxing primitives belong to the backend; the
//! pool only invokes them.

use serde::{Deserialize, Serialize};
use sieve_model::WorkerId;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Capabilities granted to one worker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IsolationPolicy {
    /// Outbound network access
    pub network: bool,
    /// Writes to any shared filesystem
    pub shared_fs_write: bool,
    /// Fragments the worker may read
    pub readable_fragments: usize,
    /// Access to the exposure ledger
    pub ledger_access: bool,
    /// Knowledge of other workers' identities
    pub peer_visibility: bool,
    /// Hard lifetime bound
    pub lifetime: Duration,
}

impl IsolationPolicy {
    /// The only policy the pool issues
    #[must_use]
    pub fn strict(lifetime: Duration) -> Self {
        Self {
            network: false,
            shared_fs_write: false,
            readable_fragments: 1,
            ledger_access: false,
            peer_visibility: false,
            lifetime,
        }
    }

    /// Reject any granted capability beyond a single fragment read
    ///
    /// # Errors
    /// [`IsolationError::PolicyViolation`] naming the capability
    pub fn validate(&self) -> Result<(), IsolationError> {
        let violation = if self.network {
            Some("network access")
        } else if self.shared_fs_write {
            Some("shared filesystem write")
        } else if self.readable_fragments != 1 {
            Some("more than one readable fragment")
        } else if self.ledger_access {
            Some("ledger access")
        } else if self.peer_visibility {
            Some("peer visibility")
        } else if self.lifetime.is_zero() {
            Some("unbounded lifetime")
        } else {
            None
        };
        match violation {
            Some(capability) => Err(IsolationError::PolicyViolation(capability)),
            None => Ok(()),
        }
    }
}

/// Proof a worker was placed in its envelope
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Confinement {
    /// Worker
    pub worker_id: WorkerId,
    /// Backend that confined it
    pub backend: &'static str,
}

/// Isolation failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IsolationError {
    /// Policy grants a forbidden capability
    #[error("isolation policy grants {0}")]
    PolicyViolation(&'static str),

    /// Backend could not confine the worker
    #[error("confinement refused: {0}")]
    ConfinementRefused(String),

    /// Backend could not confirm teardown
    #[error("teardown failed: {0}")]
    TeardownFailed(String),
}

/// Sandboxing capability invoked by the pool
///
/// Synchronous so destruction can run from `Drop`.
pub trait IsolationBackend: Send + Sync + std::fmt::Debug {
    /// Place a worker under `policy` before it receives content
    ///
    /// # Errors
    /// Any [`IsolationError`]; the worker then never receives content
    fn confine(&self, worker_id: WorkerId, policy: &IsolationPolicy) -> Result<Confinement, IsolationError>;

    /// Remove the worker's envelope; repeated calls must succeed
    ///
    /// # Errors
    /// [`IsolationError::TeardownFailed`] when destruction cannot be confirmed
    fn teardown(&self, confinement: &Confinement) -> Result<(), IsolationError>;
}

/// In-process backend: tokio tasks with capability-free scorer inputs
#[derive(Debug, Default)]
pub struct InProcessIsolation {
    confined: AtomicUsize,
    torn_down: AtomicUsize,
}

impl InProcessIsolation {
    /// New backend
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Workers confined and not yet torn down
    #[must_use]
    pub fn live(&self) -> usize {
        self.confined
            .load(Ordering::SeqCst)
            .saturating_sub(self.torn_down.load(Ordering::SeqCst))
    }
}

impl IsolationBackend for InProcessIsolation {
    fn confine(&self, worker_id: WorkerId, policy: &IsolationPolicy) -> Result<Confinement, IsolationError> {
        policy.validate()?;
        self.confined.fetch_add(1, Ordering::SeqCst);
        Ok(Confinement {
            worker_id,
            backend: "in-process",
        })
    }

    fn teardown(&self, _confinement: &Confinement) -> Result<(), IsolationError> {
        self.torn_down.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strict_policy_validates() {
        assert!(IsolationPolicy::strict(Duration::from_secs(60)).validate().is_ok());
    }

    #[test]
    fn any_extra_capability_is_rejected() {
        let base = IsolationPolicy::strict(Duration::from_secs(1));
        let cases = [
            IsolationPolicy { network: true, ..base.clone() },
            IsolationPolicy { shared_fs_write: true, ..base.clone() },
            IsolationPolicy { readable_fragments: 2, ..base.clone() },
            IsolationPolicy { ledger_access: true, ..base.clone() },
            IsolationPolicy { peer_visibility: true, ..base.clone() },
            IsolationPolicy { lifetime: Duration::ZERO, ..base },
        ];
        for policy in cases {
            assert!(matches!(policy.validate(), Err(IsolationError::PolicyViolation(_))));
        }
    }

    #[test]
    fn in_process_backend_tracks_live_workers() {
        let backend = InProcessIsolation::new();
        let policy = IsolationPolicy::strict(Duration::from_secs(1));
        let confinement = backend.confine(WorkerId::new(), &policy).unwrap();
        assert_eq!(backend.live(), 1);
        backend.teardown(&confinement).unwrap();
        assert_eq!(backend.live(), 0);
    }

    #[test]
    fn in_process_backend_refuses_loose_policy() {
        let backend = InProcessIsolation::new();
        let policy = IsolationPolicy {
            network: true,
            ..IsolationPolicy::strict(Duration::from_secs(1))
        };
        assert!(backend.confine(WorkerId::new(), &policy).is_err());
        assert_eq!(backend.live(), 0);
    }
}
