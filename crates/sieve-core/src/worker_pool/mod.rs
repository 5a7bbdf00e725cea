//! Disposable worker pool
//!
//! Each worker is spawned for exactly one fragment, confined before it
//! receives content, bounded by a hard lifetime and destroyed after it
//! returns, times out, fails, panics or is cancelled. A semaphore caps the
//! number of live workers; excess submissions queue on it.

mod arena;
mod lease;

use crate::config::PoolConfig;
use crate::error::PoolError;
use crate::isolation::IsolationBackend;
use crate::scoring::{CriterionSpec, FragmentView, Score, ScoringFunction};
use arena::ContentArena;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures::FutureExt;
use lease::WorkerLease;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sieve_attest::{Attestor, DestructionMethod, DestructionProof};
use sieve_model::{Criterion, CriterionId, Document, Fragment, FragmentId, WorkerId};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Lifecycle of a registered worker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerState {
    /// Confined, no content yet
    Spawned,
    /// Holding its fragment
    Scoring,
    /// Wiped and torn down
    Destroyed,
}

/// Why a worker produced no score
#[derive(Debug, Clone, PartialEq, thiserror::Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WorkerFault {
    /// Lifetime elapsed before the scorer returned
    #[error("worker timed out after {after_ms} ms")]
    Timeout {
        /// Configured lifetime
        after_ms: u64,
    },

    /// Scorer returned an error
    #[error("scorer failed: {message}")]
    Failed {
        /// Scorer's message
        message: String,
    },

    /// Scorer returned a value outside `[0, 1]`
    #[error("scorer returned invalid score {value}")]
    InvalidScore {
        /// Returned value
        value: f64,
    },

    /// Scorer panicked
    #[error("scorer panicked")]
    Panicked,

    /// Run cancelled while the worker was scoring
    #[error("worker cancelled")]
    Cancelled,

    /// Fragment content could not be loaded
    #[error("fragment content unavailable")]
    MissingContent,
}

impl WorkerFault {
    /// Destruction method for a worker that ended this way
    #[must_use]
    pub fn destruction_method(&self) -> DestructionMethod {
        match self {
            WorkerFault::Timeout { .. } | WorkerFault::Cancelled | WorkerFault::Panicked => {
                DestructionMethod::ProcessTerminated
            }
            WorkerFault::Failed { .. } | WorkerFault::InvalidScore { .. } | WorkerFault::MissingContent => {
                DestructionMethod::StorageWiped
            }
        }
    }
}

/// Everything the pool reports about one worker
#[derive(Debug, Clone)]
pub struct WorkerReport {
    /// Worker that held the fragment
    pub worker_id: WorkerId,
    /// Fragment it held
    pub fragment_id: FragmentId,
    /// Criterion the fragment serves
    pub criterion_id: CriterionId,
    /// Score or the reason there is none
    pub outcome: Result<Score, WorkerFault>,
    /// Proof the worker was destroyed
    pub proof: DestructionProof,
    /// Spawn time
    pub spawned_at: DateTime<Utc>,
    /// Spawn to destruction
    pub elapsed: Duration,
}

/// Pool counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolStats {
    /// Workers spawned
    pub spawned: u64,
    /// Workers confirmed destroyed
    pub destroyed: u64,
    /// Workers that returned a valid score
    pub completed: u64,
    /// Workers stopped at their lifetime bound
    pub timed_out: u64,
    /// Workers whose scorer failed, panicked or returned garbage
    pub failed: u64,
    /// Workers stopped by cancellation
    pub cancelled: u64,
    /// Workers currently alive
    pub live: u64,
    /// Highest `live` observed
    pub peak_live: u64,
}

pub(crate) struct PoolShared {
    isolation: Arc<dyn IsolationBackend>,
    arena: ContentArena,
    attestor: Arc<Attestor>,
    registry: DashMap<WorkerId, WorkerState>,
    stats: Mutex<PoolStats>,
}

/// Bounded pool of single-use scoring workers
pub struct WorkerPool {
    config: PoolConfig,
    permits: Arc<Semaphore>,
    last_spawn: tokio::sync::Mutex<Option<Instant>>,
    shared: Arc<PoolShared>,
}

impl WorkerPool {
    /// Create a pool; workers attest through `attestor`
    #[must_use]
    pub fn new(config: PoolConfig, isolation: Arc<dyn IsolationBackend>, attestor: Arc<Attestor>) -> Self {
        let cap = config.max_concurrent_workers.max(1);
        Self {
            permits: Arc::new(Semaphore::new(cap)),
            last_spawn: tokio::sync::Mutex::new(None),
            shared: Arc::new(PoolShared {
                isolation,
                arena: ContentArena::new(cap),
                attestor,
                registry: DashMap::new(),
                stats: Mutex::new(PoolStats::default()),
            }),
            config,
        }
    }

    /// Run one fragment through a fresh worker
    ///
    /// Waits for a free slot, spawns and confines a worker, loads the
    /// fragment, scores it under the lifetime bound and destroys the worker.
    /// A scorer fault is returned inside the report; only pool-level
    /// problems are errors.
    ///
    /// # Errors
    /// - [`PoolError::Cancelled`] if `cancel` fires before a worker spawned
    /// - [`PoolError::Closed`] after [`WorkerPool::close`]
    /// - [`PoolError::Isolation`] if the backend refuses confinement
    /// - [`PoolError::DestructionFailure`] if the worker cannot be confirmed destroyed
    pub async fn submit(
        &self,
        document: &Document,
        fragment: &Fragment,
        criterion: &Criterion,
        scorer: Arc<dyn ScoringFunction>,
        cancel: &CancellationToken,
    ) -> Result<WorkerReport, PoolError> {
        let permit = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(PoolError::Cancelled),
            permit = Arc::clone(&self.permits).acquire_owned() => permit.map_err(|_| PoolError::Closed)?,
        };
        self.wait_spawn_spacing(cancel).await?;

        let lifetime = self.config.worker_lifetime();
        let spawned_at = Utc::now();
        let started = Instant::now();
        let mut lease = WorkerLease::spawn(Arc::clone(&self.shared), permit, fragment.id.clone(), lifetime)?;

        let outcome = if lease.load(document, fragment).is_err() {
            Err(WorkerFault::MissingContent)
        } else {
            let spec = CriterionSpec::from(criterion);
            Self::score(&lease, scorer.as_ref(), &spec, started + lifetime, lifetime, cancel).await
        };

        let method = match &outcome {
            Ok(_) => DestructionMethod::StorageWiped,
            Err(fault) => fault.destruction_method(),
        };
        let proof = lease.destroy(method)?;
        self.record(&outcome);
        if let Err(fault) = &outcome {
            tracing::info!(worker = %lease.worker_id(), fragment = %fragment.id, %fault, "worker ended without score");
        }

        Ok(WorkerReport {
            worker_id: lease.worker_id(),
            fragment_id: fragment.id.clone(),
            criterion_id: fragment.criterion_id.clone(),
            outcome,
            proof,
            spawned_at,
            elapsed: started.elapsed(),
        })
    }

    async fn score(
        lease: &WorkerLease,
        scorer: &dyn ScoringFunction,
        spec: &CriterionSpec,
        deadline: Instant,
        lifetime: Duration,
        cancel: &CancellationToken,
    ) -> Result<Score, WorkerFault> {
        let Some(segments) = lease.segments() else {
            return Err(WorkerFault::MissingContent);
        };
        let view = FragmentView::new(&segments);
        let scoring = AssertUnwindSafe(scorer.score(&view, spec)).catch_unwind();

        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(WorkerFault::Cancelled),
            result = tokio::time::timeout_at(deadline, scoring) => match result {
                Err(_elapsed) => Err(WorkerFault::Timeout {
                    after_ms: u64::try_from(lifetime.as_millis()).unwrap_or(u64::MAX),
                }),
                Ok(Err(_panic)) => Err(WorkerFault::Panicked),
                Ok(Ok(Err(e))) => Err(WorkerFault::Failed { message: e.to_string() }),
                Ok(Ok(Ok(score))) if !score.is_valid() => Err(WorkerFault::InvalidScore { value: score.value }),
                Ok(Ok(Ok(score))) => Ok(score),
            },
        }
    }

    async fn wait_spawn_spacing(&self, cancel: &CancellationToken) -> Result<(), PoolError> {
        let Some(spacing) = self.config.spawn_spacing() else {
            return Ok(());
        };
        let mut last = self.last_spawn.lock().await;
        if let Some(previous) = *last {
            tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(PoolError::Cancelled),
                () = tokio::time::sleep_until(previous + spacing) => {}
            }
        }
        *last = Some(Instant::now());
        Ok(())
    }

    fn record(&self, outcome: &Result<Score, WorkerFault>) {
        let mut stats = self.shared.stats.lock();
        match outcome {
            Ok(_) => stats.completed += 1,
            Err(WorkerFault::Timeout { .. }) => stats.timed_out += 1,
            Err(WorkerFault::Cancelled) => stats.cancelled += 1,
            Err(_) => stats.failed += 1,
        }
    }

    /// Snapshot of the counters
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        self.shared.stats.lock().clone()
    }

    /// Workers registered and not confirmed destroyed
    #[must_use]
    pub fn live_workers(&self) -> Vec<(WorkerId, WorkerState)> {
        self.shared
            .registry
            .iter()
            .map(|entry| (*entry.key(), *entry.value()))
            .collect()
    }

    /// Stop accepting submissions; queued ones fail with [`PoolError::Closed`]
    pub fn close(&self) {
        self.permits.close();
    }

    /// Configured limits
    #[must_use]
    pub fn config(&self) -> &PoolConfig {
        &self.config
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("config", &self.config)
            .field("available_permits", &self.permits.available_permits())
            .field("live", &self.shared.registry.len())
            .finish_non_exhaustive()
    }
}
