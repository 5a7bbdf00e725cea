//! Run orchestration: decompose, analyze, score in isolation, aggregate

use crate::aggregator::{AnalyzerResult, Aggregator, FeedbackAggregate};
use crate::analyzers::{run_analyzer, AnalyzerInput};
use crate::config::PipelineConfig;
use crate::error::{ConfigError, FragmentError, PipelineError, PoolError};
use crate::fragmenter::{Decomposition, Fragmenter};
use crate::isolation::{InProcessIsolation, IsolationBackend};
use crate::scoring::ScoringFunction;
use crate::worker_pool::WorkerPool;
use futures::stream::{FuturesUnordered, StreamExt};
use rand::Rng;
use sieve_attest::{Attestor, EventSink, NullSink, ProofSigner};
use sieve_ledger::{ExposureLedger, ExposureReport};
use sieve_model::{Consumer, Criterion, Document, Fragment, Rubric, RunId};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Seed for dry runs when no shuffle seed is configured
const PLANNING_SEED: u64 = 0x5EED_0000_0000_0001;

/// Entry point for analysis runs
///
/// One pipeline serves many runs. Each run gets its own ledger, attestor,
/// worker pool and shuffle seed.
pub struct FeedbackPipeline {
    config: PipelineConfig,
    scorer: Arc<dyn ScoringFunction>,
    isolation: Arc<dyn IsolationBackend>,
    sink: Arc<dyn EventSink>,
    signer: Option<ProofSigner>,
}

impl FeedbackPipeline {
    /// Pipeline with in-process isolation and no event store
    ///
    /// # Errors
    /// [`ConfigError::Invalid`] if `config` fails validation
    pub fn new(config: PipelineConfig, scorer: Arc<dyn ScoringFunction>) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            scorer,
            isolation: Arc::new(InProcessIsolation::new()),
            sink: Arc::new(NullSink),
            signer: None,
        })
    }

    /// Use another isolation backend
    #[must_use]
    pub fn with_isolation(mut self, isolation: Arc<dyn IsolationBackend>) -> Self {
        self.isolation = isolation;
        self
    }

    /// Forward attestation records to `sink`
    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Sign destruction proofs
    #[must_use]
    pub fn with_signer(mut self, signer: ProofSigner) -> Self {
        self.signer = Some(signer);
        self
    }

    /// Configuration in force
    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Analyze a document against a rubric
    ///
    /// # Errors
    /// See [`FeedbackPipeline::analyze_with_cancellation`]
    pub async fn analyze(&self, document: &Document, rubric: &Rubric) -> Result<FeedbackAggregate, PipelineError> {
        self.analyze_with_cancellation(document, rubric, &CancellationToken::new())
            .await
    }

    /// Analyze with caller-driven cancellation
    ///
    /// Every spawned worker is destroyed before this returns, on every path.
    ///
    /// # Errors
    /// - [`PipelineError::Fragment`] when decomposition is rejected; no worker spawned
    /// - [`PipelineError::DestructionFailure`] when a worker cannot be confirmed destroyed
    /// - [`PipelineError::Cancelled`] when `cancel` fired during the run
    pub async fn analyze_with_cancellation(
        &self,
        document: &Document,
        rubric: &Rubric,
        cancel: &CancellationToken,
    ) -> Result<FeedbackAggregate, PipelineError> {
        let run_id = RunId::new();
        let seed = self.config.shuffle_seed.unwrap_or_else(|| rand::rng().random());
        let ledger = ExposureLedger::live(document.len(), self.config.exposure.global_ceiling)
            .map_err(FragmentError::from)?;
        let attestor = Arc::new(Attestor::new(run_id, Arc::clone(&self.sink), self.signer.clone()));

        tracing::info!(run = %run_id, document = %document.id(), criteria = rubric.len(), "analysis started");
        attestor.run_started(document.fingerprint(), rubric.len());

        let decomposition = match Fragmenter::new(&self.config.exposure).fragment(document, rubric, &ledger, seed) {
            Ok(decomposition) => decomposition,
            Err(e) => {
                tracing::warn!(run = %run_id, error = %e, "decomposition rejected");
                attestor.run_aborted(e.to_string());
                return Err(e.into());
            }
        };
        for fragment in &decomposition.issued {
            attestor.fragment_issued(fragment);
        }

        let mut aggregator = Aggregator::new(run_id);
        self.run_analyzers(document, &decomposition, &mut aggregator);
        let fatal = self
            .run_workers(document, rubric, &decomposition, &attestor, &mut aggregator, cancel)
            .await;

        if let Some(source) = fatal {
            attestor.run_aborted(source.to_string());
            return Err(PipelineError::DestructionFailure {
                source,
                proofs: attestor.proofs(),
            });
        }
        if cancel.is_cancelled() {
            tracing::info!(run = %run_id, "analysis cancelled");
            attestor.run_aborted("cancelled by caller");
            return Err(PipelineError::Cancelled {
                proofs: attestor.proofs(),
            });
        }

        aggregator.record_withheld(&decomposition.withheld);
        let report = ledger.report();
        attestor.run_completed(report.clone());
        let aggregate = aggregator.finish(rubric, report);
        tracing::info!(
            run = %run_id,
            overall = ?aggregate.overall_score,
            unavailable = aggregate.unavailable().len(),
            exposure = aggregate.exposure_report.total_unique_exposure,
            "analysis completed"
        );
        Ok(aggregate)
    }

    fn run_analyzers(&self, document: &Document, decomposition: &Decomposition, aggregator: &mut Aggregator) {
        for fragment in &decomposition.issued {
            let Consumer::Deterministic(kind) = fragment.consumer else {
                continue;
            };
            let input = AnalyzerInput::new(document, fragment);
            let report = run_analyzer(kind, &input, self.config.exposure.analyzer_echo);
            tracing::debug!(fragment = %fragment.id, analyzer = ?kind, "analyzer finished");
            aggregator.record_analysis(AnalyzerResult {
                criterion_id: fragment.criterion_id.clone(),
                fragment_id: fragment.id.clone(),
                report,
            });
        }
    }

    /// Submit every worker fragment and drain all submissions
    ///
    /// Returns the first destruction failure; it cancels the remaining work.
    async fn run_workers(
        &self,
        document: &Document,
        rubric: &Rubric,
        decomposition: &Decomposition,
        attestor: &Arc<Attestor>,
        aggregator: &mut Aggregator,
        cancel: &CancellationToken,
    ) -> Option<PoolError> {
        let scheduled: Vec<(&Fragment, &Criterion)> = decomposition
            .issued
            .iter()
            .filter(|f| f.consumer == Consumer::DisposableWorker)
            .filter_map(|f| rubric.get(&f.criterion_id).map(|c| (f, c)))
            .collect();
        if scheduled.is_empty() {
            return None;
        }

        let pool = WorkerPool::new(self.config.pool.clone(), Arc::clone(&self.isolation), Arc::clone(attestor));
        let run_cancel = cancel.child_token();
        let mut pending: FuturesUnordered<_> = scheduled
            .into_iter()
            .map(|(fragment, criterion)| {
                let scorer = Arc::clone(&self.scorer);
                let (pool, run_cancel) = (&pool, &run_cancel);
                async move { (fragment, pool.submit(document, fragment, criterion, scorer, run_cancel).await) }
            })
            .collect();

        let mut fatal = None;
        while let Some((fragment, result)) = pending.next().await {
            match result {
                Ok(report) => aggregator.record_worker(report),
                Err(PoolError::Isolation(e)) => {
                    tracing::warn!(fragment = %fragment.id, error = %e, "worker not confined");
                    aggregator.record_refusal(fragment.id.clone(), e.to_string());
                }
                Err(e) if e.is_destruction_failure() => {
                    run_cancel.cancel();
                    if fatal.is_none() {
                        fatal = Some(e);
                    }
                }
                Err(e) => tracing::debug!(fragment = %fragment.id, error = %e, "submission dropped"),
            }
        }
        tracing::debug!(stats = ?pool.stats(), "worker pool drained");
        fatal
    }

    /// Decompose and account without spawning any worker
    ///
    /// Uses the configured shuffle seed, or a fixed planning seed, so
    /// repeated calls report identically.
    ///
    /// # Errors
    /// [`PipelineError::Fragment`] when decomposition is rejected
    pub fn explain_decomposition(&self, document: &Document, rubric: &Rubric) -> Result<ExposureReport, PipelineError> {
        self.explain_decomposition_seeded(document, rubric, self.config.shuffle_seed.unwrap_or(PLANNING_SEED))
    }

    /// [`FeedbackPipeline::explain_decomposition`] with an explicit seed
    ///
    /// # Errors
    /// [`PipelineError::Fragment`] when decomposition is rejected
    pub fn explain_decomposition_seeded(
        &self,
        document: &Document,
        rubric: &Rubric,
        seed: u64,
    ) -> Result<ExposureReport, PipelineError> {
        let ledger = ExposureLedger::dry_run(document.len(), self.config.exposure.global_ceiling)
            .map_err(FragmentError::from)?;
        let decomposition = Fragmenter::new(&self.config.exposure).fragment(document, rubric, &ledger, seed)?;
        tracing::debug!(
            fragments = decomposition.issued.len(),
            withheld = decomposition.withheld.len(),
            "decomposition explained"
        );
        Ok(ledger.report())
    }
}

impl std::fmt::Debug for FeedbackPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeedbackPipeline")
            .field("config", &self.config)
            .field("isolation", &self.isolation)
            .field("signed", &self.signer.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::PartialResult;
    use crate::scoring::{CriterionSpec, FragmentView, Score, ScoringError};
    use sieve_attest::MemorySink;
    use sieve_ledger::LedgerMode;
    use sieve_model::{AnalyzerKind, Focus};
    use sieve_test_utils::{five_criterion_rubric, standard_essay};

    struct Fixed;

    #[async_trait::async_trait]
    impl ScoringFunction for Fixed {
        async fn score(&self, fragment: &FragmentView<'_>, _: &CriterionSpec) -> Result<Score, ScoringError> {
            Ok(Score::new(0.8).with_comment(format!("{} segments", fragment.len())))
        }
    }

    fn pipeline() -> FeedbackPipeline {
        FeedbackPipeline::new(PipelineConfig::default(), Arc::new(Fixed)).unwrap()
    }

    #[tokio::test]
    async fn analyze_scores_every_criterion() {
        let sink = Arc::new(MemorySink::new());
        let pipeline = pipeline().with_sink(sink.clone());
        let rubric = five_criterion_rubric();

        let aggregate = pipeline.analyze(&standard_essay(), &rubric).await.unwrap();

        assert_eq!(aggregate.criteria.len(), 5);
        assert!(aggregate.unavailable().is_empty());
        assert!((aggregate.overall_score.unwrap() - 0.8).abs() < 1e-12);
        assert_eq!(aggregate.proofs.len(), 5);
        assert!(aggregate.exposure_report.total_unique_exposure <= 1.0);

        assert_eq!(sink.count("run_started"), 1);
        assert_eq!(sink.count("fragment_issued"), 5);
        assert_eq!(sink.count("worker_spawned"), 5);
        assert_eq!(sink.count("worker_destroyed"), 5);
        assert_eq!(sink.count("run_completed"), 1);
    }

    #[tokio::test]
    async fn deterministic_criteria_never_reach_workers() {
        let rubric = Rubric::new(vec![
            Criterion::new("structure", Focus::Analysis, 0.25).analyzed_by(AnalyzerKind::Structure),
            Criterion::new("readability", Focus::Clarity, 0.1).analyzed_by(AnalyzerKind::Readability),
        ])
        .unwrap();

        let aggregate = pipeline().analyze(&standard_essay(), &rubric).await.unwrap();

        assert!(aggregate.proofs.is_empty());
        assert!(aggregate
            .criteria
            .iter()
            .all(|c| matches!(c.result, PartialResult::Analyzed { .. })));
        assert_eq!(aggregate.exposure_report.total_unique_exposure, 0.0);
    }

    #[test]
    fn explain_is_a_dry_run() {
        let pipeline = pipeline();
        let essay = standard_essay();
        let rubric = five_criterion_rubric();

        let first = pipeline.explain_decomposition(&essay, &rubric).unwrap();
        let second = pipeline.explain_decomposition(&essay, &rubric).unwrap();

        assert_eq!(first, second);
        assert_eq!(first.mode, LedgerMode::DryRun);
        assert_eq!(first.total_unique_exposure, 0.0);
        assert!(first.projected_unique_exposure > 0.0);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = PipelineConfig::default().with_global_ceiling(0.0);
        assert!(FeedbackPipeline::new(config, Arc::new(Fixed)).is_err());
    }
}
