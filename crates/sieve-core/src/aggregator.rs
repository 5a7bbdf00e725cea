//! Merge partial results into one feedback object
//!
//! Results arrive in completion order; the aggregate lists criteria in rubric
//! order. A criterion that produced nothing usable is `Unavailable` with a
//! reason and never fails the run. The exposure report is copied verbatim.

use crate::analyzers::AnalyzerReport;
use crate::fragmenter::{Withheld, WithheldReason};
use crate::worker_pool::{WorkerFault, WorkerReport};
use serde::{Deserialize, Serialize};
use sieve_attest::DestructionProof;
use sieve_ledger::ExposureReport;
use sieve_model::{Consumer, CriterionId, Focus, FragmentId, Rubric, RunId};
use std::collections::HashMap;

/// Output of one deterministic analyzer over one fragment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyzerResult {
    /// Criterion served
    pub criterion_id: CriterionId,
    /// Fragment analyzed
    pub fragment_id: FragmentId,
    /// Analyzer output
    pub report: AnalyzerReport,
}

/// Why a criterion has no result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "source", content = "detail", rename_all = "snake_case")]
pub enum UnavailableReason {
    /// Decomposition did not issue the criterion's fragments
    Withheld(WithheldReason),
    /// Every worker for the criterion ended without a score
    Worker(WorkerFault),
    /// The isolation backend refused to confine a worker
    IsolationRefused {
        /// Backend's message
        message: String,
    },
}

impl std::fmt::Display for UnavailableReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UnavailableReason::Withheld(WithheldReason::ExposureCeiling { attempted, ceiling }) => {
                write!(f, "withheld: exposure {attempted:.4} would exceed ceiling {ceiling:.4}")
            }
            UnavailableReason::Withheld(WithheldReason::EmptySelection) => {
                write!(f, "withheld: nothing in the document matches the focus")
            }
            UnavailableReason::Worker(fault) => write!(f, "{fault}"),
            UnavailableReason::IsolationRefused { message } => write!(f, "isolation refused: {message}"),
        }
    }
}

/// Result for one criterion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PartialResult {
    /// Scored by disposable workers
    Scored {
        /// Mean over the passes that returned a score
        score: f64,
        /// Worker comments, in pass order
        comments: Vec<String>,
        /// Passes that returned a score
        passes_scored: u16,
        /// Passes issued that ended without a score
        passes_failed: u16,
        /// Passes the ledger refused to issue
        passes_withheld: u16,
    },
    /// Produced by a deterministic analyzer
    Analyzed {
        /// One report per pass
        reports: Vec<AnalyzerReport>,
        /// Mean of the reports' scores, if any grade
        score: Option<f64>,
    },
    /// No result
    Unavailable {
        /// Cause
        reason: UnavailableReason,
    },
}

impl PartialResult {
    /// Numeric score, when there is one
    #[must_use]
    pub fn score(&self) -> Option<f64> {
        match self {
            PartialResult::Scored { score, .. } => Some(*score),
            PartialResult::Analyzed { score, .. } => *score,
            PartialResult::Unavailable { .. } => None,
        }
    }

    /// Check if the criterion has no result
    #[inline]
    #[must_use]
    pub fn is_unavailable(&self) -> bool {
        matches!(self, PartialResult::Unavailable { .. })
    }
}

/// One rubric entry in the aggregate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriterionFeedback {
    /// Criterion
    pub criterion_id: CriterionId,
    /// Its focus
    pub focus: Focus,
    /// Weight in the overall score
    pub weight: f64,
    /// Outcome
    pub result: PartialResult,
}

/// Final feedback object of a run; immutable once built
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackAggregate {
    /// Run
    pub run_id: RunId,
    /// Criteria in rubric order
    pub criteria: Vec<CriterionFeedback>,
    /// Weighted mean over criteria with a score
    pub overall_score: Option<f64>,
    /// Ledger report, unmodified
    pub exposure_report: ExposureReport,
    /// One proof per worker, in fragment order
    pub proofs: Vec<DestructionProof>,
}

impl FeedbackAggregate {
    /// Feedback for one criterion
    #[must_use]
    pub fn get(&self, id: &CriterionId) -> Option<&CriterionFeedback> {
        self.criteria.iter().find(|c| &c.criterion_id == id)
    }

    /// Criteria without a result, with reasons
    #[must_use]
    pub fn unavailable(&self) -> Vec<(&CriterionId, &UnavailableReason)> {
        self.criteria
            .iter()
            .filter_map(|c| match &c.result {
                PartialResult::Unavailable { reason } => Some((&c.criterion_id, reason)),
                _ => None,
            })
            .collect()
    }
}

/// Collects partial results for one run
#[derive(Debug)]
pub struct Aggregator {
    run_id: RunId,
    analyzed: Vec<AnalyzerResult>,
    workers: Vec<WorkerReport>,
    refused: Vec<(FragmentId, String)>,
    withheld: Vec<Withheld>,
}

impl Aggregator {
    /// Empty aggregator
    #[must_use]
    pub fn new(run_id: RunId) -> Self {
        Self {
            run_id,
            analyzed: Vec::new(),
            workers: Vec::new(),
            refused: Vec::new(),
            withheld: Vec::new(),
        }
    }

    /// Record a deterministic analyzer result
    pub fn record_analysis(&mut self, result: AnalyzerResult) {
        self.analyzed.push(result);
    }

    /// Record a destroyed worker's report
    pub fn record_worker(&mut self, report: WorkerReport) {
        self.workers.push(report);
    }

    /// Record a fragment whose worker could not be confined
    pub fn record_refusal(&mut self, fragment_id: FragmentId, message: impl Into<String>) {
        self.refused.push((fragment_id, message.into()));
    }

    /// Record criteria the decomposition withheld
    pub fn record_withheld(&mut self, withheld: &[Withheld]) {
        self.withheld.extend_from_slice(withheld);
    }

    /// One-shot form of the `record_*` calls followed by [`Aggregator::finish`]
    #[must_use]
    pub fn aggregate(
        run_id: RunId,
        rubric: &Rubric,
        deterministic: Vec<AnalyzerResult>,
        workers: Vec<WorkerReport>,
        withheld: &[Withheld],
        exposure_report: ExposureReport,
    ) -> FeedbackAggregate {
        let mut aggregator = Self::new(run_id);
        deterministic.into_iter().for_each(|r| aggregator.record_analysis(r));
        workers.into_iter().for_each(|r| aggregator.record_worker(r));
        aggregator.record_withheld(withheld);
        aggregator.finish(rubric, exposure_report)
    }

    /// Build the aggregate in rubric order
    #[must_use]
    pub fn finish(mut self, rubric: &Rubric, exposure_report: ExposureReport) -> FeedbackAggregate {
        self.workers.sort_by_key(|r| r.fragment_id.pass);
        self.analyzed.sort_by_key(|r| r.fragment_id.pass);

        let mut workers: HashMap<&CriterionId, Vec<&WorkerReport>> = HashMap::new();
        for report in &self.workers {
            workers.entry(&report.criterion_id).or_default().push(report);
        }
        let mut analyzed: HashMap<&CriterionId, Vec<&AnalyzerResult>> = HashMap::new();
        for result in &self.analyzed {
            analyzed.entry(&result.criterion_id).or_default().push(result);
        }

        let criteria: Vec<CriterionFeedback> = rubric
            .criteria
            .iter()
            .map(|criterion| {
                let withheld = self.withheld.iter().find(|w| w.criterion_id == criterion.id);
                let result = match criterion.consumer {
                    Consumer::Deterministic(_) => {
                        analyzer_result(analyzed.remove(&criterion.id).unwrap_or_default(), withheld)
                    }
                    Consumer::DisposableWorker => {
                        let refusal = self.refused.iter().find(|(id, _)| id.criterion == criterion.id);
                        worker_result(
                            workers.remove(&criterion.id).unwrap_or_default(),
                            withheld,
                            refusal.map(|(_, message)| message.as_str()),
                        )
                    }
                };
                CriterionFeedback {
                    criterion_id: criterion.id.clone(),
                    focus: criterion.focus,
                    weight: criterion.weight,
                    result,
                }
            })
            .collect();

        let overall_score = weighted_mean(&criteria);
        let mut proofs: Vec<DestructionProof> = self.workers.iter().map(|r| r.proof.clone()).collect();
        proofs.sort_by(|a, b| {
            let ordinal = |p: &DestructionProof| rubric.ordinal(&p.fragment_id.criterion);
            ordinal(a)
                .cmp(&ordinal(b))
                .then(a.fragment_id.pass.cmp(&b.fragment_id.pass))
        });

        tracing::debug!(
            run = %self.run_id,
            criteria = criteria.len(),
            unavailable = criteria.iter().filter(|c| c.result.is_unavailable()).count(),
            "aggregate built"
        );

        FeedbackAggregate {
            run_id: self.run_id,
            criteria,
            overall_score,
            exposure_report,
            proofs,
        }
    }
}

fn analyzer_result(results: Vec<&AnalyzerResult>, withheld: Option<&Withheld>) -> PartialResult {
    if results.is_empty() {
        return unavailable_withheld(withheld);
    }
    let reports: Vec<AnalyzerReport> = results.into_iter().map(|r| r.report.clone()).collect();
    let score = mean(reports.iter().filter_map(AnalyzerReport::score));
    PartialResult::Analyzed { reports, score }
}

fn worker_result(
    reports: Vec<&WorkerReport>,
    withheld: Option<&Withheld>,
    refusal: Option<&str>,
) -> PartialResult {
    let scores: Vec<&crate::scoring::Score> = reports.iter().filter_map(|r| r.outcome.as_ref().ok()).collect();

    if scores.is_empty() {
        if let Some(message) = refusal {
            return PartialResult::Unavailable {
                reason: UnavailableReason::IsolationRefused {
                    message: message.to_string(),
                },
            };
        }
        return match reports.iter().find_map(|r| r.outcome.as_ref().err()) {
            Some(fault) => PartialResult::Unavailable {
                reason: UnavailableReason::Worker(fault.clone()),
            },
            None => unavailable_withheld(withheld),
        };
    }

    let passes_scored = u16::try_from(scores.len()).unwrap_or(u16::MAX);
    let passes_issued = u16::try_from(reports.len()).unwrap_or(u16::MAX);
    PartialResult::Scored {
        score: mean(scores.iter().map(|s| s.value)).unwrap_or_default(),
        comments: scores.iter().filter_map(|s| s.comment.clone()).collect(),
        passes_scored,
        passes_failed: passes_issued - passes_scored,
        passes_withheld: withheld.map_or(0, |w| w.unissued),
    }
}

fn unavailable_withheld(withheld: Option<&Withheld>) -> PartialResult {
    PartialResult::Unavailable {
        reason: UnavailableReason::Withheld(
            withheld.map_or(WithheldReason::EmptySelection, |w| w.reason.clone()),
        ),
    }
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, count) = values.fold((0.0, 0u32), |(sum, count), v| (sum + v, count + 1));
    (count > 0).then(|| sum / f64::from(count))
}

fn weighted_mean(criteria: &[CriterionFeedback]) -> Option<f64> {
    let (sum, weights) = criteria
        .iter()
        .filter_map(|c| c.result.score().map(|s| (s, c.weight)))
        .fold((0.0, 0.0), |(sum, weights), (score, weight)| (sum + score * weight, weights + weight));
    (weights > 0.0).then(|| sum / weights)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzers::{check_structure, AnalyzerInput, KeywordAnalysis};
    use crate::scoring::Score;
    use pretty_assertions::assert_eq;
    use sieve_attest::{DestructionMethod, DestructionProof};
    use sieve_ledger::ExposureLedger;
    use sieve_model::{AnalyzerKind, ContentHash, Criterion, WorkerId};
    use std::time::Duration;

    fn rubric() -> Rubric {
        Rubric::new(vec![
            Criterion::new("intro", Focus::Introduction, 0.2).with_weight(2.0),
            Criterion::new("clarity", Focus::Clarity, 0.2).with_passes(2),
            Criterion::new("structure", Focus::Analysis, 0.2).analyzed_by(AnalyzerKind::Structure),
            Criterion::new("conclusion", Focus::Conclusion, 0.2),
        ])
        .unwrap()
    }

    fn report(run_id: RunId, criterion: &str, pass: u16, outcome: Result<Score, WorkerFault>) -> WorkerReport {
        let fragment_id = FragmentId::new(CriterionId::new(criterion), pass);
        let worker_id = WorkerId::new();
        WorkerReport {
            worker_id,
            fragment_id: fragment_id.clone(),
            criterion_id: CriterionId::new(criterion),
            outcome,
            proof: DestructionProof::issue(
                worker_id,
                run_id,
                fragment_id,
                DestructionMethod::StorageWiped,
                0,
                ContentHash::compute(&[]),
                None,
            ),
            spawned_at: chrono::Utc::now(),
            elapsed: Duration::from_millis(1),
        }
    }

    fn exposure() -> ExposureReport {
        ExposureLedger::live(100, 1.0).unwrap().report()
    }

    #[test]
    fn output_follows_rubric_order_regardless_of_arrival() {
        let run_id = RunId::new();
        let rubric = rubric();
        let workers = vec![
            report(run_id, "conclusion", 0, Ok(Score::new(0.4))),
            report(run_id, "clarity", 1, Ok(Score::new(0.6).with_comment("second"))),
            report(run_id, "intro", 0, Ok(Score::new(1.0))),
            report(run_id, "clarity", 0, Ok(Score::new(0.8).with_comment("first"))),
        ];
        let analysis = AnalyzerResult {
            criterion_id: CriterionId::new("structure"),
            fragment_id: FragmentId::new(CriterionId::new("structure"), 0),
            report: AnalyzerReport::Keywords(KeywordAnalysis {
                total_words: 0,
                distinct_words: 0,
                lexical_diversity: 0.0,
                top_terms: Vec::new(),
            }),
        };

        let aggregate = Aggregator::aggregate(run_id, &rubric, vec![analysis], workers, &[], exposure());

        let order: Vec<&str> = aggregate.criteria.iter().map(|c| c.criterion_id.as_str()).collect();
        assert_eq!(order, vec!["intro", "clarity", "structure", "conclusion"]);

        match &aggregate.get(&CriterionId::new("clarity")).unwrap().result {
            PartialResult::Scored { score, comments, passes_scored, .. } => {
                assert!((score - 0.7).abs() < 1e-12);
                assert_eq!(comments, &vec!["first".to_string(), "second".to_string()]);
                assert_eq!(*passes_scored, 2);
            }
            other => panic!("unexpected {other:?}"),
        }

        // keywords carry no score, so structure is excluded from the mean
        let expected = (1.0 * 2.0 + 0.7 + 0.4) / 4.0;
        assert!((aggregate.overall_score.unwrap() - expected).abs() < 1e-12);

        let proof_order: Vec<String> = aggregate.proofs.iter().map(|p| p.fragment_id.to_string()).collect();
        assert_eq!(proof_order, vec!["intro#0", "clarity#0", "clarity#1", "conclusion#0"]);
    }

    #[test]
    fn failed_worker_marks_only_its_criterion_unavailable() {
        let run_id = RunId::new();
        let workers = vec![
            report(run_id, "intro", 0, Err(WorkerFault::Timeout { after_ms: 10 })),
            report(run_id, "clarity", 0, Ok(Score::new(0.5))),
            report(run_id, "clarity", 1, Err(WorkerFault::Panicked)),
            report(run_id, "conclusion", 0, Ok(Score::new(0.9))),
        ];
        let structure = AnalyzerResult {
            criterion_id: CriterionId::new("structure"),
            fragment_id: FragmentId::new(CriterionId::new("structure"), 0),
            report: AnalyzerReport::Structure(check_structure(&AnalyzerInput::from_segments(vec!["A short but complete sentence."]))),
        };

        let aggregate = Aggregator::aggregate(run_id, &rubric(), vec![structure], workers, &[], exposure());

        let unavailable = aggregate.unavailable();
        assert_eq!(unavailable.len(), 1);
        assert_eq!(unavailable[0].0.as_str(), "intro");
        assert_eq!(unavailable[0].1, &UnavailableReason::Worker(WorkerFault::Timeout { after_ms: 10 }));

        match &aggregate.get(&CriterionId::new("clarity")).unwrap().result {
            PartialResult::Scored { passes_scored, passes_failed, .. } => {
                assert_eq!((*passes_scored, *passes_failed), (1, 1));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(aggregate.proofs.len(), 4);
    }

    #[test]
    fn withheld_and_refused_criteria_carry_reasons() {
        let run_id = RunId::new();
        let rubric = rubric();
        let withheld = vec![
            Withheld {
                criterion_id: CriterionId::new("clarity"),
                ordinal: 1,
                pass: 1,
                unissued: 1,
                reason: WithheldReason::ExposureCeiling { attempted: 1.05, ceiling: 1.0 },
            },
            Withheld {
                criterion_id: CriterionId::new("conclusion"),
                ordinal: 3,
                pass: 0,
                unissued: 1,
                reason: WithheldReason::ExposureCeiling { attempted: 1.1, ceiling: 1.0 },
            },
        ];
        let mut aggregator = Aggregator::new(run_id);
        aggregator.record_withheld(&withheld);
        aggregator.record_refusal(FragmentId::new(CriterionId::new("intro"), 0), "sandbox unavailable");
        aggregator.record_worker(report(run_id, "clarity", 0, Ok(Score::new(0.5))));

        let aggregate = aggregator.finish(&rubric, exposure());

        let reasons: Vec<String> = aggregate.unavailable().iter().map(|(_, r)| r.to_string()).collect();
        assert_eq!(
            reasons,
            vec![
                "isolation refused: sandbox unavailable".to_string(),
                "withheld: nothing in the document matches the focus".to_string(),
                "withheld: exposure 1.1000 would exceed ceiling 1.0000".to_string(),
            ]
        );
        match &aggregate.get(&CriterionId::new("clarity")).unwrap().result {
            PartialResult::Scored { passes_withheld, .. } => assert_eq!(*passes_withheld, 1),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn short_selection_counts_no_withheld_passes() {
        let run_id = RunId::new();
        // clarity asks for two passes but its selection held one segment
        let aggregate = Aggregator::aggregate(
            run_id,
            &rubric(),
            Vec::new(),
            vec![report(run_id, "clarity", 0, Ok(Score::new(0.5)))],
            &[],
            exposure(),
        );

        match &aggregate.get(&CriterionId::new("clarity")).unwrap().result {
            PartialResult::Scored { passes_scored, passes_failed, passes_withheld, .. } => {
                assert_eq!((*passes_scored, *passes_failed, *passes_withheld), (1, 0, 0));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn exposure_report_is_passed_through() {
        let report = exposure();
        let aggregate = Aggregator::new(RunId::new()).finish(&rubric(), report.clone());
        assert_eq!(aggregate.exposure_report, report);
        assert_eq!(aggregate.overall_score, None);
    }

    #[test]
    fn aggregate_serializes_with_tagged_results() {
        let run_id = RunId::new();
        let aggregate = Aggregator::aggregate(
            run_id,
            &rubric(),
            Vec::new(),
            vec![report(run_id, "intro", 0, Err(WorkerFault::Cancelled))],
            &[],
            exposure(),
        );
        let json = serde_json::to_value(&aggregate).unwrap();
        assert_eq!(json["criteria"][0]["result"]["status"], "unavailable");
        assert_eq!(json["criteria"][0]["result"]["reason"]["source"], "worker");
        let back: FeedbackAggregate = serde_json::from_value(json).unwrap();
        assert_eq!(back, aggregate);
    }
}
