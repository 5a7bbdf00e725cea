//! Fragmenter
//!
//! Splits a tagged document into criterion-scoped fragments:
//! - structural foci (sections, citation context) select first
//! - sampled foci (clarity, grammar) and keyword foci (coherence) then draw
//!   only from content no exclusive criterion has claimed
//! - every bound and overlap check runs before the first ledger registration
//! - fragments are registered, in rubric order, before they are returned

mod selection;
mod shuffle;

use crate::config::{AnalyzerEchoPolicy, CeilingPolicy, ExposurePolicy};
use crate::error::FragmentError;
use serde::{Deserialize, Serialize};
use sieve_ledger::ExposureLedger;
use sieve_model::{
    size_fraction, Consumer, Criterion, CriterionId, Document, Focus, Fragment, FragmentId, Rubric,
    Span, SpanSet,
};

use shuffle::criterion_seed;

/// Slack for float comparison against per-criterion bounds
const BOUND_EPSILON: f64 = 1e-12;

/// Why a criterion produced no (or not all of its) fragments
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum WithheldReason {
    /// Ledger refused a fragment
    ExposureCeiling {
        /// Exposure the fragment would have produced
        attempted: f64,
        /// Ceiling in force
        ceiling: f64,
    },
    /// Selection found no content for the focus
    EmptySelection,
}

/// A criterion left (partly) unserved by the decomposition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Withheld {
    /// Criterion
    pub criterion_id: CriterionId,
    /// Its index in the rubric
    pub ordinal: usize,
    /// First pass not issued
    pub pass: u16,
    /// Passes the ledger refused, from `pass` on; zero for an empty selection
    pub unissued: u16,
    /// Cause
    pub reason: WithheldReason,
}

/// Output of [`Fragmenter::fragment`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Decomposition {
    /// Registered fragments, in rubric order then pass order
    pub issued: Vec<Fragment>,
    /// Criteria with passes that were not issued
    pub withheld: Vec<Withheld>,
}

impl Decomposition {
    /// Fragments of one criterion
    pub fn fragments_for<'a>(&'a self, id: &'a CriterionId) -> impl Iterator<Item = &'a Fragment> + 'a {
        self.issued.iter().filter(move |f| &f.criterion_id == id)
    }

    /// Withheld record of one criterion
    #[must_use]
    pub fn withheld_for(&self, id: &CriterionId) -> Option<&Withheld> {
        self.withheld.iter().find(|w| &w.criterion_id == id)
    }
}

#[derive(Debug, Clone)]
struct Selection {
    segments: Vec<Span>,
    spans: SpanSet,
}

/// Splits documents into fragments per rubric
#[derive(Debug, Clone, Copy, Default)]
pub struct Fragmenter {
    echo: AnalyzerEchoPolicy,
    ceiling_policy: CeilingPolicy,
}

impl Fragmenter {
    /// Fragmenter applying the given exposure policy
    #[inline]
    #[must_use]
    pub fn new(policy: &ExposurePolicy) -> Self {
        Self {
            echo: policy.analyzer_echo,
            ceiling_policy: policy.ceiling_policy,
        }
    }

    /// Decompose `document` per `rubric` and register every fragment with `ledger`
    ///
    /// `seed` is run-scoped: it drives sampling and order erasure and must not
    /// be reused across live runs.
    ///
    /// # Errors
    /// - [`FragmentError::Model`] for an invalid rubric
    /// - [`FragmentError::Configuration`] when a selection exceeds its criterion's bound
    /// - [`FragmentError::Overlap`] when exclusive criteria share content
    /// - [`FragmentError::ExposureExceeded`] on a ceiling breach under
    ///   [`CeilingPolicy::AbortRun`]
    pub fn fragment(
        &self,
        document: &Document,
        rubric: &Rubric,
        ledger: &ExposureLedger,
        seed: u64,
    ) -> Result<Decomposition, FragmentError> {
        rubric.validate()?;
        let document_len = document.len();
        let mut selections: Vec<Option<Selection>> = vec![None; rubric.len()];
        let mut claimed = SpanSet::new();

        // Structural foci claim their content first
        for (ordinal, criterion) in rubric.criteria.iter().enumerate() {
            if !criterion.focus.is_structural() {
                continue;
            }
            let raw = selection::structural(document, criterion.focus);
            let selection = Self::bounded(document, criterion, raw)?;
            if !criterion.overlap_allowed {
                claimed = claimed.union(&selection.spans);
            }
            selections[ordinal] = Some(selection);
        }

        for (ordinal, criterion) in rubric.criteria.iter().enumerate() {
            if criterion.focus.is_structural() {
                continue;
            }
            let excluded = if criterion.overlap_allowed {
                SpanSet::new()
            } else {
                claimed.clone()
            };
            let target = selection::target_units(criterion.effective_sample_fraction(), document_len);
            let raw = match criterion.focus {
                Focus::Coherence => selection::keyword_dense(document, target, &excluded),
                _ => selection::sampled(
                    document,
                    target,
                    &excluded,
                    criterion_seed(seed, &criterion.id, u16::MAX),
                ),
            };
            let selection = Self::bounded(document, criterion, raw)?;
            if !criterion.overlap_allowed {
                claimed = claimed.union(&selection.spans);
            }
            selections[ordinal] = Some(selection);
        }

        check_overlaps(rubric, &selections)?;

        let mut decomposition = Decomposition::default();
        for (ordinal, (criterion, selection)) in rubric.criteria.iter().zip(selections).enumerate() {
            let Some(selection) = selection.filter(|s| !s.spans.is_empty()) else {
                tracing::debug!(criterion = %criterion.id, "selection empty, criterion withheld");
                decomposition.withheld.push(Withheld {
                    criterion_id: criterion.id.clone(),
                    ordinal,
                    pass: 0,
                    unissued: 0,
                    reason: WithheldReason::EmptySelection,
                });
                continue;
            };

            let metered = self.is_metered(criterion.consumer);
            let groups = selection::split_passes(&selection.segments, criterion.passes);
            let planned = u16::try_from(groups.len()).unwrap_or(u16::MAX);
            for (pass, mut segments) in (0u16..).zip(groups) {
                if criterion.order_erased {
                    shuffle::erase_order(&mut segments, criterion_seed(seed, &criterion.id, pass));
                }
                let fragment = Fragment::new(
                    FragmentId::new(criterion.id.clone(), pass),
                    ordinal,
                    criterion.consumer,
                    segments,
                    document_len,
                    criterion.order_erased,
                    metered,
                );

                match ledger.register(&fragment) {
                    Ok(_) => {
                        tracing::debug!(
                            fragment = %fragment.id,
                            size_fraction = fragment.size_fraction,
                            segments = fragment.segments.len(),
                            metered,
                            "fragment issued"
                        );
                        decomposition.issued.push(fragment);
                    }
                    Err(exceeded) => match self.ceiling_policy {
                        CeilingPolicy::AbortRun => return Err(exceeded.into()),
                        CeilingPolicy::WithholdCriterion => {
                            decomposition.withheld.push(Withheld {
                                criterion_id: criterion.id.clone(),
                                ordinal,
                                pass,
                                unissued: planned - pass,
                                reason: WithheldReason::ExposureCeiling {
                                    attempted: exceeded.attempted,
                                    ceiling: exceeded.ceiling,
                                },
                            });
                            break;
                        }
                    },
                }
            }
        }

        tracing::info!(
            issued = decomposition.issued.len(),
            withheld = decomposition.withheld.len(),
            "decomposition complete"
        );
        Ok(decomposition)
    }

    fn is_metered(&self, consumer: Consumer) -> bool {
        match consumer {
            Consumer::DisposableWorker => true,
            Consumer::Deterministic(analyzer) => analyzer.may_echo_input() && self.echo.is_metered(),
        }
    }

    /// Refine if order-erased, then enforce the criterion's own bound
    fn bounded(
        document: &Document,
        criterion: &Criterion,
        raw: Vec<Span>,
    ) -> Result<Selection, FragmentError> {
        let segments = if criterion.order_erased {
            selection::refine_to_sentences(document, &raw)
        } else {
            raw
        };
        let spans = SpanSet::from_spans(segments.iter().copied());
        let fraction = size_fraction(spans.total_len(), document.len());
        if fraction > criterion.max_exposure_fraction + BOUND_EPSILON {
            return Err(FragmentError::Configuration {
                criterion: criterion.id.clone(),
                size_fraction: fraction,
                max_exposure_fraction: criterion.max_exposure_fraction,
            });
        }
        Ok(Selection { segments, spans })
    }
}

/// Overlap between two criteria is permitted when either opted in
fn check_overlaps(rubric: &Rubric, selections: &[Option<Selection>]) -> Result<(), FragmentError> {
    let chosen: Vec<(&Criterion, &Selection)> = rubric
        .criteria
        .iter()
        .zip(selections)
        .filter_map(|(c, s)| s.as_ref().map(|s| (c, s)))
        .collect();

    for (i, (first, a)) in chosen.iter().enumerate() {
        for (second, b) in &chosen[i + 1..] {
            if first.overlap_allowed || second.overlap_allowed {
                continue;
            }
            let shared_units = a.spans.intersection_len(&b.spans);
            if shared_units > 0 {
                return Err(FragmentError::Overlap {
                    first: first.id.clone(),
                    second: second.id.clone(),
                    shared_units,
                });
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sieve_model::{AnalyzerKind, SectionTag};
    use sieve_test_utils::{five_criterion_rubric, standard_essay, EssayBuilder};

    fn ledger(doc: &Document) -> ExposureLedger {
        ExposureLedger::live(doc.len(), 1.0).unwrap()
    }

    #[test]
    fn five_criteria_at_a_fifth_each() {
        let doc = standard_essay();
        let rubric = five_criterion_rubric();
        let ledger = ledger(&doc);

        let decomposition = Fragmenter::default().fragment(&doc, &rubric, &ledger, 7).unwrap();

        assert_eq!(decomposition.issued.len(), 5);
        assert!(decomposition.withheld.is_empty());
        for fragment in &decomposition.issued {
            let criterion = rubric.get(&fragment.criterion_id).unwrap();
            assert!(fragment.size_fraction <= criterion.max_exposure_fraction + 1e-12);
        }
        let report = ledger.report();
        assert!(report.total_unique_exposure <= 1.0);
        assert_eq!(report.fragments_issued, 5);
    }

    #[test]
    fn structural_selection_over_bound_is_configuration_error() {
        let doc = standard_essay();
        let rubric = Rubric::new(vec![Criterion::new("intro", Focus::Introduction, 0.05)]).unwrap();
        let ledger = ledger(&doc);

        let err = Fragmenter::default().fragment(&doc, &rubric, &ledger, 1).unwrap_err();
        assert!(matches!(err, FragmentError::Configuration { .. }));
        assert_eq!(ledger.report().fragments_issued, 0);
    }

    #[test]
    fn exclusive_structural_overlap_is_rejected() {
        let doc = EssayBuilder::new()
            .raw_section(SectionTag::Introduction, &["Prior work (Lee2019) is cited here."])
            .raw_section(SectionTag::Conclusion, &["Nothing else is cited."])
            .bibliography(&["Lee2019"])
            .build();
        let rubric = Rubric::new(vec![
            Criterion::new("intro", Focus::Introduction, 1.0),
            Criterion::new("citations", Focus::CitationContext, 1.0),
        ])
        .unwrap();

        let err = Fragmenter::default()
            .fragment(&doc, &rubric, &ledger(&doc), 1)
            .unwrap_err();
        assert!(matches!(err, FragmentError::Overlap { .. }));

        let permissive = Rubric::new(vec![
            Criterion::new("intro", Focus::Introduction, 1.0),
            Criterion::new("citations", Focus::CitationContext, 1.0).allow_overlap(),
        ])
        .unwrap();
        let ok = Fragmenter::default().fragment(&doc, &permissive, &ledger(&doc), 1);
        assert!(ok.is_ok());
    }

    #[test]
    fn sampled_criteria_avoid_claimed_content() {
        let doc = standard_essay();
        let rubric = Rubric::new(vec![
            Criterion::new("intro", Focus::Introduction, 0.2),
            Criterion::new("grammar", Focus::Grammar, 0.5).order_erased(),
        ])
        .unwrap();
        let decomposition = Fragmenter::default()
            .fragment(&doc, &rubric, &ledger(&doc), 11)
            .unwrap();

        let intro = &decomposition.issued[0];
        let grammar = &decomposition.issued[1];
        assert!(!intro.spans.overlaps(&grammar.spans));
        assert!(grammar.size_fraction <= 0.5);
    }

    #[test]
    fn multi_pass_fragments_are_disjoint() {
        let doc = standard_essay();
        let rubric = Rubric::new(vec![Criterion::new("analysis", Focus::Analysis, 0.2)
            .order_erased()
            .with_passes(3)])
        .unwrap();
        let decomposition = Fragmenter::default()
            .fragment(&doc, &rubric, &ledger(&doc), 3)
            .unwrap();

        assert_eq!(decomposition.issued.len(), 3);
        let [a, b, c] = [&decomposition.issued[0], &decomposition.issued[1], &decomposition.issued[2]];
        assert!(!a.spans.overlaps(&b.spans));
        assert!(!b.spans.overlaps(&c.spans));
        assert!(!a.spans.overlaps(&c.spans));
        assert_eq!(a.id.pass, 0);
        assert_eq!(c.id.pass, 2);
    }

    #[test]
    fn passes_beyond_segment_count_are_not_withheld() {
        let doc = EssayBuilder::new()
            .raw_section(SectionTag::Introduction, &["Only one sentence introduces this essay."])
            .section(SectionTag::Analysis, 6)
            .build();
        let rubric = Rubric::new(vec![Criterion::new("intro", Focus::Introduction, 1.0)
            .order_erased()
            .with_passes(3)])
        .unwrap();

        let decomposition = Fragmenter::default()
            .fragment(&doc, &rubric, &ledger(&doc), 5)
            .unwrap();

        assert_eq!(decomposition.issued.len(), 1);
        assert!(decomposition.withheld.is_empty());
    }

    #[test]
    fn ceiling_withholds_criterion_by_default() {
        let doc = standard_essay();
        let rubric = five_criterion_rubric();
        let ledger = ExposureLedger::live(doc.len(), 0.5).unwrap();

        let decomposition = Fragmenter::default().fragment(&doc, &rubric, &ledger, 7).unwrap();
        assert!(!decomposition.withheld.is_empty());
        assert!(matches!(
            decomposition.withheld[0].reason,
            WithheldReason::ExposureCeiling { .. }
        ));
        assert_eq!(decomposition.withheld[0].unissued, 1);
        assert!(ledger.report().total_unique_exposure <= 0.5 + 1e-12);
    }

    #[test]
    fn ceiling_aborts_under_abort_policy() {
        let doc = standard_essay();
        let rubric = five_criterion_rubric();
        let ledger = ExposureLedger::live(doc.len(), 0.5).unwrap();
        let policy = ExposurePolicy {
            ceiling_policy: CeilingPolicy::AbortRun,
            ..ExposurePolicy::default()
        };

        let err = Fragmenter::new(&policy).fragment(&doc, &rubric, &ledger, 7).unwrap_err();
        assert!(matches!(err, FragmentError::ExposureExceeded(_)));
    }

    #[test]
    fn deterministic_analyzers_are_unmetered_unless_echo_is_metered() {
        let doc = standard_essay();
        let rubric = Rubric::new(vec![
            Criterion::new("grammar", Focus::Grammar, 0.2).analyzed_by(AnalyzerKind::Grammar),
        ])
        .unwrap();

        let redacted = Fragmenter::default()
            .fragment(&doc, &rubric, &ledger(&doc), 1)
            .unwrap();
        assert!(!redacted.issued[0].metered);

        let policy = ExposurePolicy {
            analyzer_echo: AnalyzerEchoPolicy::Echo { metered: true },
            ..ExposurePolicy::default()
        };
        let echo_ledger = ledger(&doc);
        let echoed = Fragmenter::new(&policy)
            .fragment(&doc, &rubric, &echo_ledger, 1)
            .unwrap();
        assert!(echoed.issued[0].metered);
        assert!(echo_ledger.report().total_unique_exposure > 0.0);
    }

    #[test]
    fn criterion_without_content_is_withheld_not_fatal() {
        let doc = standard_essay();
        let rubric = Rubric::new(vec![
            Criterion::new("intro", Focus::Introduction, 0.2),
            Criterion::new("citations", Focus::CitationContext, 0.2),
        ])
        .unwrap();
        let decomposition = Fragmenter::default()
            .fragment(&doc, &rubric, &ledger(&doc), 1)
            .unwrap();
        assert_eq!(decomposition.issued.len(), 1);
        assert_eq!(
            decomposition.withheld_for(&CriterionId::new("citations")).map(|w| &w.reason),
            Some(&WithheldReason::EmptySelection)
        );
    }
}
