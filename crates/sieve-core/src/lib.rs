//! Sieve Core - exposure-bounded document feedback
//!
//! Splits a document into criterion-scoped fragments, hands each scoring
//! fragment to a confined single-use worker, destroys every worker with a
//! proof, and merges the partial results into one feedback object whose
//! exposure is accounted by the ledger.
//!
//! # Example
//!
//! ```rust,ignore
//! use sieve_core::{FeedbackPipeline, PipelineConfig};
//!
//! # async fn example(scorer: std::sync::Arc<dyn sieve_core::ScoringFunction>,
//! #                  essay: sieve_model::Document, rubric: sieve_model::Rubric)
//! #     -> Result<(), Box<dyn std::error::Error>> {
//! let pipeline = FeedbackPipeline::new(PipelineConfig::default(), scorer)?;
//!
//! let plan = pipeline.explain_decomposition(&essay, &rubric)?;
//! println!("projected exposure {:.2}", plan.projected_unique_exposure);
//!
//! let feedback = pipeline.analyze(&essay, &rubric).await?;
//! println!("{} proofs, overall {:?}", feedback.proofs.len(), feedback.overall_score);
//! # Ok(())
//! # }
//! ```

pub mod aggregator;
pub mod analyzers;
pub mod config;
pub mod error;
pub mod fragmenter;
pub mod isolation;
pub mod pipeline;
pub mod scoring;
pub mod telemetry;
pub mod worker_pool;

pub use aggregator::{
    AnalyzerResult, Aggregator, CriterionFeedback, FeedbackAggregate, PartialResult, UnavailableReason,
};
pub use analyzers::{run_analyzer, AnalyzerInput, AnalyzerReport};
pub use config::{AnalyzerEchoPolicy, CeilingPolicy, ExposurePolicy, PipelineConfig, PoolConfig, TelemetryConfig};
pub use error::{ConfigError, FragmentError, PipelineError, PoolError};
pub use fragmenter::{Decomposition, Fragmenter, Withheld, WithheldReason};
pub use isolation::{Confinement, InProcessIsolation, IsolationBackend, IsolationError, IsolationPolicy};
pub use pipeline::FeedbackPipeline;
pub use scoring::{CriterionSpec, FragmentView, Score, ScoringError, ScoringFunction};
pub use telemetry::init_tracing;
pub use worker_pool::{PoolStats, WorkerFault, WorkerPool, WorkerReport, WorkerState};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
