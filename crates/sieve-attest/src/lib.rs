//! Sieve Attest
//!
//! Evidence that a run honored its isolation guarantees:
//! - [`DestructionProof`]: checksummed, optionally signed record of a worker's end
//! - [`AttestationLog`]: SHA-256 hash chain of a run's lifecycle events
//! - [`Attestor`]: run-scoped emitter feeding an [`EventSink`]

#![warn(missing_docs)]
#![warn(unreachable_pub)]

mod emitter;
mod error;
mod event;
mod log;
mod proof;
mod sink;

pub use emitter::Attestor;
pub use error::{AttestError, SinkError};
pub use event::{AttestationEvent, AttestationRecord};
pub use log::{verify_chain, AttestationLog};
pub use proof::{DestructionMethod, DestructionProof, ProofSigner};
pub use sink::{EventSink, JsonLinesSink, MemorySink, NullSink};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
