//! Sieve Ledger
//!
//! Run-scoped accounting of how much of a document has been shown to
//! exposure-metered consumers. See [`ExposureLedger`].

#![warn(missing_docs)]
#![warn(unreachable_pub)]

mod error;
mod ledger;
mod report;

pub use error::{ExposureExceeded, LedgerError};
pub use ledger::{ExposureLedger, LedgerEntry, LedgerMode};
pub use report::{CriterionExposure, ExposureReport};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
