use thiserror::Error;

/// Attestation log failures
#[derive(Debug, Error)]
pub enum AttestError {
    /// A record does not link to its predecessor or its hash is wrong
    #[error("attestation chain broken at sequence {sequence}")]
    IntegrityViolation {
        /// First offending record
        sequence: u64,
    },

    /// Event could not be encoded for hashing
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Event sink failures
#[derive(Debug, Error)]
pub enum SinkError {
    /// Writer failed
    #[error("sink I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Record could not be encoded
    #[error("sink serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Sink refused the record
    #[error("sink rejected record: {0}")]
    Rejected(String),
}
