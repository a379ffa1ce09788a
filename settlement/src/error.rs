//! Error types for settlement engine

use crate::types::PaymentStatus;
use thiserror::Error;

/// Result type for settlement operations
pub type Result<T> = std::result::Result<T, Error>;

/// Settlement errors
///
/// Insufficient funds is deliberately absent: it is an outcome of gross
/// settlement (see [`crate::accounts::DebitOutcome`]), not a failure.
#[derive(Error, Debug)]
pub enum Error {
    /// Bad amount, missing field, unknown participant
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Caller is not the party the operation requires
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Referenced payment or account does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Lifecycle violation
    #[error("Invalid status transition from {from} to {to}")]
    InvalidTransition {
        /// Current status
        from: PaymentStatus,
        /// Requested status
        to: PaymentStatus,
    },

    /// Required partition could not be read
    #[error("Partition unavailable: {0}")]
    PartitionUnavailable(String),

    /// Record changed between calculation and apply
    #[error("Write conflict: {0}")]
    WriteConflict(String),

    /// Record store error
    #[error("Ledger error: {0}")]
    Ledger(ledger_core::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl From<ledger_core::Error> for Error {
    fn from(err: ledger_core::Error) -> Self {
        match err {
            ledger_core::Error::PartitionUnavailable(partition) => {
                Error::PartitionUnavailable(partition)
            }
            other => Error::Ledger(other),
        }
    }
}

impl From<prometheus::Error> for Error {
    fn from(err: prometheus::Error) -> Self {
        Error::Other(format!("Metrics error: {}", err))
    }
}

impl From<String> for Error {
    fn from(msg: String) -> Self {
        Error::Other(msg)
    }
}

impl From<&str> for Error {
    fn from(msg: &str) -> Self {
        Error::Other(msg.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partition_unavailable_is_lifted() {
        let err: Error = ledger_core::Error::PartitionUnavailable("col-A-B".into()).into();
        assert!(matches!(err, Error::PartitionUnavailable(p) if p == "col-A-B"));

        let err: Error = ledger_core::Error::Storage("disk full".into()).into();
        assert!(matches!(err, Error::Ledger(_)));
    }

    #[test]
    fn test_transition_message() {
        let err = Error::InvalidTransition {
            from: PaymentStatus::Pending,
            to: PaymentStatus::Settled,
        };
        assert_eq!(
            err.to_string(),
            "Invalid status transition from PENDING to SETTLED"
        );
    }
}
