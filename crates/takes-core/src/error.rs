//! Domain-level error types.

use crate::period::LedgerError;
use crate::take::TakeStatus;
use thiserror::Error;

/// Errors from domain operations on takes.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DomainError {
    /// Transition attempted from a status that does not allow it.
    #[error("invalid transition: take is {from}, expected {expected}")]
    InvalidTransition {
        from: TakeStatus,
        expected: &'static str,
    },

    /// Reviewer supplied a multiplier outside the accepted range.
    #[error("invalid multiplier {value}: must be >= 0")]
    InvalidMultiplier { value: f64 },

    /// Period sequence failed its integrity check.
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

/// Result type for domain operations.
pub type DomainResult<T> = Result<T, DomainError>;
