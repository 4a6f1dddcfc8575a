//! Error types for the fund ledger

use crate::types::{LoanId, MemberId};
use rust_decimal::Decimal;
use thiserror::Error;

/// Result type for ledger operations
pub type Result<T> = std::result::Result<T, Error>;

/// Ledger errors
#[derive(Error, Debug)]
pub enum Error {
    /// Lookup failure (unknown mobile at login, unknown member for a posting)
    #[error("Not found: {0}")]
    NotFound(String),

    /// Login attempt by an inactive member
    #[error("Account is inactive: {0}")]
    Disabled(MemberId),

    /// Operation attempted without an active session
    #[error("No active session")]
    Unauthenticated,

    /// Member-role session attempted an admin operation
    #[error("Operation requires the admin role (member {0})")]
    Forbidden(MemberId),

    /// Loan cannot be closed while principal remains
    #[error("Loan {loan_id} still has outstanding principal {outstanding}")]
    PrincipalOutstanding {
        /// Loan that was targeted
        loan_id: LoanId,
        /// Remaining principal
        outstanding: Decimal,
    },

    /// Amount failed validation
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    /// Mobile number already registered to another member
    #[error("Mobile number already registered: {0}")]
    DuplicateMobile(String),

    /// Loan-side effect needs an active loan and there is none
    #[error("No active loan for member {0}")]
    NoActiveLoan(MemberId),

    /// Reversal would leave the ledger inconsistent
    #[error("Reversal inconsistency: {0}")]
    ReversalInconsistency(String),

    /// Invariant violation (duplicate keys, second active loan, etc.)
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Storage error
    #[error("Storage error: {0}")]
    Storage(String),

    /// Metrics registry error
    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<tempfile::PersistError> for Error {
    fn from(err: tempfile::PersistError) -> Self {
        Error::Storage(err.to_string())
    }
}
