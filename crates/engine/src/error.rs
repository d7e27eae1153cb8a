//! The module contains the error the ledger can throw.
//!
//! Expected business outcomes (overpayment, zero-debt payment, capped credit
//! use) are **not** errors; they come back as normal result fields. The
//! variants here cover rejected input, missing records, corrupted stored
//! state and storage failures.
use sea_orm::DbErr;
use thiserror::Error;

/// Ledger custom errors.
#[derive(Error, Debug)]
pub enum LedgerError {
    /// Amount is zero/negative where a positive amount is required, or the
    /// textual amount failed to parse.
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),
    /// Bad input shape, rejected before any write (mixed-payment mismatch,
    /// malformed id, illegal status transition).
    #[error("Validation failed: {0}")]
    Validation(String),
    /// Unknown customer or transaction.
    #[error("\"{0}\" not found!")]
    NotFound(String),
    /// A stored balance or audit payload failed its sanity check. Surfaced
    /// loudly, never coerced to zero.
    #[error("Corrupt state: {0}")]
    CorruptState(String),
    #[error(transparent)]
    Database(#[from] DbErr),
}

impl PartialEq for LedgerError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::InvalidAmount(a), Self::InvalidAmount(b)) => a == b,
            (Self::Validation(a), Self::Validation(b)) => a == b,
            (Self::NotFound(a), Self::NotFound(b)) => a == b,
            (Self::CorruptState(a), Self::CorruptState(b)) => a == b,
            (Self::Database(a), Self::Database(b)) => a.to_string() == b.to_string(),
            _ => false,
        }
    }
}
