//! Customer debt/credit ledger.
//!
//! Converts a stream of heterogeneous financial events (sales, payments,
//! credit issuance, refunds, cancellations) into a single authoritative
//! per-customer balance pair, tolerating partial payments, overpayments,
//! mixed payment sources and post-hoc correction of drifted state.
//!
//! All money is integer kobo ([`Kobo`]); every public write operation runs
//! inside one database transaction.

pub use audit::{AuditEntry, AuditKind, AuditPayload, SettledSale};
pub use commands::{
    ApplyCreditCmd, CancelCmd, MixedPaymentCmd, PaymentCmd, RefundCmd, SaleCmd, UseCreditCmd,
};
pub use customers::{Balances, Customer};
pub use error::LedgerError;
pub use money::Kobo;
pub use ops::{
    CreditUse, Discrepancy, Ledger, LedgerBuilder, MixedPaymentOutcome, PaymentAllocation,
    ReconcileReport,
};
pub use transactions::{PaymentMethod, Transaction, TransactionKind, TransactionStatus};

mod audit;
pub mod calculator;
mod commands;
mod customers;
mod error;
mod money;
mod ops;
mod transactions;

pub type LedgerResult<T> = Result<T, LedgerError>;
