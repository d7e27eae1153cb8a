//! Command structs for ledger operations.
//!
//! These types group parameters for write operations (sale, payment, credit
//! use, cancellation), keeping call sites readable and avoiding long
//! argument lists. Each carries an optional caller-supplied idempotency key;
//! resubmitting with the same key returns the original transaction instead
//! of double-applying.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::transactions::PaymentMethod;

/// Record a sale or credit issuance.
#[derive(Clone, Debug)]
pub struct SaleCmd {
    pub customer_id: Uuid,
    pub payment_method: PaymentMethod,
    pub amount_minor: i64,
    /// Caller-supplied paid portion, required for `PaymentMethod::Mixed`.
    pub paid_minor: Option<i64>,
    pub note: Option<String>,
    pub idempotency_key: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

impl SaleCmd {
    #[must_use]
    pub fn new(
        customer_id: Uuid,
        payment_method: PaymentMethod,
        amount_minor: i64,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            customer_id,
            payment_method,
            amount_minor,
            paid_minor: None,
            note: None,
            idempotency_key: None,
            occurred_at,
        }
    }

    #[must_use]
    pub fn paid_minor(mut self, paid_minor: i64) -> Self {
        self.paid_minor = Some(paid_minor);
        self
    }

    #[must_use]
    pub fn note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    #[must_use]
    pub fn idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }
}

/// Allocate an incoming payment (debt-first when `use_for_debt`).
#[derive(Clone, Debug)]
pub struct PaymentCmd {
    pub customer_id: Uuid,
    pub amount_minor: i64,
    pub use_for_debt: bool,
    pub payment_method: PaymentMethod,
    pub note: Option<String>,
    pub idempotency_key: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

impl PaymentCmd {
    #[must_use]
    pub fn new(
        customer_id: Uuid,
        amount_minor: i64,
        use_for_debt: bool,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            customer_id,
            amount_minor,
            use_for_debt,
            payment_method: PaymentMethod::Cash,
            note: None,
            idempotency_key: None,
            occurred_at,
        }
    }

    #[must_use]
    pub fn payment_method(mut self, method: PaymentMethod) -> Self {
        self.payment_method = method;
        self
    }

    #[must_use]
    pub fn note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    #[must_use]
    pub fn idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }
}

/// Settle a purchase partly with immediate funds and partly with stored
/// credit.
#[derive(Clone, Debug)]
pub struct MixedPaymentCmd {
    pub customer_id: Uuid,
    pub total_minor: i64,
    pub cash_minor: i64,
    pub credit_minor: i64,
    pub note: Option<String>,
    pub idempotency_key: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

impl MixedPaymentCmd {
    #[must_use]
    pub fn new(
        customer_id: Uuid,
        total_minor: i64,
        cash_minor: i64,
        credit_minor: i64,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            customer_id,
            total_minor,
            cash_minor,
            credit_minor,
            note: None,
            idempotency_key: None,
            occurred_at,
        }
    }

    #[must_use]
    pub fn note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    #[must_use]
    pub fn idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }
}

/// Consume stored credit for a purchase (capped at the credit balance).
#[derive(Clone, Debug)]
pub struct UseCreditCmd {
    pub customer_id: Uuid,
    pub amount_minor: i64,
    pub occurred_at: DateTime<Utc>,
}

impl UseCreditCmd {
    #[must_use]
    pub fn new(customer_id: Uuid, amount_minor: i64, occurred_at: DateTime<Utc>) -> Self {
        Self {
            customer_id,
            amount_minor,
            occurred_at,
        }
    }
}

/// Apply stored credit against one specific sale's remaining amount.
#[derive(Clone, Debug)]
pub struct ApplyCreditCmd {
    pub customer_id: Uuid,
    pub amount_minor: i64,
    pub sale_transaction_id: Uuid,
    pub occurred_at: DateTime<Utc>,
}

impl ApplyCreditCmd {
    #[must_use]
    pub fn new(
        customer_id: Uuid,
        amount_minor: i64,
        sale_transaction_id: Uuid,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            customer_id,
            amount_minor,
            sale_transaction_id,
            occurred_at,
        }
    }
}

/// Record a refund to the customer.
#[derive(Clone, Debug)]
pub struct RefundCmd {
    pub customer_id: Uuid,
    pub amount_minor: i64,
    pub note: Option<String>,
    pub idempotency_key: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

impl RefundCmd {
    #[must_use]
    pub fn new(customer_id: Uuid, amount_minor: i64, occurred_at: DateTime<Utc>) -> Self {
        Self {
            customer_id,
            amount_minor,
            note: None,
            idempotency_key: None,
            occurred_at,
        }
    }

    #[must_use]
    pub fn note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    #[must_use]
    pub fn idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }
}

/// Cancel (soft-delete) a transaction, reversing its recorded impact.
#[derive(Clone, Debug)]
pub struct CancelCmd {
    pub transaction_id: Uuid,
    pub reason: Option<String>,
    pub cancelled_at: DateTime<Utc>,
}

impl CancelCmd {
    #[must_use]
    pub fn new(transaction_id: Uuid, cancelled_at: DateTime<Utc>) -> Self {
        Self {
            transaction_id,
            reason: None,
            cancelled_at,
        }
    }

    #[must_use]
    pub fn reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}
