//! Transaction primitives.
//!
//! A `Transaction` is one financial event for a customer: a sale, a payment,
//! a credit issuance (loan) or a refund. Sales and credits create debt and
//! keep a `remaining_minor` that later payments pay down; payments and
//! refunds are always fully paid on creation.

use chrono::{DateTime, Utc};
use sea_orm::{ActiveValue, entity::prelude::*};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{LedgerError, LedgerResult};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    Sale,
    Payment,
    Credit,
    Refund,
}

impl TransactionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sale => "sale",
            Self::Payment => "payment",
            Self::Credit => "credit",
            Self::Refund => "refund",
        }
    }

    /// Sales and credit issuances carry a meaningful `remaining_minor`.
    pub fn creates_debt(self) -> bool {
        matches!(self, Self::Sale | Self::Credit)
    }
}

impl TryFrom<&str> for TransactionKind {
    type Error = LedgerError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "sale" => Ok(Self::Sale),
            "payment" => Ok(Self::Payment),
            "credit" => Ok(Self::Credit),
            "refund" => Ok(Self::Refund),
            other => Err(LedgerError::Validation(format!(
                "invalid transaction kind: {other}"
            ))),
        }
    }
}

/// How a transaction was funded. Distinct from [`TransactionKind`]: a
/// `credit` *method* spends the customer's stored credit, a `credit` *kind*
/// issues a loan.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    BankTransfer,
    PosCard,
    Credit,
    Mixed,
}

impl PaymentMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Cash => "cash",
            Self::BankTransfer => "bank_transfer",
            Self::PosCard => "pos_card",
            Self::Credit => "credit",
            Self::Mixed => "mixed",
        }
    }
}

impl TryFrom<&str> for PaymentMethod {
    type Error = LedgerError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "cash" => Ok(Self::Cash),
            "bank_transfer" => Ok(Self::BankTransfer),
            "pos_card" => Ok(Self::PosCard),
            "credit" => Ok(Self::Credit),
            "mixed" => Ok(Self::Mixed),
            other => Err(LedgerError::Validation(format!(
                "invalid payment method: {other}"
            ))),
        }
    }
}

/// Settlement state, monotonic `pending → partial → completed` as
/// `remaining_minor` drops to 0. `cancelled` is terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Pending,
    Partial,
    Completed,
    Cancelled,
}

impl TransactionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Partial => "partial",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl TryFrom<&str> for TransactionStatus {
    type Error = LedgerError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "pending" => Ok(Self::Pending),
            "partial" => Ok(Self::Partial),
            "completed" => Ok(Self::Completed),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(LedgerError::Validation(format!(
                "invalid transaction status: {other}"
            ))),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub kind: TransactionKind,
    pub payment_method: PaymentMethod,
    pub amount_minor: i64,
    pub paid_minor: i64,
    pub remaining_minor: i64,
    pub applied_to_debt: bool,
    pub status: TransactionStatus,
    pub linked_transaction_id: Option<Uuid>,
    pub note: Option<String>,
    pub occurred_at: DateTime<Utc>,
    pub is_deleted: bool,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub cancel_reason: Option<String>,
    pub idempotency_key: Option<String>,
}

impl Transaction {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        customer_id: Uuid,
        kind: TransactionKind,
        payment_method: PaymentMethod,
        amount_minor: i64,
        paid_minor: i64,
        remaining_minor: i64,
        applied_to_debt: bool,
        status: TransactionStatus,
        occurred_at: DateTime<Utc>,
    ) -> LedgerResult<Self> {
        if amount_minor < 0 || paid_minor < 0 || remaining_minor < 0 {
            return Err(LedgerError::InvalidAmount(
                "amounts must not be negative".to_string(),
            ));
        }
        if paid_minor + remaining_minor != amount_minor {
            return Err(LedgerError::Validation(
                "paid_minor + remaining_minor must equal amount_minor".to_string(),
            ));
        }
        Ok(Self {
            id: Uuid::new_v4(),
            customer_id,
            kind,
            payment_method,
            amount_minor,
            paid_minor,
            remaining_minor,
            applied_to_debt,
            status,
            linked_transaction_id: None,
            note: None,
            occurred_at,
            is_deleted: false,
            cancelled_at: None,
            cancel_reason: None,
            idempotency_key: None,
        })
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "transactions")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub customer_id: String,
    pub kind: String,
    pub payment_method: String,
    pub amount_minor: i64,
    pub paid_minor: i64,
    pub remaining_minor: i64,
    pub applied_to_debt: bool,
    pub status: String,
    pub linked_transaction_id: Option<String>,
    pub note: Option<String>,
    pub occurred_at: DateTimeUtc,
    pub is_deleted: bool,
    pub cancelled_at: Option<DateTimeUtc>,
    pub cancel_reason: Option<String>,
    pub idempotency_key: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::customers::Entity",
        from = "Column::CustomerId",
        to = "super::customers::Column::Id"
    )]
    Customers,
}

impl Related<super::customers::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Customers.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl From<&Transaction> for ActiveModel {
    fn from(tx: &Transaction) -> Self {
        Self {
            id: ActiveValue::Set(tx.id.to_string()),
            customer_id: ActiveValue::Set(tx.customer_id.to_string()),
            kind: ActiveValue::Set(tx.kind.as_str().to_string()),
            payment_method: ActiveValue::Set(tx.payment_method.as_str().to_string()),
            amount_minor: ActiveValue::Set(tx.amount_minor),
            paid_minor: ActiveValue::Set(tx.paid_minor),
            remaining_minor: ActiveValue::Set(tx.remaining_minor),
            applied_to_debt: ActiveValue::Set(tx.applied_to_debt),
            status: ActiveValue::Set(tx.status.as_str().to_string()),
            linked_transaction_id: ActiveValue::Set(
                tx.linked_transaction_id.map(|id| id.to_string()),
            ),
            note: ActiveValue::Set(tx.note.clone()),
            occurred_at: ActiveValue::Set(tx.occurred_at),
            is_deleted: ActiveValue::Set(tx.is_deleted),
            cancelled_at: ActiveValue::Set(tx.cancelled_at),
            cancel_reason: ActiveValue::Set(tx.cancel_reason.clone()),
            idempotency_key: ActiveValue::Set(tx.idempotency_key.clone()),
        }
    }
}

impl TryFrom<Model> for Transaction {
    type Error = LedgerError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        Ok(Self {
            id: Uuid::parse_str(&model.id)
                .map_err(|_| LedgerError::NotFound("transaction not exists".to_string()))?,
            customer_id: Uuid::parse_str(&model.customer_id)
                .map_err(|_| LedgerError::NotFound("customer not exists".to_string()))?,
            kind: TransactionKind::try_from(model.kind.as_str())?,
            payment_method: PaymentMethod::try_from(model.payment_method.as_str())?,
            amount_minor: model.amount_minor,
            paid_minor: model.paid_minor,
            remaining_minor: model.remaining_minor,
            applied_to_debt: model.applied_to_debt,
            status: TransactionStatus::try_from(model.status.as_str())?,
            linked_transaction_id: model
                .linked_transaction_id
                .and_then(|s| Uuid::parse_str(&s).ok()),
            note: model.note,
            occurred_at: model.occurred_at,
            is_deleted: model.is_deleted,
            cancelled_at: model.cancelled_at,
            cancel_reason: model.cancel_reason,
            idempotency_key: model.idempotency_key,
        })
    }
}
