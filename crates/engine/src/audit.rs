//! Append-only audit log.
//!
//! Every balance-affecting operation writes one (or a small fixed set of)
//! `AuditEntry` rows before its enclosing database transaction commits. The
//! log is the ground truth the reconciler trusts over the cached customer
//! balance columns: credit consumption in particular has no transaction row
//! of its own and is replayable only from here.
//!
//! The payload is a tagged union per entry kind, encoded to a JSON text
//! column at the storage boundary; a row whose payload no longer decodes is
//! reported as [`LedgerError::CorruptState`].

use chrono::{DateTime, Utc};
use sea_orm::{ActiveValue, entity::prelude::*};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{LedgerError, transactions::TransactionStatus};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditKind {
    Payment,
    Overpayment,
    CreditUsed,
    CreditAppliedToSale,
    Refund,
    StatusChange,
    Cancellation,
    DebtIncurred,
    Reconciliation,
}

impl AuditKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Payment => "payment",
            Self::Overpayment => "overpayment",
            Self::CreditUsed => "credit_used",
            Self::CreditAppliedToSale => "credit_applied_to_sale",
            Self::Refund => "refund",
            Self::StatusChange => "status_change",
            Self::Cancellation => "cancellation",
            Self::DebtIncurred => "debt_incurred",
            Self::Reconciliation => "reconciliation",
        }
    }
}

impl TryFrom<&str> for AuditKind {
    type Error = LedgerError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "payment" => Ok(Self::Payment),
            "overpayment" => Ok(Self::Overpayment),
            "credit_used" => Ok(Self::CreditUsed),
            "credit_applied_to_sale" => Ok(Self::CreditAppliedToSale),
            "refund" => Ok(Self::Refund),
            "status_change" => Ok(Self::StatusChange),
            "cancellation" => Ok(Self::Cancellation),
            "debt_incurred" => Ok(Self::DebtIncurred),
            "reconciliation" => Ok(Self::Reconciliation),
            other => Err(LedgerError::Validation(format!(
                "invalid audit kind: {other}"
            ))),
        }
    }
}

/// One open sale paid down by a payment, recorded so a later cancellation of
/// that payment can restore the sale rows it touched.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettledSale {
    pub transaction_id: Uuid,
    pub amount_minor: i64,
}

/// Structured audit payload, one variant per entry kind. The `op` tag names
/// the originating operation so replay never has to infer intent from
/// transaction rows alone.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum AuditPayload {
    /// A payment was allocated debt-first; `settled` lists the open sales it
    /// paid down.
    Payment {
        applied_to_debt: bool,
        debt_reduced: i64,
        credit_created: i64,
        settled: Vec<SettledSale>,
    },
    /// Stored credit was consumed. `toward_debt` marks the mixed-payment
    /// path where the consumption also pays down outstanding debt;
    /// `debt_reduced` records the exact reduction and `settled` the open
    /// sales it paid down, so a cancellation can reverse both.
    CreditUsed {
        used_minor: i64,
        toward_debt: bool,
        debt_reduced: i64,
        settled: Vec<SettledSale>,
    },
    /// Stored credit settled part of a specific sale's remaining amount.
    CreditAppliedToSale {
        used_minor: i64,
        debt_reduced: i64,
        sale_remaining_after: i64,
    },
    Refund {
        debt_reduced: i64,
        credit_created: i64,
    },
    StatusChange {
        from: TransactionStatus,
        to: TransactionStatus,
    },
    /// Compensating entry for a cancellation: the signed deltas applied to
    /// the stored balances, plus the settled sales whose rows were restored.
    Cancellation {
        outstanding_delta: i64,
        credit_delta: i64,
        restored: Vec<SettledSale>,
    },
    /// Written when a sale or credit issuance is recorded, fixing the debt it
    /// initially created. Replay uses this instead of the sale's current
    /// `remaining_minor`, which later payments patch down.
    DebtIncurred { initial_remaining: i64 },
    /// Balance overwrite performed by the reconciler.
    Reconciliation {
        outstanding_before: i64,
        outstanding_after: i64,
        credit_before: i64,
        credit_after: i64,
    },
}

impl AuditPayload {
    pub fn kind(&self) -> AuditKind {
        match self {
            Self::Payment { credit_created, .. } => {
                if *credit_created > 0 {
                    AuditKind::Overpayment
                } else {
                    AuditKind::Payment
                }
            }
            Self::CreditUsed { .. } => AuditKind::CreditUsed,
            Self::CreditAppliedToSale { .. } => AuditKind::CreditAppliedToSale,
            Self::Refund { .. } => AuditKind::Refund,
            Self::StatusChange { .. } => AuditKind::StatusChange,
            Self::Cancellation { .. } => AuditKind::Cancellation,
            Self::DebtIncurred { .. } => AuditKind::DebtIncurred,
            Self::Reconciliation { .. } => AuditKind::Reconciliation,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub source_transaction_id: Option<Uuid>,
    pub kind: AuditKind,
    pub amount_minor: i64,
    pub payload: AuditPayload,
    pub created_at: DateTime<Utc>,
}

impl AuditEntry {
    pub fn new(
        customer_id: Uuid,
        source_transaction_id: Option<Uuid>,
        amount_minor: i64,
        payload: AuditPayload,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            customer_id,
            source_transaction_id,
            kind: payload.kind(),
            amount_minor,
            payload,
            created_at,
        }
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "audit_entries")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub customer_id: String,
    pub source_transaction_id: Option<String>,
    pub kind: String,
    pub amount_minor: i64,
    pub payload: String,
    pub created_at: DateTimeUtc,
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

impl TryFrom<&AuditEntry> for ActiveModel {
    type Error = LedgerError;

    fn try_from(entry: &AuditEntry) -> Result<Self, Self::Error> {
        let payload = serde_json::to_string(&entry.payload).map_err(|err| {
            LedgerError::Validation(format!("audit payload not serializable: {err}"))
        })?;
        Ok(Self {
            id: ActiveValue::Set(entry.id.to_string()),
            customer_id: ActiveValue::Set(entry.customer_id.to_string()),
            source_transaction_id: ActiveValue::Set(
                entry.source_transaction_id.map(|id| id.to_string()),
            ),
            kind: ActiveValue::Set(entry.kind.as_str().to_string()),
            amount_minor: ActiveValue::Set(entry.amount_minor),
            payload: ActiveValue::Set(payload),
            created_at: ActiveValue::Set(entry.created_at),
        })
    }
}

impl TryFrom<Model> for AuditEntry {
    type Error = LedgerError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        let payload: AuditPayload = serde_json::from_str(&model.payload).map_err(|err| {
            LedgerError::CorruptState(format!(
                "audit entry {} payload not decodable: {err}",
                model.id
            ))
        })?;
        Ok(Self {
            id: Uuid::parse_str(&model.id)
                .map_err(|_| LedgerError::NotFound("audit entry not exists".to_string()))?,
            customer_id: Uuid::parse_str(&model.customer_id)
                .map_err(|_| LedgerError::NotFound("customer not exists".to_string()))?,
            source_transaction_id: model
                .source_transaction_id
                .and_then(|s| Uuid::parse_str(&s).ok()),
            kind: AuditKind::try_from(model.kind.as_str())?,
            amount_minor: model.amount_minor,
            payload,
            created_at: model.created_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_round_trips_through_json() {
        let payload = AuditPayload::Payment {
            applied_to_debt: true,
            debt_reduced: 25_000,
            credit_created: 10_000,
            settled: vec![SettledSale {
                transaction_id: Uuid::new_v4(),
                amount_minor: 25_000,
            }],
        };
        let encoded = serde_json::to_string(&payload).unwrap();
        assert!(encoded.contains("\"op\":\"payment\""));
        let decoded: AuditPayload = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, payload);
    }

    #[test]
    fn payment_payload_with_excess_is_overpayment() {
        let payload = AuditPayload::Payment {
            applied_to_debt: true,
            debt_reduced: 0,
            credit_created: 50_000,
            settled: Vec::new(),
        };
        assert_eq!(payload.kind(), AuditKind::Overpayment);

        let payload = AuditPayload::Payment {
            applied_to_debt: true,
            debt_reduced: 4_000,
            credit_created: 0,
            settled: Vec::new(),
        };
        assert_eq!(payload.kind(), AuditKind::Payment);
    }

    #[test]
    fn unknown_payload_is_corrupt_state() {
        let model = Model {
            id: Uuid::new_v4().to_string(),
            customer_id: Uuid::new_v4().to_string(),
            source_transaction_id: None,
            kind: "payment".to_string(),
            amount_minor: 100,
            payload: "{\"op\":\"mystery\"}".to_string(),
            created_at: Utc::now(),
        };
        let err = AuditEntry::try_from(model).unwrap_err();
        assert!(matches!(err, LedgerError::CorruptState(_)));
    }
}
