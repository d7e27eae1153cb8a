//! Customer primitives.
//!
//! The two balance columns are derived state: they cache what replaying the
//! customer's transactions and audit entries would produce, and only the
//! allocation and reconciliation ops may write them.

use chrono::{DateTime, Utc};
use sea_orm::{ActiveValue, entity::prelude::*};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Kobo, LedgerError};

/// Cached per-customer balances, both non-negative at rest.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balances {
    /// What the customer owes the merchant.
    pub outstanding: Kobo,
    /// What the merchant owes the customer (overpayment or pre-funding).
    pub credit: Kobo,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    pub id: Uuid,
    pub name: String,
    pub balances: Balances,
    pub created_at: DateTime<Utc>,
}

impl Customer {
    pub fn new(name: String, created_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name,
            balances: Balances::default(),
            created_at,
        }
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "customers")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub name: String,
    pub outstanding_minor: i64,
    pub credit_minor: i64,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::transactions::Entity")]
    Transactions,
    #[sea_orm(has_many = "super::audit::Entity")]
    AuditEntries,
}

impl Related<super::transactions::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Transactions.def()
    }
}

impl Related<super::audit::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::AuditEntries.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl From<&Customer> for ActiveModel {
    fn from(customer: &Customer) -> Self {
        Self {
            id: ActiveValue::Set(customer.id.to_string()),
            name: ActiveValue::Set(customer.name.clone()),
            outstanding_minor: ActiveValue::Set(customer.balances.outstanding.kobo()),
            credit_minor: ActiveValue::Set(customer.balances.credit.kobo()),
            created_at: ActiveValue::Set(customer.created_at),
        }
    }
}

impl TryFrom<Model> for Customer {
    type Error = LedgerError;

    /// Sanity-checks the stored balances: a negative value means the cached
    /// columns no longer match the ledger and must not be trusted.
    fn try_from(model: Model) -> Result<Self, Self::Error> {
        if model.outstanding_minor < 0 || model.credit_minor < 0 {
            return Err(LedgerError::CorruptState(format!(
                "customer {} has negative stored balance (outstanding {}, credit {})",
                model.id, model.outstanding_minor, model.credit_minor
            )));
        }
        Ok(Self {
            id: Uuid::parse_str(&model.id)
                .map_err(|_| LedgerError::NotFound("customer not exists".to_string()))?,
            name: model.name,
            balances: Balances {
                outstanding: Kobo::new(model.outstanding_minor),
                credit: Kobo::new(model.credit_minor),
            },
            created_at: model.created_at,
        })
    }
}
