use sea_orm::{ActiveValue, ConnectionTrait, DatabaseConnection, prelude::*};
use uuid::Uuid;

use crate::{Balances, Customer, LedgerError, LedgerResult};

mod audit;
mod customers;
mod payments;
mod reconcile;
mod sales;
mod transactions;

pub use payments::{CreditUse, MixedPaymentOutcome, PaymentAllocation};
pub use reconcile::{Discrepancy, ReconcileReport};

/// Run a block inside a DB transaction, committing on success and rolling back on error.
macro_rules! with_tx {
    ($self:expr, |$tx:ident| $body:expr) => {{
        let $tx = $self.database.begin().await?;
        let result = $body;
        match result {
            Ok(value) => {
                $tx.commit().await?;
                Ok(value)
            }
            Err(err) => Err(err),
        }
    }};
}

pub(crate) use with_tx;

/// The ledger engine. All public write operations run inside one database
/// transaction; partial application is never observable.
#[derive(Debug)]
pub struct Ledger {
    database: DatabaseConnection,
}

impl Ledger {
    /// Return a builder for `Ledger`. Help to build the struct.
    pub fn builder() -> LedgerBuilder {
        LedgerBuilder::default()
    }

    /// Loads a customer, sanity-checking the stored balances.
    pub(crate) async fn require_customer(
        &self,
        conn: &impl ConnectionTrait,
        customer_id: Uuid,
    ) -> LedgerResult<Customer> {
        let model = crate::customers::Entity::find_by_id(customer_id.to_string())
            .one(conn)
            .await?
            .ok_or_else(|| LedgerError::NotFound("customer not exists".to_string()))?;
        Customer::try_from(model)
    }

    /// Overwrites the cached balance columns for one customer.
    pub(crate) async fn persist_balances(
        &self,
        conn: &impl ConnectionTrait,
        customer_id: Uuid,
        balances: Balances,
    ) -> LedgerResult<()> {
        let model = crate::customers::ActiveModel {
            id: ActiveValue::Set(customer_id.to_string()),
            outstanding_minor: ActiveValue::Set(balances.outstanding.kobo()),
            credit_minor: ActiveValue::Set(balances.credit.kobo()),
            ..Default::default()
        };
        model.update(conn).await?;
        Ok(())
    }
}

/// Initial remaining for rows predating the `debt_incurred` audit entry,
/// derived from the payment method.
pub(crate) fn legacy_initial_remaining(tx: &crate::Transaction) -> i64 {
    use crate::transactions::PaymentMethod;

    match tx.payment_method {
        PaymentMethod::Cash | PaymentMethod::BankTransfer | PaymentMethod::PosCard => 0,
        PaymentMethod::Credit => tx.amount_minor,
        PaymentMethod::Mixed => tx.remaining_minor,
    }
}

fn normalize_required_name(value: &str, label: &str) -> LedgerResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(LedgerError::Validation(format!(
            "{label} name must not be empty"
        )));
    }
    Ok(trimmed.to_string())
}

/// The builder for `Ledger`
#[derive(Default)]
pub struct LedgerBuilder {
    database: DatabaseConnection,
}

impl LedgerBuilder {
    /// Pass the required database
    pub fn database(mut self, db: DatabaseConnection) -> LedgerBuilder {
        self.database = db;
        self
    }

    /// Construct `Ledger`
    pub async fn build(self) -> LedgerResult<Ledger> {
        Ok(Ledger {
            database: self.database,
        })
    }
}
