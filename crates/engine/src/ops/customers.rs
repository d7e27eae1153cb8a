use chrono::Utc;
use sea_orm::prelude::*;
use uuid::Uuid;

use crate::{Balances, Customer, LedgerResult, customers};

use super::{Ledger, normalize_required_name};

impl Ledger {
    /// Creates a new customer with zero balances.
    pub async fn create_customer(&self, name: &str) -> LedgerResult<Customer> {
        let name = normalize_required_name(name, "customer")?;
        let customer = Customer::new(name, Utc::now());
        customers::ActiveModel::from(&customer)
            .insert(&self.database)
            .await?;
        tracing::info!(customer_id = %customer.id, "customer created");
        Ok(customer)
    }

    /// Returns a customer, failing with `CorruptState` if the stored
    /// balances are negative.
    pub async fn customer(&self, customer_id: Uuid) -> LedgerResult<Customer> {
        self.require_customer(&self.database, customer_id).await
    }

    /// Returns the cached balances for a customer.
    pub async fn customer_balances(&self, customer_id: Uuid) -> LedgerResult<Balances> {
        let customer = self.require_customer(&self.database, customer_id).await?;
        Ok(customer.balances)
    }

    /// Lists all customers.
    pub async fn customers(&self) -> LedgerResult<Vec<Customer>> {
        let models = customers::Entity::find().all(&self.database).await?;
        models.into_iter().map(Customer::try_from).collect()
    }
}
