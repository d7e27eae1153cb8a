use sea_orm::{ConnectionTrait, QueryFilter, QueryOrder, prelude::*};
use uuid::Uuid;

use crate::{
    LedgerError, LedgerResult, Transaction, transactions,
};

use super::Ledger;

impl Ledger {
    /// Loads one transaction, including soft-deleted rows.
    pub(crate) async fn require_transaction(
        &self,
        conn: &impl ConnectionTrait,
        transaction_id: Uuid,
    ) -> LedgerResult<Transaction> {
        let model = transactions::Entity::find_by_id(transaction_id.to_string())
            .one(conn)
            .await?
            .ok_or_else(|| LedgerError::NotFound("transaction not exists".to_string()))?;
        Transaction::try_from(model)
    }

    /// Returns one transaction by id.
    pub async fn transaction(&self, transaction_id: Uuid) -> LedgerResult<Transaction> {
        self.require_transaction(&self.database, transaction_id)
            .await
    }

    /// Lists a customer's transactions in chronological order. Soft-deleted
    /// rows are hidden unless `include_deleted` is set.
    pub async fn transactions_for_customer(
        &self,
        customer_id: Uuid,
        include_deleted: bool,
    ) -> LedgerResult<Vec<Transaction>> {
        let mut query = transactions::Entity::find()
            .filter(transactions::Column::CustomerId.eq(customer_id.to_string()))
            .order_by_asc(transactions::Column::OccurredAt)
            .order_by_asc(transactions::Column::Id);
        if !include_deleted {
            query = query.filter(transactions::Column::IsDeleted.eq(false));
        }
        let models = query.all(&self.database).await?;
        models.into_iter().map(Transaction::try_from).collect()
    }

    /// Idempotency probe: returns the transaction already recorded for this
    /// customer and key, if any.
    pub(crate) async fn find_by_idempotency_key(
        &self,
        conn: &impl ConnectionTrait,
        customer_id: Uuid,
        key: &str,
    ) -> LedgerResult<Option<Transaction>> {
        let model = transactions::Entity::find()
            .filter(transactions::Column::CustomerId.eq(customer_id.to_string()))
            .filter(transactions::Column::IdempotencyKey.eq(key.to_string()))
            .one(conn)
            .await?;
        model.map(Transaction::try_from).transpose()
    }
}
