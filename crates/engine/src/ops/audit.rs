use sea_orm::{ConnectionTrait, QueryFilter, QueryOrder, prelude::*};
use uuid::Uuid;

use crate::{
    LedgerResult,
    audit::{self, AuditEntry},
};

use super::Ledger;

impl Ledger {
    /// Appends one audit entry inside the caller's transaction. The log is
    /// append-only; no update or delete surface exists.
    pub(crate) async fn append_audit(
        &self,
        conn: &impl ConnectionTrait,
        entry: &AuditEntry,
    ) -> LedgerResult<()> {
        audit::ActiveModel::try_from(entry)?.insert(conn).await?;
        Ok(())
    }

    /// Loads the audit entries sourced from one transaction inside the
    /// caller's transaction.
    pub(crate) async fn load_audit_for_transaction(
        &self,
        conn: &impl ConnectionTrait,
        transaction_id: Uuid,
    ) -> LedgerResult<Vec<AuditEntry>> {
        let models = audit::Entity::find()
            .filter(audit::Column::SourceTransactionId.eq(transaction_id.to_string()))
            .order_by_asc(audit::Column::CreatedAt)
            .order_by_asc(audit::Column::Id)
            .all(conn)
            .await?;
        models.into_iter().map(AuditEntry::try_from).collect()
    }

    /// Lists a customer's audit entries in creation order.
    pub async fn audit_entries(&self, customer_id: Uuid) -> LedgerResult<Vec<AuditEntry>> {
        let models = audit::Entity::find()
            .filter(audit::Column::CustomerId.eq(customer_id.to_string()))
            .order_by_asc(audit::Column::CreatedAt)
            .order_by_asc(audit::Column::Id)
            .all(&self.database)
            .await?;
        models.into_iter().map(AuditEntry::try_from).collect()
    }

    /// Lists the audit entries sourced from one transaction.
    pub async fn audit_entries_for_transaction(
        &self,
        transaction_id: Uuid,
    ) -> LedgerResult<Vec<AuditEntry>> {
        self.load_audit_for_transaction(&self.database, transaction_id)
            .await
    }
}
