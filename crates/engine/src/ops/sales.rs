use sea_orm::{TransactionTrait, prelude::*};
use uuid::Uuid;

use crate::{
    Kobo, LedgerResult, SaleCmd, Transaction, calculator,
    audit::{AuditEntry, AuditPayload},
    transactions::{self, PaymentMethod, TransactionKind},
};

use super::{Ledger, with_tx};

impl Ledger {
    /// Records a sale. Cash/bank/POS sales settle immediately; credit and
    /// mixed sales leave a remaining amount that increases the customer's
    /// outstanding balance.
    pub async fn record_sale(&self, cmd: SaleCmd) -> LedgerResult<Uuid> {
        self.create_debt_transaction(TransactionKind::Sale, cmd).await
    }

    /// Issues a credit loan: all-debt, paid down by later payments exactly
    /// like a credit sale.
    pub async fn issue_credit(&self, cmd: SaleCmd) -> LedgerResult<Uuid> {
        let cmd = SaleCmd {
            payment_method: PaymentMethod::Credit,
            ..cmd
        };
        self.create_debt_transaction(TransactionKind::Credit, cmd).await
    }

    async fn create_debt_transaction(
        &self,
        kind: TransactionKind,
        cmd: SaleCmd,
    ) -> LedgerResult<Uuid> {
        with_tx!(self, |db_tx| {
            async {
                if let Some(key) = cmd.idempotency_key.as_deref()
                    && let Some(existing) = self
                        .find_by_idempotency_key(&db_tx, cmd.customer_id, key)
                        .await?
                {
                    return Ok(existing.id);
                }

                let mut customer = self.require_customer(&db_tx, cmd.customer_id).await?;
                let split = calculator::initial_amounts(
                    kind,
                    cmd.payment_method,
                    cmd.amount_minor,
                    cmd.paid_minor,
                )?;
                let status =
                    calculator::status_for(kind, cmd.amount_minor, split.paid_minor, split.remaining_minor);

                let mut tx = Transaction::new(
                    cmd.customer_id,
                    kind,
                    cmd.payment_method,
                    cmd.amount_minor,
                    split.paid_minor,
                    split.remaining_minor,
                    false,
                    status,
                    cmd.occurred_at,
                )?;
                tx.note = cmd.note.clone();
                tx.idempotency_key = cmd.idempotency_key.clone();

                if let Err(err) = transactions::ActiveModel::from(&tx).insert(&db_tx).await {
                    // Unique (customer_id, idempotency_key) race: someone else
                    // recorded the same logical sale first.
                    if let Some(key) = cmd.idempotency_key.as_deref()
                        && let Some(existing) = self
                            .find_by_idempotency_key(&db_tx, cmd.customer_id, key)
                            .await?
                    {
                        return Ok(existing.id);
                    }
                    return Err(err.into());
                }

                customer.balances.outstanding += Kobo::new(split.remaining_minor);
                self.persist_balances(&db_tx, customer.id, customer.balances)
                    .await?;

                // Fixes the debt this row initially created; replay reads this
                // instead of the (later patched) remaining_minor column.
                let entry = AuditEntry::new(
                    cmd.customer_id,
                    Some(tx.id),
                    split.remaining_minor,
                    AuditPayload::DebtIncurred {
                        initial_remaining: split.remaining_minor,
                    },
                    cmd.occurred_at,
                );
                self.append_audit(&db_tx, &entry).await?;

                tracing::info!(
                    customer_id = %cmd.customer_id,
                    transaction_id = %tx.id,
                    kind = kind.as_str(),
                    amount_minor = cmd.amount_minor,
                    remaining_minor = split.remaining_minor,
                    "debt transaction recorded"
                );
                Ok(tx.id)
            }
            .await
        })
    }
}
