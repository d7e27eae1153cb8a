//! Payment allocation, credit consumption and cancellation.
//!
//! Every operation here runs inside one database transaction: read the
//! customer's balances, compute the deltas, patch the affected transaction
//! rows, write the balances back and append the audit entries. A failure at
//! any step rolls back the whole unit.

use chrono::{DateTime, Utc};
use sea_orm::{ActiveValue, ConnectionTrait, QueryFilter, QueryOrder, TransactionTrait, prelude::*};
use uuid::Uuid;

use crate::{
    ApplyCreditCmd, CancelCmd, Customer, Kobo, LedgerError, LedgerResult, MixedPaymentCmd,
    PaymentCmd, RefundCmd, Transaction, UseCreditCmd, calculator,
    audit::{AuditEntry, AuditPayload, SettledSale},
    transactions::{self, PaymentMethod, TransactionKind, TransactionStatus},
};

use super::{Ledger, legacy_initial_remaining, with_tx};

/// Debt/credit split of one allocated payment or refund.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PaymentAllocation {
    pub transaction_id: Uuid,
    pub debt_reduced: Kobo,
    pub credit_created: Kobo,
}

/// Outcome of a mixed payment. One payment row records the purchase even
/// when the cash component is zero.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MixedPaymentOutcome {
    pub transaction_id: Uuid,
    pub cash_processed: Kobo,
    pub credit_used: Kobo,
}

/// Outcome of a credit consumption: how much was actually used (capped at
/// the credit balance) and the credit remaining afterwards.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CreditUse {
    pub used: Kobo,
    pub remaining: Kobo,
}

impl Ledger {
    /// Allocates an incoming payment for a customer.
    ///
    /// With `use_for_debt`, up to `min(amount, outstanding)` reduces debt
    /// and pays down the customer's open sales oldest-first; any excess
    /// becomes credit. Overpayment and zero-debt payment are success shapes,
    /// not errors.
    pub async fn allocate_payment(&self, cmd: PaymentCmd) -> LedgerResult<PaymentAllocation> {
        if cmd.amount_minor <= 0 {
            return Err(LedgerError::InvalidAmount(
                "payment amount must be positive".to_string(),
            ));
        }
        with_tx!(self, |db_tx| {
            async {
                if let Some(key) = cmd.idempotency_key.as_deref()
                    && let Some(existing) = self
                        .find_by_idempotency_key(&db_tx, cmd.customer_id, key)
                        .await?
                {
                    return self.allocation_from_audit(&db_tx, &existing).await;
                }

                let mut customer = self.require_customer(&db_tx, cmd.customer_id).await?;
                self.apply_payment(&db_tx, &mut customer, &cmd).await
            }
            .await
        })
    }

    /// Settles a purchase partly with immediate funds and partly with
    /// stored credit.
    ///
    /// Consumes up to `credit_minor` from the credit balance
    /// (short-allocating if insufficient), then allocates the cash
    /// component via the same debt-first policy as [`allocate_payment`].
    /// Both components pay down the customer's open sales oldest-first.
    /// The payment row (cash amount, zero allowed) is inserted before any
    /// balance mutation so a resubmitted idempotency key always finds it
    /// and applies nothing.
    pub async fn mixed_payment(&self, cmd: MixedPaymentCmd) -> LedgerResult<MixedPaymentOutcome> {
        calculator::validate_mixed_payment(cmd.total_minor, cmd.cash_minor, cmd.credit_minor)?;
        if cmd.total_minor <= 0 {
            return Err(LedgerError::InvalidAmount(
                "payment amount must be positive".to_string(),
            ));
        }
        with_tx!(self, |db_tx| {
            async {
                if let Some(key) = cmd.idempotency_key.as_deref()
                    && let Some(existing) = self
                        .find_by_idempotency_key(&db_tx, cmd.customer_id, key)
                        .await?
                {
                    return self.mixed_outcome_from_audit(&db_tx, &existing).await;
                }

                let mut customer = self.require_customer(&db_tx, cmd.customer_id).await?;

                let mut tx = Transaction::new(
                    cmd.customer_id,
                    TransactionKind::Payment,
                    PaymentMethod::Mixed,
                    cmd.cash_minor,
                    cmd.cash_minor,
                    0,
                    true,
                    TransactionStatus::Completed,
                    cmd.occurred_at,
                )?;
                tx.note = cmd.note.clone();
                tx.idempotency_key = cmd.idempotency_key.clone();
                if let Some(existing) = self.insert_transaction(&db_tx, &tx).await? {
                    return self.mixed_outcome_from_audit(&db_tx, &existing).await;
                }

                // Credit component first, capped at the stored balance.
                let used = Kobo::new(cmd.credit_minor).min(customer.balances.credit);
                let debt_from_credit = used.min(customer.balances.outstanding);
                let settled_by_credit = if debt_from_credit.is_positive() {
                    self.settle_open_sales(
                        &db_tx,
                        customer.id,
                        debt_from_credit.kobo(),
                        cmd.occurred_at,
                    )
                    .await?
                } else {
                    Vec::new()
                };
                customer.balances.credit -= used;
                customer.balances.outstanding -= debt_from_credit;

                // Then the cash component, debt-first.
                let cash = Kobo::new(cmd.cash_minor);
                let debt_reduced = cash.min(customer.balances.outstanding);
                let credit_created = cash - debt_reduced;
                let settled_by_cash = if debt_reduced.is_positive() {
                    self.settle_open_sales(&db_tx, customer.id, debt_reduced.kobo(), cmd.occurred_at)
                        .await?
                } else {
                    Vec::new()
                };
                customer.balances.outstanding -= debt_reduced;
                customer.balances.credit += credit_created;
                self.persist_balances(&db_tx, customer.id, customer.balances)
                    .await?;

                if let Some(first) = settled_by_credit.first().or(settled_by_cash.first()) {
                    let link = transactions::ActiveModel {
                        id: ActiveValue::Set(tx.id.to_string()),
                        linked_transaction_id: ActiveValue::Set(Some(
                            first.transaction_id.to_string(),
                        )),
                        ..Default::default()
                    };
                    link.update(&db_tx).await?;
                }

                if used.is_positive() {
                    let entry = AuditEntry::new(
                        cmd.customer_id,
                        Some(tx.id),
                        used.kobo(),
                        AuditPayload::CreditUsed {
                            used_minor: used.kobo(),
                            toward_debt: true,
                            debt_reduced: debt_from_credit.kobo(),
                            settled: settled_by_credit,
                        },
                        cmd.occurred_at,
                    );
                    self.append_audit(&db_tx, &entry).await?;
                }
                let entry = AuditEntry::new(
                    cmd.customer_id,
                    Some(tx.id),
                    cmd.cash_minor,
                    AuditPayload::Payment {
                        applied_to_debt: true,
                        debt_reduced: debt_reduced.kobo(),
                        credit_created: credit_created.kobo(),
                        settled: settled_by_cash,
                    },
                    cmd.occurred_at,
                );
                self.append_audit(&db_tx, &entry).await?;

                tracing::info!(
                    customer_id = %cmd.customer_id,
                    transaction_id = %tx.id,
                    cash_minor = cmd.cash_minor,
                    credit_used_minor = used.kobo(),
                    "mixed payment processed"
                );
                Ok(MixedPaymentOutcome {
                    transaction_id: tx.id,
                    cash_processed: cash,
                    credit_used: used,
                })
            }
            .await
        })
    }

    /// Consumes up to `min(amount, credit_balance)` of stored credit. Never
    /// creates debt by itself; a shortfall must be covered separately.
    pub async fn use_credit(&self, cmd: UseCreditCmd) -> LedgerResult<CreditUse> {
        if cmd.amount_minor <= 0 {
            return Err(LedgerError::InvalidAmount(
                "credit amount must be positive".to_string(),
            ));
        }
        with_tx!(self, |db_tx| {
            async {
                let mut customer = self.require_customer(&db_tx, cmd.customer_id).await?;
                let used = Kobo::new(cmd.amount_minor).min(customer.balances.credit);
                customer.balances.credit -= used;
                self.persist_balances(&db_tx, customer.id, customer.balances)
                    .await?;

                if used.is_positive() {
                    let entry = AuditEntry::new(
                        cmd.customer_id,
                        None,
                        used.kobo(),
                        AuditPayload::CreditUsed {
                            used_minor: used.kobo(),
                            toward_debt: false,
                            debt_reduced: 0,
                            settled: Vec::new(),
                        },
                        cmd.occurred_at,
                    );
                    self.append_audit(&db_tx, &entry).await?;
                }

                Ok(CreditUse {
                    used,
                    remaining: customer.balances.credit,
                })
            }
            .await
        })
    }

    /// Applies stored credit against one specific sale's remaining amount,
    /// reducing outstanding debt by the same value.
    pub async fn apply_credit_to_sale(&self, cmd: ApplyCreditCmd) -> LedgerResult<CreditUse> {
        if cmd.amount_minor <= 0 {
            return Err(LedgerError::InvalidAmount(
                "credit amount must be positive".to_string(),
            ));
        }
        with_tx!(self, |db_tx| {
            async {
                let mut customer = self.require_customer(&db_tx, cmd.customer_id).await?;
                let sale = self
                    .require_transaction(&db_tx, cmd.sale_transaction_id)
                    .await?;
                if sale.customer_id != cmd.customer_id {
                    return Err(LedgerError::NotFound("transaction not exists".to_string()));
                }
                if sale.is_deleted {
                    return Err(LedgerError::Validation(
                        "cannot apply credit to a cancelled transaction".to_string(),
                    ));
                }
                if !sale.kind.creates_debt() {
                    return Err(LedgerError::Validation(
                        "credit can only settle a sale or credit transaction".to_string(),
                    ));
                }

                let used = Kobo::new(cmd.amount_minor)
                    .min(customer.balances.credit)
                    .min(Kobo::new(sale.remaining_minor));
                let debt_reduced = used.min(customer.balances.outstanding);

                if used.is_positive() {
                    self.patch_sale_amounts(&db_tx, &sale, used.kobo(), cmd.occurred_at)
                        .await?;
                }

                customer.balances.credit -= used;
                customer.balances.outstanding -= debt_reduced;
                self.persist_balances(&db_tx, customer.id, customer.balances)
                    .await?;

                if used.is_positive() {
                    let entry = AuditEntry::new(
                        cmd.customer_id,
                        Some(sale.id),
                        used.kobo(),
                        AuditPayload::CreditAppliedToSale {
                            used_minor: used.kobo(),
                            debt_reduced: debt_reduced.kobo(),
                            sale_remaining_after: sale.remaining_minor - used.kobo(),
                        },
                        cmd.occurred_at,
                    );
                    self.append_audit(&db_tx, &entry).await?;
                }

                tracing::info!(
                    customer_id = %cmd.customer_id,
                    sale_transaction_id = %sale.id,
                    used_minor = used.kobo(),
                    "credit applied to sale"
                );
                Ok(CreditUse {
                    used,
                    remaining: customer.balances.credit,
                })
            }
            .await
        })
    }

    /// Records a refund: reduces outstanding debt by up to the refund
    /// amount; any excess becomes credit.
    pub async fn record_refund(&self, cmd: RefundCmd) -> LedgerResult<PaymentAllocation> {
        if cmd.amount_minor <= 0 {
            return Err(LedgerError::InvalidAmount(
                "refund amount must be positive".to_string(),
            ));
        }
        with_tx!(self, |db_tx| {
            async {
                if let Some(key) = cmd.idempotency_key.as_deref()
                    && let Some(existing) = self
                        .find_by_idempotency_key(&db_tx, cmd.customer_id, key)
                        .await?
                {
                    return self.allocation_from_audit(&db_tx, &existing).await;
                }

                let mut customer = self.require_customer(&db_tx, cmd.customer_id).await?;
                let debt_reduced = Kobo::new(cmd.amount_minor).min(customer.balances.outstanding);
                let credit_created = Kobo::new(cmd.amount_minor) - debt_reduced;

                let mut tx = Transaction::new(
                    cmd.customer_id,
                    TransactionKind::Refund,
                    PaymentMethod::Cash,
                    cmd.amount_minor,
                    cmd.amount_minor,
                    0,
                    false,
                    TransactionStatus::Completed,
                    cmd.occurred_at,
                )?;
                tx.note = cmd.note.clone();
                tx.idempotency_key = cmd.idempotency_key.clone();
                if let Some(existing) = self.insert_transaction(&db_tx, &tx).await? {
                    return self.allocation_from_audit(&db_tx, &existing).await;
                }

                customer.balances.outstanding -= debt_reduced;
                customer.balances.credit += credit_created;
                self.persist_balances(&db_tx, customer.id, customer.balances)
                    .await?;

                let entry = AuditEntry::new(
                    cmd.customer_id,
                    Some(tx.id),
                    cmd.amount_minor,
                    AuditPayload::Refund {
                        debt_reduced: debt_reduced.kobo(),
                        credit_created: credit_created.kobo(),
                    },
                    cmd.occurred_at,
                );
                self.append_audit(&db_tx, &entry).await?;

                tracing::info!(
                    customer_id = %cmd.customer_id,
                    transaction_id = %tx.id,
                    amount_minor = cmd.amount_minor,
                    "refund recorded"
                );
                Ok(PaymentAllocation {
                    transaction_id: tx.id,
                    debt_reduced,
                    credit_created,
                })
            }
            .await
        })
    }

    /// Cancels a transaction: soft delete plus a compensating audit entry
    /// reversing its *last recorded* impact. A partially-paid sale reverses
    /// only its current remaining amount; a payment restores the sale rows
    /// it settled.
    pub async fn cancel_transaction(&self, cmd: CancelCmd) -> LedgerResult<()> {
        with_tx!(self, |db_tx| {
            async {
                let tx = self.require_transaction(&db_tx, cmd.transaction_id).await?;
                if tx.is_deleted || tx.status == TransactionStatus::Cancelled {
                    return Err(LedgerError::Validation(
                        "transaction already cancelled".to_string(),
                    ));
                }
                let mut customer = self.require_customer(&db_tx, tx.customer_id).await?;
                let entries = self.load_audit_for_transaction(&db_tx, tx.id).await?;

                let (outstanding_delta, credit_delta, restored) = match tx.kind {
                    TransactionKind::Sale | TransactionKind::Credit => {
                        let initial_remaining = entries
                            .iter()
                            .find_map(|e| match e.payload {
                                AuditPayload::DebtIncurred { initial_remaining } => {
                                    Some(initial_remaining)
                                }
                                _ => None,
                            })
                            .unwrap_or_else(|| legacy_initial_remaining(&tx));
                        let initial_paid = tx.amount_minor - initial_remaining;
                        // Payments allocated since creation come back as credit.
                        let settled_since = (tx.paid_minor - initial_paid).max(0);
                        (-tx.remaining_minor, settled_since, Vec::new())
                    }
                    TransactionKind::Payment => {
                        let mut outstanding_delta = 0;
                        let mut credit_delta = 0;
                        let mut restored = Vec::new();
                        for entry in &entries {
                            match &entry.payload {
                                AuditPayload::Payment {
                                    debt_reduced,
                                    credit_created,
                                    settled,
                                    ..
                                } => {
                                    outstanding_delta += debt_reduced;
                                    credit_delta -= credit_created;
                                    restored.extend(settled.iter().cloned());
                                }
                                AuditPayload::CreditUsed {
                                    used_minor,
                                    debt_reduced,
                                    settled,
                                    ..
                                } => {
                                    outstanding_delta += debt_reduced;
                                    credit_delta += used_minor;
                                    restored.extend(settled.iter().cloned());
                                }
                                _ => {}
                            }
                        }
                        (outstanding_delta, credit_delta, restored)
                    }
                    TransactionKind::Refund => {
                        let mut outstanding_delta = 0;
                        let mut credit_delta = 0;
                        for entry in &entries {
                            if let AuditPayload::Refund {
                                debt_reduced,
                                credit_created,
                            } = &entry.payload
                            {
                                outstanding_delta += debt_reduced;
                                credit_delta -= credit_created;
                            }
                        }
                        (outstanding_delta, credit_delta, Vec::new())
                    }
                };

                // Un-settle the sale rows this payment had paid down.
                for settled in &restored {
                    self.restore_settled_sale(&db_tx, settled, cmd.cancelled_at)
                        .await?;
                }

                customer.balances.outstanding = Kobo::new(
                    (customer.balances.outstanding.kobo() + outstanding_delta).max(0),
                );
                customer.balances.credit =
                    Kobo::new((customer.balances.credit.kobo() + credit_delta).max(0));

                let patch = transactions::ActiveModel {
                    id: ActiveValue::Set(tx.id.to_string()),
                    is_deleted: ActiveValue::Set(true),
                    status: ActiveValue::Set(TransactionStatus::Cancelled.as_str().to_string()),
                    cancelled_at: ActiveValue::Set(Some(cmd.cancelled_at)),
                    cancel_reason: ActiveValue::Set(cmd.reason.clone()),
                    ..Default::default()
                };
                patch.update(&db_tx).await?;

                self.persist_balances(&db_tx, customer.id, customer.balances)
                    .await?;

                let entry = AuditEntry::new(
                    tx.customer_id,
                    Some(tx.id),
                    tx.amount_minor,
                    AuditPayload::Cancellation {
                        outstanding_delta,
                        credit_delta,
                        restored,
                    },
                    cmd.cancelled_at,
                );
                self.append_audit(&db_tx, &entry).await?;

                tracing::info!(
                    customer_id = %tx.customer_id,
                    transaction_id = %tx.id,
                    kind = tx.kind.as_str(),
                    outstanding_delta,
                    credit_delta,
                    "transaction cancelled"
                );
                Ok(())
            }
            .await
        })
    }

    /// Core debt-first allocation shared by `allocate_payment` and the cash
    /// component of `mixed_payment`. Expects `cmd.amount_minor > 0`.
    async fn apply_payment(
        &self,
        db_tx: &impl ConnectionTrait,
        customer: &mut Customer,
        cmd: &PaymentCmd,
    ) -> LedgerResult<PaymentAllocation> {
        let amount = Kobo::new(cmd.amount_minor);
        let debt_reduced = if cmd.use_for_debt {
            amount.min(customer.balances.outstanding)
        } else {
            Kobo::ZERO
        };
        let credit_created = amount - debt_reduced;

        let mut tx = Transaction::new(
            cmd.customer_id,
            TransactionKind::Payment,
            cmd.payment_method,
            cmd.amount_minor,
            cmd.amount_minor,
            0,
            cmd.use_for_debt,
            TransactionStatus::Completed,
            cmd.occurred_at,
        )?;
        tx.note = cmd.note.clone();
        tx.idempotency_key = cmd.idempotency_key.clone();
        if let Some(existing) = self.insert_transaction(db_tx, &tx).await? {
            return self.allocation_from_audit(db_tx, &existing).await;
        }

        let settled = if debt_reduced.is_positive() {
            self.settle_open_sales(db_tx, customer.id, debt_reduced.kobo(), cmd.occurred_at)
                .await?
        } else {
            Vec::new()
        };
        if let Some(first) = settled.first() {
            let link = transactions::ActiveModel {
                id: ActiveValue::Set(tx.id.to_string()),
                linked_transaction_id: ActiveValue::Set(Some(first.transaction_id.to_string())),
                ..Default::default()
            };
            link.update(db_tx).await?;
        }

        customer.balances.outstanding -= debt_reduced;
        customer.balances.credit += credit_created;
        self.persist_balances(db_tx, customer.id, customer.balances)
            .await?;

        let entry = AuditEntry::new(
            cmd.customer_id,
            Some(tx.id),
            cmd.amount_minor,
            AuditPayload::Payment {
                applied_to_debt: cmd.use_for_debt,
                debt_reduced: debt_reduced.kobo(),
                credit_created: credit_created.kobo(),
                settled,
            },
            cmd.occurred_at,
        );
        self.append_audit(db_tx, &entry).await?;

        tracing::info!(
            customer_id = %cmd.customer_id,
            transaction_id = %tx.id,
            amount_minor = cmd.amount_minor,
            debt_reduced_minor = debt_reduced.kobo(),
            credit_created_minor = credit_created.kobo(),
            "payment allocated"
        );
        Ok(PaymentAllocation {
            transaction_id: tx.id,
            debt_reduced,
            credit_created,
        })
    }

    /// Walks the customer's open sales oldest-first, paying down their
    /// remaining amounts out of `budget_minor` and advancing their status.
    async fn settle_open_sales(
        &self,
        db_tx: &impl ConnectionTrait,
        customer_id: Uuid,
        budget_minor: i64,
        occurred_at: DateTime<Utc>,
    ) -> LedgerResult<Vec<SettledSale>> {
        let open = transactions::Entity::find()
            .filter(transactions::Column::CustomerId.eq(customer_id.to_string()))
            .filter(transactions::Column::Kind.is_in([
                TransactionKind::Sale.as_str(),
                TransactionKind::Credit.as_str(),
            ]))
            .filter(transactions::Column::IsDeleted.eq(false))
            .filter(transactions::Column::Status.is_in([
                TransactionStatus::Pending.as_str(),
                TransactionStatus::Partial.as_str(),
            ]))
            .filter(transactions::Column::RemainingMinor.gt(0))
            .order_by_asc(transactions::Column::OccurredAt)
            .order_by_asc(transactions::Column::Id)
            .all(db_tx)
            .await?;

        let mut budget = budget_minor;
        let mut settled = Vec::new();
        for model in open {
            if budget <= 0 {
                break;
            }
            let sale = Transaction::try_from(model)?;
            let pay = budget.min(sale.remaining_minor);
            self.patch_sale_amounts(db_tx, &sale, pay, occurred_at).await?;
            settled.push(SettledSale {
                transaction_id: sale.id,
                amount_minor: pay,
            });
            budget -= pay;
        }
        Ok(settled)
    }

    /// Moves `pay_minor` from a sale's remaining to its paid amount,
    /// recomputing the status and logging the change.
    async fn patch_sale_amounts(
        &self,
        db_tx: &impl ConnectionTrait,
        sale: &Transaction,
        pay_minor: i64,
        occurred_at: DateTime<Utc>,
    ) -> LedgerResult<()> {
        let new_paid = sale.paid_minor + pay_minor;
        let new_remaining = sale.remaining_minor - pay_minor;
        let new_status =
            calculator::status_for(sale.kind, sale.amount_minor, new_paid, new_remaining);

        let patch = transactions::ActiveModel {
            id: ActiveValue::Set(sale.id.to_string()),
            paid_minor: ActiveValue::Set(new_paid),
            remaining_minor: ActiveValue::Set(new_remaining),
            status: ActiveValue::Set(new_status.as_str().to_string()),
            ..Default::default()
        };
        patch.update(db_tx).await?;

        if new_status != sale.status {
            let entry = AuditEntry::new(
                sale.customer_id,
                Some(sale.id),
                pay_minor,
                AuditPayload::StatusChange {
                    from: sale.status,
                    to: new_status,
                },
                occurred_at,
            );
            self.append_audit(db_tx, &entry).await?;
        }
        Ok(())
    }

    /// Gives a settled amount back to a sale after the settling payment was
    /// cancelled. Skips sales that no longer exist or were cancelled
    /// themselves.
    async fn restore_settled_sale(
        &self,
        db_tx: &impl ConnectionTrait,
        settled: &SettledSale,
        occurred_at: DateTime<Utc>,
    ) -> LedgerResult<()> {
        let Some(model) = transactions::Entity::find_by_id(settled.transaction_id.to_string())
            .one(db_tx)
            .await?
        else {
            return Ok(());
        };
        let sale = Transaction::try_from(model)?;
        if sale.is_deleted {
            return Ok(());
        }
        self.patch_sale_amounts(db_tx, &sale, -settled.amount_minor, occurred_at)
            .await
    }

    /// Inserts a transaction row. When the unique
    /// `(customer_id, idempotency_key)` index rejects the insert, returns
    /// the already-recorded transaction instead; callers must then skip all
    /// balance mutation.
    async fn insert_transaction(
        &self,
        db_tx: &impl ConnectionTrait,
        tx: &Transaction,
    ) -> LedgerResult<Option<Transaction>> {
        if let Err(err) = transactions::ActiveModel::from(tx).insert(db_tx).await {
            if let Some(key) = tx.idempotency_key.as_deref()
                && let Some(existing) = self
                    .find_by_idempotency_key(db_tx, tx.customer_id, key)
                    .await?
            {
                return Ok(Some(existing));
            }
            return Err(err.into());
        }
        Ok(None)
    }

    /// Rebuilds a [`PaymentAllocation`] for an already-recorded transaction
    /// from its audit entries (idempotent resubmission path).
    async fn allocation_from_audit(
        &self,
        db_tx: &impl ConnectionTrait,
        existing: &Transaction,
    ) -> LedgerResult<PaymentAllocation> {
        let entries = self.load_audit_for_transaction(db_tx, existing.id).await?;
        for entry in entries {
            match entry.payload {
                AuditPayload::Payment {
                    debt_reduced,
                    credit_created,
                    ..
                }
                | AuditPayload::Refund {
                    debt_reduced,
                    credit_created,
                } => {
                    return Ok(PaymentAllocation {
                        transaction_id: existing.id,
                        debt_reduced: Kobo::new(debt_reduced),
                        credit_created: Kobo::new(credit_created),
                    });
                }
                _ => {}
            }
        }
        Err(LedgerError::CorruptState(format!(
            "transaction {} has no allocation audit entry",
            existing.id
        )))
    }

    /// Rebuilds a [`MixedPaymentOutcome`] for an already-recorded mixed
    /// payment from its audit entries.
    async fn mixed_outcome_from_audit(
        &self,
        db_tx: &impl ConnectionTrait,
        existing: &Transaction,
    ) -> LedgerResult<MixedPaymentOutcome> {
        let entries = self.load_audit_for_transaction(db_tx, existing.id).await?;
        let mut credit_used = Kobo::ZERO;
        for entry in &entries {
            if let AuditPayload::CreditUsed { used_minor, .. } = entry.payload {
                credit_used += Kobo::new(used_minor);
            }
        }
        Ok(MixedPaymentOutcome {
            transaction_id: existing.id,
            cash_processed: Kobo::new(existing.amount_minor),
            credit_used,
        })
    }
}

