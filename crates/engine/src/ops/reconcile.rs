//! Balance reconciliation.
//!
//! The cached customer balance columns are derived state; the authoritative
//! history is the transaction rows plus the audit log (credit consumption
//! exists only there). Reconciliation replays that history per customer,
//! detects drift against the stored columns and overwrites them, one
//! database transaction per customer so a failing repair never blocks the
//! rest.

use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveValue, ConnectionTrait, QueryFilter, QueryOrder, QuerySelect, TransactionTrait,
    prelude::*,
};
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

use crate::{
    Balances, Kobo, LedgerError, LedgerResult, Transaction,
    audit::{self, AuditEntry, AuditPayload},
    calculator::{self, DebtImpact},
    customers,
    transactions::{self, TransactionKind},
};

use super::{Ledger, legacy_initial_remaining, with_tx};

/// One customer whose stored balances disagree with the replayed history.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Discrepancy {
    pub customer_id: Uuid,
    pub stored: Balances,
    pub computed: Balances,
}

impl Discrepancy {
    pub fn outstanding_difference(&self) -> i64 {
        self.computed.outstanding.kobo() - self.stored.outstanding.kobo()
    }

    pub fn credit_difference(&self) -> i64 {
        self.computed.credit.kobo() - self.stored.credit.kobo()
    }
}

/// Result of one reconciliation run.
#[derive(Debug, Default)]
pub struct ReconcileReport {
    pub examined: usize,
    pub repaired: Vec<Uuid>,
    pub backfilled_audits: usize,
    pub failures: Vec<(Uuid, LedgerError)>,
}

/// Replay event: either a live transaction or a credit consumption recorded
/// only in the audit log.
enum ReplayEvent {
    Transaction(Transaction),
    CreditConsumed { used_minor: i64, toward_debt: bool },
}

impl Ledger {
    /// Recomputes one customer's balances from scratch without mutating
    /// anything.
    pub async fn recompute_customer_balance(&self, customer_id: Uuid) -> LedgerResult<Balances> {
        customers::Entity::find_by_id(customer_id.to_string())
            .one(&self.database)
            .await?
            .ok_or_else(|| LedgerError::NotFound("customer not exists".to_string()))?;
        self.replay_customer(&self.database, customer_id).await
    }

    /// Full-table scan comparing stored balances against the replayed
    /// history. Pure read, no mutation.
    pub async fn detect_discrepancies(&self) -> LedgerResult<Vec<Discrepancy>> {
        let models = customers::Entity::find().all(&self.database).await?;
        let mut out = Vec::new();
        for model in models {
            let customer_id = Uuid::parse_str(&model.id)
                .map_err(|_| LedgerError::NotFound("customer not exists".to_string()))?;
            let stored = Balances {
                outstanding: Kobo::new(model.outstanding_minor),
                credit: Kobo::new(model.credit_minor),
            };
            let computed = self.replay_customer(&self.database, customer_id).await?;
            if stored != computed {
                out.push(Discrepancy {
                    customer_id,
                    stored,
                    computed,
                });
            }
        }
        Ok(out)
    }

    /// Repairs drifted balances for every customer, one transaction per
    /// customer; a failure is recorded in the report and the loop
    /// continues. Also backfills audit entries missing for historical
    /// rows. Idempotent: a second run with no intervening writes changes
    /// nothing.
    pub async fn reconcile(&self) -> LedgerResult<ReconcileReport> {
        let models = customers::Entity::find().all(&self.database).await?;
        let mut report = ReconcileReport::default();

        for model in models {
            report.examined += 1;
            let customer_id = match Uuid::parse_str(&model.id) {
                Ok(id) => id,
                Err(_) => {
                    report.failures.push((
                        Uuid::nil(),
                        LedgerError::CorruptState(format!("invalid customer id {}", model.id)),
                    ));
                    continue;
                }
            };

            match self.reconcile_one(customer_id).await {
                Ok((backfilled, repaired)) => {
                    report.backfilled_audits += backfilled;
                    if repaired {
                        report.repaired.push(customer_id);
                    }
                }
                Err(err) => {
                    tracing::warn!(customer_id = %customer_id, error = %err, "reconciliation failed");
                    report.failures.push((customer_id, err));
                }
            }
        }

        tracing::info!(
            examined = report.examined,
            repaired = report.repaired.len(),
            backfilled = report.backfilled_audits,
            failures = report.failures.len(),
            "reconciliation run finished"
        );
        Ok(report)
    }

    /// Clears `linked_transaction_id` values pointing at transactions that
    /// no longer exist or were soft-deleted. Returns how many links were
    /// cleared.
    pub async fn repair_orphaned_links(&self) -> LedgerResult<usize> {
        with_tx!(self, |db_tx| {
            async {
                let linked = transactions::Entity::find()
                    .filter(transactions::Column::LinkedTransactionId.is_not_null())
                    .all(&db_tx)
                    .await?;
                if linked.is_empty() {
                    return Ok(0);
                }

                let target_ids: Vec<String> = linked
                    .iter()
                    .filter_map(|m| m.linked_transaction_id.clone())
                    .collect();
                let live: HashSet<String> = transactions::Entity::find()
                    .select_only()
                    .column(transactions::Column::Id)
                    .filter(transactions::Column::Id.is_in(target_ids))
                    .filter(transactions::Column::IsDeleted.eq(false))
                    .into_tuple::<String>()
                    .all(&db_tx)
                    .await?
                    .into_iter()
                    .collect();

                let mut cleared = 0;
                for model in linked {
                    let Some(target) = model.linked_transaction_id.as_ref() else {
                        continue;
                    };
                    if live.contains(target) {
                        continue;
                    }
                    tracing::info!(
                        transaction_id = %model.id,
                        target = %target,
                        "clearing orphaned transaction link"
                    );
                    let patch = transactions::ActiveModel {
                        id: ActiveValue::Set(model.id.clone()),
                        linked_transaction_id: ActiveValue::Set(None),
                        ..Default::default()
                    };
                    patch.update(&db_tx).await?;
                    cleared += 1;
                }
                Ok(cleared)
            }
            .await
        })
    }

    /// Backfill plus repair for one customer in its own transaction, so
    /// its failure (commit included) is isolated from the rest of the run.
    async fn reconcile_one(&self, customer_id: Uuid) -> LedgerResult<(usize, bool)> {
        with_tx!(self, |db_tx| {
            self.reconcile_customer(&db_tx, customer_id).await
        })
    }

    /// Backfill plus repair for one customer, inside the caller's
    /// transaction. Returns `(backfilled_audits, repaired)`.
    async fn reconcile_customer(
        &self,
        db_tx: &impl ConnectionTrait,
        customer_id: Uuid,
    ) -> LedgerResult<(usize, bool)> {
        let backfilled = self.backfill_missing_audit(db_tx, customer_id).await?;
        let computed = self.replay_customer(db_tx, customer_id).await?;

        let model = customers::Entity::find_by_id(customer_id.to_string())
            .one(db_tx)
            .await?
            .ok_or_else(|| LedgerError::NotFound("customer not exists".to_string()))?;
        let stored = Balances {
            outstanding: Kobo::new(model.outstanding_minor),
            credit: Kobo::new(model.credit_minor),
        };
        if stored == computed {
            return Ok((backfilled, false));
        }

        tracing::warn!(
            customer_id = %customer_id,
            stored_outstanding = stored.outstanding.kobo(),
            computed_outstanding = computed.outstanding.kobo(),
            stored_credit = stored.credit.kobo(),
            computed_credit = computed.credit.kobo(),
            "balance drift repaired"
        );
        self.persist_balances(db_tx, customer_id, computed).await?;

        let entry = AuditEntry::new(
            customer_id,
            None,
            computed.outstanding.kobo() - stored.outstanding.kobo(),
            AuditPayload::Reconciliation {
                outstanding_before: stored.outstanding.kobo(),
                outstanding_after: computed.outstanding.kobo(),
                credit_before: stored.credit.kobo(),
                credit_after: computed.credit.kobo(),
            },
            Utc::now(),
        );
        self.append_audit(db_tx, &entry).await?;

        Ok((backfilled, true))
    }

    /// Writes the audit entries older data is missing: a `payment` entry
    /// for each debt payment that lacks one, and a `debt_incurred` entry
    /// for each sale/credit row so replay knows its initial remaining.
    async fn backfill_missing_audit(
        &self,
        db_tx: &impl ConnectionTrait,
        customer_id: Uuid,
    ) -> LedgerResult<usize> {
        let txs = self.load_live_transactions(db_tx, customer_id).await?;
        let audit_models = audit::Entity::find()
            .filter(audit::Column::CustomerId.eq(customer_id.to_string()))
            .all(db_tx)
            .await?;

        let mut kinds_by_source: HashMap<String, HashSet<String>> = HashMap::new();
        for model in &audit_models {
            if let Some(source) = model.source_transaction_id.as_ref() {
                kinds_by_source
                    .entry(source.clone())
                    .or_default()
                    .insert(model.kind.clone());
            }
        }
        let has_kind = |tx_id: &Uuid, kinds: &[&str]| {
            kinds_by_source
                .get(&tx_id.to_string())
                .is_some_and(|set| kinds.iter().any(|k| set.contains(*k)))
        };

        let mut backfilled = 0;
        for tx in &txs {
            match tx.kind {
                TransactionKind::Payment if tx.applied_to_debt => {
                    if has_kind(&tx.id, &["payment", "overpayment"]) {
                        continue;
                    }
                    let entry = AuditEntry::new(
                        customer_id,
                        Some(tx.id),
                        tx.amount_minor,
                        AuditPayload::Payment {
                            applied_to_debt: true,
                            debt_reduced: tx.amount_minor,
                            credit_created: 0,
                            settled: Vec::new(),
                        },
                        tx.occurred_at,
                    );
                    self.append_audit(db_tx, &entry).await?;
                    backfilled += 1;
                }
                TransactionKind::Sale | TransactionKind::Credit => {
                    if has_kind(&tx.id, &["debt_incurred"]) {
                        continue;
                    }
                    let initial_remaining = legacy_initial_remaining(tx);
                    let entry = AuditEntry::new(
                        customer_id,
                        Some(tx.id),
                        initial_remaining,
                        AuditPayload::DebtIncurred { initial_remaining },
                        tx.occurred_at,
                    );
                    self.append_audit(db_tx, &entry).await?;
                    backfilled += 1;
                }
                _ => {}
            }
        }
        Ok(backfilled)
    }

    /// Replays one customer's history: live transactions in ascending date
    /// order merged with the audit log's credit consumptions. The running
    /// debt is clamped at 0; surplus becomes credit, never negative debt.
    async fn replay_customer(
        &self,
        conn: &impl ConnectionTrait,
        customer_id: Uuid,
    ) -> LedgerResult<Balances> {
        let txs = self.load_live_transactions(conn, customer_id).await?;
        let live_ids: HashSet<Uuid> = txs.iter().map(|tx| tx.id).collect();

        let audit_models = audit::Entity::find()
            .filter(audit::Column::CustomerId.eq(customer_id.to_string()))
            .order_by_asc(audit::Column::CreatedAt)
            .order_by_asc(audit::Column::Id)
            .all(conn)
            .await?;

        let mut initial_remaining: HashMap<Uuid, i64> = HashMap::new();
        let mut events: Vec<(DateTime<Utc>, ReplayEvent)> = Vec::new();

        // Credit consumptions are pushed before transactions so the stable
        // sort applies them first on timestamp ties: a mixed payment
        // consumes credit before its cash component is allocated.
        for model in audit_models {
            let entry = AuditEntry::try_from(model)?;
            // Entries sourced from a cancelled transaction no longer count.
            if let Some(source) = entry.source_transaction_id
                && !live_ids.contains(&source)
            {
                continue;
            }
            match entry.payload {
                AuditPayload::DebtIncurred { initial_remaining: v } => {
                    if let Some(source) = entry.source_transaction_id {
                        initial_remaining.insert(source, v);
                    }
                }
                AuditPayload::CreditUsed {
                    used_minor,
                    toward_debt,
                    ..
                } => {
                    events.push((
                        entry.created_at,
                        ReplayEvent::CreditConsumed {
                            used_minor,
                            toward_debt,
                        },
                    ));
                }
                AuditPayload::CreditAppliedToSale { used_minor, .. } => {
                    events.push((
                        entry.created_at,
                        ReplayEvent::CreditConsumed {
                            used_minor,
                            toward_debt: true,
                        },
                    ));
                }
                _ => {}
            }
        }
        for tx in txs {
            events.push((tx.occurred_at, ReplayEvent::Transaction(tx)));
        }
        events.sort_by_key(|(at, _)| *at);

        let mut outstanding = Kobo::ZERO;
        let mut credit = Kobo::ZERO;
        for (_, event) in events {
            match event {
                ReplayEvent::Transaction(tx) => {
                    let incurred = initial_remaining
                        .get(&tx.id)
                        .copied()
                        .unwrap_or_else(|| legacy_initial_remaining(&tx));
                    match calculator::debt_impact(
                        tx.kind,
                        tx.amount_minor,
                        incurred,
                        tx.applied_to_debt,
                    ) {
                        DebtImpact::Increase(minor) => outstanding += Kobo::new(minor),
                        DebtImpact::Decrease(minor) => {
                            let amount = Kobo::new(minor);
                            let reduced = amount.min(outstanding);
                            outstanding -= reduced;
                            credit += amount - reduced;
                        }
                        // A payment routed past debt still raises credit.
                        DebtImpact::None => {
                            if tx.kind == TransactionKind::Payment {
                                credit += Kobo::new(tx.amount_minor);
                            }
                        }
                    }
                }
                ReplayEvent::CreditConsumed {
                    used_minor,
                    toward_debt,
                } => {
                    let used = Kobo::new(used_minor);
                    credit = credit.sub_clamped(used);
                    if toward_debt {
                        outstanding = outstanding.sub_clamped(used);
                    }
                }
            }
        }

        Ok(Balances {
            outstanding,
            credit,
        })
    }

    async fn load_live_transactions(
        &self,
        conn: &impl ConnectionTrait,
        customer_id: Uuid,
    ) -> LedgerResult<Vec<Transaction>> {
        let models = transactions::Entity::find()
            .filter(transactions::Column::CustomerId.eq(customer_id.to_string()))
            .filter(transactions::Column::IsDeleted.eq(false))
            .order_by_asc(transactions::Column::OccurredAt)
            .order_by_asc(transactions::Column::Id)
            .all(conn)
            .await?;
        models.into_iter().map(Transaction::try_from).collect()
    }
}
