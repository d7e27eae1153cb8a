use chrono::{DateTime, TimeZone, Utc};
use sea_orm::{ConnectionTrait, Database, DatabaseConnection, Statement};
use uuid::Uuid;

use engine::{
    AuditKind, Balances, CancelCmd, Kobo, Ledger, PaymentCmd, PaymentMethod, SaleCmd,
};
use migration::MigratorTrait;

async fn ledger_with_db() -> (Ledger, DatabaseConnection) {
    let db = Database::connect("sqlite::memory:").await.unwrap();
    migration::Migrator::up(&db, None).await.unwrap();
    let ledger = Ledger::builder()
        .database(db.clone())
        .build()
        .await
        .unwrap();
    (ledger, db)
}

fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
}

/// Corrupts the cached balance columns behind the engine's back.
async fn set_stored_balances(
    db: &DatabaseConnection,
    customer_id: Uuid,
    outstanding: i64,
    credit: i64,
) {
    let backend = db.get_database_backend();
    db.execute(Statement::from_sql_and_values(
        backend,
        "UPDATE customers SET outstanding_minor = ?, credit_minor = ? WHERE id = ?",
        vec![
            outstanding.into(),
            credit.into(),
            customer_id.to_string().into(),
        ],
    ))
    .await
    .unwrap();
}

#[tokio::test]
async fn detect_reports_drifted_balances() {
    let (ledger, db) = ledger_with_db().await;
    let customer = ledger.create_customer("Ada").await.unwrap();
    ledger
        .record_sale(SaleCmd::new(
            customer.id,
            PaymentMethod::Credit,
            10_000,
            at(0),
        ))
        .await
        .unwrap();

    set_stored_balances(&db, customer.id, 4_000, 0).await;

    let discrepancies = ledger.detect_discrepancies().await.unwrap();
    assert_eq!(discrepancies.len(), 1);
    let d = &discrepancies[0];
    assert_eq!(d.customer_id, customer.id);
    assert_eq!(d.stored.outstanding, Kobo::new(4_000));
    assert_eq!(d.computed.outstanding, Kobo::new(10_000));
    assert_eq!(d.outstanding_difference(), 6_000);
}

#[tokio::test]
async fn reconcile_repairs_drift_and_logs_it() {
    let (ledger, db) = ledger_with_db().await;
    let customer = ledger.create_customer("Ada").await.unwrap();
    ledger
        .record_sale(SaleCmd::new(
            customer.id,
            PaymentMethod::Credit,
            10_000,
            at(0),
        ))
        .await
        .unwrap();
    set_stored_balances(&db, customer.id, 4_000, 123).await;

    let report = ledger.reconcile().await.unwrap();
    assert_eq!(report.examined, 1);
    assert_eq!(report.repaired, vec![customer.id]);
    assert!(report.failures.is_empty());

    let balances = ledger.customer_balances(customer.id).await.unwrap();
    assert_eq!(balances.outstanding, Kobo::new(10_000));
    assert_eq!(balances.credit, Kobo::ZERO);

    let entries = ledger.audit_entries(customer.id).await.unwrap();
    assert!(
        entries
            .iter()
            .any(|e| e.kind == AuditKind::Reconciliation)
    );

    assert!(ledger.detect_discrepancies().await.unwrap().is_empty());
}

#[tokio::test]
async fn reconcile_twice_changes_nothing() {
    let (ledger, db) = ledger_with_db().await;
    let customer = ledger.create_customer("Ada").await.unwrap();
    ledger
        .record_sale(SaleCmd::new(
            customer.id,
            PaymentMethod::Credit,
            10_000,
            at(0),
        ))
        .await
        .unwrap();
    set_stored_balances(&db, customer.id, 0, 0).await;

    ledger.reconcile().await.unwrap();
    let report = ledger.reconcile().await.unwrap();
    assert!(report.repaired.is_empty());
    assert_eq!(report.backfilled_audits, 0);
    assert!(report.failures.is_empty());
}

#[tokio::test]
async fn replay_clamps_debt_at_zero_with_surplus_as_credit() {
    let (ledger, db) = ledger_with_db().await;
    let customer = ledger.create_customer("Ada").await.unwrap();
    ledger
        .record_sale(SaleCmd::new(
            customer.id,
            PaymentMethod::Credit,
            5_000,
            at(0),
        ))
        .await
        .unwrap();
    ledger
        .allocate_payment(PaymentCmd::new(customer.id, 8_000, true, at(10)))
        .await
        .unwrap();
    set_stored_balances(&db, customer.id, 999, 999).await;

    ledger.reconcile().await.unwrap();

    let balances = ledger.customer_balances(customer.id).await.unwrap();
    assert_eq!(
        balances,
        Balances {
            outstanding: Kobo::ZERO,
            credit: Kobo::new(3_000),
        }
    );
}

#[tokio::test]
async fn replay_routes_unapplied_payments_to_credit() {
    let (ledger, db) = ledger_with_db().await;
    let customer = ledger.create_customer("Ada").await.unwrap();
    ledger
        .record_sale(SaleCmd::new(
            customer.id,
            PaymentMethod::Credit,
            5_000,
            at(0),
        ))
        .await
        .unwrap();
    ledger
        .allocate_payment(PaymentCmd::new(customer.id, 4_000, false, at(10)))
        .await
        .unwrap();
    set_stored_balances(&db, customer.id, 0, 0).await;

    ledger.reconcile().await.unwrap();

    // The unapplied payment replays as credit; the debt stays untouched.
    let balances = ledger.customer_balances(customer.id).await.unwrap();
    assert_eq!(balances.outstanding, Kobo::new(5_000));
    assert_eq!(balances.credit, Kobo::new(4_000));
}

#[tokio::test]
async fn replay_skips_cancelled_transactions() {
    let (ledger, db) = ledger_with_db().await;
    let customer = ledger.create_customer("Ada").await.unwrap();
    let sale_id = ledger
        .record_sale(SaleCmd::new(
            customer.id,
            PaymentMethod::Credit,
            10_000,
            at(0),
        ))
        .await
        .unwrap();
    ledger
        .allocate_payment(PaymentCmd::new(customer.id, 4_000, true, at(10)))
        .await
        .unwrap();
    ledger
        .cancel_transaction(CancelCmd::new(sale_id, at(20)))
        .await
        .unwrap();

    let before = ledger.customer_balances(customer.id).await.unwrap();
    assert_eq!(before.outstanding, Kobo::ZERO);
    assert_eq!(before.credit, Kobo::new(4_000));

    set_stored_balances(&db, customer.id, 7_777, 0).await;
    ledger.reconcile().await.unwrap();

    let after = ledger.customer_balances(customer.id).await.unwrap();
    assert_eq!(after, before);
}

#[tokio::test]
async fn reconcile_backfills_audit_for_legacy_rows() {
    let (ledger, db) = ledger_with_db().await;
    let customer = ledger.create_customer("Ada").await.unwrap();

    // A debt payment recorded before the audit log existed: raw row, no
    // audit entries at all.
    let backend = db.get_database_backend();
    db.execute(Statement::from_sql_and_values(
        backend,
        "INSERT INTO transactions (id, customer_id, kind, payment_method, amount_minor, \
         paid_minor, remaining_minor, applied_to_debt, status, occurred_at, is_deleted) \
         VALUES (?, ?, 'payment', 'cash', ?, ?, 0, ?, 'completed', ?, ?)",
        vec![
            Uuid::new_v4().to_string().into(),
            customer.id.to_string().into(),
            7_000i64.into(),
            7_000i64.into(),
            true.into(),
            at(0).into(),
            false.into(),
        ],
    ))
    .await
    .unwrap();

    let report = ledger.reconcile().await.unwrap();
    assert_eq!(report.backfilled_audits, 1);
    assert_eq!(report.repaired, vec![customer.id]);

    // No open debt, so the legacy payment replays as credit.
    let balances = ledger.customer_balances(customer.id).await.unwrap();
    assert_eq!(balances.outstanding, Kobo::ZERO);
    assert_eq!(balances.credit, Kobo::new(7_000));

    let entries = ledger.audit_entries(customer.id).await.unwrap();
    assert!(entries.iter().any(|e| e.kind == AuditKind::Payment));
}

#[tokio::test]
async fn repair_orphaned_links_clears_links_to_cancelled_targets() {
    let (ledger, _db) = ledger_with_db().await;
    let customer = ledger.create_customer("Ada").await.unwrap();
    let sale_id = ledger
        .record_sale(SaleCmd::new(
            customer.id,
            PaymentMethod::Credit,
            10_000,
            at(0),
        ))
        .await
        .unwrap();
    let allocation = ledger
        .allocate_payment(PaymentCmd::new(customer.id, 4_000, true, at(10)))
        .await
        .unwrap();

    let payment = ledger.transaction(allocation.transaction_id).await.unwrap();
    assert_eq!(payment.linked_transaction_id, Some(sale_id));

    ledger
        .cancel_transaction(CancelCmd::new(sale_id, at(20)))
        .await
        .unwrap();

    let cleared = ledger.repair_orphaned_links().await.unwrap();
    assert_eq!(cleared, 1);
    let payment = ledger.transaction(allocation.transaction_id).await.unwrap();
    assert_eq!(payment.linked_transaction_id, None);

    // Nothing left to clear on a second run.
    assert_eq!(ledger.repair_orphaned_links().await.unwrap(), 0);
}

#[tokio::test]
async fn recompute_for_unknown_customer_is_not_found() {
    let (ledger, _db) = ledger_with_db().await;
    let err = ledger
        .recompute_customer_balance(Uuid::new_v4())
        .await
        .unwrap_err();
    assert!(matches!(err, engine::LedgerError::NotFound(_)));
}
