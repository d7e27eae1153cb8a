use chrono::{DateTime, TimeZone, Utc};
use sea_orm::{Database, DatabaseConnection};
use uuid::Uuid;

use engine::{
    ApplyCreditCmd, CancelCmd, Kobo, Ledger, LedgerError, MixedPaymentCmd, PaymentCmd,
    PaymentMethod, RefundCmd, SaleCmd, TransactionStatus, UseCreditCmd,
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

/// Customer with one open credit sale of `amount` kobo.
async fn customer_with_debt(ledger: &Ledger, amount: i64) -> (Uuid, Uuid) {
    let customer = ledger.create_customer("Ada").await.unwrap();
    let sale_id = ledger
        .record_sale(SaleCmd::new(
            customer.id,
            PaymentMethod::Credit,
            amount,
            at(0),
        ))
        .await
        .unwrap();
    (customer.id, sale_id)
}

#[tokio::test]
async fn overpayment_splits_between_debt_and_credit() {
    let (ledger, _db) = ledger_with_db().await;
    let (customer_id, sale_id) = customer_with_debt(&ledger, 25_000).await;

    let allocation = ledger
        .allocate_payment(PaymentCmd::new(customer_id, 35_000, true, at(10)))
        .await
        .unwrap();
    assert_eq!(allocation.debt_reduced, Kobo::new(25_000));
    assert_eq!(allocation.credit_created, Kobo::new(10_000));

    let balances = ledger.customer_balances(customer_id).await.unwrap();
    assert_eq!(balances.outstanding, Kobo::ZERO);
    assert_eq!(balances.credit, Kobo::new(10_000));

    let sale = ledger.transaction(sale_id).await.unwrap();
    assert_eq!(sale.status, TransactionStatus::Completed);
    assert_eq!(sale.paid_minor, 25_000);
    assert_eq!(sale.remaining_minor, 0);

    let payment = ledger.transaction(allocation.transaction_id).await.unwrap();
    assert_eq!(payment.linked_transaction_id, Some(sale_id));
}

#[tokio::test]
async fn payment_with_no_debt_is_all_credit() {
    let (ledger, _db) = ledger_with_db().await;
    let customer = ledger.create_customer("Ada").await.unwrap();

    let allocation = ledger
        .allocate_payment(PaymentCmd::new(customer.id, 50_000, true, at(0)))
        .await
        .unwrap();
    assert_eq!(allocation.debt_reduced, Kobo::ZERO);
    assert_eq!(allocation.credit_created, Kobo::new(50_000));

    let balances = ledger.customer_balances(customer.id).await.unwrap();
    assert_eq!(balances.outstanding, Kobo::ZERO);
    assert_eq!(balances.credit, Kobo::new(50_000));
}

#[tokio::test]
async fn payment_not_marked_for_debt_leaves_debt_untouched() {
    let (ledger, _db) = ledger_with_db().await;
    let (customer_id, _) = customer_with_debt(&ledger, 10_000).await;

    let allocation = ledger
        .allocate_payment(PaymentCmd::new(customer_id, 4_000, false, at(10)))
        .await
        .unwrap();
    assert_eq!(allocation.debt_reduced, Kobo::ZERO);
    assert_eq!(allocation.credit_created, Kobo::new(4_000));

    let balances = ledger.customer_balances(customer_id).await.unwrap();
    assert_eq!(balances.outstanding, Kobo::new(10_000));
    assert_eq!(balances.credit, Kobo::new(4_000));
}

#[tokio::test]
async fn settlement_pays_open_sales_oldest_first() {
    let (ledger, _db) = ledger_with_db().await;
    let customer = ledger.create_customer("Ada").await.unwrap();
    let older = ledger
        .record_sale(SaleCmd::new(
            customer.id,
            PaymentMethod::Credit,
            10_000,
            at(0),
        ))
        .await
        .unwrap();
    let newer = ledger
        .record_sale(SaleCmd::new(
            customer.id,
            PaymentMethod::Credit,
            5_000,
            at(5),
        ))
        .await
        .unwrap();

    ledger
        .allocate_payment(PaymentCmd::new(customer.id, 12_000, true, at(10)))
        .await
        .unwrap();

    let first = ledger.transaction(older).await.unwrap();
    assert_eq!(first.status, TransactionStatus::Completed);
    assert_eq!(first.paid_minor, 10_000);
    assert_eq!(first.remaining_minor, 0);

    let second = ledger.transaction(newer).await.unwrap();
    assert_eq!(second.status, TransactionStatus::Partial);
    assert_eq!(second.paid_minor, 2_000);
    assert_eq!(second.remaining_minor, 3_000);
    assert_eq!(second.paid_minor + second.remaining_minor, second.amount_minor);

    let balances = ledger.customer_balances(customer.id).await.unwrap();
    assert_eq!(balances.outstanding, Kobo::new(3_000));
}

#[tokio::test]
async fn mixed_payment_consumes_credit_then_cash() {
    let (ledger, _db) = ledger_with_db().await;
    let customer = ledger.create_customer("Ada").await.unwrap();
    ledger
        .allocate_payment(PaymentCmd::new(customer.id, 6_000, false, at(0)))
        .await
        .unwrap();
    let sale_id = ledger
        .record_sale(SaleCmd::new(
            customer.id,
            PaymentMethod::Credit,
            12_567,
            at(5),
        ))
        .await
        .unwrap();

    let outcome = ledger
        .mixed_payment(MixedPaymentCmd::new(
            customer.id,
            12_567,
            7_534,
            5_033,
            at(10),
        ))
        .await
        .unwrap();
    assert_eq!(outcome.cash_processed, Kobo::new(7_534));
    assert_eq!(outcome.credit_used, Kobo::new(5_033));

    let balances = ledger.customer_balances(customer.id).await.unwrap();
    assert_eq!(balances.outstanding, Kobo::ZERO);
    assert_eq!(balances.credit, Kobo::new(967));

    // Both components settled the sale row, not just the balances.
    let sale = ledger.transaction(sale_id).await.unwrap();
    assert_eq!(sale.status, TransactionStatus::Completed);
    assert_eq!(sale.paid_minor, 12_567);
    assert_eq!(sale.remaining_minor, 0);

    let payment = ledger.transaction(outcome.transaction_id).await.unwrap();
    assert_eq!(payment.linked_transaction_id, Some(sale_id));
}

#[tokio::test]
async fn mixed_payment_short_allocates_available_credit() {
    let (ledger, _db) = ledger_with_db().await;
    let customer = ledger.create_customer("Ada").await.unwrap();
    ledger
        .allocate_payment(PaymentCmd::new(customer.id, 1_000, false, at(0)))
        .await
        .unwrap();
    let sale_id = ledger
        .record_sale(SaleCmd::new(
            customer.id,
            PaymentMethod::Credit,
            12_567,
            at(5),
        ))
        .await
        .unwrap();

    let outcome = ledger
        .mixed_payment(MixedPaymentCmd::new(
            customer.id,
            12_567,
            7_534,
            5_033,
            at(10),
        ))
        .await
        .unwrap();
    assert_eq!(outcome.credit_used, Kobo::new(1_000));

    let balances = ledger.customer_balances(customer.id).await.unwrap();
    assert_eq!(balances.outstanding, Kobo::new(4_033));
    assert_eq!(balances.credit, Kobo::ZERO);

    let sale = ledger.transaction(sale_id).await.unwrap();
    assert_eq!(sale.status, TransactionStatus::Partial);
    assert_eq!(sale.remaining_minor, 4_033);
}

#[tokio::test]
async fn credit_only_mixed_payment_dedupes_on_resubmission() {
    let (ledger, _db) = ledger_with_db().await;
    let customer = ledger.create_customer("Ada").await.unwrap();
    ledger
        .allocate_payment(PaymentCmd::new(customer.id, 10_000, false, at(0)))
        .await
        .unwrap();
    let sale_id = ledger
        .record_sale(SaleCmd::new(
            customer.id,
            PaymentMethod::Credit,
            4_000,
            at(5),
        ))
        .await
        .unwrap();

    let cmd = MixedPaymentCmd::new(customer.id, 4_000, 0, 4_000, at(10)).idempotency_key("mp-1");
    let first = ledger.mixed_payment(cmd.clone()).await.unwrap();
    assert_eq!(first.credit_used, Kobo::new(4_000));
    assert_eq!(first.cash_processed, Kobo::ZERO);

    let second = ledger.mixed_payment(cmd).await.unwrap();
    assert_eq!(second.transaction_id, first.transaction_id);
    assert_eq!(second.credit_used, Kobo::new(4_000));

    // Credit was consumed once, not twice.
    let balances = ledger.customer_balances(customer.id).await.unwrap();
    assert_eq!(balances.outstanding, Kobo::ZERO);
    assert_eq!(balances.credit, Kobo::new(6_000));

    let sale = ledger.transaction(sale_id).await.unwrap();
    assert_eq!(sale.status, TransactionStatus::Completed);
    assert_eq!(sale.remaining_minor, 0);
}

#[tokio::test]
async fn cancelling_a_mixed_payment_restores_credit_and_sales() {
    let (ledger, _db) = ledger_with_db().await;
    let customer = ledger.create_customer("Ada").await.unwrap();
    ledger
        .allocate_payment(PaymentCmd::new(customer.id, 10_000, false, at(0)))
        .await
        .unwrap();
    let sale_id = ledger
        .record_sale(SaleCmd::new(
            customer.id,
            PaymentMethod::Credit,
            4_000,
            at(5),
        ))
        .await
        .unwrap();
    let outcome = ledger
        .mixed_payment(MixedPaymentCmd::new(customer.id, 4_000, 0, 4_000, at(10)))
        .await
        .unwrap();

    ledger
        .cancel_transaction(CancelCmd::new(outcome.transaction_id, at(20)))
        .await
        .unwrap();

    let balances = ledger.customer_balances(customer.id).await.unwrap();
    assert_eq!(balances.outstanding, Kobo::new(4_000));
    assert_eq!(balances.credit, Kobo::new(10_000));

    let sale = ledger.transaction(sale_id).await.unwrap();
    assert_eq!(sale.status, TransactionStatus::Pending);
    assert_eq!(sale.remaining_minor, 4_000);

    let computed = ledger.recompute_customer_balance(customer.id).await.unwrap();
    assert_eq!(computed, balances);
}

#[tokio::test]
async fn mixed_payment_components_must_sum_to_total() {
    let (ledger, _db) = ledger_with_db().await;
    let customer = ledger.create_customer("Ada").await.unwrap();

    let err = ledger
        .mixed_payment(MixedPaymentCmd::new(customer.id, 12_567, 7_000, 5_033, at(0)))
        .await
        .unwrap_err();
    assert_eq!(
        err,
        LedgerError::Validation("cash and credit must equal total amount".to_string())
    );
}

#[tokio::test]
async fn use_credit_caps_at_stored_balance() {
    let (ledger, _db) = ledger_with_db().await;
    let customer = ledger.create_customer("Ada").await.unwrap();
    ledger
        .allocate_payment(PaymentCmd::new(customer.id, 15_000, false, at(0)))
        .await
        .unwrap();

    let outcome = ledger
        .use_credit(UseCreditCmd::new(customer.id, 30_000, at(10)))
        .await
        .unwrap();
    assert_eq!(outcome.used, Kobo::new(15_000));
    assert_eq!(outcome.remaining, Kobo::ZERO);

    let outcome = ledger
        .use_credit(UseCreditCmd::new(customer.id, 1_000, at(20)))
        .await
        .unwrap();
    assert_eq!(outcome.used, Kobo::ZERO);
}

#[tokio::test]
async fn apply_credit_settles_a_specific_sale() {
    let (ledger, _db) = ledger_with_db().await;
    let customer = ledger.create_customer("Ada").await.unwrap();
    ledger
        .allocate_payment(PaymentCmd::new(customer.id, 5_000, false, at(0)))
        .await
        .unwrap();
    let sale_id = ledger
        .record_sale(SaleCmd::new(
            customer.id,
            PaymentMethod::Credit,
            10_000,
            at(5),
        ))
        .await
        .unwrap();

    let outcome = ledger
        .apply_credit_to_sale(ApplyCreditCmd::new(customer.id, 3_000, sale_id, at(10)))
        .await
        .unwrap();
    assert_eq!(outcome.used, Kobo::new(3_000));
    assert_eq!(outcome.remaining, Kobo::new(2_000));

    let sale = ledger.transaction(sale_id).await.unwrap();
    assert_eq!(sale.status, TransactionStatus::Partial);
    assert_eq!(sale.paid_minor, 3_000);
    assert_eq!(sale.remaining_minor, 7_000);

    let balances = ledger.customer_balances(customer.id).await.unwrap();
    assert_eq!(balances.outstanding, Kobo::new(7_000));
    assert_eq!(balances.credit, Kobo::new(2_000));
}

#[tokio::test]
async fn refund_reduces_debt_then_credits_the_rest() {
    let (ledger, _db) = ledger_with_db().await;
    let (customer_id, _) = customer_with_debt(&ledger, 5_000).await;

    let allocation = ledger
        .record_refund(RefundCmd::new(customer_id, 8_000, at(10)))
        .await
        .unwrap();
    assert_eq!(allocation.debt_reduced, Kobo::new(5_000));
    assert_eq!(allocation.credit_created, Kobo::new(3_000));

    let balances = ledger.customer_balances(customer_id).await.unwrap();
    assert_eq!(balances.outstanding, Kobo::ZERO);
    assert_eq!(balances.credit, Kobo::new(3_000));
}

#[tokio::test]
async fn duplicate_payment_key_returns_original_allocation() {
    let (ledger, _db) = ledger_with_db().await;
    let (customer_id, _) = customer_with_debt(&ledger, 25_000).await;

    let cmd = PaymentCmd::new(customer_id, 10_000, true, at(10)).idempotency_key("pay-1");
    let first = ledger.allocate_payment(cmd.clone()).await.unwrap();
    let second = ledger.allocate_payment(cmd).await.unwrap();

    assert_eq!(first.transaction_id, second.transaction_id);
    assert_eq!(first.debt_reduced, second.debt_reduced);

    let balances = ledger.customer_balances(customer_id).await.unwrap();
    assert_eq!(balances.outstanding, Kobo::new(15_000));
    assert_eq!(balances.credit, Kobo::ZERO);

    // Sale plus one payment; the resubmission added no row.
    let txs = ledger
        .transactions_for_customer(customer_id, true)
        .await
        .unwrap();
    assert_eq!(txs.len(), 2);
}

#[tokio::test]
async fn duplicate_sale_key_returns_original_transaction() {
    let (ledger, _db) = ledger_with_db().await;
    let customer = ledger.create_customer("Ada").await.unwrap();

    let cmd = SaleCmd::new(customer.id, PaymentMethod::Credit, 10_000, at(0))
        .idempotency_key("sale-1");
    let first = ledger.record_sale(cmd.clone()).await.unwrap();
    let second = ledger.record_sale(cmd).await.unwrap();
    assert_eq!(first, second);

    let balances = ledger.customer_balances(customer.id).await.unwrap();
    assert_eq!(balances.outstanding, Kobo::new(10_000));
}

#[tokio::test]
async fn cancelling_a_partially_paid_sale_reverses_its_remaining() {
    let (ledger, _db) = ledger_with_db().await;
    let (customer_id, sale_id) = customer_with_debt(&ledger, 10_000).await;
    ledger
        .allocate_payment(PaymentCmd::new(customer_id, 4_000, true, at(10)))
        .await
        .unwrap();

    ledger
        .cancel_transaction(CancelCmd::new(sale_id, at(20)).reason("wrong item"))
        .await
        .unwrap();

    // Remaining debt vanishes; the 4_000 already paid comes back as credit.
    let balances = ledger.customer_balances(customer_id).await.unwrap();
    assert_eq!(balances.outstanding, Kobo::ZERO);
    assert_eq!(balances.credit, Kobo::new(4_000));

    let sale = ledger.transaction(sale_id).await.unwrap();
    assert!(sale.is_deleted);
    assert_eq!(sale.status, TransactionStatus::Cancelled);

    // Stored balances agree with a from-scratch replay.
    let computed = ledger.recompute_customer_balance(customer_id).await.unwrap();
    assert_eq!(computed, balances);
}

#[tokio::test]
async fn cancelling_a_payment_restores_the_sales_it_settled() {
    let (ledger, _db) = ledger_with_db().await;
    let (customer_id, sale_id) = customer_with_debt(&ledger, 10_000).await;
    let allocation = ledger
        .allocate_payment(PaymentCmd::new(customer_id, 4_000, true, at(10)))
        .await
        .unwrap();

    ledger
        .cancel_transaction(CancelCmd::new(allocation.transaction_id, at(20)))
        .await
        .unwrap();

    let balances = ledger.customer_balances(customer_id).await.unwrap();
    assert_eq!(balances.outstanding, Kobo::new(10_000));
    assert_eq!(balances.credit, Kobo::ZERO);

    let sale = ledger.transaction(sale_id).await.unwrap();
    assert_eq!(sale.status, TransactionStatus::Pending);
    assert_eq!(sale.paid_minor, 0);
    assert_eq!(sale.remaining_minor, 10_000);
}

#[tokio::test]
async fn cancelling_twice_is_rejected() {
    let (ledger, _db) = ledger_with_db().await;
    let (_, sale_id) = customer_with_debt(&ledger, 10_000).await;

    ledger
        .cancel_transaction(CancelCmd::new(sale_id, at(10)))
        .await
        .unwrap();
    let err = ledger
        .cancel_transaction(CancelCmd::new(sale_id, at(20)))
        .await
        .unwrap_err();
    assert_eq!(
        err,
        LedgerError::Validation("transaction already cancelled".to_string())
    );
}

#[tokio::test]
async fn non_positive_payment_is_rejected() {
    let (ledger, _db) = ledger_with_db().await;
    let customer = ledger.create_customer("Ada").await.unwrap();

    let err = ledger
        .allocate_payment(PaymentCmd::new(customer.id, 0, true, at(0)))
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::InvalidAmount(_)));

    let err = ledger
        .allocate_payment(PaymentCmd::new(customer.id, -500, true, at(0)))
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::InvalidAmount(_)));
}

#[tokio::test]
async fn unknown_customer_is_not_found() {
    let (ledger, _db) = ledger_with_db().await;

    let err = ledger
        .allocate_payment(PaymentCmd::new(Uuid::new_v4(), 1_000, true, at(0)))
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::NotFound(_)));
}
