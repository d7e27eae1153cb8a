//! Pure transaction arithmetic.
//!
//! Everything in this module is a side-effect-free function over integer
//! kobo: initial paid/remaining split, settlement status, and the signed
//! debt impact a transaction has on the customer's outstanding balance. The
//! allocation and reconciliation ops call these; nothing here touches the
//! database.

use crate::{
    LedgerError, LedgerResult,
    transactions::{PaymentMethod, TransactionKind, TransactionStatus},
};

/// Initial paid/remaining split for a new transaction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct InitialAmounts {
    pub paid_minor: i64,
    pub remaining_minor: i64,
}

/// Signed change one transaction applies to the outstanding balance.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DebtImpact {
    Increase(i64),
    Decrease(i64),
    None,
}

/// Derives the initial `paid`/`remaining` split from kind and payment
/// method.
///
/// - sale paid by cash/bank/POS settles immediately (`remaining = 0`)
/// - sale on credit and credit issuance are all-debt (`paid = 0`)
/// - mixed sale needs the caller-supplied paid portion, `0 ≤ paid ≤ amount`
/// - payments and refunds are always fully paid on creation
pub fn initial_amounts(
    kind: TransactionKind,
    method: PaymentMethod,
    amount_minor: i64,
    provided_paid_minor: Option<i64>,
) -> LedgerResult<InitialAmounts> {
    if amount_minor < 0 {
        return Err(LedgerError::InvalidAmount(
            "amount must not be negative".to_string(),
        ));
    }

    match kind {
        TransactionKind::Sale => match method {
            PaymentMethod::Cash | PaymentMethod::BankTransfer | PaymentMethod::PosCard => {
                Ok(InitialAmounts {
                    paid_minor: amount_minor,
                    remaining_minor: 0,
                })
            }
            PaymentMethod::Credit => Ok(InitialAmounts {
                paid_minor: 0,
                remaining_minor: amount_minor,
            }),
            PaymentMethod::Mixed => {
                let paid = provided_paid_minor.ok_or_else(|| {
                    LedgerError::Validation(
                        "mixed sale requires a paid amount".to_string(),
                    )
                })?;
                if paid < 0 || paid > amount_minor {
                    return Err(LedgerError::Validation(
                        "mixed sale paid amount must be between 0 and the total".to_string(),
                    ));
                }
                Ok(InitialAmounts {
                    paid_minor: paid,
                    remaining_minor: amount_minor - paid,
                })
            }
        },
        TransactionKind::Credit => Ok(InitialAmounts {
            paid_minor: 0,
            remaining_minor: amount_minor,
        }),
        TransactionKind::Payment | TransactionKind::Refund => Ok(InitialAmounts {
            paid_minor: amount_minor,
            remaining_minor: 0,
        }),
    }
}

/// Settlement status from the current amounts.
///
/// Zero-amount transactions resolve `completed` (documented edge case, not
/// an error).
pub fn status_for(
    kind: TransactionKind,
    amount_minor: i64,
    paid_minor: i64,
    remaining_minor: i64,
) -> TransactionStatus {
    match kind {
        TransactionKind::Payment | TransactionKind::Refund => TransactionStatus::Completed,
        TransactionKind::Sale | TransactionKind::Credit => {
            if remaining_minor == 0 {
                TransactionStatus::Completed
            } else if paid_minor == 0 && remaining_minor == amount_minor {
                TransactionStatus::Pending
            } else {
                TransactionStatus::Partial
            }
        }
    }
}

/// Signed debt impact of one transaction.
///
/// Debt-creating kinds increase by their *remaining* portion; a payment
/// routed to credit (`applied_to_debt = false`) leaves debt untouched.
pub fn debt_impact(
    kind: TransactionKind,
    amount_minor: i64,
    remaining_minor: i64,
    applied_to_debt: bool,
) -> DebtImpact {
    match kind {
        TransactionKind::Sale | TransactionKind::Credit => {
            if remaining_minor > 0 {
                DebtImpact::Increase(remaining_minor)
            } else {
                DebtImpact::None
            }
        }
        TransactionKind::Payment => {
            if applied_to_debt {
                DebtImpact::Decrease(amount_minor)
            } else {
                DebtImpact::None
            }
        }
        TransactionKind::Refund => DebtImpact::Decrease(amount_minor),
    }
}

/// Checks a mixed payment's component split.
pub fn validate_mixed_payment(
    total_minor: i64,
    cash_minor: i64,
    credit_minor: i64,
) -> LedgerResult<()> {
    if cash_minor < 0 || credit_minor < 0 {
        return Err(LedgerError::Validation(
            "payment components cannot be negative".to_string(),
        ));
    }
    if cash_minor + credit_minor != total_minor {
        return Err(LedgerError::Validation(
            "cash and credit must equal total amount".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sale_split_follows_payment_method() {
        let cash = initial_amounts(
            TransactionKind::Sale,
            PaymentMethod::Cash,
            10_000,
            None,
        )
        .unwrap();
        assert_eq!(cash.paid_minor, 10_000);
        assert_eq!(cash.remaining_minor, 0);

        let on_credit = initial_amounts(
            TransactionKind::Sale,
            PaymentMethod::Credit,
            10_000,
            None,
        )
        .unwrap();
        assert_eq!(on_credit.paid_minor, 0);
        assert_eq!(on_credit.remaining_minor, 10_000);

        let loan = initial_amounts(
            TransactionKind::Credit,
            PaymentMethod::Credit,
            5_000,
            None,
        )
        .unwrap();
        assert_eq!(loan.remaining_minor, 5_000);
    }

    #[test]
    fn mixed_sale_requires_bounded_paid_amount() {
        let split = initial_amounts(
            TransactionKind::Sale,
            PaymentMethod::Mixed,
            12_567,
            Some(7_534),
        )
        .unwrap();
        assert_eq!(split.paid_minor, 7_534);
        assert_eq!(split.remaining_minor, 5_033);

        assert!(
            initial_amounts(TransactionKind::Sale, PaymentMethod::Mixed, 10_000, None).is_err()
        );
        assert!(
            initial_amounts(
                TransactionKind::Sale,
                PaymentMethod::Mixed,
                10_000,
                Some(10_001)
            )
            .is_err()
        );
        assert!(
            initial_amounts(
                TransactionKind::Sale,
                PaymentMethod::Mixed,
                10_000,
                Some(-1)
            )
            .is_err()
        );
    }

    #[test]
    fn status_transitions_with_remaining() {
        assert_eq!(
            status_for(TransactionKind::Sale, 10_000, 0, 10_000),
            TransactionStatus::Pending
        );
        assert_eq!(
            status_for(TransactionKind::Sale, 10_000, 4_000, 6_000),
            TransactionStatus::Partial
        );
        assert_eq!(
            status_for(TransactionKind::Sale, 10_000, 10_000, 0),
            TransactionStatus::Completed
        );
        // Zero-amount transactions resolve completed.
        assert_eq!(
            status_for(TransactionKind::Sale, 0, 0, 0),
            TransactionStatus::Completed
        );
        assert_eq!(
            status_for(TransactionKind::Payment, 10_000, 10_000, 0),
            TransactionStatus::Completed
        );
    }

    #[test]
    fn debt_impact_by_kind() {
        assert_eq!(
            debt_impact(TransactionKind::Sale, 10_000, 10_000, false),
            DebtImpact::Increase(10_000)
        );
        assert_eq!(
            debt_impact(TransactionKind::Sale, 10_000, 0, false),
            DebtImpact::None
        );
        assert_eq!(
            debt_impact(TransactionKind::Payment, 5_000, 0, true),
            DebtImpact::Decrease(5_000)
        );
        assert_eq!(
            debt_impact(TransactionKind::Payment, 5_000, 0, false),
            DebtImpact::None
        );
        assert_eq!(
            debt_impact(TransactionKind::Refund, 3_000, 0, false),
            DebtImpact::Decrease(3_000)
        );
    }

    #[test]
    fn mixed_payment_validation() {
        assert!(validate_mixed_payment(12_567, 7_534, 5_033).is_ok());
        assert_eq!(
            validate_mixed_payment(12_567, 7_534, 5_034),
            Err(LedgerError::Validation(
                "cash and credit must equal total amount".to_string()
            ))
        );
        assert_eq!(
            validate_mixed_payment(100, -50, 150),
            Err(LedgerError::Validation(
                "payment components cannot be negative".to_string()
            ))
        );
    }
}
