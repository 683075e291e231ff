#![allow(dead_code)]

use std::str::FromStr;

use rust_decimal::Decimal;
use unifarm::db::{ user, TransactionFilter };
use unifarm::enums::{ Currency, TransactionKind };
use unifarm::services::Balances;
use unifarm::test_utils::{ create_test_user, setup_test_ledger, TestLedger };

pub fn dec(raw: &str) -> Decimal {
    Decimal::from_str(raw).expect("valid decimal literal")
}

pub async fn setup() -> TestLedger {
    setup_test_ledger().await.expect("Failed to set up test ledger")
}

/// A user whose balances come from ledger-recorded deposits, so
/// reconciliation holds from the start.
pub async fn funded_user(ledger: &TestLedger, telegram_id: i64, uni: &str, ton: &str) -> user::Model {
    let user = create_test_user(&ledger.db, telegram_id).await.expect("Failed to create user");
    for (raw, currency) in [(uni, Currency::Uni), (ton, Currency::Ton)] {
        let amount = dec(raw);
        if !amount.is_zero() {
            ledger.wallet
                .deposit(user.id, amount, currency, None).await
                .expect("Failed to fund user");
        }
    }
    user
}

pub async fn balances(ledger: &TestLedger, user_id: i64) -> Balances {
    ledger.balances.get_balance(user_id).await.expect("Failed to read balance")
}

/// Completed rows of `kind` for the user.
pub async fn count_kind(ledger: &TestLedger, user_id: i64, kind: TransactionKind) -> usize {
    let page = ledger.transactions
        .list_user_transactions(user_id, TransactionFilter::default(), Some(1), Some(100)).await
        .expect("Failed to list transactions");
    page.items
        .iter()
        .filter(|item| item.kind == kind)
        .count()
}

pub async fn assert_reconciles(ledger: &TestLedger, user_id: i64) {
    let report = ledger.reconciliation.reconcile_user(user_id).await.expect("Failed to reconcile");
    assert!(report.is_consistent(), "user {} drifted: {:?}", user_id, report);
}
