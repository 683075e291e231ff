mod common;

use common::*;
use unifarm::enums::{ Currency, TransactionKind };
use unifarm::error::AppError;
use unifarm::services::{ AccrualOutcome, AccrualStream, CreateTransactionRequest, TransactionOutcome };
use unifarm::test_utils::{
    create_test_user,
    fixed_time,
    setup_test_ledger_with_failing_notifier,
    start_uni_farming,
};

#[tokio::test]
async fn replayed_deposit_hash_credits_once() {
    let ledger = setup().await;
    let user = create_test_user(&ledger.db, 1).await.unwrap();
    let hash = Some("0xabc123".to_string());

    let first = ledger.wallet.deposit(user.id, dec("25"), Currency::Ton, hash.clone()).await.unwrap();
    let second = ledger.wallet.deposit(user.id, dec("25"), Currency::Ton, hash).await.unwrap();

    assert!(!first.is_duplicate());
    assert!(second.is_duplicate());
    assert_eq!(first.transaction().id, second.transaction().id);
    assert_eq!(balances(&ledger, user.id).await.ton, dec("25"));
    assert_eq!(count_kind(&ledger, user.id, TransactionKind::Deposit).await, 1);
    assert_eq!(ledger.notifier.events_for(user.id).len(), 1);
}

#[tokio::test]
async fn concurrent_deposits_with_one_hash_credit_once() {
    let ledger = setup().await;
    let user = create_test_user(&ledger.db, 1).await.unwrap();

    let (a, b) = tokio::join!(
        ledger.wallet.deposit(user.id, dec("10"), Currency::Uni, Some("hash-1".to_string())),
        ledger.wallet.deposit(user.id, dec("10"), Currency::Uni, Some("hash-1".to_string()))
    );

    let duplicates = [a.unwrap(), b.unwrap()]
        .iter()
        .filter(|outcome| outcome.is_duplicate())
        .count();
    assert_eq!(duplicates, 1);
    assert_eq!(balances(&ledger, user.id).await.uni, dec("10"));
    assert_eq!(count_kind(&ledger, user.id, TransactionKind::Deposit).await, 1);
}

#[tokio::test]
async fn same_hash_for_different_users_is_not_a_duplicate() {
    let ledger = setup().await;
    let alice = create_test_user(&ledger.db, 1).await.unwrap();
    let bob = create_test_user(&ledger.db, 2).await.unwrap();

    ledger.wallet.deposit(alice.id, dec("1"), Currency::Ton, Some("shared".to_string())).await.unwrap();
    let outcome = ledger.wallet
        .deposit(bob.id, dec("1"), Currency::Ton, Some("shared".to_string())).await
        .unwrap();

    assert!(!outcome.is_duplicate());
}

#[tokio::test]
async fn deposit_hash_cannot_collide_with_an_accrual_window() {
    let ledger = setup().await;
    let user = create_test_user(&ledger.db, 1).await.unwrap();
    let start = fixed_time();
    start_uni_farming(&ledger.db, user.id, "1000", "0.01", start).await.unwrap();
    let window_key = AccrualStream::UniFarming.dedup_key(user.id, start);

    let deposit = ledger.wallet
        .deposit(user.id, dec("1"), Currency::Uni, Some(window_key.clone())).await
        .unwrap();
    let accrual = ledger.farming
        .accrue(user.id, AccrualStream::UniFarming, start + chrono::Duration::seconds(300)).await
        .unwrap();

    assert!(!deposit.is_duplicate());
    assert_eq!(deposit.transaction().dedup_key, Some(format!("deposit:{}", window_key)));
    assert!(matches!(accrual, AccrualOutcome::Paid { .. }));
    assert_eq!(balances(&ledger, user.id).await.uni, dec("1.03472222"));
}

#[tokio::test]
async fn blank_deposit_hash_is_rejected() {
    let ledger = setup().await;
    let user = create_test_user(&ledger.db, 1).await.unwrap();

    let err = ledger.wallet
        .deposit(user.id, dec("1"), Currency::Uni, Some("   ".to_string())).await
        .unwrap_err();

    assert!(matches!(err, AppError::InvalidInput(_)));
    assert_eq!(balances(&ledger, user.id).await.uni, dec("0"));
}

#[tokio::test]
async fn overdrawn_withdrawal_is_rejected_without_side_effects() {
    let ledger = setup().await;
    let user = funded_user(&ledger, 1, "0", "30").await;

    let err = ledger.wallet.withdraw(user.id, dec("50"), Currency::Ton, None).await.unwrap_err();

    match err {
        AppError::InsufficientBalance { currency, available, required } => {
            assert_eq!(currency, Currency::Ton);
            assert_eq!(available, dec("30"));
            assert_eq!(required, dec("50"));
        }
        other => panic!("expected insufficient balance, got {other:?}"),
    }
    assert_eq!(balances(&ledger, user.id).await.ton, dec("30"));
    assert_eq!(count_kind(&ledger, user.id, TransactionKind::Withdrawal).await, 0);
    assert_reconciles(&ledger, user.id).await;
}

#[tokio::test]
async fn clamped_debit_never_goes_negative() {
    let ledger = setup().await;
    let user = funded_user(&ledger, 1, "5", "0").await;

    let request = CreateTransactionRequest::new(
        user.id,
        TransactionKind::Withdrawal,
        dec("8"),
        Currency::Uni
    ).clamp_debit();
    let outcome = ledger.transactions.create_transaction(request).await.unwrap();

    let TransactionOutcome::Created(applied) = outcome else {
        panic!("debit should be recorded");
    };
    assert_eq!(applied.balances.uni, dec("0"));
    assert_eq!(balances(&ledger, user.id).await.uni, dec("0"));
}

#[tokio::test]
async fn operation_sequence_keeps_ledger_and_balances_in_step() {
    let ledger = setup().await;
    let user = funded_user(&ledger, 1, "1000", "20").await;

    ledger.wallet.deposit_uni_farming(user.id, dec("250.5")).await.unwrap();
    ledger.wallet.purchase_boost(user.id, 2).await.unwrap();
    ledger.wallet.withdraw(user.id, dec("3.25"), Currency::Ton, Some("UQ-wallet".to_string())).await.unwrap();
    let rejected = ledger.wallet.withdraw(user.id, dec("100"), Currency::Ton, None).await;
    assert!(rejected.is_err());

    let current = balances(&ledger, user.id).await;
    assert_eq!(current.uni, dec("75749.5"));
    assert_eq!(current.ton, dec("11.75"));
    assert!(!current.uni.is_sign_negative());
    assert!(!current.ton.is_sign_negative());
    assert_reconciles(&ledger, user.id).await;
}

#[tokio::test]
async fn withdrawal_fee_is_reconciled_too() {
    let ledger = setup().await;
    let wallet = ledger.wallet_with_fee(dec("0.1"));
    let user = funded_user(&ledger, 1, "0", "10").await;

    let receipt = wallet.withdraw(user.id, dec("4"), Currency::Ton, None).await.unwrap();

    assert_eq!(receipt.balances.ton, dec("5.9"));
    assert_eq!(count_kind(&ledger, user.id, TransactionKind::WithdrawalFee).await, 1);
    assert_reconciles(&ledger, user.id).await;
}

#[tokio::test]
async fn failed_notification_does_not_undo_the_credit() {
    let ledger = setup_test_ledger_with_failing_notifier().await.unwrap();
    let user = create_test_user(&ledger.db, 1).await.unwrap();

    let outcome = ledger.wallet.deposit(user.id, dec("12.5"), Currency::Uni, None).await.unwrap();

    assert!(!outcome.is_duplicate());
    assert_eq!(balances(&ledger, user.id).await.uni, dec("12.5"));
    assert_eq!(count_kind(&ledger, user.id, TransactionKind::Deposit).await, 1);
}

#[tokio::test]
async fn registration_is_idempotent_and_keeps_the_referrer() {
    let ledger = setup().await;
    let referrer = ledger.accounts.register(100, Some("alice".to_string()), None).await.unwrap();
    let other = ledger.accounts.register(200, None, None).await.unwrap();

    let first = ledger.accounts.register(300, None, Some(referrer.user.id)).await.unwrap();
    let again = ledger.accounts.register(300, None, Some(other.user.id)).await.unwrap();

    assert!(first.created);
    assert!(!again.created);
    assert_eq!(again.user.id, first.user.id);
    assert_eq!(again.user.referred_by, Some(referrer.user.id));
}

#[tokio::test]
async fn unknown_referrer_is_rejected() {
    let ledger = setup().await;

    let err = ledger.accounts.register(1, None, Some(999)).await.unwrap_err();

    assert!(matches!(err, AppError::ReferralRejected(_)));
}
