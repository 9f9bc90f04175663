use rust_decimal_macros::dec;
use wallet_ledger::application::engine::TransactionEngine;
use wallet_ledger::domain::ledger::{EntryType, replay_balance};
use wallet_ledger::domain::wallet::{Amount, WalletId, WalletStatus};
use wallet_ledger::error::WalletError;
use wallet_ledger::infrastructure::memory::MemoryStore;

fn engine() -> TransactionEngine<MemoryStore> {
    TransactionEngine::new(MemoryStore::new())
}

fn amount(value: rust_decimal::Decimal) -> Amount {
    Amount::new(value).unwrap()
}

#[tokio::test]
async fn test_scenario_owner_400_usd() {
    let engine = engine();

    let wallet = engine.create_wallet(400, "usd").await.unwrap();
    assert_eq!(wallet.wallet_id.as_str(), "user400-USD");
    assert_eq!(wallet.balance.value(), dec!(0.00));
    let id = wallet.wallet_id.clone();

    let wallet = engine.top_up(&id, amount(dec!(100.00)), "CODE1").await.unwrap();
    assert_eq!(wallet.balance.value(), dec!(100.00));

    let wallet = engine.pay(&id, amount(dec!(30.00))).await.unwrap();
    assert_eq!(wallet.balance.value(), dec!(70.00));

    let replay = engine.top_up(&id, amount(dec!(100.00)), "CODE1").await;
    assert!(matches!(replay, Err(WalletError::DuplicateTransaction(_))));
    assert_eq!(
        engine.wallet_details(&id).await.unwrap().balance.value(),
        dec!(70.00)
    );

    let entries = engine.history(&id).await.unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].entry_type, EntryType::Credit);
    assert_eq!(entries[0].before.value(), dec!(0.00));
    assert_eq!(entries[0].after.value(), dec!(100.00));
    assert_eq!(entries[1].entry_type, EntryType::Debit);
    assert_eq!(entries[1].before.value(), dec!(100.00));
    assert_eq!(entries[1].after.value(), dec!(70.00));
}

#[tokio::test]
async fn test_scenario_transfer_70_becomes_20_and_50() {
    let engine = engine();
    let a = engine.create_wallet(1, "usd").await.unwrap().wallet_id;
    let b = engine.create_wallet(2, "usd").await.unwrap().wallet_id;
    engine.top_up(&a, amount(dec!(70.00)), "SEED").await.unwrap();

    let receipt = engine.transfer(&a, &b, amount(dec!(50.00))).await.unwrap();
    assert_eq!(receipt.from.balance.value(), dec!(20.00));
    assert_eq!(receipt.to.balance.value(), dec!(50.00));

    let a_entries = engine.history(&a).await.unwrap();
    let b_entries = engine.history(&b).await.unwrap();
    let debit = a_entries.last().unwrap();
    let credit = b_entries.last().unwrap();
    assert_eq!(debit.entry_type, EntryType::Debit);
    assert_eq!(credit.entry_type, EntryType::Credit);
    assert_eq!(debit.amount.value(), dec!(50.00));
    assert_eq!(credit.amount.value(), dec!(50.00));
    assert_eq!(debit.before.value(), dec!(70.00));
    assert_eq!(debit.after.value(), dec!(20.00));
    assert_eq!(credit.before.value(), dec!(0.00));
    assert_eq!(credit.after.value(), dec!(50.00));
}

#[tokio::test]
async fn test_transfer_conserves_total() {
    let engine = engine();
    let a = engine.create_wallet(1, "usd").await.unwrap().wallet_id;
    let b = engine.create_wallet(2, "usd").await.unwrap().wallet_id;
    engine.top_up(&a, amount(dec!(80.50)), "A").await.unwrap();
    engine.top_up(&b, amount(dec!(19.50)), "B").await.unwrap();

    engine.transfer(&a, &b, amount(dec!(33.25))).await.unwrap();

    let total = engine.wallet_details(&a).await.unwrap().balance.value()
        + engine.wallet_details(&b).await.unwrap().balance.value();
    assert_eq!(total, dec!(100.00));
}

#[tokio::test]
async fn test_transfer_insufficient_funds_leaves_both_untouched() {
    let engine = engine();
    let a = engine.create_wallet(1, "usd").await.unwrap().wallet_id;
    let b = engine.create_wallet(2, "usd").await.unwrap().wallet_id;
    engine.top_up(&a, amount(dec!(10.00)), "A").await.unwrap();

    let result = engine.transfer(&a, &b, amount(dec!(10.01))).await;
    assert!(matches!(result, Err(WalletError::InsufficientFunds { .. })));

    assert_eq!(
        engine.wallet_details(&a).await.unwrap().balance.value(),
        dec!(10.00)
    );
    assert_eq!(
        engine.wallet_details(&b).await.unwrap().balance.value(),
        dec!(0.00)
    );
    assert!(engine.history(&b).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_balance_reconstructible_by_replay() {
    let engine = engine();
    let id = engine.create_wallet(9, "idr").await.unwrap().wallet_id;
    let other = engine.create_wallet(10, "idr").await.unwrap().wallet_id;

    engine.top_up(&id, amount(dec!(500.00)), "T1").await.unwrap();
    engine.pay(&id, amount(dec!(123.45))).await.unwrap();
    engine.transfer(&id, &other, amount(dec!(76.55))).await.unwrap();
    engine.top_up(&id, amount(dec!(0.01)), "T2").await.unwrap();

    let wallet = engine.wallet_details(&id).await.unwrap();
    let entries = engine.history(&id).await.unwrap();
    assert!(entries.iter().all(|e| e.is_consistent()));
    assert_eq!(replay_balance(&entries), wallet.balance);
    assert!(engine.audit(&id).await.unwrap());
    assert!(engine.audit(&other).await.unwrap());
}

#[tokio::test]
async fn test_currency_is_normalized_for_lookup_and_id() {
    let engine = engine();
    engine.create_wallet(400, "usd").await.unwrap();

    let found = engine.find_wallet(400, "USD").await.unwrap();
    assert_eq!(found.wallet_id.as_str(), "user400-USD");
    assert_eq!(found.currency.as_str(), "USD");

    // mixed case in operations resolves to the same wallet
    let found = engine.find_wallet(400, "Usd").await.unwrap();
    assert_eq!(found.wallet_id.as_str(), "user400-USD");
}

#[tokio::test]
async fn test_amounts_enter_at_two_decimal_scale() {
    let engine = engine();
    let id = engine.create_wallet(1, "usd").await.unwrap().wallet_id;

    engine
        .top_up(&id, Amount::new(dec!(33.333)).unwrap(), "C1")
        .await
        .unwrap();
    assert_eq!(
        engine.wallet_details(&id).await.unwrap().balance.value(),
        dec!(33.33)
    );
}

#[tokio::test]
async fn test_suspend_is_one_way_and_unlogged() {
    let engine = engine();
    let id = engine.create_wallet(1, "usd").await.unwrap().wallet_id;
    engine.top_up(&id, amount(dec!(5.00)), "C1").await.unwrap();

    let wallet = engine.suspend(&id).await.unwrap();
    assert_eq!(wallet.status, WalletStatus::Suspended);

    // status changes are not economic events
    assert_eq!(engine.history(&id).await.unwrap().len(), 1);

    assert!(matches!(
        engine.suspend(&id).await,
        Err(WalletError::AlreadySuspended(_))
    ));
    // balance inquiry still works on a suspended wallet
    assert_eq!(
        engine.wallet_details(&id).await.unwrap().balance.value(),
        dec!(5.00)
    );
}

#[tokio::test]
async fn test_unknown_wallets_and_ids() {
    let engine = engine();
    let ghost = WalletId::from("user77-EUR");

    assert!(matches!(
        engine.wallet_details(&ghost).await,
        Err(WalletError::NotFound(_))
    ));
    assert!(matches!(
        engine.transfer(&ghost, &WalletId::from("user78-EUR"), amount(dec!(1.00)))
            .await,
        Err(WalletError::NotFound(_))
    ));
    assert!(matches!(
        engine.find_wallet(77, "EUR").await,
        Err(WalletError::NotFound(_))
    ));
}
