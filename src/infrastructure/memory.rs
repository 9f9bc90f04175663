use crate::domain::ledger::{LedgerEntry, NewEntry};
use crate::domain::ports::LedgerStore;
use crate::domain::wallet::{Balance, CurrencyCode, OwnerId, Wallet, WalletId, WalletStatus};
use crate::error::{Result, WalletError};
use async_trait::async_trait;
use log::warn;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tokio::time::timeout;

const DEFAULT_LOCK_WAIT: Duration = Duration::from_secs(5);

/// In-memory store backend.
///
/// Each wallet row lives behind its own `Arc<Mutex<Wallet>>`; holding the
/// mutex is the exclusive row lock. Ledger entries are an append-only vector
/// and consumed top-up codes a set that doubles as the uniqueness constraint
/// on external transaction ids.
pub struct MemoryStore {
    rows: RwLock<HashMap<WalletId, Arc<Mutex<Wallet>>>>,
    owner_index: RwLock<HashMap<(OwnerId, CurrencyCode), WalletId>>,
    ledger: RwLock<Vec<LedgerEntry>>,
    consumed_codes: RwLock<HashSet<String>>,
    next_wallet_id: AtomicU64,
    next_entry_id: AtomicU64,
    lock_wait: Duration,
}

/// Unit of work over [`MemoryStore`]: held row locks plus staged writes.
/// Dropping it without commit releases the locks and discards the stages.
#[derive(Default)]
pub struct MemoryUow {
    guards: HashMap<WalletId, OwnedMutexGuard<Wallet>>,
    balances: HashMap<WalletId, Balance>,
    entries: Vec<NewEntry>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_lock_wait(DEFAULT_LOCK_WAIT)
    }

    pub fn with_lock_wait(lock_wait: Duration) -> Self {
        Self {
            rows: RwLock::new(HashMap::new()),
            owner_index: RwLock::new(HashMap::new()),
            ledger: RwLock::new(Vec::new()),
            consumed_codes: RwLock::new(HashSet::new()),
            next_wallet_id: AtomicU64::new(1),
            next_entry_id: AtomicU64::new(1),
            lock_wait,
        }
    }

    async fn row(&self, id: &WalletId) -> Result<Arc<Mutex<Wallet>>> {
        self.rows
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| WalletError::NotFound(id.to_string()))
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LedgerStore for MemoryStore {
    type Uow = MemoryUow;

    async fn begin(&self) -> Result<MemoryUow> {
        Ok(MemoryUow::default())
    }

    async fn commit(&self, mut uow: MemoryUow) -> Result<()> {
        // Uniqueness constraint on external codes: checked in full before the
        // first insert so a failure applies nothing.
        let staged = std::mem::take(&mut uow.entries);
        {
            let mut consumed = self.consumed_codes.write().await;
            for entry in staged.iter().filter(|e| e.unique_code) {
                if consumed.contains(&entry.transaction_id) {
                    return Err(WalletError::DuplicateTransaction(
                        entry.transaction_id.clone(),
                    ));
                }
            }
            for entry in staged.iter().filter(|e| e.unique_code) {
                consumed.insert(entry.transaction_id.clone());
            }
        }

        {
            let mut ledger = self.ledger.write().await;
            for entry in staged {
                let id = self.next_entry_id.fetch_add(1, Ordering::SeqCst);
                ledger.push(entry.into_entry(id));
            }
        }

        // Balances go through the held guards; readers of these rows block on
        // the row lock, so they only ever see the post-commit state.
        let balances = std::mem::take(&mut uow.balances);
        for (id, balance) in balances {
            if let Some(guard) = uow.guards.get_mut(&id) {
                guard.balance = balance;
            }
        }
        // guards drop here, releasing the row locks
        Ok(())
    }

    async fn lock_wallet(&self, uow: &mut MemoryUow, id: &WalletId) -> Result<Wallet> {
        if let Some(guard) = uow.guards.get(id) {
            return Ok(Wallet::clone(guard));
        }
        let row = self.row(id).await?;
        let guard = match timeout(self.lock_wait, row.lock_owned()).await {
            Ok(guard) => guard,
            Err(_) => {
                warn!("lock wait timed out for wallet {id}");
                return Err(WalletError::Busy(id.to_string()));
            }
        };
        let wallet = Wallet::clone(&guard);
        uow.guards.insert(id.clone(), guard);
        Ok(wallet)
    }

    async fn get_wallet(&self, id: &WalletId) -> Result<Option<Wallet>> {
        let row = match self.rows.read().await.get(id).cloned() {
            Some(row) => row,
            None => return Ok(None),
        };
        match timeout(self.lock_wait, row.lock()).await {
            Ok(guard) => Ok(Some(Wallet::clone(&guard))),
            Err(_) => Err(WalletError::Busy(id.to_string())),
        }
    }

    async fn find_wallet(&self, owner: OwnerId, currency: &CurrencyCode) -> Result<Option<Wallet>> {
        let id = self
            .owner_index
            .read()
            .await
            .get(&(owner, currency.clone()))
            .cloned();
        match id {
            Some(id) => self.get_wallet(&id).await,
            None => Ok(None),
        }
    }

    async fn create_wallet(&self, owner: OwnerId, currency: CurrencyCode) -> Result<Wallet> {
        let mut rows = self.rows.write().await;
        let mut index = self.owner_index.write().await;
        let key = (owner, currency.clone());
        if index.contains_key(&key) {
            return Err(WalletError::Conflict {
                owner_id: owner,
                currency: currency.to_string(),
            });
        }
        let id = self.next_wallet_id.fetch_add(1, Ordering::SeqCst);
        let wallet = Wallet::new(id, owner, currency);
        rows.insert(wallet.wallet_id.clone(), Arc::new(Mutex::new(wallet.clone())));
        index.insert(key, wallet.wallet_id.clone());
        Ok(wallet)
    }

    async fn stage_balance(
        &self,
        uow: &mut MemoryUow,
        id: &WalletId,
        balance: Balance,
    ) -> Result<()> {
        if !uow.guards.contains_key(id) {
            return Err(WalletError::Storage(format!(
                "balance staged for wallet `{id}` without holding its row lock"
            )));
        }
        uow.balances.insert(id.clone(), balance);
        Ok(())
    }

    async fn set_status(&self, id: &WalletId, status: WalletStatus) -> Result<Wallet> {
        let row = self.row(id).await?;
        let mut guard = timeout(self.lock_wait, row.lock())
            .await
            .map_err(|_| WalletError::Busy(id.to_string()))?;
        // re-checked under the lock so racing transitions cannot both win
        if guard.status == status {
            return Err(WalletError::AlreadySuspended(id.to_string()));
        }
        guard.status = status;
        Ok(Wallet::clone(&guard))
    }

    async fn stage_entry(&self, uow: &mut MemoryUow, entry: NewEntry) -> Result<()> {
        uow.entries.push(entry);
        Ok(())
    }

    async fn entries(&self, id: &WalletId) -> Result<Vec<LedgerEntry>> {
        Ok(self
            .ledger
            .read()
            .await
            .iter()
            .filter(|e| &e.wallet_id == id)
            .cloned()
            .collect())
    }

    async fn code_consumed(&self, uow: &MemoryUow, code: &str) -> Result<bool> {
        if uow
            .entries
            .iter()
            .any(|e| e.unique_code && e.transaction_id == code)
        {
            return Ok(true);
        }
        Ok(self.consumed_codes.read().await.contains(code))
    }

    async fn all_wallets(&self) -> Result<Vec<Wallet>> {
        let rows: Vec<Arc<Mutex<Wallet>>> = self.rows.read().await.values().cloned().collect();
        let mut wallets = Vec::with_capacity(rows.len());
        for row in rows {
            let guard = timeout(self.lock_wait, row.lock())
                .await
                .map_err(|_| WalletError::Storage("lock wait during snapshot".into()))?;
            wallets.push(Wallet::clone(&guard));
        }
        Ok(wallets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::wallet::Amount;
    use rust_decimal_macros::dec;

    fn usd() -> CurrencyCode {
        CurrencyCode::parse("usd").unwrap()
    }

    #[tokio::test]
    async fn test_create_and_lookup() {
        let store = MemoryStore::new();
        let wallet = store.create_wallet(400, usd()).await.unwrap();
        assert_eq!(wallet.wallet_id.as_str(), "user400-USD");
        assert_eq!(wallet.id, 1);

        let fetched = store.get_wallet(&wallet.wallet_id).await.unwrap().unwrap();
        assert_eq!(fetched, wallet);

        let by_owner = store.find_wallet(400, &usd()).await.unwrap().unwrap();
        assert_eq!(by_owner, wallet);
        assert!(store.find_wallet(401, &usd()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_create_conflict_on_owner_currency() {
        let store = MemoryStore::new();
        store.create_wallet(1, usd()).await.unwrap();
        assert!(matches!(
            store.create_wallet(1, usd()).await,
            Err(WalletError::Conflict { .. })
        ));
    }

    #[tokio::test]
    async fn test_dropped_uow_rolls_back() {
        let store = MemoryStore::new();
        let wallet = store.create_wallet(1, usd()).await.unwrap();
        let id = wallet.wallet_id.clone();

        let mut uow = store.begin().await.unwrap();
        let locked = store.lock_wallet(&mut uow, &id).await.unwrap();
        let entry = NewEntry::credit(
            &locked,
            Amount::new(dec!(10.00)).unwrap(),
            "C1".into(),
            "Top up balance",
        )
        .with_unique_code();
        store
            .stage_balance(&mut uow, &id, entry.after)
            .await
            .unwrap();
        store.stage_entry(&mut uow, entry).await.unwrap();
        drop(uow);

        let wallet = store.get_wallet(&id).await.unwrap().unwrap();
        assert_eq!(wallet.balance, Balance::ZERO);
        assert!(store.entries(&id).await.unwrap().is_empty());
        let uow = store.begin().await.unwrap();
        assert!(!store.code_consumed(&uow, "C1").await.unwrap());
    }

    #[tokio::test]
    async fn test_lock_wait_times_out_busy() {
        let store = Arc::new(MemoryStore::with_lock_wait(Duration::from_millis(50)));
        let wallet = store.create_wallet(1, usd()).await.unwrap();
        let id = wallet.wallet_id.clone();

        let mut holder = store.begin().await.unwrap();
        store.lock_wallet(&mut holder, &id).await.unwrap();

        let mut contender = store.begin().await.unwrap();
        let result = store.lock_wallet(&mut contender, &id).await;
        assert!(matches!(result, Err(WalletError::Busy(_))));
        drop(holder);

        // lock released, second attempt succeeds
        let mut retry = store.begin().await.unwrap();
        assert!(store.lock_wallet(&mut retry, &id).await.is_ok());
    }

    #[tokio::test]
    async fn test_relock_in_same_uow_is_reentrant() {
        let store = MemoryStore::new();
        let wallet = store.create_wallet(1, usd()).await.unwrap();
        let id = wallet.wallet_id.clone();

        let mut uow = store.begin().await.unwrap();
        let first = store.lock_wallet(&mut uow, &id).await.unwrap();
        let second = store.lock_wallet(&mut uow, &id).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_commit_constraint_backstop() {
        let store = MemoryStore::new();
        let wallet = store.create_wallet(1, usd()).await.unwrap();
        let id = wallet.wallet_id.clone();
        let amount = Amount::new(dec!(5.00)).unwrap();

        // two units of work stage the same unique code without either having
        // checked it; the second commit must hit the constraint
        let mut first = store.begin().await.unwrap();
        let locked = store.lock_wallet(&mut first, &id).await.unwrap();
        let entry = NewEntry::credit(&locked, amount, "DUP".into(), "Top up balance")
            .with_unique_code();
        store
            .stage_balance(&mut first, &id, entry.after)
            .await
            .unwrap();
        store.stage_entry(&mut first, entry).await.unwrap();
        store.commit(first).await.unwrap();

        let mut second = store.begin().await.unwrap();
        let locked = store.lock_wallet(&mut second, &id).await.unwrap();
        let entry = NewEntry::credit(&locked, amount, "DUP".into(), "Top up balance")
            .with_unique_code();
        store
            .stage_balance(&mut second, &id, entry.after)
            .await
            .unwrap();
        store.stage_entry(&mut second, entry).await.unwrap();
        let result = store.commit(second).await;
        assert!(matches!(result, Err(WalletError::DuplicateTransaction(_))));

        // only the first commit took effect
        let wallet = store.get_wallet(&id).await.unwrap().unwrap();
        assert_eq!(wallet.balance.value(), dec!(5.00));
        assert_eq!(store.entries(&id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_set_status_is_compare_and_set() {
        let store = MemoryStore::new();
        let wallet = store.create_wallet(1, usd()).await.unwrap();
        let id = wallet.wallet_id.clone();

        let updated = store
            .set_status(&id, WalletStatus::Suspended)
            .await
            .unwrap();
        assert_eq!(updated.status, WalletStatus::Suspended);

        // repeat transition is rejected under the row lock
        assert!(matches!(
            store.set_status(&id, WalletStatus::Suspended).await,
            Err(WalletError::AlreadySuspended(_))
        ));
    }

    #[tokio::test]
    async fn test_stage_balance_requires_row_lock() {
        let store = MemoryStore::new();
        let wallet = store.create_wallet(1, usd()).await.unwrap();
        let mut uow = store.begin().await.unwrap();
        let result = store
            .stage_balance(&mut uow, &wallet.wallet_id, Balance::new(dec!(1.00)))
            .await;
        assert!(matches!(result, Err(WalletError::Storage(_))));
    }

    #[tokio::test]
    async fn test_entry_ids_are_insertion_ordered() {
        let store = MemoryStore::new();
        let wallet = store.create_wallet(1, usd()).await.unwrap();
        let id = wallet.wallet_id.clone();
        let amount = Amount::new(dec!(1.00)).unwrap();

        for code in ["A", "B", "C"] {
            let mut uow = store.begin().await.unwrap();
            let locked = store.lock_wallet(&mut uow, &id).await.unwrap();
            let entry = NewEntry::credit(&locked, amount, code.into(), "Top up balance")
                .with_unique_code();
            store
                .stage_balance(&mut uow, &id, entry.after)
                .await
                .unwrap();
            store.stage_entry(&mut uow, entry).await.unwrap();
            store.commit(uow).await.unwrap();
        }

        let entries = store.entries(&id).await.unwrap();
        let ids: Vec<u64> = entries.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }
}
