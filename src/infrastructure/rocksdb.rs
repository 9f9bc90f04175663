use crate::domain::ledger::{LedgerEntry, NewEntry};
use crate::domain::ports::LedgerStore;
use crate::domain::wallet::{Balance, CurrencyCode, OwnerId, Wallet, WalletId, WalletStatus};
use crate::error::{Result, WalletError};
use async_trait::async_trait;
use log::warn;
use rocksdb::{ColumnFamilyDescriptor, DB, Options, WriteBatch};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tokio::time::timeout;

/// Column family for wallet rows, keyed by external wallet id.
pub const CF_WALLETS: &str = "wallets";
/// Column family mapping `owner:CURRENCY` to the external wallet id.
pub const CF_OWNER_INDEX: &str = "owner_index";
/// Column family for ledger entries, keyed by big-endian entry id.
pub const CF_LEDGER: &str = "ledger";
/// Column family acting as the uniqueness constraint on consumed codes.
pub const CF_CODES: &str = "codes";
/// Column family for id counters.
pub const CF_META: &str = "meta";

const META_NEXT_WALLET_ID: &[u8] = b"next_wallet_id";
const META_NEXT_ENTRY_ID: &[u8] = b"next_entry_id";

/// Persistent store backend on RocksDB.
///
/// Durable state lives in column families; exclusive row locks are an
/// in-process registry of per-wallet mutexes (the engine assumes a single
/// writer process). A unit of work commits as one atomic `WriteBatch`, so a
/// reader never observes a half-applied transfer. Commits themselves are
/// serialized: two units of work holding disjoint row locks could otherwise
/// interleave between the unique-code constraint check and the batch write.
#[derive(Clone)]
pub struct RocksDbStore {
    db: Arc<DB>,
    row_locks: Arc<RwLock<HashMap<WalletId, Arc<Mutex<()>>>>>,
    commit_lock: Arc<Mutex<()>>,
    next_wallet_id: Arc<AtomicU64>,
    next_entry_id: Arc<AtomicU64>,
    lock_wait: Duration,
}

/// Unit of work over [`RocksDbStore`]. Dropping it without commit releases
/// the row locks and discards the staged writes.
#[derive(Default)]
pub struct RocksUow {
    guards: HashMap<WalletId, OwnedMutexGuard<()>>,
    balances: HashMap<WalletId, Balance>,
    entries: Vec<NewEntry>,
}

fn storage_err(err: impl std::fmt::Display) -> WalletError {
    WalletError::Storage(err.to_string())
}

fn owner_key(owner: OwnerId, currency: &CurrencyCode) -> Vec<u8> {
    format!("{owner}:{currency}").into_bytes()
}

impl RocksDbStore {
    /// Opens or creates a database at `path`, ensuring all column families
    /// exist and restoring the id counters.
    pub fn open<P: AsRef<Path>>(path: P, lock_wait: Duration) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cfs = [CF_WALLETS, CF_OWNER_INDEX, CF_LEDGER, CF_CODES, CF_META]
            .into_iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()))
            .collect::<Vec<_>>();
        let db = DB::open_cf_descriptors(&opts, path, cfs).map_err(storage_err)?;

        let next_wallet_id = read_counter(&db, META_NEXT_WALLET_ID)?;
        let next_entry_id = read_counter(&db, META_NEXT_ENTRY_ID)?;

        Ok(Self {
            db: Arc::new(db),
            row_locks: Arc::new(RwLock::new(HashMap::new())),
            commit_lock: Arc::new(Mutex::new(())),
            next_wallet_id: Arc::new(AtomicU64::new(next_wallet_id)),
            next_entry_id: Arc::new(AtomicU64::new(next_entry_id)),
            lock_wait,
        })
    }

    fn cf(&self, name: &str) -> Result<&rocksdb::ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| WalletError::Storage(format!("column family `{name}` not found")))
    }

    fn read_wallet(&self, id: &WalletId) -> Result<Option<Wallet>> {
        let cf = self.cf(CF_WALLETS)?;
        match self.db.get_cf(cf, id.as_str()).map_err(storage_err)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes).map_err(storage_err)?)),
            None => Ok(None),
        }
    }

    fn put_wallet(&self, batch: &mut WriteBatch, wallet: &Wallet) -> Result<()> {
        let cf = self.cf(CF_WALLETS)?;
        let value = serde_json::to_vec(wallet).map_err(storage_err)?;
        batch.put_cf(cf, wallet.wallet_id.as_str(), value);
        Ok(())
    }

    async fn row_lock(&self, id: &WalletId) -> Result<Arc<Mutex<()>>> {
        if let Some(lock) = self.row_locks.read().await.get(id).cloned() {
            return Ok(lock);
        }
        let mut locks = self.row_locks.write().await;
        Ok(locks.entry(id.clone()).or_default().clone())
    }

    async fn acquire(&self, uow: &mut RocksUow, id: &WalletId) -> Result<()> {
        if uow.guards.contains_key(id) {
            return Ok(());
        }
        let lock = self.row_lock(id).await?;
        let guard = match timeout(self.lock_wait, lock.lock_owned()).await {
            Ok(guard) => guard,
            Err(_) => {
                warn!("lock wait timed out for wallet {id}");
                return Err(WalletError::Busy(id.to_string()));
            }
        };
        uow.guards.insert(id.clone(), guard);
        Ok(())
    }
}

fn read_counter(db: &DB, key: &[u8]) -> Result<u64> {
    let cf = db
        .cf_handle(CF_META)
        .ok_or_else(|| WalletError::Storage("meta column family not found".into()))?;
    match db.get_cf(cf, key).map_err(storage_err)? {
        Some(bytes) => {
            let arr: [u8; 8] = bytes
                .as_slice()
                .try_into()
                .map_err(|_| WalletError::Storage("corrupt id counter".into()))?;
            Ok(u64::from_be_bytes(arr))
        }
        None => Ok(1),
    }
}

#[async_trait]
impl LedgerStore for RocksDbStore {
    type Uow = RocksUow;

    async fn begin(&self) -> Result<RocksUow> {
        Ok(RocksUow::default())
    }

    async fn commit(&self, mut uow: RocksUow) -> Result<()> {
        // Held across the constraint check and the batch write: row locks
        // alone do not order two commits reusing one code on different
        // wallets.
        let _commit = self.commit_lock.lock().await;
        let codes_cf = self.cf(CF_CODES)?;
        let staged = std::mem::take(&mut uow.entries);

        // Constraint check before any write; the batch below is all-or-nothing.
        for entry in staged.iter().filter(|e| e.unique_code) {
            let existing = self
                .db
                .get_cf(codes_cf, entry.transaction_id.as_bytes())
                .map_err(storage_err)?;
            if existing.is_some() {
                return Err(WalletError::DuplicateTransaction(
                    entry.transaction_id.clone(),
                ));
            }
        }

        let mut batch = WriteBatch::default();
        for entry in staged.iter().filter(|e| e.unique_code) {
            batch.put_cf(codes_cf, entry.transaction_id.as_bytes(), b"");
        }

        let ledger_cf = self.cf(CF_LEDGER)?;
        for entry in staged {
            let id = self.next_entry_id.fetch_add(1, Ordering::SeqCst);
            let row = entry.into_entry(id);
            let value = serde_json::to_vec(&row).map_err(storage_err)?;
            batch.put_cf(ledger_cf, id.to_be_bytes(), value);
        }

        let balances = std::mem::take(&mut uow.balances);
        for (id, balance) in balances {
            if !uow.guards.contains_key(&id) {
                return Err(WalletError::Storage(format!(
                    "balance staged for wallet `{id}` without holding its row lock"
                )));
            }
            let mut wallet = self
                .read_wallet(&id)?
                .ok_or_else(|| WalletError::NotFound(id.to_string()))?;
            wallet.balance = balance;
            self.put_wallet(&mut batch, &wallet)?;
        }

        let meta_cf = self.cf(CF_META)?;
        batch.put_cf(
            meta_cf,
            META_NEXT_ENTRY_ID,
            self.next_entry_id.load(Ordering::SeqCst).to_be_bytes(),
        );
        batch.put_cf(
            meta_cf,
            META_NEXT_WALLET_ID,
            self.next_wallet_id.load(Ordering::SeqCst).to_be_bytes(),
        );

        self.db.write(batch).map_err(storage_err)?;
        // guards drop here, releasing the row locks
        Ok(())
    }

    async fn lock_wallet(&self, uow: &mut RocksUow, id: &WalletId) -> Result<Wallet> {
        // Existence check first so an unknown wallet is NotFound, not a stray
        // registry entry. Wallets are never deleted, so it stays valid.
        self.read_wallet(id)?
            .ok_or_else(|| WalletError::NotFound(id.to_string()))?;
        self.acquire(uow, id).await?;
        // Re-read under the lock: the pre-lock copy may be stale.
        self.read_wallet(id)?
            .ok_or_else(|| WalletError::NotFound(id.to_string()))
    }

    async fn get_wallet(&self, id: &WalletId) -> Result<Option<Wallet>> {
        self.read_wallet(id)
    }

    async fn find_wallet(&self, owner: OwnerId, currency: &CurrencyCode) -> Result<Option<Wallet>> {
        let cf = self.cf(CF_OWNER_INDEX)?;
        match self
            .db
            .get_cf(cf, owner_key(owner, currency))
            .map_err(storage_err)?
        {
            Some(bytes) => {
                let id = WalletId::new(String::from_utf8(bytes).map_err(storage_err)?);
                self.read_wallet(&id)
            }
            None => Ok(None),
        }
    }

    async fn create_wallet(&self, owner: OwnerId, currency: CurrencyCode) -> Result<Wallet> {
        // Serialize creations through the registry write lock so the
        // owner+currency uniqueness check cannot race.
        let _registry = self.row_locks.write().await;

        let index_cf = self.cf(CF_OWNER_INDEX)?;
        let key = owner_key(owner, &currency);
        if self.db.get_cf(index_cf, &key).map_err(storage_err)?.is_some() {
            return Err(WalletError::Conflict {
                owner_id: owner,
                currency: currency.to_string(),
            });
        }

        let id = self.next_wallet_id.fetch_add(1, Ordering::SeqCst);
        let wallet = Wallet::new(id, owner, currency);

        let mut batch = WriteBatch::default();
        self.put_wallet(&mut batch, &wallet)?;
        batch.put_cf(index_cf, key, wallet.wallet_id.as_str());
        let meta_cf = self.cf(CF_META)?;
        batch.put_cf(
            meta_cf,
            META_NEXT_WALLET_ID,
            self.next_wallet_id.load(Ordering::SeqCst).to_be_bytes(),
        );
        self.db.write(batch).map_err(storage_err)?;
        Ok(wallet)
    }

    async fn stage_balance(
        &self,
        uow: &mut RocksUow,
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
        let lock = self.row_lock(id).await?;
        let _guard = timeout(self.lock_wait, lock.lock())
            .await
            .map_err(|_| WalletError::Busy(id.to_string()))?;
        let mut wallet = self
            .read_wallet(id)?
            .ok_or_else(|| WalletError::NotFound(id.to_string()))?;
        // re-checked under the lock so racing transitions cannot both win
        if wallet.status == status {
            return Err(WalletError::AlreadySuspended(id.to_string()));
        }
        wallet.status = status;
        let mut batch = WriteBatch::default();
        self.put_wallet(&mut batch, &wallet)?;
        self.db.write(batch).map_err(storage_err)?;
        Ok(wallet)
    }

    async fn stage_entry(&self, uow: &mut RocksUow, entry: NewEntry) -> Result<()> {
        uow.entries.push(entry);
        Ok(())
    }

    async fn entries(&self, id: &WalletId) -> Result<Vec<LedgerEntry>> {
        let cf = self.cf(CF_LEDGER)?;
        let mut out = Vec::new();
        for item in self.db.iterator_cf(cf, rocksdb::IteratorMode::Start) {
            let (_, value) = item.map_err(storage_err)?;
            let entry: LedgerEntry = serde_json::from_slice(&value).map_err(storage_err)?;
            if &entry.wallet_id == id {
                out.push(entry);
            }
        }
        Ok(out)
    }

    async fn code_consumed(&self, uow: &RocksUow, code: &str) -> Result<bool> {
        if uow
            .entries
            .iter()
            .any(|e| e.unique_code && e.transaction_id == code)
        {
            return Ok(true);
        }
        let cf = self.cf(CF_CODES)?;
        Ok(self
            .db
            .get_cf(cf, code.as_bytes())
            .map_err(storage_err)?
            .is_some())
    }

    async fn all_wallets(&self) -> Result<Vec<Wallet>> {
        let cf = self.cf(CF_WALLETS)?;
        let mut out = Vec::new();
        for item in self.db.iterator_cf(cf, rocksdb::IteratorMode::Start) {
            let (_, value) = item.map_err(storage_err)?;
            out.push(serde_json::from_slice(&value).map_err(storage_err)?);
        }
        Ok(out)
    }
}
