use crate::domain::ledger::{LedgerEntry, NewEntry};
use crate::domain::wallet::{Balance, CurrencyCode, OwnerId, Wallet, WalletId, WalletStatus};
use crate::error::Result;
use async_trait::async_trait;

/// Storage port for the ledger engine: wallet rows, append-only ledger
/// entries, and the idempotency index over consumed transaction codes.
///
/// Mutations flow through a unit of work (`Uow`): writes are staged against it
/// and become visible all at once on [`commit`](LedgerStore::commit). Dropping
/// an uncommitted unit of work rolls everything back. Exclusive row locks
/// taken by [`lock_wallet`](LedgerStore::lock_wallet) are held until the unit
/// of work commits or is dropped.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    type Uow: Send;

    /// Opens a unit of work.
    async fn begin(&self) -> Result<Self::Uow>;

    /// Atomically applies every staged write. The uniqueness constraint on
    /// external transaction codes is re-checked here as the last line of
    /// defense; on any failure nothing is applied.
    async fn commit(&self, uow: Self::Uow) -> Result<()>;

    /// Fetches a wallet under an exclusive row lock with a bounded wait.
    /// Fails `Busy` on timeout, `NotFound` if the wallet does not exist.
    /// Re-locking a wallet already held by this unit of work returns the
    /// current in-uow view.
    async fn lock_wallet(&self, uow: &mut Self::Uow, id: &WalletId) -> Result<Wallet>;

    /// Unlocked read of committed state. Blocks behind in-flight row locks,
    /// so it never observes a half-applied transfer.
    async fn get_wallet(&self, id: &WalletId) -> Result<Option<Wallet>>;

    async fn find_wallet(&self, owner: OwnerId, currency: &CurrencyCode) -> Result<Option<Wallet>>;

    /// Creates a wallet with a derived external id, zero balance, `Active`
    /// status. Fails `Conflict` if `(owner, currency)` already has a wallet.
    async fn create_wallet(&self, owner: OwnerId, currency: CurrencyCode) -> Result<Wallet>;

    /// Stages a balance write; the row lock must already be held by `uow`.
    async fn stage_balance(&self, uow: &mut Self::Uow, id: &WalletId, balance: Balance)
        -> Result<()>;

    /// Single-row status write under the row lock, no unit of work required.
    /// Compare-and-set: fails `AlreadySuspended` if the wallet already holds
    /// `status`, so two racing transitions cannot both report success.
    async fn set_status(&self, id: &WalletId, status: WalletStatus) -> Result<Wallet>;

    /// Stages an append to the ledger. The recorder is strictly additive:
    /// there is no update or delete.
    async fn stage_entry(&self, uow: &mut Self::Uow, entry: NewEntry) -> Result<()>;

    /// Ordered audit trail for one wallet.
    async fn entries(&self, id: &WalletId) -> Result<Vec<LedgerEntry>>;

    /// Idempotency check: has this external transaction code been consumed?
    /// Scoped to the unit of work so the check and the later write are
    /// serialized against concurrent use of the same code.
    async fn code_consumed(&self, uow: &Self::Uow, code: &str) -> Result<bool>;

    /// Snapshot of every wallet, for reporting at the end of a run.
    async fn all_wallets(&self) -> Result<Vec<Wallet>>;
}
