use crate::domain::ledger::{
    self, LedgerEntry, NewEntry, generated_transaction_id, transfer_group_id,
};
use crate::domain::ports::LedgerStore;
use crate::domain::wallet::{Amount, CurrencyCode, OwnerId, Wallet, WalletId, WalletStatus};
use crate::error::{Result, WalletError};
use log::{debug, warn};

/// Outcome of a successful transfer: both refreshed wallets and the
/// correlation id shared by the two ledger entries it produced.
#[derive(Debug, Clone)]
pub struct TransferReceipt {
    pub from: Wallet,
    pub to: Wallet,
    pub transfer_group: String,
}

/// The transaction orchestrator.
///
/// Composes the wallet store, ledger recorder, and idempotency guard (all
/// behind [`LedgerStore`]) into the economic operations. Every mutating
/// operation runs as one atomic unit of work with exclusive row locks on each
/// wallet it touches, held for the unit's duration; any failed precondition
/// aborts before a write is issued, leaving balances and the ledger untouched.
pub struct TransactionEngine<S> {
    store: S,
}

impl<S: LedgerStore> TransactionEngine<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Creates a wallet for `(owner, currency)`. The external identifier is
    /// derived deterministically, so a repeat call conflicts rather than
    /// minting a second wallet.
    pub async fn create_wallet(&self, owner_id: OwnerId, currency: &str) -> Result<Wallet> {
        let currency = CurrencyCode::parse(currency)?;
        let wallet = self.store.create_wallet(owner_id, currency).await?;
        debug!(
            "created wallet {} for owner {}",
            wallet.wallet_id, owner_id
        );
        Ok(wallet)
    }

    /// Credits `amount` onto the wallet. `code` is the caller-supplied
    /// idempotency code: replaying it fails `DuplicateTransaction` and leaves
    /// the balance untouched.
    pub async fn top_up(&self, wallet_id: &WalletId, amount: Amount, code: &str) -> Result<Wallet> {
        let mut uow = self.store.begin().await?;
        let wallet = self.store.lock_wallet(&mut uow, wallet_id).await?;
        if wallet.is_suspended() {
            return Err(WalletError::InvalidState(wallet_id.to_string()));
        }
        // Checked inside the same unit of work as the write; the commit-time
        // uniqueness constraint closes any remaining replay window.
        if self.store.code_consumed(&uow, code).await? {
            return Err(WalletError::DuplicateTransaction(code.to_string()));
        }

        let entry = NewEntry::credit(&wallet, amount, code.to_string(), "Top up balance")
            .with_unique_code();
        let after = entry.after;
        self.store.stage_balance(&mut uow, wallet_id, after).await?;
        self.store.stage_entry(&mut uow, entry).await?;
        self.store.commit(uow).await?;

        debug!("top up of {} on {} committed", amount, wallet_id);
        let mut refreshed = wallet;
        refreshed.balance = after;
        Ok(refreshed)
    }

    /// Debits `amount` from the wallet. Fails `InsufficientFunds` before any
    /// write if the balance cannot cover it.
    pub async fn pay(&self, wallet_id: &WalletId, amount: Amount) -> Result<Wallet> {
        let mut uow = self.store.begin().await?;
        let wallet = self.store.lock_wallet(&mut uow, wallet_id).await?;
        if wallet.is_suspended() {
            return Err(WalletError::InvalidState(wallet_id.to_string()));
        }

        let entry = NewEntry::debit(
            &wallet,
            amount,
            generated_transaction_id(),
            "Payment deduction",
        )?;
        let after = entry.after;
        self.store.stage_balance(&mut uow, wallet_id, after).await?;
        self.store.stage_entry(&mut uow, entry).await?;
        self.store.commit(uow).await?;

        debug!("payment of {} from {} committed", amount, wallet_id);
        let mut refreshed = wallet;
        refreshed.balance = after;
        Ok(refreshed)
    }

    /// Moves `amount` between two same-currency wallets, producing one debit
    /// entry on the source and one credit entry on the target, committed as a
    /// single atomic unit. Locks are acquired in ascending external-id order
    /// regardless of argument order, so opposite-direction transfers cannot
    /// deadlock.
    pub async fn transfer(
        &self,
        from_id: &WalletId,
        to_id: &WalletId,
        amount: Amount,
    ) -> Result<TransferReceipt> {
        // Must come before locking: locking the same row twice would block on
        // itself until the wait times out.
        if from_id == to_id {
            return Err(WalletError::SameWallet);
        }

        let mut uow = self.store.begin().await?;
        let (first, second) = if from_id <= to_id {
            (from_id, to_id)
        } else {
            (to_id, from_id)
        };
        let first_wallet = self.store.lock_wallet(&mut uow, first).await?;
        let second_wallet = self.store.lock_wallet(&mut uow, second).await?;
        let (from, to) = if first == from_id {
            (first_wallet, second_wallet)
        } else {
            (second_wallet, first_wallet)
        };

        if from.is_suspended() {
            return Err(WalletError::InvalidState(from.wallet_id.to_string()));
        }
        if to.is_suspended() {
            return Err(WalletError::InvalidState(to.wallet_id.to_string()));
        }
        if from.currency != to.currency {
            return Err(WalletError::CurrencyMismatch {
                from: from.currency.to_string(),
                to: to.currency.to_string(),
            });
        }

        let group = transfer_group_id();
        let debit = NewEntry::debit(
            &from,
            amount,
            generated_transaction_id(),
            format!("Transfer to wallet {}", to.wallet_id),
        )?
        .with_transfer_group(&group);
        let credit = NewEntry::credit(
            &to,
            amount,
            generated_transaction_id(),
            format!("Transfer from wallet {}", from.wallet_id),
        )
        .with_transfer_group(&group);

        let from_after = debit.after;
        let to_after = credit.after;
        self.store
            .stage_balance(&mut uow, &from.wallet_id, from_after)
            .await?;
        self.store
            .stage_balance(&mut uow, &to.wallet_id, to_after)
            .await?;
        self.store.stage_entry(&mut uow, debit).await?;
        self.store.stage_entry(&mut uow, credit).await?;
        self.store.commit(uow).await?;

        debug!(
            "transfer of {} from {} to {} committed (group {})",
            amount, from.wallet_id, to.wallet_id, group
        );
        let mut from_refreshed = from;
        from_refreshed.balance = from_after;
        let mut to_refreshed = to;
        to_refreshed.balance = to_after;
        Ok(TransferReceipt {
            from: from_refreshed,
            to: to_refreshed,
            transfer_group: group,
        })
    }

    /// Suspends a wallet. Not an economic event: no ledger entry is written.
    /// The transition is one-way; there is no reactivate.
    pub async fn suspend(&self, wallet_id: &WalletId) -> Result<Wallet> {
        let wallet = self
            .store
            .get_wallet(wallet_id)
            .await?
            .ok_or_else(|| WalletError::NotFound(wallet_id.to_string()))?;
        if wallet.is_suspended() {
            return Err(WalletError::AlreadySuspended(wallet_id.to_string()));
        }
        let updated = self
            .store
            .set_status(wallet_id, WalletStatus::Suspended)
            .await?;
        warn!("wallet {} suspended", wallet_id);
        Ok(updated)
    }

    /// Committed-state read of one wallet.
    pub async fn wallet_details(&self, wallet_id: &WalletId) -> Result<Wallet> {
        self.store
            .get_wallet(wallet_id)
            .await?
            .ok_or_else(|| WalletError::NotFound(wallet_id.to_string()))
    }

    pub async fn find_wallet(&self, owner_id: OwnerId, currency: &str) -> Result<Wallet> {
        let currency = CurrencyCode::parse(currency)?;
        self.store
            .find_wallet(owner_id, &currency)
            .await?
            .ok_or_else(|| {
                WalletError::NotFound(WalletId::derive(owner_id, &currency).to_string())
            })
    }

    /// Ordered audit trail for one wallet. Replaying the entries yields the
    /// wallet's current balance.
    pub async fn history(&self, wallet_id: &WalletId) -> Result<Vec<LedgerEntry>> {
        self.wallet_details(wallet_id).await?;
        self.store.entries(wallet_id).await
    }

    /// Verifies the audit trail: every entry internally consistent and the
    /// replayed balance equal to the stored one.
    pub async fn audit(&self, wallet_id: &WalletId) -> Result<bool> {
        let wallet = self.wallet_details(wallet_id).await?;
        let entries = self.store.entries(wallet_id).await?;
        let consistent = entries.iter().all(LedgerEntry::is_consistent);
        Ok(consistent && ledger::replay_balance(&entries) == wallet.balance)
    }

    /// Snapshot of all wallets, sorted by external id.
    pub async fn wallets(&self) -> Result<Vec<Wallet>> {
        let mut wallets = self.store.all_wallets().await?;
        wallets.sort_by(|a, b| a.wallet_id.cmp(&b.wallet_id));
        Ok(wallets)
    }
}
