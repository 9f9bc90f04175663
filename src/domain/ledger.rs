use crate::domain::wallet::{Amount, Balance, CurrencyCode, Wallet, WalletId};
use crate::error::Result;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EntryType {
    /// Reduces the wallet balance.
    Debit,
    /// Increases the wallet balance.
    Credit,
}

impl fmt::Display for EntryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntryType::Debit => f.write_str("DEBIT"),
            EntryType::Credit => f.write_str("CREDIT"),
        }
    }
}

/// A ledger row staged inside a unit of work, before the store assigns a
/// surrogate id and timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewEntry {
    pub wallet_id: WalletId,
    pub transaction_id: String,
    /// Correlates the two entries produced by one transfer.
    pub transfer_group: Option<String>,
    pub currency: CurrencyCode,
    pub entry_type: EntryType,
    pub amount: Amount,
    pub before: Balance,
    pub after: Balance,
    pub description: String,
    /// External codes (top-up) carry a store-level uniqueness constraint;
    /// generated ids do not.
    pub unique_code: bool,
}

impl NewEntry {
    /// Builds a credit entry against the wallet's current balance.
    pub fn credit(
        wallet: &Wallet,
        amount: Amount,
        transaction_id: String,
        description: impl Into<String>,
    ) -> Self {
        Self {
            wallet_id: wallet.wallet_id.clone(),
            transaction_id,
            transfer_group: None,
            currency: wallet.currency.clone(),
            entry_type: EntryType::Credit,
            amount,
            before: wallet.balance,
            after: wallet.balance.credit(amount),
            description: description.into(),
            unique_code: false,
        }
    }

    /// Builds a debit entry; fails with `InsufficientFunds` if the wallet
    /// cannot cover the amount.
    pub fn debit(
        wallet: &Wallet,
        amount: Amount,
        transaction_id: String,
        description: impl Into<String>,
    ) -> Result<Self> {
        let after = wallet.balance.debit(amount)?;
        Ok(Self {
            wallet_id: wallet.wallet_id.clone(),
            transaction_id,
            transfer_group: None,
            currency: wallet.currency.clone(),
            entry_type: EntryType::Debit,
            amount,
            before: wallet.balance,
            after,
            description: description.into(),
            unique_code: false,
        })
    }

    pub fn with_unique_code(mut self) -> Self {
        self.unique_code = true;
        self
    }

    pub fn with_transfer_group(mut self, group: &str) -> Self {
        self.transfer_group = Some(group.to_string());
        self
    }

    /// Finalizes the row once the store assigns its surrogate id.
    pub fn into_entry(self, id: u64) -> LedgerEntry {
        LedgerEntry {
            id,
            wallet_id: self.wallet_id,
            transaction_id: self.transaction_id,
            transfer_group: self.transfer_group,
            currency: self.currency,
            entry_type: self.entry_type,
            amount: self.amount,
            before: self.before,
            after: self.after,
            description: self.description,
            created_at: Utc::now(),
        }
    }
}

/// An immutable record of one balance-affecting event.
///
/// Never updated or deleted; the ordered sequence of a wallet's entries is a
/// complete audit trail from which the current balance can be replayed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: u64,
    pub wallet_id: WalletId,
    pub transaction_id: String,
    pub transfer_group: Option<String>,
    pub currency: CurrencyCode,
    pub entry_type: EntryType,
    pub amount: Amount,
    /// Wallet balance immediately before this entry.
    pub before: Balance,
    /// Wallet balance immediately after this entry.
    pub after: Balance,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

impl LedgerEntry {
    /// Signed delta this entry applied to the wallet balance.
    pub fn signed_delta(&self) -> Decimal {
        match self.entry_type {
            EntryType::Credit => self.amount.value(),
            EntryType::Debit => -self.amount.value(),
        }
    }

    /// Checks `after = before + amount` (credit) / `after = before - amount`
    /// (debit).
    pub fn is_consistent(&self) -> bool {
        self.after.value() == self.before.value() + self.signed_delta()
    }
}

/// Replays an ordered entry sequence into a balance.
pub fn replay_balance(entries: &[LedgerEntry]) -> Balance {
    let total = entries.iter().map(LedgerEntry::signed_delta).sum();
    Balance::new(total)
}

/// Generated identifier for engine-internal transactions (payments and the
/// two legs of a transfer).
pub fn generated_transaction_id() -> String {
    format!("TXN-{}", Uuid::new_v4().simple())
}

/// Correlation id shared by the two entries of one transfer.
pub fn transfer_group_id() -> String {
    Uuid::new_v4().to_string()
}
