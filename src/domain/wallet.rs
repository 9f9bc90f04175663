use crate::error::{Result, WalletError};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Reference to the owning account.
pub type OwnerId = u64;

/// External-facing wallet identifier.
///
/// Derived deterministically from owner and currency at creation time
/// (`user<owner>-<CURRENCY>`). Callers must treat the value as opaque but
/// stable. The derived `Ord` gives the total order used to canonicalize lock
/// acquisition for transfers.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WalletId(String);

impl WalletId {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Derives the identifier for an owner/currency pair.
    pub fn derive(owner: OwnerId, currency: &CurrencyCode) -> Self {
        Self(format!("user{owner}-{currency}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WalletId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for WalletId {
    fn from(raw: &str) -> Self {
        Self(raw.to_string())
    }
}

/// Currency code, 1 to 10 ASCII alphanumeric characters, stored uppercase.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CurrencyCode(String);

impl CurrencyCode {
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty()
            || trimmed.len() > 10
            || !trimmed.chars().all(|c| c.is_ascii_alphanumeric())
        {
            return Err(WalletError::InvalidCurrency(raw.to_string()));
        }
        Ok(Self(trimmed.to_ascii_uppercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CurrencyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A positive monetary amount, normalized to 2-decimal scale on construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Amount(Decimal);

impl Amount {
    pub fn new(value: Decimal) -> Result<Self> {
        let scaled = value.round_dp(2);
        if scaled <= Decimal::ZERO {
            return Err(WalletError::InvalidAmount(value));
        }
        Ok(Self(scaled))
    }

    pub fn value(&self) -> Decimal {
        self.0
    }
}

impl TryFrom<Decimal> for Amount {
    type Error = WalletError;

    fn try_from(value: Decimal) -> Result<Self> {
        Self::new(value)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A wallet balance. Never negative: the only way to reduce it is
/// [`Balance::debit`], which checks funds first.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub struct Balance(Decimal);

impl Balance {
    pub const ZERO: Self = Self(Decimal::ZERO);

    pub fn new(value: Decimal) -> Self {
        Self(value.round_dp(2))
    }

    pub fn value(&self) -> Decimal {
        self.0
    }

    pub fn credit(self, amount: Amount) -> Self {
        Self(self.0 + amount.value())
    }

    pub fn debit(self, amount: Amount) -> Result<Self> {
        if self.0 < amount.value() {
            return Err(WalletError::InsufficientFunds {
                available: self.0,
                required: amount.value(),
            });
        }
        Ok(Self(self.0 - amount.value()))
    }
}

impl fmt::Display for Balance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum WalletStatus {
    Active,
    Suspended,
}

impl fmt::Display for WalletStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WalletStatus::Active => f.write_str("ACTIVE"),
            WalletStatus::Suspended => f.write_str("SUSPENDED"),
        }
    }
}

/// An account-scoped, currency-scoped monetary balance.
///
/// The balance is mutated only by the orchestrator through the store; status
/// transitions one way, `Active` to `Suspended`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Wallet {
    /// Internal surrogate identifier, assigned by the store at creation.
    pub id: u64,
    pub wallet_id: WalletId,
    pub owner_id: OwnerId,
    pub currency: CurrencyCode,
    pub balance: Balance,
    pub status: WalletStatus,
    pub created_at: DateTime<Utc>,
}

impl Wallet {
    pub fn new(id: u64, owner_id: OwnerId, currency: CurrencyCode) -> Self {
        let wallet_id = WalletId::derive(owner_id, &currency);
        Self {
            id,
            wallet_id,
            owner_id,
            currency,
            balance: Balance::ZERO,
            status: WalletStatus::Active,
            created_at: Utc::now(),
        }
    }

    pub fn is_suspended(&self) -> bool {
        self.status == WalletStatus::Suspended
    }
}
