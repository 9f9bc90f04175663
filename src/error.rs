use rust_decimal::Decimal;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, WalletError>;

/// Failures surfaced by the ledger engine.
///
/// Business-rule failures are detected before any write and abort the whole
/// unit of work. `Busy` is the only variant a caller may blindly retry.
#[derive(Error, Debug)]
pub enum WalletError {
    #[error("wallet `{0}` not found")]
    NotFound(String),
    #[error("owner {owner_id} already has a wallet for currency {currency}")]
    Conflict { owner_id: u64, currency: String },
    #[error("wallet `{0}` is suspended")]
    InvalidState(String),
    #[error("insufficient funds: available {available}, required {required}")]
    InsufficientFunds {
        available: Decimal,
        required: Decimal,
    },
    #[error("transaction code `{0}` already used")]
    DuplicateTransaction(String),
    #[error("cannot transfer to the same wallet")]
    SameWallet,
    #[error("currency mismatch between wallets: {from} vs {to}")]
    CurrencyMismatch { from: String, to: String },
    #[error("wallet `{0}` is already suspended")]
    AlreadySuspended(String),
    #[error("timed out waiting for a lock on wallet `{0}`")]
    Busy(String),
    #[error("amount must be positive: {0}")]
    InvalidAmount(Decimal),
    #[error("invalid currency code `{0}`")]
    InvalidCurrency(String),
    #[error("invalid request: {0}")]
    Validation(String),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("storage failure: {0}")]
    Storage(String),
}

impl WalletError {
    /// Stable machine-readable kind, intended for transport layers that map
    /// errors onto their own status codes.
    pub fn code(&self) -> &'static str {
        match self {
            WalletError::NotFound(_) => "NOT_FOUND",
            WalletError::Conflict { .. } => "CONFLICT",
            WalletError::InvalidState(_) => "INVALID_STATE",
            WalletError::InsufficientFunds { .. } => "INSUFFICIENT_FUNDS",
            WalletError::DuplicateTransaction(_) => "DUPLICATE_TRANSACTION",
            WalletError::SameWallet => "SAME_WALLET",
            WalletError::CurrencyMismatch { .. } => "CURRENCY_MISMATCH",
            WalletError::AlreadySuspended(_) => "ALREADY_SUSPENDED",
            WalletError::Busy(_) => "BUSY",
            WalletError::InvalidAmount(_) => "INVALID_AMOUNT",
            WalletError::InvalidCurrency(_) => "INVALID_CURRENCY",
            WalletError::Validation(_) => "VALIDATION",
            WalletError::Csv(_) => "CSV",
            WalletError::Storage(_) => "STORAGE",
        }
    }

    /// Whether the caller can retry the operation unchanged without risking a
    /// double apply. Only lock-wait timeouts qualify: they fail before any
    /// write is issued.
    pub fn is_retryable(&self) -> bool {
        matches!(self, WalletError::Busy(_))
    }
}
