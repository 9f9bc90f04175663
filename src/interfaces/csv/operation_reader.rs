use crate::domain::wallet::{Amount, OwnerId, WalletId};
use crate::error::{Result, WalletError};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::io::Read;

#[derive(Debug, Deserialize, PartialEq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum OpKind {
    Create,
    Topup,
    Pay,
    Transfer,
    Suspend,
}

/// One raw row of an operation script. Which columns are required depends on
/// the operation; [`OperationRecord::into_operation`] enforces that.
#[derive(Debug, Deserialize, PartialEq, Clone)]
pub struct OperationRecord {
    pub op: OpKind,
    pub owner: Option<OwnerId>,
    pub currency: Option<String>,
    pub wallet: Option<String>,
    pub target: Option<String>,
    pub amount: Option<Decimal>,
    pub code: Option<String>,
}

/// A structurally validated engine operation.
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    Create {
        owner: OwnerId,
        currency: String,
    },
    TopUp {
        wallet: WalletId,
        amount: Amount,
        code: String,
    },
    Pay {
        wallet: WalletId,
        amount: Amount,
    },
    Transfer {
        from: WalletId,
        to: WalletId,
        amount: Amount,
    },
    Suspend {
        wallet: WalletId,
    },
}

fn required<T>(value: Option<T>, field: &str) -> Result<T> {
    value.ok_or_else(|| WalletError::Validation(format!("missing required field `{field}`")))
}

impl OperationRecord {
    /// Structural validation: required fields present and the amount positive.
    /// Business rules (funds, status, currency match) stay with the engine.
    pub fn into_operation(self) -> Result<Operation> {
        match self.op {
            OpKind::Create => Ok(Operation::Create {
                owner: required(self.owner, "owner")?,
                currency: required(self.currency, "currency")?,
            }),
            OpKind::Topup => Ok(Operation::TopUp {
                wallet: WalletId::new(required(self.wallet, "wallet")?),
                amount: Amount::new(required(self.amount, "amount")?)?,
                code: required(self.code, "code")?,
            }),
            OpKind::Pay => Ok(Operation::Pay {
                wallet: WalletId::new(required(self.wallet, "wallet")?),
                amount: Amount::new(required(self.amount, "amount")?)?,
            }),
            OpKind::Transfer => Ok(Operation::Transfer {
                from: WalletId::new(required(self.wallet, "wallet")?),
                to: WalletId::new(required(self.target, "target")?),
                amount: Amount::new(required(self.amount, "amount")?)?,
            }),
            OpKind::Suspend => Ok(Operation::Suspend {
                wallet: WalletId::new(required(self.wallet, "wallet")?),
            }),
        }
    }
}

/// Reads an operation script from a CSV source.
///
/// Wraps `csv::Reader` with whitespace trimming; rows deserialize lazily so
/// large scripts stream.
pub struct OperationReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> OperationReader<R> {
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(source);
        Self { reader }
    }

    pub fn operations(self) -> impl Iterator<Item = Result<OperationRecord>> {
        self.reader
            .into_deserialize()
            .map(|result| result.map_err(WalletError::from))
    }
}
