use crate::domain::wallet::Wallet;
use crate::error::Result;
use std::io::Write;

/// Writes final wallet states as CSV.
pub struct WalletWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> WalletWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(sink),
        }
    }

    pub fn write_wallets(&mut self, wallets: &[Wallet]) -> Result<()> {
        self.writer
            .write_record(["wallet_id", "owner", "currency", "balance", "status"])?;
        for wallet in wallets {
            // print balances at the fixed 2-decimal scale
            let mut balance = wallet.balance.value();
            balance.rescale(2);
            self.writer.write_record([
                wallet.wallet_id.as_str(),
                &wallet.owner_id.to_string(),
                wallet.currency.as_str(),
                &balance.to_string(),
                &wallet.status.to_string(),
            ])?;
        }
        self.writer.flush().map_err(csv::Error::from)?;
        Ok(())
    }
}
