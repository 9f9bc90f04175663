use clap::Parser;
use miette::{IntoDiagnostic, Result};
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use wallet_ledger::application::engine::TransactionEngine;
use wallet_ledger::config::Settings;
use wallet_ledger::domain::ports::LedgerStore;
use wallet_ledger::infrastructure::memory::MemoryStore;
use wallet_ledger::interfaces::csv::operation_reader::{Operation, OperationReader};
use wallet_ledger::interfaces::csv::wallet_writer::WalletWriter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Input operations CSV file
    input: PathBuf,

    /// Path to persistent database (optional). If provided, uses RocksDB.
    #[arg(long)]
    db_path: Option<PathBuf>,

    /// Max time to wait for a wallet row lock, in milliseconds
    #[arg(long)]
    lock_wait_ms: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    let settings = Settings::load(cli.lock_wait_ms);

    if let Some(db_path) = cli.db_path {
        #[cfg(feature = "storage-rocksdb")]
        {
            let store = wallet_ledger::infrastructure::rocksdb::RocksDbStore::open(
                db_path,
                settings.lock_wait,
            )
            .into_diagnostic()?;
            return run(TransactionEngine::new(store), &cli.input).await;
        }
        #[cfg(not(feature = "storage-rocksdb"))]
        {
            let _ = db_path;
            return Err(miette::miette!(
                "this build has no persistent storage; rebuild with --features storage-rocksdb"
            ));
        }
    }

    let store = MemoryStore::with_lock_wait(settings.lock_wait);
    run(TransactionEngine::new(store), &cli.input).await
}

async fn run<S: LedgerStore>(engine: TransactionEngine<S>, input: &Path) -> Result<()> {
    let file = File::open(input).into_diagnostic()?;
    let reader = OperationReader::new(file);

    for record in reader.operations() {
        let operation = match record.and_then(|r| r.into_operation()) {
            Ok(operation) => operation,
            Err(e) => {
                eprintln!("skipping row: {}: {}", e.code(), e);
                continue;
            }
        };
        if let Err(e) = apply(&engine, operation).await {
            eprintln!("operation failed: {}: {}", e.code(), e);
        }
    }

    let wallets = engine.wallets().await.into_diagnostic()?;
    let stdout = io::stdout();
    let mut writer = WalletWriter::new(stdout.lock());
    writer.write_wallets(&wallets).into_diagnostic()?;
    Ok(())
}

async fn apply<S: LedgerStore>(
    engine: &TransactionEngine<S>,
    operation: Operation,
) -> wallet_ledger::error::Result<()> {
    match operation {
        Operation::Create { owner, currency } => {
            engine.create_wallet(owner, &currency).await?;
        }
        Operation::TopUp {
            wallet,
            amount,
            code,
        } => {
            engine.top_up(&wallet, amount, &code).await?;
        }
        Operation::Pay { wallet, amount } => {
            engine.pay(&wallet, amount).await?;
        }
        Operation::Transfer { from, to, amount } => {
            engine.transfer(&from, &to, amount).await?;
        }
        Operation::Suspend { wallet } => {
            engine.suspend(&wallet).await?;
        }
    }
    Ok(())
}
