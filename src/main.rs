use clap::Parser;
use miette::{IntoDiagnostic, Result};
use payrecon::application::engine::PaymentEngine;
use payrecon::config::EngineConfig;
use payrecon::domain::ports::LedgerStoreBox;
use payrecon::infrastructure::in_memory::InMemoryLedger;
use payrecon::infrastructure::sandbox::SandboxProcessor;
use payrecon::interfaces::csv::ledger_writer::LedgerWriter;
use payrecon::interfaces::replay::Replay;
use std::fs::File;
use std::io::{self, BufReader, IsTerminal};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Input commands file (one JSON command per line)
    input: PathBuf,

    /// Path to persistent database (optional). If provided, uses RocksDB.
    #[arg(long)]
    db_path: Option<PathBuf>,

    /// Deadline for each request, in milliseconds
    #[arg(long, default_value_t = 5000)]
    timeout_ms: u64,

    /// Print the transaction history instead of user balances
    #[arg(long)]
    history: bool,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

fn open_store(db_path: Option<PathBuf>) -> Result<LedgerStoreBox> {
    match db_path {
        #[cfg(feature = "storage-rocksdb")]
        Some(path) => {
            let store = payrecon::infrastructure::rocksdb::RocksDbLedger::open(&path)?;
            tracing::debug!(path = %path.display(), "Opened RocksDB ledger");
            Ok(Box::new(store))
        }
        #[cfg(not(feature = "storage-rocksdb"))]
        Some(_) => {
            tracing::warn!(
                "Persistent storage requested via --db-path, but 'storage-rocksdb' feature is not enabled. Falling back to In-Memory storage."
            );
            Ok(Box::new(InMemoryLedger::new()))
        }
        None => Ok(Box::new(InMemoryLedger::new())),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with_writer(io::stderr)
        .with_ansi(io::stderr().is_terminal())
        .init();

    let store = open_store(cli.db_path)?;
    let sandbox = SandboxProcessor::new();
    let config = EngineConfig::default().with_call_timeout(Duration::from_millis(cli.timeout_ms));
    let engine = PaymentEngine::new(store, Box::new(sandbox.clone()), config);

    let file = File::open(&cli.input).into_diagnostic()?;
    let mut replay = Replay::new(engine, sandbox);
    let summary = replay.run(BufReader::new(file)).await?;
    tracing::info!(
        executed = summary.executed,
        failed = summary.failed,
        unreadable = summary.unreadable,
        "Replay finished"
    );

    let engine = replay.into_engine();
    let stdout = io::stdout();
    let mut writer = LedgerWriter::new(stdout.lock());
    if cli.history {
        writer.write_transactions(&engine.transactions().await?)?;
    } else {
        writer.write_users(&engine.users().await?)?;
    }

    Ok(())
}
