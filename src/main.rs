//! Ledger Core CLI
//!
//! Replays an operations CSV against a ledger store and prints final
//! account balances.
//!
//! # Usage
//!
//! ```bash
//! cargo run -- operations.csv > balances.csv          # in-memory
//! cargo run -- operations.csv ledger.journal          # durable journal
//! ```
//!
//! Input columns: `op,account,counterparty,amount`, where `op` is one of
//! `open`, `deposit`, `withdraw`, `transfer`. `counterparty` is the transfer
//! recipient; `amount` is the opening balance for `open` (defaults to zero).
//!
//! # Environment Variables
//!
//! - `RUST_LOG`: Set to `debug` or `warn` to control logging verbosity

use csv::{ReaderBuilder, Trim};
use ledger_core::{
    AccountId, JournalStore, LedgerError, LedgerStore, MemoryStore, Money, TransferEngine,
};
use log::warn;
use serde::Deserialize;
use std::env;
use std::fs::File;
use std::io::{self, BufReader, Read, Write};
use std::process;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug)]
enum CliError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("{0}")]
    Ledger(#[from] LedgerError),

    #[error("invalid amount: {0}")]
    Amount(#[from] rust_decimal::Error),

    #[error("Missing input file argument. Usage: ledger-core <operations.csv> [journal-file]")]
    MissingArgument,
}

/// Raw operation row as read from CSV.
#[derive(Debug, Deserialize)]
struct OpRecord {
    op: String,
    account: String,
    counterparty: Option<String>,
    amount: Option<String>,
}

impl OpRecord {
    /// Distinguishes an absent amount (`Ok(None)`) from a malformed one,
    /// so a row like `open,alice,,abc` is skipped with a warning instead
    /// of silently opening the account at zero.
    fn amount(&self) -> Result<Option<Money>, rust_decimal::Error> {
        match self.amount.as_deref().map(str::trim) {
            None | Some("") => Ok(None),
            Some(trimmed) => Money::from_str(trimmed).map(Some),
        }
    }

    fn counterparty(&self) -> Option<AccountId> {
        let raw = self.counterparty.as_ref()?;
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return None;
        }
        Some(AccountId::from(trimmed))
    }
}

fn main() {
    env_logger::init();

    if let Err(e) = run() {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn run() -> Result<(), CliError> {
    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        return Err(CliError::MissingArgument);
    }

    let file = File::open(&args[1])?;
    let reader = BufReader::new(file);

    match args.get(2) {
        Some(journal_path) => {
            let engine = TransferEngine::new(JournalStore::open(journal_path)?);
            replay(&engine, reader)?;
            report(&engine, io::stdout().lock())
        }
        None => {
            let engine = TransferEngine::new(MemoryStore::new());
            replay(&engine, reader)?;
            report(&engine, io::stdout().lock())
        }
    }
}

/// Applies each operation row; failed rows are logged and skipped.
fn replay<S: LedgerStore, R: Read>(
    engine: &TransferEngine<S>,
    reader: R,
) -> Result<(), CliError> {
    let mut csv_reader = ReaderBuilder::new()
        .trim(Trim::All)
        .flexible(true)
        .from_reader(reader);

    for (row_idx, result) in csv_reader.deserialize::<OpRecord>().enumerate() {
        let row_num = row_idx + 2; // 1-indexed, accounting for header row

        let record = match result {
            Ok(record) => record,
            Err(e) => {
                warn!("Row {}: CSV parse error: {}", row_num, e);
                continue;
            }
        };

        if let Err(e) = apply(engine, &record) {
            warn!("Row {}: {}", row_num, e);
        }
    }

    Ok(())
}

fn apply<S: LedgerStore>(engine: &TransferEngine<S>, record: &OpRecord) -> Result<(), CliError> {
    let account = AccountId::from(record.account.trim());

    match record.op.trim().to_lowercase().as_str() {
        "open" => {
            let opening = record.amount()?.unwrap_or(Money::ZERO);
            engine.open_account(&account, opening)?;
        }
        "deposit" => {
            let amount = record.amount()?.ok_or(LedgerError::InvalidAmount)?;
            engine.deposit(&account, amount)?;
        }
        "withdraw" => {
            let amount = record.amount()?.ok_or(LedgerError::InvalidAmount)?;
            engine.withdraw(&account, amount)?;
        }
        "transfer" => {
            let amount = record.amount()?.ok_or(LedgerError::InvalidAmount)?;
            let to = match record.counterparty() {
                Some(to) => to,
                None => {
                    warn!("transfer from {} missing counterparty, skipping", account);
                    return Ok(());
                }
            };
            engine.transfer(&account, &to, amount)?;
        }
        other => {
            warn!("unknown operation {:?}, skipping", other);
        }
    }

    Ok(())
}

/// Writes final balances as CSV, sorted by account id for deterministic
/// output.
fn report<S: LedgerStore, W: Write>(engine: &TransferEngine<S>, writer: W) -> Result<(), CliError> {
    let mut csv_writer = csv::Writer::from_writer(writer);

    csv_writer.write_record(["account", "balance"])?;

    let mut accounts = engine.store().list_accounts()?;
    accounts.sort_by(|a, b| a.0.cmp(&b.0));

    for (account, balance) in accounts {
        csv_writer.write_record([account.to_string(), balance.to_string()])?;
    }

    csv_writer.flush()?;
    Ok(())
}
