//! Local command-line harness.
//!
//! Each mutating command loads the persisted snapshot, applies exactly one
//! ledger operation and writes the result back. There is no signing layer:
//! the calling account is passed explicitly.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use ed25519_dalek::SigningKey;
use rand::rngs::OsRng;
use thiserror::Error;
use tracing::info;

use crate::events::EventLog;
use crate::ledger::{LedgerError, TokenLedger};
use crate::storage::{Storage, StorageError};
use crate::types::{format_hex, Address, Amount, TokenConfig, TypeError, DEFAULT_DECIMALS};

#[derive(Debug, Error)]
pub enum CliError {
    #[error("Storage error: {0}")]
    StorageError(#[from] StorageError),
    #[error("Ledger error: {0}")]
    LedgerError(#[from] LedgerError),
    #[error("Input error: {0}")]
    TypeError(#[from] TypeError),
    #[error("Output encoding error: {0}")]
    EncodingError(#[from] serde_json::Error),
    #[error("Ledger not initialized; run `init` first")]
    NotInitialized,
    #[error("Ledger already initialized; pass --force to replace it")]
    AlreadyInitialized,
    #[error("Missing argument: {0}")]
    MissingArgument(&'static str),
}

#[derive(Parser, Debug)]
#[command(name = "token-ledger")]
#[command(about = "Fixed-supply fungible token ledger", long_about = None)]
pub struct Cli {
    /// Directory holding the ledger database
    #[arg(long, default_value = "token_data", global = true)]
    pub data_dir: PathBuf,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create the ledger, crediting the whole supply to the owner
    Init {
        /// JSON file with name, symbol, initial_supply, owner and optional decimals
        #[arg(long, conflicts_with_all = ["name", "symbol", "supply", "owner"])]
        config: Option<PathBuf>,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        symbol: Option<String>,
        #[arg(long)]
        supply: Option<Amount>,
        #[arg(long)]
        owner: Option<Address>,
        #[arg(long, default_value_t = DEFAULT_DECIMALS)]
        decimals: u8,
        /// Replace an existing ledger
        #[arg(long)]
        force: bool,
    },
    /// Show token metadata
    Info,
    Balance {
        account: Address,
    },
    Allowance {
        owner: Address,
        spender: Address,
    },
    /// Transfer tokens from the calling account
    Transfer {
        #[arg(long)]
        from: Address,
        to: Address,
        amount: Amount,
    },
    /// Set a spender's allowance over the calling account
    Approve {
        #[arg(long)]
        from: Address,
        spender: Address,
        amount: Amount,
    },
    /// Spend an allowance granted to the calling account
    TransferFrom {
        #[arg(long)]
        caller: Address,
        from: Address,
        to: Address,
        amount: Amount,
    },
    /// Generate an ed25519 keypair whose public key is a ledger address
    Keygen,
}

/// Run one command, returning the lines to print.
pub fn execute(command: Commands, storage: &dyn Storage) -> Result<Vec<String>, CliError> {
    match command {
        Commands::Init {
            config,
            name,
            symbol,
            supply,
            owner,
            decimals,
            force,
        } => {
            if !force && storage.get_snapshot()?.is_some() {
                return Err(CliError::AlreadyInitialized);
            }
            let config = match config {
                Some(path) => TokenConfig::from_json_file(path)?,
                None => TokenConfig::new(
                    name.ok_or(CliError::MissingArgument("--name"))?,
                    symbol.ok_or(CliError::MissingArgument("--symbol"))?,
                    supply.ok_or(CliError::MissingArgument("--supply"))?,
                    owner.ok_or(CliError::MissingArgument("--owner"))?,
                )
                .with_decimals(decimals),
            };
            let ledger = TokenLedger::new(config)?;
            storage.put_snapshot(&ledger.snapshot())?;
            info!(name = %ledger.name(), symbol = %ledger.symbol(), "ledger initialized");
            Ok(vec![format!(
                "Initialized {} ({}) with supply {} owned by {}",
                ledger.name(),
                ledger.symbol(),
                ledger.total_supply(),
                ledger.owner()
            )])
        }
        Commands::Info => {
            let ledger = load(storage)?;
            Ok(vec![
                format!("name: {}", ledger.name()),
                format!("symbol: {}", ledger.symbol()),
                format!("decimals: {}", ledger.decimals()),
                format!("total_supply: {}", ledger.total_supply()),
                format!("owner: {}", ledger.owner()),
                format!("state_root: {}", format_hex(&ledger.state_root())),
            ])
        }
        Commands::Balance { account } => {
            let ledger = load(storage)?;
            Ok(vec![ledger.balance_of(&account).to_string()])
        }
        Commands::Allowance { owner, spender } => {
            let ledger = load(storage)?;
            Ok(vec![ledger.allowance(&owner, &spender).to_string()])
        }
        Commands::Transfer { from, to, amount } => {
            apply(storage, |ledger, log| ledger.transfer(from, to, amount, log))
        }
        Commands::Approve {
            from,
            spender,
            amount,
        } => apply(storage, |ledger, log| ledger.approve(from, spender, amount, log)),
        Commands::TransferFrom {
            caller,
            from,
            to,
            amount,
        } => apply(storage, |ledger, log| {
            ledger.transfer_from(caller, from, to, amount, log)
        }),
        Commands::Keygen => {
            let signing_key = SigningKey::generate(&mut OsRng);
            let address = Address::from(signing_key.verifying_key());
            Ok(vec![
                format!("address: {}", address),
                format!("secret: {}", format_hex(&signing_key.to_bytes())),
            ])
        }
    }
}

fn load(storage: &dyn Storage) -> Result<TokenLedger, CliError> {
    let snapshot = storage.get_snapshot()?.ok_or(CliError::NotInitialized)?;
    Ok(TokenLedger::from_snapshot(snapshot)?)
}

// Persists only when the operation succeeded; a rejected call leaves the
// stored snapshot untouched.
fn apply<F>(storage: &dyn Storage, op: F) -> Result<Vec<String>, CliError>
where
    F: FnOnce(&mut TokenLedger, &mut EventLog) -> Result<(), LedgerError>,
{
    let mut ledger = load(storage)?;
    let mut log = EventLog::new();
    op(&mut ledger, &mut log)?;
    storage.put_snapshot(&ledger.snapshot())?;

    log.take()
        .iter()
        .map(|event| serde_json::to_string(event).map_err(CliError::from))
        .collect()
}
