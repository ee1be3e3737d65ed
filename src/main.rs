use clap::Parser;
use tracing::error;
use tracing_subscriber::EnvFilter;

use token_ledger::cli::{execute, Cli};
use token_ledger::storage::SledStorage;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Logs go to stderr so command output on stdout stays machine-readable.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let storage = SledStorage::new(&cli.data_dir)?;

    match execute(cli.command, &storage) {
        Ok(lines) => {
            for line in lines {
                println!("{}", line);
            }
            Ok(())
        }
        Err(e) => {
            error!("command failed: {}", e);
            Err(e.into())
        }
    }
}
