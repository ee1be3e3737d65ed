// src/lib.rs

pub mod types;
pub mod events;
pub mod ledger;
pub mod runtime;
pub mod storage;
pub mod cli;

pub use events::{EventLog, EventSink, LedgerEvent};
pub use ledger::{LedgerError, LedgerSnapshot, TokenLedger};
pub use runtime::SharedLedger;
pub use types::{Address, Amount, TokenConfig};
