use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::events::LedgerEvent;
use crate::ledger::{LedgerError, LedgerSnapshot, TokenLedger};
use crate::types::{Address, Amount};

/// Thread-safe handle to a [`TokenLedger`].
///
/// Every call holds one lock for its whole duration, so no caller can observe
/// a partially applied transition. Mutating calls return the events they
/// produced in emission order.
#[derive(Clone)]
pub struct SharedLedger {
    inner: Arc<Mutex<TokenLedger>>,
}

impl SharedLedger {
    pub fn new(ledger: TokenLedger) -> Self {
        SharedLedger {
            inner: Arc::new(Mutex::new(ledger)),
        }
    }

    // Transitions validate before writing and never panic halfway, so a
    // poisoned lock still guards a valid ledger.
    fn lock(&self) -> MutexGuard<'_, TokenLedger> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn name(&self) -> String {
        self.lock().name().to_string()
    }

    pub fn symbol(&self) -> String {
        self.lock().symbol().to_string()
    }

    pub fn total_supply(&self) -> Amount {
        self.lock().total_supply()
    }

    pub fn balance_of(&self, account: &Address) -> Amount {
        self.lock().balance_of(account)
    }

    pub fn allowance(&self, owner: &Address, spender: &Address) -> Amount {
        self.lock().allowance(owner, spender)
    }

    pub fn transfer(
        &self,
        caller: Address,
        to: Address,
        amount: Amount,
    ) -> Result<Vec<LedgerEvent>, LedgerError> {
        let mut events = Vec::new();
        self.lock().transfer(caller, to, amount, &mut events)?;
        Ok(events)
    }

    pub fn approve(
        &self,
        caller: Address,
        spender: Address,
        amount: Amount,
    ) -> Result<Vec<LedgerEvent>, LedgerError> {
        let mut events = Vec::new();
        self.lock().approve(caller, spender, amount, &mut events)?;
        Ok(events)
    }

    pub fn transfer_from(
        &self,
        caller: Address,
        from: Address,
        to: Address,
        amount: Amount,
    ) -> Result<Vec<LedgerEvent>, LedgerError> {
        let mut events = Vec::new();
        self.lock()
            .transfer_from(caller, from, to, amount, &mut events)?;
        Ok(events)
    }

    /// Consistent point-in-time copy of the ledger.
    pub fn snapshot(&self) -> LedgerSnapshot {
        self.lock().snapshot()
    }

    /// Run a read-only closure against one consistent view of the ledger.
    pub fn with_ledger<R>(&self, f: impl FnOnce(&TokenLedger) -> R) -> R {
        f(&self.lock())
    }
}
