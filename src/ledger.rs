use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, warn};

use crate::events::{EventSink, LedgerEvent};
use crate::types::{Address, Amount, TokenConfig};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error("not enough tokens for transfer: {account} holds {balance}, requested {requested}")]
    InsufficientBalance {
        account: Address,
        balance: Amount,
        requested: Amount,
    },
    #[error("allowance too low: {spender} may spend {allowance} on behalf of {owner}, requested {requested}")]
    AllowanceTooLow {
        owner: Address,
        spender: Address,
        allowance: Amount,
        requested: Amount,
    },
    #[error("Invalid token configuration: {0}")]
    InvalidConfig(String),
    #[error("Corrupt ledger snapshot: {0}")]
    CorruptSnapshot(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllowanceEntry {
    pub owner: Address,
    pub spender: Address,
    pub amount: Amount,
}

/// Point-in-time copy of the whole ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
    pub total_supply: Amount,
    pub owner: Address,
    pub balances: BTreeMap<Address, Amount>,
    pub allowances: Vec<AllowanceEntry>,
}

/// Fixed-supply fungible token ledger.
///
/// All mutation goes through [`transfer`](Self::transfer),
/// [`approve`](Self::approve) and [`transfer_from`](Self::transfer_from).
/// Each one validates every precondition before touching state, so a failed
/// call leaves balances and allowances exactly as they were.
///
/// Absent balances and allowances read as zero; zero values are never stored.
#[derive(Debug, Clone)]
pub struct TokenLedger {
    name: String,
    symbol: String,
    decimals: u8,
    total_supply: Amount,
    owner: Address,
    balances: BTreeMap<Address, Amount>,
    allowances: BTreeMap<(Address, Address), Amount>,
}

impl TokenLedger {
    /// Create a ledger with the entire supply credited to `config.owner`.
    pub fn new(config: TokenConfig) -> Result<Self, LedgerError> {
        validate_metadata(&config.name, &config.symbol)?;

        let mut ledger = TokenLedger {
            name: config.name,
            symbol: config.symbol,
            decimals: config.decimals,
            total_supply: config.initial_supply,
            owner: config.owner,
            balances: BTreeMap::new(),
            allowances: BTreeMap::new(),
        };
        ledger.set_balance(config.owner, config.initial_supply);

        debug!(
            name = %ledger.name,
            symbol = %ledger.symbol,
            supply = %ledger.total_supply,
            owner = %ledger.owner,
            "ledger created"
        );
        Ok(ledger)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn decimals(&self) -> u8 {
        self.decimals
    }

    pub fn total_supply(&self) -> Amount {
        self.total_supply
    }

    /// Account that received the initial supply.
    pub fn owner(&self) -> Address {
        self.owner
    }

    pub fn balance_of(&self, account: &Address) -> Amount {
        self.balances.get(account).copied().unwrap_or(0)
    }

    pub fn allowance(&self, owner: &Address, spender: &Address) -> Amount {
        self.allowances
            .get(&(*owner, *spender))
            .copied()
            .unwrap_or(0)
    }

    /// Move `amount` from `caller` to `to`.
    ///
    /// Self-transfers and zero-value transfers succeed and still emit a
    /// `Transfer` event.
    pub fn transfer(
        &mut self,
        caller: Address,
        to: Address,
        amount: Amount,
        sink: &mut dyn EventSink,
    ) -> Result<(), LedgerError> {
        if let Err(e) = self.move_balance(caller, to, amount) {
            warn!(from = %caller, to = %to, amount = %amount, "transfer rejected: {}", e);
            return Err(e);
        }

        debug!(from = %caller, to = %to, amount = %amount, "transfer committed");
        sink.emit(LedgerEvent::Transfer {
            from: caller,
            to,
            value: amount,
        });
        Ok(())
    }

    /// Set the allowance of `spender` over `caller`'s balance to `amount`.
    ///
    /// The previous allowance is overwritten, not added to. A spender that
    /// observes a pending change can still spend the old allowance first;
    /// callers that need increments must read and re-approve themselves.
    pub fn approve(
        &mut self,
        caller: Address,
        spender: Address,
        amount: Amount,
        sink: &mut dyn EventSink,
    ) -> Result<(), LedgerError> {
        self.set_allowance(caller, spender, amount);

        debug!(owner = %caller, spender = %spender, amount = %amount, "approval committed");
        sink.emit(LedgerEvent::Approval {
            owner: caller,
            spender,
            value: amount,
        });
        Ok(())
    }

    /// Move `amount` from `from` to `to` on behalf of `caller`, consuming
    /// allowance.
    ///
    /// The allowance is checked before the balance, so an unauthorized caller
    /// always gets `AllowanceTooLow`. No `Approval` event is emitted for the
    /// allowance decrement.
    pub fn transfer_from(
        &mut self,
        caller: Address,
        from: Address,
        to: Address,
        amount: Amount,
        sink: &mut dyn EventSink,
    ) -> Result<(), LedgerError> {
        let allowance = self.allowance(&from, &caller);
        let result = match allowance.checked_sub(amount) {
            None => Err(LedgerError::AllowanceTooLow {
                owner: from,
                spender: caller,
                allowance,
                requested: amount,
            }),
            Some(remaining) => self
                .move_balance(from, to, amount)
                .map(|()| self.set_allowance(from, caller, remaining)),
        };

        if let Err(e) = result {
            warn!(
                spender = %caller,
                from = %from,
                to = %to,
                amount = %amount,
                "transfer_from rejected: {}",
                e
            );
            return Err(e);
        }

        debug!(spender = %caller, from = %from, to = %to, amount = %amount, "transfer_from committed");
        sink.emit(LedgerEvent::Transfer {
            from,
            to,
            value: amount,
        });
        Ok(())
    }

    pub fn snapshot(&self) -> LedgerSnapshot {
        LedgerSnapshot {
            name: self.name.clone(),
            symbol: self.symbol.clone(),
            decimals: self.decimals,
            total_supply: self.total_supply,
            owner: self.owner,
            balances: self.balances.clone(),
            allowances: self
                .allowances
                .iter()
                .map(|(&(owner, spender), &amount)| AllowanceEntry {
                    owner,
                    spender,
                    amount,
                })
                .collect(),
        }
    }

    /// Rebuild a ledger from a snapshot, rejecting any snapshot that breaks
    /// conservation or repeats an allowance pair.
    pub fn from_snapshot(snapshot: LedgerSnapshot) -> Result<Self, LedgerError> {
        validate_metadata(&snapshot.name, &snapshot.symbol)?;

        let sum = checked_sum(snapshot.balances.values().copied()).ok_or_else(|| {
            LedgerError::CorruptSnapshot("balance sum overflows".to_string())
        })?;
        if sum != snapshot.total_supply {
            return Err(LedgerError::CorruptSnapshot(format!(
                "balances sum to {}, total supply is {}",
                sum, snapshot.total_supply
            )));
        }

        let mut allowances = BTreeMap::new();
        for entry in snapshot.allowances {
            if allowances
                .insert((entry.owner, entry.spender), entry.amount)
                .is_some()
            {
                return Err(LedgerError::CorruptSnapshot(format!(
                    "duplicate allowance for owner {} and spender {}",
                    entry.owner, entry.spender
                )));
            }
        }
        allowances.retain(|_, amount| *amount > 0);

        let mut balances = snapshot.balances;
        balances.retain(|_, amount| *amount > 0);

        Ok(TokenLedger {
            name: snapshot.name,
            symbol: snapshot.symbol,
            decimals: snapshot.decimals,
            total_supply: snapshot.total_supply,
            owner: snapshot.owner,
            balances,
            allowances,
        })
    }

    /// SHA-256 digest over all balances and allowances in key order.
    pub fn state_root(&self) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(b"balances");
        for (account, amount) in &self.balances {
            hasher.update(account.as_bytes());
            hasher.update(amount.to_le_bytes());
        }
        hasher.update(b"allowances");
        for ((owner, spender), amount) in &self.allowances {
            hasher.update(owner.as_bytes());
            hasher.update(spender.as_bytes());
            hasher.update(amount.to_le_bytes());
        }
        hasher.finalize().into()
    }

    /// Sum of every stored balance, or `None` on overflow.
    pub fn circulating_sum(&self) -> Option<Amount> {
        checked_sum(self.balances.values().copied())
    }

    pub fn holders(&self) -> impl Iterator<Item = (&Address, &Amount)> {
        self.balances.iter()
    }

    // Validates before writing anything, so an error leaves state untouched.
    fn move_balance(&mut self, from: Address, to: Address, amount: Amount) -> Result<(), LedgerError> {
        let balance = self.balance_of(&from);
        let remaining = balance
            .checked_sub(amount)
            .ok_or(LedgerError::InsufficientBalance {
                account: from,
                balance,
                requested: amount,
            })?;
        self.set_balance(from, remaining);

        // Bounded by total supply, which fits in Amount.
        let credited = self.balance_of(&to).saturating_add(amount);
        self.set_balance(to, credited);
        Ok(())
    }

    fn set_balance(&mut self, account: Address, amount: Amount) {
        if amount == 0 {
            self.balances.remove(&account);
        } else {
            self.balances.insert(account, amount);
        }
    }

    fn set_allowance(&mut self, owner: Address, spender: Address, amount: Amount) {
        if amount == 0 {
            self.allowances.remove(&(owner, spender));
        } else {
            self.allowances.insert((owner, spender), amount);
        }
    }
}

fn validate_metadata(name: &str, symbol: &str) -> Result<(), LedgerError> {
    if name.trim().is_empty() {
        return Err(LedgerError::InvalidConfig("token name is empty".to_string()));
    }
    if symbol.trim().is_empty() {
        return Err(LedgerError::InvalidConfig("token symbol is empty".to_string()));
    }
    Ok(())
}

fn checked_sum(amounts: impl Iterator<Item = Amount>) -> Option<Amount> {
    amounts.fold(Some(0), |acc: Option<Amount>, x| acc?.checked_add(x))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventLog;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn addr(tag: u8) -> Address {
        Address::from_bytes([tag; 32])
    }

    fn ledger(supply: Amount) -> TokenLedger {
        TokenLedger::new(TokenConfig::new("ERC20Token", "ERT", supply, addr(0))).unwrap()
    }

    #[test]
    fn test_new_credits_owner() {
        let l = ledger(1_000_000);
        assert_eq!(l.balance_of(&addr(0)), 1_000_000);
        assert_eq!(l.balance_of(&addr(1)), 0);
        assert_eq!(l.owner(), addr(0));
        assert_eq!(l.circulating_sum(), Some(l.total_supply()));
    }

    #[test]
    fn test_new_rejects_blank_metadata() {
        let err = TokenLedger::new(TokenConfig::new("  ", "ERT", 1, addr(0))).unwrap_err();
        assert!(matches!(err, LedgerError::InvalidConfig(_)));
        let err = TokenLedger::new(TokenConfig::new("Token", "", 1, addr(0))).unwrap_err();
        assert!(matches!(err, LedgerError::InvalidConfig(_)));
    }

    #[test]
    fn test_zero_supply_ledger_has_no_holders() {
        let l = ledger(0);
        assert_eq!(l.holders().count(), 0);
        assert_eq!(l.balance_of(&addr(0)), 0);
    }

    #[test]
    fn test_self_transfer_keeps_balance_and_emits() {
        let mut l = ledger(500);
        let mut log = EventLog::new();
        l.transfer(addr(0), addr(0), 200, &mut log).unwrap();

        assert_eq!(l.balance_of(&addr(0)), 500);
        assert_eq!(
            log.events(),
            &[LedgerEvent::Transfer { from: addr(0), to: addr(0), value: 200 }]
        );
    }

    #[test]
    fn test_self_transfer_over_balance_fails() {
        let mut l = ledger(500);
        let err = l.transfer(addr(0), addr(0), 501, &mut ()).unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientBalance { balance: 500, requested: 501, .. }));
        assert_eq!(l.balance_of(&addr(0)), 500);
    }

    #[test]
    fn test_zero_transfer_from_empty_account_emits() {
        let mut l = ledger(500);
        let mut log = EventLog::new();
        l.transfer(addr(3), addr(4), 0, &mut log).unwrap();
        l.transfer(addr(3), addr(3), 0, &mut log).unwrap();

        assert_eq!(log.len(), 2);
        assert_eq!(l.balance_of(&addr(3)), 0);
        assert_eq!(l.balance_of(&addr(4)), 0);
        assert_eq!(l.holders().count(), 1);
    }

    #[test]
    fn test_transfer_entire_balance_drops_entry() {
        let mut l = ledger(500);
        l.transfer(addr(0), addr(1), 500, &mut ()).unwrap();
        assert_eq!(l.balance_of(&addr(0)), 0);
        assert_eq!(l.holders().collect::<Vec<_>>(), vec![(&addr(1), &500)]);
    }

    #[test]
    fn test_approve_overwrites() {
        let mut l = ledger(500);
        let mut log = EventLog::new();
        l.approve(addr(0), addr(1), 300, &mut log).unwrap();
        l.approve(addr(0), addr(1), 100, &mut log).unwrap();

        assert_eq!(l.allowance(&addr(0), &addr(1)), 100);
        assert_eq!(
            log.last(),
            Some(&LedgerEvent::Approval { owner: addr(0), spender: addr(1), value: 100 })
        );
    }

    #[test]
    fn test_approve_is_directional() {
        let mut l = ledger(500);
        l.approve(addr(0), addr(1), 300, &mut ()).unwrap();
        assert_eq!(l.allowance(&addr(1), &addr(0)), 0);
    }

    #[test]
    fn test_approve_beyond_balance_is_allowed() {
        let mut l = ledger(500);
        l.approve(addr(1), addr(2), 10_000, &mut ()).unwrap();
        assert_eq!(l.allowance(&addr(1), &addr(2)), 10_000);
    }

    #[test]
    fn test_approve_zero_revokes() {
        let mut l = ledger(500);
        l.approve(addr(0), addr(1), 300, &mut ()).unwrap();
        let before = l.state_root();
        l.approve(addr(0), addr(1), 0, &mut ()).unwrap();

        assert_eq!(l.allowance(&addr(0), &addr(1)), 0);
        assert_ne!(l.state_root(), before);
        assert_eq!(l.state_root(), ledger(500).state_root());
    }

    #[test]
    fn test_transfer_from_consumes_allowance() {
        let mut l = ledger(1_000);
        l.approve(addr(0), addr(9), 600, &mut ()).unwrap();

        let mut log = EventLog::new();
        l.transfer_from(addr(9), addr(0), addr(2), 250, &mut log).unwrap();

        assert_eq!(l.allowance(&addr(0), &addr(9)), 350);
        assert_eq!(l.balance_of(&addr(0)), 750);
        assert_eq!(l.balance_of(&addr(2)), 250);
        assert_eq!(l.balance_of(&addr(9)), 0);
        assert_eq!(
            log.events(),
            &[LedgerEvent::Transfer { from: addr(0), to: addr(2), value: 250 }]
        );
    }

    #[test]
    fn test_transfer_from_checks_allowance_first() {
        let mut l = ledger(1_000);
        l.approve(addr(5), addr(9), 10, &mut ()).unwrap();

        // addr(5) has no balance and too little allowance: allowance wins.
        let err = l.transfer_from(addr(9), addr(5), addr(2), 20, &mut ()).unwrap_err();
        assert_eq!(
            err,
            LedgerError::AllowanceTooLow {
                owner: addr(5),
                spender: addr(9),
                allowance: 10,
                requested: 20,
            }
        );

        let err = l.transfer_from(addr(9), addr(5), addr(2), 10, &mut ()).unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientBalance { account, .. } if account == addr(5)));
    }

    #[test]
    fn test_failed_transfer_from_is_atomic() {
        let mut l = ledger(1_000);
        l.transfer(addr(0), addr(1), 100, &mut ()).unwrap();
        l.approve(addr(1), addr(9), 500, &mut ()).unwrap();
        let before = l.snapshot();
        let root = l.state_root();

        let mut log = EventLog::new();
        assert!(l.transfer_from(addr(9), addr(1), addr(2), 200, &mut log).is_err());
        assert!(l.transfer_from(addr(8), addr(1), addr(2), 1, &mut log).is_err());

        assert!(log.is_empty());
        assert_eq!(l.state_root(), root);
        assert_eq!(l.snapshot(), before);
    }

    #[test]
    fn test_transfer_from_self_spender() {
        let mut l = ledger(1_000);
        // Owner spending its own tokens through transfer_from still needs an allowance.
        let err = l.transfer_from(addr(0), addr(0), addr(1), 1, &mut ()).unwrap_err();
        assert!(matches!(err, LedgerError::AllowanceTooLow { .. }));

        l.approve(addr(0), addr(0), 1, &mut ()).unwrap();
        l.transfer_from(addr(0), addr(0), addr(1), 1, &mut ()).unwrap();
        assert_eq!(l.allowance(&addr(0), &addr(0)), 0);
        assert_eq!(l.balance_of(&addr(1)), 1);
    }

    #[test]
    fn test_random_sequences_conserve_supply() {
        let supply: Amount = 1_000_000;
        let mut l = ledger(supply);
        let accounts: Vec<Address> = (0..6).map(addr).collect();
        let mut rng = StdRng::seed_from_u64(0x5eed);

        for _ in 0..2_000 {
            let a = accounts[rng.gen_range(0..accounts.len())];
            let b = accounts[rng.gen_range(0..accounts.len())];
            let c = accounts[rng.gen_range(0..accounts.len())];
            let amount = rng.gen_range(0..400_000u64) as Amount;
            let root = l.state_root();

            let result = match rng.gen_range(0..3) {
                0 => l.transfer(a, b, amount, &mut ()),
                1 => l.approve(a, b, amount, &mut ()),
                _ => l.transfer_from(a, b, c, amount, &mut ()),
            };
            if result.is_err() {
                assert_eq!(l.state_root(), root);
            }
            assert_eq!(l.circulating_sum(), Some(supply));
        }
    }

    #[test]
    fn test_snapshot_round_trip() {
        let mut l = ledger(1_000);
        l.transfer(addr(0), addr(1), 400, &mut ()).unwrap();
        l.approve(addr(1), addr(2), 50, &mut ()).unwrap();

        let restored = TokenLedger::from_snapshot(l.snapshot()).unwrap();
        assert_eq!(restored.state_root(), l.state_root());
        assert_eq!(restored.name(), "ERC20Token");
        assert_eq!(restored.allowance(&addr(1), &addr(2)), 50);
    }

    #[test]
    fn test_from_snapshot_rejects_broken_conservation() {
        let mut snapshot = ledger(1_000).snapshot();
        snapshot.balances.insert(addr(4), 1);
        assert!(matches!(
            TokenLedger::from_snapshot(snapshot),
            Err(LedgerError::CorruptSnapshot(_))
        ));

        let mut snapshot = ledger(1_000).snapshot();
        snapshot.balances.insert(addr(4), Amount::MAX);
        assert!(matches!(
            TokenLedger::from_snapshot(snapshot),
            Err(LedgerError::CorruptSnapshot(_))
        ));
    }

    #[test]
    fn test_from_snapshot_rejects_duplicate_allowance() {
        let mut snapshot = ledger(1_000).snapshot();
        for amount in [1, 2] {
            snapshot.allowances.push(AllowanceEntry {
                owner: addr(0),
                spender: addr(1),
                amount,
            });
        }
        assert!(matches!(
            TokenLedger::from_snapshot(snapshot),
            Err(LedgerError::CorruptSnapshot(_))
        ));
    }

    #[test]
    fn test_error_messages_keep_revert_reasons() {
        let mut l = ledger(10);
        let err = l.transfer(addr(1), addr(2), 1, &mut ()).unwrap_err();
        assert!(err.to_string().starts_with("not enough tokens for transfer"));
        let err = l.transfer_from(addr(3), addr(1), addr(2), 1, &mut ()).unwrap_err();
        assert!(err.to_string().starts_with("allowance too low"));
    }
}
