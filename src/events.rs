//! Notifications emitted by committed ledger transitions.

use serde::{Deserialize, Serialize};

use crate::types::{Address, Amount};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerEvent {
    Transfer {
        from: Address,
        to: Address,
        value: Amount,
    },
    Approval {
        owner: Address,
        spender: Address,
        value: Amount,
    },
}

/// Observer of ledger notifications.
///
/// The ledger calls `emit` only after a transition has been committed, so a
/// sink never sees an event for a rejected operation.
pub trait EventSink {
    fn emit(&mut self, event: LedgerEvent);
}

/// Discarding sink, for callers that do not observe notifications.
impl EventSink for () {
    fn emit(&mut self, _event: LedgerEvent) {}
}

impl EventSink for Vec<LedgerEvent> {
    fn emit(&mut self, event: LedgerEvent) {
        self.push(event);
    }
}

/// In-order record of emitted events.
#[derive(Debug, Default, Clone)]
pub struct EventLog {
    events: Vec<LedgerEvent>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> &[LedgerEvent] {
        &self.events
    }

    pub fn last(&self) -> Option<&LedgerEvent> {
        self.events.last()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Drain recorded events, leaving the log empty.
    pub fn take(&mut self) -> Vec<LedgerEvent> {
        std::mem::take(&mut self.events)
    }
}

impl EventSink for EventLog {
    fn emit(&mut self, event: LedgerEvent) {
        self.events.push(event);
    }
}
