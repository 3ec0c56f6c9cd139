use alloy_primitives::{aliases::U192, Address, B256, U256};
use tracing::trace;

use crate::{Code, DepositInfo, EntryPointEvent, LedgerError, SystemFault, WorldState};

/// A position in the journal that state can be rolled back to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JournalCheckpoint {
    entries: usize,
    events: usize,
}

/// The previous value of a piece of state, recorded before it was overwritten.
#[derive(Debug, Clone)]
enum JournalEntry {
    Deposit { account: Address, previous: DepositInfo },
    Nonce { sender: Address, key: U192, previous: u128 },
    CodeDeployed { address: Address },
    Storage { address: Address, slot: B256, previous: B256 },
}

/// The journaled view of the [`WorldState`]. Reads go straight to the state; writes are recorded
/// so they can be reverted.
#[derive(Debug, Default, derive_more::Deref)]
pub struct Journal {
    #[deref]
    state: WorldState,
    entries: Vec<JournalEntry>,
    events: Vec<EntryPointEvent>,
    locked: bool,
}

impl Journal {
    /// Creates a journal over `state`.
    pub fn new(state: WorldState) -> Self {
        Self { state, ..Default::default() }
    }

    /// The current state, including uncommitted changes.
    pub const fn state(&self) -> &WorldState {
        &self.state
    }

    /// Marks the start of a scope.
    pub fn checkpoint(&self) -> JournalCheckpoint {
        JournalCheckpoint { entries: self.entries.len(), events: self.events.len() }
    }

    /// Rolls back every change and event recorded since `checkpoint`.
    pub fn revert(&mut self, checkpoint: JournalCheckpoint) {
        trace!(
            target: "mega_entrypoint::journal",
            reverted = self.entries.len().saturating_sub(checkpoint.entries),
            "reverting to checkpoint"
        );
        while self.entries.len() > checkpoint.entries {
            let Some(entry) = self.entries.pop() else { break };
            match entry {
                JournalEntry::Deposit { account, previous } => {
                    self.state.ledger.replace(account, previous);
                }
                JournalEntry::Nonce { sender, key, previous } => {
                    if previous == 0 {
                        self.state.nonces.remove(&(sender, key));
                    } else {
                        self.state.nonces.insert((sender, key), previous);
                    }
                }
                JournalEntry::CodeDeployed { address } => {
                    self.state.code.remove(&address);
                }
                JournalEntry::Storage { address, slot, previous } => {
                    if previous.is_zero() {
                        self.state.storage.remove(&(address, slot));
                    } else {
                        self.state.storage.insert((address, slot), previous);
                    }
                }
            }
        }
        self.events.truncate(checkpoint.events);
    }

    /// Makes every change permanent and hands out the recorded events.
    pub fn commit(&mut self) -> Vec<EntryPointEvent> {
        self.entries.clear();
        core::mem::take(&mut self.events)
    }

    /// Enters the engine's critical section.
    pub fn lock(&mut self) -> Result<(), SystemFault> {
        if self.locked {
            return Err(SystemFault::ReentrancyDetected);
        }
        self.locked = true;
        Ok(())
    }

    /// Leaves the engine's critical section.
    pub fn unlock(&mut self) {
        self.locked = false;
    }

    /// Whether a batch or a simulation is in flight.
    pub const fn is_locked(&self) -> bool {
        self.locked
    }

    /// Appends an event to the log.
    pub fn emit(&mut self, event: EntryPointEvent) {
        self.events.push(event);
    }

    /// The events recorded since the last commit.
    pub fn events(&self) -> &[EntryPointEvent] {
        &self.events
    }

    /// The ledger entry of `account`.
    pub fn deposit_info(&self, account: Address) -> DepositInfo {
        self.state.ledger.deposit_info(account)
    }

    /// The prepaid balance of `account`.
    pub fn balance_of(&self, account: Address) -> U256 {
        self.state.ledger.balance_of(account)
    }

    /// Applies `update` to the ledger entry of `account`. On error nothing changes.
    pub fn update_deposit<T>(
        &mut self,
        account: Address,
        update: impl FnOnce(&mut DepositInfo) -> Result<T, LedgerError>,
    ) -> Result<T, LedgerError> {
        let previous = self.state.ledger.deposit_info(account);
        let mut info = previous;
        let value = update(&mut info)?;
        if info != previous {
            self.state.ledger.replace(account, info);
            self.entries.push(JournalEntry::Deposit { account, previous });
        }
        Ok(value)
    }

    /// Adds `amount` to the deposit of `account`. Returns the new deposit.
    pub fn credit(&mut self, account: Address, amount: U256) -> Result<U256, LedgerError> {
        let total = self.update_deposit(account, |info| info.credit(amount))?;
        trace!(target: "mega_entrypoint::ledger", %account, %amount, %total, "credit");
        Ok(total)
    }

    /// Removes `amount` from the deposit of `account`. Returns the new deposit.
    pub fn debit(&mut self, account: Address, amount: U256) -> Result<U256, LedgerError> {
        let total = self.update_deposit(account, |info| info.debit(amount))?;
        trace!(target: "mega_entrypoint::ledger", %account, %amount, %total, "debit");
        Ok(total)
    }

    /// The next sequence number of `sender` under `key`.
    pub fn nonce_sequence(&self, sender: Address, key: U192) -> u128 {
        self.state.nonce_sequence(sender, key)
    }

    /// Consumes `sequence` if it is the next one for `(sender, key)`. Returns the expected
    /// sequence number on mismatch.
    ///
    /// The counter is wider than a sequence number, so once `u64::MAX` is used no sequence
    /// matches again under that key.
    pub fn use_nonce(&mut self, sender: Address, key: U192, sequence: u64) -> Result<(), u128> {
        let expected = self.nonce_sequence(sender, key);
        if expected != u128::from(sequence) {
            return Err(expected);
        }
        self.increment_nonce(sender, key);
        Ok(())
    }

    /// Skips the next sequence number of `(sender, key)`.
    pub fn increment_nonce(&mut self, sender: Address, key: U192) {
        let previous = self.nonce_sequence(sender, key);
        self.state.nonces.insert((sender, key), previous.saturating_add(1));
        self.entries.push(JournalEntry::Nonce { sender, key, previous });
    }

    /// The code deployed at `address`.
    pub fn code(&self, address: Address) -> Option<&Code> {
        self.state.code(address)
    }

    /// Whether any code is deployed at `address`.
    pub fn has_code(&self, address: Address) -> bool {
        self.state.code.contains_key(&address)
    }

    /// Deploys `code` at `address`. Existing code is never replaced; returns `false` if there was
    /// some.
    pub fn deploy(&mut self, address: Address, code: Code) -> bool {
        if self.has_code(address) {
            return false;
        }
        self.state.code.insert(address, code);
        self.entries.push(JournalEntry::CodeDeployed { address });
        true
    }

    /// A storage slot of the contract at `address`.
    pub fn storage(&self, address: Address, slot: B256) -> B256 {
        self.state.storage(address, slot)
    }

    /// Writes a storage slot of the contract at `address`.
    pub fn set_storage(&mut self, address: Address, slot: B256, value: B256) {
        let previous = self.storage(address, slot);
        if previous == value {
            return;
        }
        if value.is_zero() {
            self.state.storage.remove(&(address, slot));
        } else {
            self.state.storage.insert((address, slot), value);
        }
        self.entries.push(JournalEntry::Storage { address, slot, previous });
    }
}
