use std::sync::Arc;

use alloy_primitives::{aliases::U192, map::HashMap, Address, B256};

use crate::{AccountFactory, DepositLedger, SmartAccount, Sponsor, Target};

/// Code deployed at an address, tagged with the capability it provides.
#[derive(Clone, Debug)]
pub enum Code {
    /// A smart account.
    Account(Arc<dyn SmartAccount>),
    /// A sponsor.
    Sponsor(Arc<dyn Sponsor>),
    /// An account factory.
    Factory(Arc<dyn AccountFactory>),
    /// Any other callable code.
    Contract(Arc<dyn Target>),
}

impl Code {
    /// The account capability, if this code is an account.
    pub fn as_account(&self) -> Option<&Arc<dyn SmartAccount>> {
        match self {
            Self::Account(account) => Some(account),
            _ => None,
        }
    }

    /// The sponsor capability, if this code is a sponsor.
    pub fn as_sponsor(&self) -> Option<&Arc<dyn Sponsor>> {
        match self {
            Self::Sponsor(sponsor) => Some(sponsor),
            _ => None,
        }
    }

    /// The factory capability, if this code is a factory.
    pub fn as_factory(&self) -> Option<&Arc<dyn AccountFactory>> {
        match self {
            Self::Factory(factory) => Some(factory),
            _ => None,
        }
    }
}

/// The state owned by the engine for its whole lifetime.
#[derive(Debug, Default)]
pub struct WorldState {
    pub(crate) ledger: DepositLedger,
    pub(crate) nonces: HashMap<(Address, U192), u128>,
    pub(crate) code: HashMap<Address, Code>,
    pub(crate) storage: HashMap<(Address, B256), B256>,
}

impl WorldState {
    /// The deposit ledger.
    pub const fn ledger(&self) -> &DepositLedger {
        &self.ledger
    }

    /// The next sequence number of `sender` under `key`, `2^64` once the key is exhausted.
    pub fn nonce_sequence(&self, sender: Address, key: U192) -> u128 {
        self.nonces.get(&(sender, key)).copied().unwrap_or_default()
    }

    /// The code deployed at `address`.
    pub fn code(&self, address: Address) -> Option<&Code> {
        self.code.get(&address)
    }

    /// A storage slot of the contract at `address`. Unset slots read as zero.
    pub fn storage(&self, address: Address, slot: B256) -> B256 {
        self.storage.get(&(address, slot)).copied().unwrap_or_default()
    }
}
