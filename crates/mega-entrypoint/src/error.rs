//! Error types of the entry point.
//!
//! Failures fall into three classes with different blast radius:
//!
//! - [`AdmissionError`]: one operation of the batch failed admission. The whole batch is rolled
//!   back and the error is returned to the submitter together with the offending index.
//! - [`SettlementFault`](crate::SettlementFault): one operation failed during settlement. It is
//!   contained in that operation's outcome record and never propagates.
//! - [`SystemFault`]: the engine itself cannot continue. The whole batch is rolled back.

use alloy_primitives::{aliases::U192, Address, Bytes, U256};
use serde::{Deserialize, Serialize};

/// The error a capability (account, sponsor, factory or target) returns to the engine.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CallError {
    /// The code reverted with the given reason.
    #[error("execution reverted: {0}")]
    Revert(Bytes),
    /// The code ran out of the gas it was allotted.
    #[error("out of gas (limit {limit})")]
    OutOfGas {
        /// The gas limit of the scope that ran out.
        limit: u64,
    },
}

impl CallError {
    /// Creates a revert carrying a UTF-8 reason.
    pub fn revert_msg(reason: &str) -> Self {
        Self::Revert(Bytes::copy_from_slice(reason.as_bytes()))
    }

    /// Returns `true` if the error is an out-of-gas condition.
    pub const fn is_out_of_gas(&self) -> bool {
        matches!(self, Self::OutOfGas { .. })
    }

    /// The revert data, or empty bytes for an out-of-gas condition.
    pub fn revert_data(&self) -> Bytes {
        match self {
            Self::Revert(data) => data.clone(),
            Self::OutOfGas { .. } => Bytes::new(),
        }
    }
}

/// Why a single operation was refused admission. Any of these aborts the whole batch with no
/// state change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum AdmissionError {
    /// The account materialized from the initialization payload does not live at the declared
    /// sender address.
    #[error("account derivation mismatch: declared {declared}, derived {derived}")]
    AccountDerivationMismatch {
        /// The sender declared by the operation.
        declared: Address,
        /// The address the factory derived from the initialization payload.
        derived: Address,
    },
    /// The sender has no account code and the operation carries no initialization payload.
    #[error("account {0} is not deployed")]
    AccountNotDeployed(Address),
    /// The operation carries an initialization payload but the sender already exists.
    #[error("account {0} is already constructed")]
    SenderAlreadyConstructed(Address),
    /// The initialization payload names an address that is not a registered factory.
    #[error("no account factory at {0}")]
    UnknownFactory(Address),
    /// The declared gas limits overflow when summed.
    #[error("gas values overflow")]
    GasValuesOverflow,
    /// The nonce does not match the next expected value for its key.
    #[error("nonce mismatch for key {key}: expected sequence {expected}, got {provided}")]
    NonceMismatch {
        /// The nonce key.
        key: U192,
        /// The next expected sequence number. It reaches `2^64` once every sequence number of
        /// the key was used.
        expected: u128,
        /// The sequence number carried by the operation.
        provided: u64,
    },
    /// The sender's deposit does not cover the required prefund.
    #[error("insufficient prefund: required {required}, available {available}")]
    InsufficientPrefund {
        /// The required prefund.
        required: U256,
        /// The payer's deposit.
        available: U256,
    },
    /// The account rejected the operation.
    #[error("authorization rejected: {reason}")]
    AuthorizationRejected {
        /// The account's reason, if it gave one.
        reason: String,
    },
    /// The sponsor rejected the operation, is not deployed, or cannot pay for it.
    #[error("sponsorship rejected by {sponsor}: {reason}")]
    SponsorshipRejected {
        /// The sponsor named by the operation.
        sponsor: Address,
        /// Why the sponsorship was rejected.
        reason: String,
    },
    /// The combined validity window has not started yet.
    #[error("not valid before {valid_after} (now {now})")]
    WindowNotYetValid {
        /// The earliest acceptance time.
        valid_after: u64,
        /// The current block timestamp.
        now: u64,
    },
    /// The combined validity window has already ended.
    #[error("expired at {valid_until} (now {now})")]
    WindowExpired {
        /// The latest acceptance time.
        valid_until: u64,
        /// The current block timestamp.
        now: u64,
    },
    /// The account, the sponsor or the factory exceeded the verification gas limit.
    #[error("verification gas limit {limit} exceeded by {party}")]
    VerificationGasExceeded {
        /// The party whose verification ran out of gas.
        party: Address,
        /// The verification gas limit.
        limit: u64,
    },
}

/// An overflow or underflow in fee accounting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("arithmetic overflow in {operation}")]
pub struct ArithmeticError {
    /// The accounting step that overflowed.
    pub operation: &'static str,
}

impl ArithmeticError {
    /// Creates a new [`ArithmeticError`] for the given accounting step.
    pub const fn new(operation: &'static str) -> Self {
        Self { operation }
    }
}

/// A fatal engine failure. It aborts the batch it occurs in.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SystemFault {
    /// Code running inside a batch tried to enter the engine again.
    #[error("reentrant call into the entry point")]
    ReentrancyDetected,
    /// Fee accounting overflowed.
    #[error(transparent)]
    Arithmetic(#[from] ArithmeticError),
    /// An internal invariant does not hold.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),
}

/// The error returned by [`EntryPoint::process_batch`](crate::EntryPoint::process_batch).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EntryPointError {
    /// An operation failed admission. Nothing from the batch persists.
    #[error("operation {index} failed admission: {error}")]
    Admission {
        /// The position of the offending operation in the batch.
        index: usize,
        /// The admission failure.
        error: AdmissionError,
    },
    /// The engine hit a fatal fault. Nothing from the batch persists.
    #[error(transparent)]
    System(#[from] SystemFault),
}

impl EntryPointError {
    /// Returns the admission failure, if this is one.
    pub const fn as_admission(&self) -> Option<&AdmissionError> {
        match self {
            Self::Admission { error, .. } => Some(error),
            Self::System(_) => None,
        }
    }

    /// Returns the system fault, if this is one.
    pub const fn as_system(&self) -> Option<&SystemFault> {
        match self {
            Self::System(fault) => Some(fault),
            Self::Admission { .. } => None,
        }
    }
}

/// Errors of the deposit ledger.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    /// The account's deposit does not cover the requested amount.
    #[error("insufficient balance: requested {requested}, available {available}")]
    InsufficientBalance {
        /// The requested amount.
        requested: U256,
        /// The available deposit.
        available: U256,
    },
    /// A deposit would overflow.
    #[error(transparent)]
    Arithmetic(#[from] ArithmeticError),
    /// Someone other than the account tried to withdraw from its deposit.
    #[error("{caller} may not withdraw from the deposit of {account}")]
    Unauthorized {
        /// The party requesting the withdrawal.
        caller: Address,
        /// The owner of the deposit.
        account: Address,
    },
    /// The unstake delay is below the minimum or lower than the current one.
    #[error("invalid unstake delay {requested} (minimum {minimum})")]
    InvalidUnstakeDelay {
        /// The requested delay.
        requested: u32,
        /// The minimum acceptable delay.
        minimum: u32,
    },
    /// Staking requires a non-zero total stake.
    #[error("no stake specified")]
    NoStake,
    /// The stake is already unlocking.
    #[error("stake is already unlocking")]
    AlreadyUnstaking,
    /// The stake has not been unlocked.
    #[error("stake is not unlocked")]
    StakeNotUnlocked,
    /// The stake is unlocking but its delay has not elapsed.
    #[error("stake withdrawal is not due until {withdraw_time} (now {now})")]
    StakeWithdrawalNotDue {
        /// The earliest withdrawal time.
        withdraw_time: u64,
        /// The current block timestamp.
        now: u64,
    },
    /// The ledger cannot be modified while a batch is in flight.
    #[error(transparent)]
    System(#[from] SystemFault),
}

impl From<LedgerError> for SystemFault {
    /// Maps a ledger failure the engine itself caused to a fatal fault.
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::Arithmetic(err) => Self::Arithmetic(err),
            LedgerError::System(fault) => fault,
            err => Self::InvariantViolation(err.to_string()),
        }
    }
}
