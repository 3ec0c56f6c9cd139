//! Constants for the `MegaETH` entry point.
//!
//! It groups the gas schedule charged by the engine itself and the defaults of
//! [`EntryPointConfig`](crate::EntryPointConfig) as sub-modules.

use alloy_primitives::{address, Address};

/// The default address of the entry point. It is bound into every operation hash, so two engines
/// with different addresses never accept each other's signatures.
pub const DEFAULT_ENTRY_POINT_ADDRESS: Address =
    address!("0x0000000071727De22E5E9d8BAf0edAc6f37da032");

/// The selector of `executeUserOp((address,uint256,bytes,bytes,bytes32,uint256,bytes32,bytes,bytes),bytes32)`.
///
/// An execution payload starting with this selector asks the engine to hand the whole operation
/// and its hash to the sender instead of calling it with the raw payload.
pub const EXECUTE_USER_OP_SELECTOR: [u8; 4] = [0x8d, 0xd7, 0x71, 0x2f];

/// Gas charged by the engine when code runs through a [`CallContext`](crate::CallContext).
pub mod gas {
    /// Gas charged for every nested call, before the callee runs.
    pub const CALL: u64 = 700;
    /// Gas charged for reading a storage slot.
    pub const SLOAD: u64 = 2_100;
    /// Gas charged for writing a storage slot.
    pub const SSTORE: u64 = 20_000;
    /// Gas charged for materializing a new account during admission. The deployment is charged
    /// against the operation's verification gas.
    pub const CREATE: u64 = 32_000;
    /// Gas charged for an ECDSA public key recovery.
    pub const ECRECOVER: u64 = 3_000;
    /// Gas charged for touching the deposit ledger from inside a call.
    pub const LEDGER_ACCESS: u64 = 2_600;
}

/// Defaults of [`EntryPointConfig`](crate::EntryPointConfig).
pub mod defaults {
    /// The default chain id bound into operation hashes.
    pub const CHAIN_ID: u64 = 6342;
    /// The maximum depth of nested calls inside one scope.
    pub const MAX_CALL_DEPTH: usize = 1024;
    /// The percentage of unused execution gas charged as a penalty.
    pub const UNUSED_GAS_PENALTY_PERCENT: u64 = 10;
    /// The amount of unused execution gas from which the penalty applies.
    pub const PENALTY_GAS_THRESHOLD: u64 = 40_000;
    /// The gas the engine charges per operation for its own bookkeeping.
    pub const SETTLEMENT_OVERHEAD_GAS: u64 = 0;
    /// The minimum stake lock duration, in seconds.
    pub const MIN_UNSTAKE_DELAY: u32 = 1;
}
