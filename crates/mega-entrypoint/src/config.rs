use alloy_primitives::Address;
use serde::{Deserialize, Serialize};

use crate::constants::{defaults, DEFAULT_ENTRY_POINT_ADDRESS};

/// Static parameters of an [`EntryPoint`](crate::EntryPoint).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EntryPointConfig {
    // ====== Identity ======
    /// The address of the entry point, bound into every operation hash. Code called by the
    /// engine sees it as its caller.
    pub address: Address,
    /// The chain id, bound into every operation hash.
    pub chain_id: u64,

    // ====== Execution ======
    /// The maximum depth of nested calls in one scope.
    pub max_call_depth: usize,

    // ====== Fees ======
    /// The percentage of unused execution gas charged as a penalty.
    pub unused_gas_penalty_percent: u64,
    /// The amount of unused execution gas from which the penalty applies.
    pub penalty_gas_threshold: u64,
    /// Gas charged per operation for the engine's own bookkeeping, on top of the declared
    /// limits. It is not covered by the prefund.
    pub settlement_overhead_gas: u64,

    // ====== Stakes ======
    /// The minimum stake lock duration, in seconds.
    pub min_unstake_delay: u32,
}

impl Default for EntryPointConfig {
    fn default() -> Self {
        Self {
            address: DEFAULT_ENTRY_POINT_ADDRESS,
            chain_id: defaults::CHAIN_ID,
            max_call_depth: defaults::MAX_CALL_DEPTH,
            unused_gas_penalty_percent: defaults::UNUSED_GAS_PENALTY_PERCENT,
            penalty_gas_threshold: defaults::PENALTY_GAS_THRESHOLD,
            settlement_overhead_gas: defaults::SETTLEMENT_OVERHEAD_GAS,
            min_unstake_delay: defaults::MIN_UNSTAKE_DELAY,
        }
    }
}

impl EntryPointConfig {
    /// Sets the address of the entry point.
    pub fn with_address(mut self, address: Address) -> Self {
        self.address = address;
        self
    }

    /// Sets the chain id.
    pub fn with_chain_id(mut self, chain_id: u64) -> Self {
        self.chain_id = chain_id;
        self
    }

    /// Sets the maximum depth of nested calls.
    pub fn with_max_call_depth(mut self, max_call_depth: usize) -> Self {
        self.max_call_depth = max_call_depth;
        self
    }

    /// Sets the unused gas penalty and the amount of unused gas from which it applies.
    pub fn with_unused_gas_penalty(mut self, percent: u64, threshold: u64) -> Self {
        self.unused_gas_penalty_percent = percent;
        self.penalty_gas_threshold = threshold;
        self
    }

    /// Sets the per-operation settlement overhead.
    pub fn with_settlement_overhead_gas(mut self, settlement_overhead_gas: u64) -> Self {
        self.settlement_overhead_gas = settlement_overhead_gas;
        self
    }

    /// Sets the minimum stake lock duration.
    pub fn with_min_unstake_delay(mut self, min_unstake_delay: u32) -> Self {
        self.min_unstake_delay = min_unstake_delay;
        self
    }
}
