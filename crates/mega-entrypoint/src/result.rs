//! What a batch produces: outcome records, the event log and simulation results.

use alloy_primitives::{Address, Bytes, B256, U256};
use serde::{Deserialize, Serialize};

use crate::{AdmissionError, ValidityWindow};

/// The mode a sponsor's post-execution hook is invoked with.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PostOpMode {
    /// The execution payload succeeded.
    Success,
    /// The execution payload reverted or ran out of gas. The operation is still charged.
    ExecutionFailed,
    /// The first invocation of the hook failed. This is the second and last invocation.
    PostOpFailed,
}

/// A failure contained within the settlement of a single operation.
///
/// These replace the sentinel return data an on-chain implementation would have to parse: each
/// case carries its own data and none of them ever leaves the operation's outcome record.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SettlementFault {
    /// The execution payload reverted.
    ExecutionReverted {
        /// The revert data.
        reason: Bytes,
    },
    /// The execution payload ran out of its execution gas.
    ExecutionOutOfGas {
        /// The execution gas limit.
        gas_limit: u64,
    },
    /// The sponsor's hook failed once and succeeded when re-invoked with
    /// [`PostOpMode::PostOpFailed`].
    PostOpReverted {
        /// The revert data of the first invocation.
        reason: Bytes,
    },
    /// The sponsor's hook failed twice. The whole prefund is forfeited.
    PostOpFailed {
        /// The revert data of the second invocation.
        reason: Bytes,
    },
    /// The actual cost exceeded the reserved prefund. The whole prefund is forfeited.
    PrefundTooLow {
        /// The reserved prefund.
        prefund: U256,
        /// The computed actual cost.
        actual_cost: U256,
    },
}

impl SettlementFault {
    /// Whether this fault forfeits the payer's whole prefund.
    pub const fn forfeits_prefund(&self) -> bool {
        matches!(self, Self::PostOpFailed { .. } | Self::PrefundTooLow { .. })
    }
}

/// The outcome of one admitted operation. Exactly one is emitted per admitted operation.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OutcomeRecord {
    /// The operation hash.
    pub op_hash: B256,
    /// The sender.
    pub sender: Address,
    /// The sponsor, if any.
    pub sponsor: Option<Address>,
    /// The nonce the operation consumed.
    pub nonce: U256,
    /// Whether execution and the sponsor's hook both succeeded.
    pub success: bool,
    /// The gas the operation is charged for.
    pub actual_gas_used: u64,
    /// The cost collected from the payer.
    pub actual_cost: U256,
    /// The settlement faults of this operation, in the order they happened.
    pub faults: Vec<SettlementFault>,
}

impl OutcomeRecord {
    /// Whether the payer's whole prefund was forfeited.
    pub fn prefund_forfeited(&self) -> bool {
        self.faults.iter().any(SettlementFault::forfeits_prefund)
    }
}

/// An entry of the batch event log.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntryPointEvent {
    /// A sender account was materialized during admission.
    AccountDeployed {
        /// The operation hash.
        op_hash: B256,
        /// The new account.
        sender: Address,
        /// The factory that deployed it.
        factory: Address,
        /// The sponsor of the operation, if any.
        sponsor: Option<Address>,
    },
    /// Admission finished and settlement starts.
    BeforeExecution,
    /// An execution payload failed.
    UserOperationRevertReason {
        /// The operation hash.
        op_hash: B256,
        /// The sender.
        sender: Address,
        /// The nonce.
        nonce: U256,
        /// The revert data, empty when the payload ran out of gas.
        revert_reason: Bytes,
    },
    /// A sponsor's post-execution hook failed.
    PostOpReverted {
        /// The operation hash.
        op_hash: B256,
        /// The sponsor.
        sponsor: Address,
        /// The mode the failed invocation was made with.
        mode: PostOpMode,
        /// The revert data.
        revert_reason: Bytes,
    },
    /// The payer lost its whole prefund.
    PrefundForfeited {
        /// The operation hash.
        op_hash: B256,
        /// The payer.
        payer: Address,
        /// The forfeited prefund.
        prefund: U256,
        /// The actual cost that was computed.
        actual_cost: U256,
    },
    /// The outcome of an operation.
    UserOperationEvent {
        /// The operation hash.
        op_hash: B256,
        /// The sender.
        sender: Address,
        /// The sponsor, if any.
        sponsor: Option<Address>,
        /// The nonce.
        nonce: U256,
        /// Whether the operation succeeded.
        success: bool,
        /// The collected cost.
        actual_gas_cost: U256,
        /// The charged gas.
        actual_gas_used: u64,
    },
    /// A deposit was credited.
    Deposited {
        /// The credited account.
        account: Address,
        /// The new deposit.
        total_deposit: U256,
    },
    /// An account withdrew from its deposit.
    Withdrawn {
        /// The account.
        account: Address,
        /// The destination of the funds.
        withdraw_address: Address,
        /// The amount.
        amount: U256,
    },
    /// An account locked stake.
    StakeLocked {
        /// The account.
        account: Address,
        /// The total locked stake.
        total_staked: U256,
        /// The unstake delay, in seconds.
        unstake_delay_sec: u32,
    },
    /// An account started the unstake delay.
    StakeUnlocked {
        /// The account.
        account: Address,
        /// The earliest withdrawal time.
        withdraw_time: u64,
    },
    /// An account withdrew its unlocked stake.
    StakeWithdrawn {
        /// The account.
        account: Address,
        /// The destination of the funds.
        withdraw_address: Address,
        /// The amount.
        amount: U256,
    },
}

/// Everything a successful [`EntryPoint::process_batch`](crate::EntryPoint::process_batch)
/// produces.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchReceipt {
    /// One record per operation, in submission order.
    pub outcomes: Vec<OutcomeRecord>,
    /// The event log, in emission order.
    pub events: Vec<EntryPointEvent>,
    /// The account credited with the collected costs.
    pub beneficiary: Address,
    /// The sum of the collected costs.
    pub collected: U256,
}

impl BatchReceipt {
    /// The number of operations that succeeded.
    pub fn successful(&self) -> usize {
        self.outcomes.iter().filter(|outcome| outcome.success).count()
    }
}

/// The preview produced by [`EntryPoint::simulate`](crate::EntryPoint::simulate).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulationResult {
    /// The operation hash.
    pub op_hash: B256,
    /// Whether the operation would pass admission against the current state.
    pub would_admit: bool,
    /// The admission failure, if it would not.
    pub admission_error: Option<AdmissionError>,
    /// The prefund that would be reserved.
    pub prefund: U256,
    /// The gas consumed by admission, including the pre-verification gas.
    pub pre_op_gas: u64,
    /// The combined validity window.
    pub window: ValidityWindow,
    /// Whether execution and the sponsor's hook would succeed. `None` if not admitted.
    pub execution_success: Option<bool>,
    /// The gas the operation would be charged for. Zero if not admitted.
    pub estimated_gas: u64,
    /// The cost the payer would be charged. Zero if not admitted.
    pub estimated_cost: U256,
}
