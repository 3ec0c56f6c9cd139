use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Mutex,
};

use alloy_primitives::{b256, Bytes, B256, U256};

use crate::{
    CallContext, CallError, PostOpMode, Sponsor, Sponsorship, UserOperation, ValidationData,
    ValidityWindow,
};

/// The storage slot where [`DepositSponsor`] records the mode of its last post-op invocation.
pub const LAST_POST_OP_MODE_SLOT: B256 =
    b256!("0x00000000000000000000000000000000000000000000000000000000000000b1");

/// Gas [`DepositSponsor`] spends on its sponsorship check.
pub const SPONSOR_VALIDATION_GAS: u64 = 5_000;

/// The arguments of one post-op invocation of [`DepositSponsor`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostOpInvocation {
    /// The mode it was invoked with.
    pub mode: PostOpMode,
    /// The sponsorship context.
    pub context: Bytes,
    /// The cost charged before the hook.
    pub actual_cost: U256,
    /// The effective gas price.
    pub gas_price: u128,
}

/// A sponsor paying for every operation out of its own deposit.
///
/// It can be told to deny sponsorship, to restrict it to a window, or to fail its first post-op
/// invocations. Every post-op invocation is counted and its arguments recorded.
#[derive(Debug, Clone, Default)]
pub struct DepositSponsor {
    window: ValidityWindow,
    deny: bool,
    post_op_failures: usize,
    validation_gas: u64,
    post_op_calls: Arc<AtomicUsize>,
    invocations: Arc<Mutex<Vec<PostOpInvocation>>>,
}

impl DepositSponsor {
    /// Creates a sponsor accepting every operation.
    pub fn new() -> Self {
        Self { validation_gas: SPONSOR_VALIDATION_GAS, ..Default::default() }
    }

    /// Denies every operation.
    pub fn denying(mut self) -> Self {
        self.deny = true;
        self
    }

    /// Accepts operations only within `window`.
    pub fn with_window(mut self, window: ValidityWindow) -> Self {
        self.window = window;
        self
    }

    /// Makes the first `failures` post-op invocations revert.
    pub fn failing_post_op(mut self, failures: usize) -> Self {
        self.post_op_failures = failures;
        self
    }

    /// Sets the gas the sponsorship check spends.
    pub fn with_validation_gas(mut self, gas: u64) -> Self {
        self.validation_gas = gas;
        self
    }

    /// A handle on the number of post-op invocations so far.
    pub fn post_op_calls(&self) -> Arc<AtomicUsize> {
        self.post_op_calls.clone()
    }

    /// A handle on the arguments of every post-op invocation so far.
    pub fn invocations(&self) -> Arc<Mutex<Vec<PostOpInvocation>>> {
        self.invocations.clone()
    }
}

impl Sponsor for DepositSponsor {
    fn validate_sponsorship(
        &self,
        ctx: &mut CallContext<'_>,
        op: &UserOperation,
        _op_hash: B256,
        _max_cost: U256,
    ) -> Result<Sponsorship, CallError> {
        ctx.charge_gas(self.validation_gas)?;
        if self.deny {
            return Err(CallError::revert_msg("sponsor: denied"));
        }
        Ok(Sponsorship {
            context: Bytes::copy_from_slice(op.sender.as_slice()),
            validation: ValidationData::authorized().with_window(self.window),
        })
    }

    fn post_op(
        &self,
        ctx: &mut CallContext<'_>,
        mode: PostOpMode,
        context: &Bytes,
        actual_cost: U256,
        gas_price: u128,
    ) -> Result<(), CallError> {
        let invocation = self.post_op_calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut invocations) = self.invocations.lock() {
            invocations.push(PostOpInvocation {
                mode,
                context: context.clone(),
                actual_cost,
                gas_price,
            });
        }
        let marker = match mode {
            PostOpMode::Success => 1,
            PostOpMode::ExecutionFailed => 2,
            PostOpMode::PostOpFailed => 3,
        };
        ctx.sstore(LAST_POST_OP_MODE_SLOT, B256::with_last_byte(marker))?;
        if invocation < self.post_op_failures {
            return Err(CallError::revert_msg("sponsor: post-op failed"));
        }
        Ok(())
    }
}
