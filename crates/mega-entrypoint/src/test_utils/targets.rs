use alloy_primitives::{Address, Bytes, B256, U256};
use alloy_sol_types::SolValue;

use crate::{CallContext, CallError, SystemFault, Target};

/// Counts the calls it receives in storage slot zero and returns the new count.
#[derive(Debug, Clone, Copy, Default)]
pub struct Counter;

impl Counter {
    /// The storage slot holding the count.
    pub const SLOT: B256 = B256::ZERO;
}

impl Target for Counter {
    fn call(&self, ctx: &mut CallContext<'_>, _data: &Bytes) -> Result<Bytes, CallError> {
        let count = U256::from_be_bytes(ctx.sload(Self::SLOT)?.0) + U256::from(1);
        ctx.sstore(Self::SLOT, B256::from(count))?;
        Ok(count.abi_encode().into())
    }
}

/// Always reverts with the given reason.
#[derive(Debug, Clone, Copy)]
pub struct Reverter(pub &'static str);

impl Target for Reverter {
    fn call(&self, ctx: &mut CallContext<'_>, _data: &Bytes) -> Result<Bytes, CallError> {
        // leaves a write behind that the revert must undo
        ctx.sstore(B256::ZERO, B256::with_last_byte(1))?;
        Err(CallError::revert_msg(self.0))
    }
}

/// Burns a fixed amount of gas.
#[derive(Debug, Clone, Copy)]
pub struct GasBurner(pub u64);

impl Target for GasBurner {
    fn call(&self, ctx: &mut CallContext<'_>, _data: &Bytes) -> Result<Bytes, CallError> {
        ctx.charge_gas(self.0)?;
        Ok(Bytes::new())
    }
}

/// Tries to enter the entry point again while it runs.
///
/// Records in storage slot zero whether the attempt was rejected as reentrant: `1` if it was,
/// `2` for any other outcome.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReentrantTarget;

impl ReentrantTarget {
    /// The storage slot holding the result of the attempt.
    pub const SLOT: B256 = B256::ZERO;
}

impl Target for ReentrantTarget {
    fn call(&self, ctx: &mut CallContext<'_>, _data: &Bytes) -> Result<Bytes, CallError> {
        let rejected = matches!(
            ctx.process_batch(&[], Address::ZERO),
            Err(err) if err.as_system() == Some(&SystemFault::ReentrancyDetected)
        );
        ctx.sstore(Self::SLOT, B256::with_last_byte(if rejected { 1 } else { 2 }))?;
        Ok(Bytes::new())
    }
}

/// Withdraws a fixed amount from its own deposit to `destination`.
#[derive(Debug, Clone, Copy)]
pub struct Withdrawer {
    /// Where the withdrawn funds go.
    pub destination: Address,
    /// The amount withdrawn per call.
    pub amount: U256,
}

impl Target for Withdrawer {
    fn call(&self, ctx: &mut CallContext<'_>, _data: &Bytes) -> Result<Bytes, CallError> {
        ctx.withdraw_to(self.destination, self.amount)?;
        Ok(Bytes::new())
    }
}

/// Calls itself as many more times as the first byte of its input says. The innermost call
/// records its depth in storage slot zero.
#[derive(Debug, Clone, Copy, Default)]
pub struct Recurser;

impl Recurser {
    /// The storage slot holding the depth of the innermost call.
    pub const SLOT: B256 = B256::ZERO;
}

impl Target for Recurser {
    fn call(&self, ctx: &mut CallContext<'_>, data: &Bytes) -> Result<Bytes, CallError> {
        match data.first().copied() {
            None | Some(0) => {
                let depth = U256::from(ctx.depth());
                ctx.sstore(Self::SLOT, B256::from(depth))?;
                Ok(Bytes::new())
            }
            Some(levels) => {
                let this = ctx.address();
                ctx.call(this, &Bytes::from(vec![levels - 1]))
            }
        }
    }
}

/// Writes to storage slot zero and then panics.
#[derive(Debug, Clone, Copy, Default)]
pub struct Panicker;

impl Target for Panicker {
    fn call(&self, ctx: &mut CallContext<'_>, _data: &Bytes) -> Result<Bytes, CallError> {
        ctx.sstore(B256::ZERO, B256::with_last_byte(1))?;
        panic!("target panicked");
    }
}
