//! Gas metering and fee accounting.
//!
//! [`GasMeter`] bounds every capability invocation: code charges it cooperatively and the first
//! charge beyond the limit fails the current scope with [`CallError::OutOfGas`]. The free
//! functions are the pure accounting used by both admission and settlement. They are checked:
//! an overflow is reported as an [`ArithmeticError`], never clamped.

use alloy_primitives::U256;

use crate::{ArithmeticError, CallError, GasFees, GasLimits};

/// A gas budget for one scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GasMeter {
    limit: u64,
    used: u64,
}

impl GasMeter {
    /// Creates a meter with the given limit and nothing spent.
    pub const fn new(limit: u64) -> Self {
        Self { limit, used: 0 }
    }

    /// Records `cost` units of gas. Running out consumes the whole budget, like an EVM frame
    /// halting out of gas.
    pub fn charge(&mut self, cost: u64) -> Result<(), CallError> {
        match self.used.checked_add(cost) {
            Some(used) if used <= self.limit => {
                self.used = used;
                Ok(())
            }
            _ => {
                self.used = self.limit;
                Err(CallError::OutOfGas { limit: self.limit })
            }
        }
    }

    /// The gas limit.
    pub const fn limit(&self) -> u64 {
        self.limit
    }

    /// The gas spent so far.
    pub const fn used(&self) -> u64 {
        self.used
    }

    /// The gas still available.
    pub const fn remaining(&self) -> u64 {
        self.limit - self.used
    }
}

/// The price per unit of gas actually paid: the lesser of the maximum fee and the base price
/// plus the priority fee. When both fee parameters are equal the base price is ignored.
pub fn effective_gas_price(fees: GasFees, base_fee: u128) -> u128 {
    if fees.max_fee_per_gas == fees.max_priority_fee_per_gas {
        return fees.max_fee_per_gas;
    }
    fees.max_fee_per_gas.min(base_fee.saturating_add(fees.max_priority_fee_per_gas))
}

/// The total gas an operation may consume: its three limits plus the sponsor's post-execution
/// allowance.
pub fn max_gas(limits: GasLimits, post_op_gas_limit: u64) -> Result<u64, ArithmeticError> {
    limits
        .pre_verification_gas
        .checked_add(limits.verification_gas_limit)
        .and_then(|gas| gas.checked_add(limits.call_gas_limit))
        .and_then(|gas| gas.checked_add(post_op_gas_limit))
        .ok_or(ArithmeticError::new("max gas"))
}

/// The worst-case cost reserved against the payer before execution.
pub fn required_prefund(
    limits: GasLimits,
    fees: GasFees,
    post_op_gas_limit: u64,
) -> Result<U256, ArithmeticError> {
    let gas = max_gas(limits, post_op_gas_limit)?;
    U256::from(gas)
        .checked_mul(U256::from(fees.max_fee_per_gas))
        .ok_or(ArithmeticError::new("required prefund"))
}

/// The cost of `gas_used` units of gas at `gas_price`.
pub fn actual_cost(gas_used: u64, gas_price: u128) -> Result<U256, ArithmeticError> {
    U256::from(gas_used)
        .checked_mul(U256::from(gas_price))
        .ok_or(ArithmeticError::new("actual cost"))
}

/// The amount returned to the payer once the actual cost is known.
pub fn refund(prefund: U256, actual_cost: U256) -> Result<U256, ArithmeticError> {
    prefund.checked_sub(actual_cost).ok_or(ArithmeticError::new("refund"))
}

/// The penalty charged on unused gas. Nothing is charged while the unused amount stays below
/// `threshold`.
pub fn unused_gas_penalty(gas_limit: u64, gas_used: u64, percent: u64, threshold: u64) -> u64 {
    let unused = gas_limit.saturating_sub(gas_used);
    if unused < threshold {
        return 0;
    }
    // `unused * percent` cannot overflow for any percent <= 100 once widened.
    (u128::from(unused) * u128::from(percent.min(100)) / 100) as u64
}
