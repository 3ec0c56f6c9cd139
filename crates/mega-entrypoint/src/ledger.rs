//! The deposit ledger: per-account prepaid balances and stakes.
//!
//! Balances are only mutated through the [`Journal`](crate::Journal), so every change made inside
//! a batch can be rolled back. The ledger itself never lets a balance go negative: a debit that
//! exceeds the balance fails with [`LedgerError::InsufficientBalance`] and changes nothing.

use alloy_primitives::{map::HashMap, Address, U256};
use serde::{Deserialize, Serialize};

use crate::{ArithmeticError, LedgerError};

/// The ledger entry of one account.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DepositInfo {
    /// The prepaid balance usable for gas.
    pub deposit: U256,
    /// Whether the stake is locked.
    pub staked: bool,
    /// The staked amount. Never usable for gas.
    pub stake: U256,
    /// The delay between unlocking and withdrawing the stake, in seconds.
    pub unstake_delay_sec: u32,
    /// The earliest time the stake can be withdrawn, zero while locked.
    pub withdraw_time: u64,
}

impl DepositInfo {
    /// Adds `amount` to the deposit.
    pub fn credit(&mut self, amount: U256) -> Result<U256, LedgerError> {
        self.deposit =
            self.deposit.checked_add(amount).ok_or(ArithmeticError::new("deposit credit"))?;
        Ok(self.deposit)
    }

    /// Removes `amount` from the deposit.
    pub fn debit(&mut self, amount: U256) -> Result<U256, LedgerError> {
        self.deposit = self.deposit.checked_sub(amount).ok_or(LedgerError::InsufficientBalance {
            requested: amount,
            available: self.deposit,
        })?;
        Ok(self.deposit)
    }

    /// Locks `amount` more stake with the given unstake delay. The delay can only grow.
    pub fn add_stake(
        &mut self,
        unstake_delay_sec: u32,
        amount: U256,
        min_unstake_delay: u32,
    ) -> Result<(), LedgerError> {
        let minimum = self.unstake_delay_sec.max(min_unstake_delay);
        if unstake_delay_sec < minimum {
            return Err(LedgerError::InvalidUnstakeDelay { requested: unstake_delay_sec, minimum });
        }
        let stake = self.stake.checked_add(amount).ok_or(ArithmeticError::new("stake"))?;
        if stake.is_zero() {
            return Err(LedgerError::NoStake);
        }
        self.stake = stake;
        self.staked = true;
        self.unstake_delay_sec = unstake_delay_sec;
        self.withdraw_time = 0;
        Ok(())
    }

    /// Starts the unstake delay. Returns the time the stake becomes withdrawable.
    pub fn unlock_stake(&mut self, now: u64) -> Result<u64, LedgerError> {
        if !self.staked {
            return Err(LedgerError::AlreadyUnstaking);
        }
        let withdraw_time = now.saturating_add(u64::from(self.unstake_delay_sec));
        self.staked = false;
        self.withdraw_time = withdraw_time;
        Ok(withdraw_time)
    }

    /// Releases the unlocked stake once its delay elapsed. Returns the released amount.
    pub fn withdraw_stake(&mut self, now: u64) -> Result<U256, LedgerError> {
        if self.staked || self.withdraw_time == 0 {
            return Err(LedgerError::StakeNotUnlocked);
        }
        if now < self.withdraw_time {
            let withdraw_time = self.withdraw_time;
            return Err(LedgerError::StakeWithdrawalNotDue { withdraw_time, now });
        }
        let amount = self.stake;
        self.stake = U256::ZERO;
        self.unstake_delay_sec = 0;
        self.withdraw_time = 0;
        Ok(amount)
    }
}

/// The set of ledger entries, keyed by account.
#[derive(Clone, Debug, Default)]
pub struct DepositLedger {
    entries: HashMap<Address, DepositInfo>,
}

impl DepositLedger {
    /// The ledger entry of `account`.
    pub fn deposit_info(&self, account: Address) -> DepositInfo {
        self.entries.get(&account).copied().unwrap_or_default()
    }

    /// The prepaid balance of `account`.
    pub fn balance_of(&self, account: Address) -> U256 {
        self.entries.get(&account).map_or(U256::ZERO, |info| info.deposit)
    }

    /// The sum of every deposit.
    pub fn total_deposits(&self) -> U256 {
        self.entries.values().fold(U256::ZERO, |total, info| total.saturating_add(info.deposit))
    }

    /// Replaces the entry of `account`, returning the previous one.
    pub(crate) fn replace(&mut self, account: Address, info: DepositInfo) -> DepositInfo {
        if info == DepositInfo::default() {
            self.entries.remove(&account).unwrap_or_default()
        } else {
            self.entries.insert(account, info).unwrap_or_default()
        }
    }
}
