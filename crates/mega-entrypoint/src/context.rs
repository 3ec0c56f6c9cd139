//! The handle code running inside the engine uses to reach state.

use alloy_primitives::{aliases::U192, Address, Bytes, B256, U256};
use tracing::{trace, warn};

use crate::{
    constants, next_nonce, BatchReceipt, BlockEnv, CallError, Code, DepositInfo,
    EntryPointConfig, EntryPointError, EntryPointEvent, GasMeter, Journal, SystemFault,
    UserOperation,
};

/// The execution context of one capability invocation.
///
/// It carries the code's own address, its caller and the gas meter of the enclosing scope. Every
/// state access goes through the journal, so a failing scope can be rolled back in full.
#[derive(Debug)]
pub struct CallContext<'a> {
    journal: &'a mut Journal,
    gas: &'a mut GasMeter,
    env: &'a BlockEnv,
    config: &'a EntryPointConfig,
    address: Address,
    caller: Address,
    depth: usize,
}

impl<'a> CallContext<'a> {
    pub(crate) fn new(
        journal: &'a mut Journal,
        gas: &'a mut GasMeter,
        env: &'a BlockEnv,
        config: &'a EntryPointConfig,
        address: Address,
        caller: Address,
    ) -> Self {
        Self { journal, gas, env, config, address, caller, depth: 0 }
    }

    /// The address of the running code.
    pub const fn address(&self) -> Address {
        self.address
    }

    /// The address that called the running code. The entry point itself for validation, execution
    /// and post-execution hooks.
    pub const fn caller(&self) -> Address {
        self.caller
    }

    /// Whether the running code was called by the entry point.
    pub fn called_by_entry_point(&self) -> bool {
        self.caller == self.config.address
    }

    /// The nesting depth of the running code, zero for code called by the engine.
    pub const fn depth(&self) -> usize {
        self.depth
    }

    /// The block environment.
    pub const fn block(&self) -> &BlockEnv {
        self.env
    }

    /// The engine configuration.
    pub const fn config(&self) -> &EntryPointConfig {
        self.config
    }

    /// The gas left in the enclosing scope.
    pub const fn gas_remaining(&self) -> u64 {
        self.gas.remaining()
    }

    /// Consumes `cost` units of gas.
    pub fn charge_gas(&mut self, cost: u64) -> Result<(), CallError> {
        self.gas.charge(cost)
    }

    /// Reads a storage slot of the running code.
    pub fn sload(&mut self, slot: B256) -> Result<B256, CallError> {
        self.gas.charge(constants::gas::SLOAD)?;
        Ok(self.journal.storage(self.address, slot))
    }

    /// Writes a storage slot of the running code.
    pub fn sstore(&mut self, slot: B256, value: B256) -> Result<(), CallError> {
        self.gas.charge(constants::gas::SSTORE)?;
        self.journal.set_storage(self.address, slot, value);
        Ok(())
    }

    /// Calls the code at `to` with `data`.
    ///
    /// The callee runs in a nested scope: if it fails, its changes are rolled back and the error
    /// is returned to the caller, which may recover from it. Calling an address with no code
    /// succeeds with empty return data. Sponsors and factories are not callable.
    pub fn call(&mut self, to: Address, data: &Bytes) -> Result<Bytes, CallError> {
        self.gas.charge(constants::gas::CALL)?;
        if self.depth + 1 > self.config.max_call_depth {
            return Err(CallError::revert_msg("call depth exceeded"));
        }

        let code = match self.journal.code(to) {
            None => return Ok(Bytes::new()),
            Some(code) => code.clone(),
        };

        let checkpoint = self.journal.checkpoint();
        let mut callee = CallContext {
            journal: &mut *self.journal,
            gas: &mut *self.gas,
            env: self.env,
            config: self.config,
            address: to,
            caller: self.address,
            depth: self.depth + 1,
        };
        let result = match code {
            Code::Contract(target) => target.call(&mut callee, data),
            Code::Account(account) => account.execute(&mut callee, data),
            Code::Sponsor(_) | Code::Factory(_) => Err(CallError::revert_msg("not callable")),
        };
        if let Err(err) = &result {
            trace!(
                target: "mega_entrypoint::call",
                %to, depth = self.depth + 1, %err, "nested call failed"
            );
            self.journal.revert(checkpoint);
        }
        result
    }

    /// The deposit of `account`.
    pub fn balance_of(&mut self, account: Address) -> Result<U256, CallError> {
        self.gas.charge(constants::gas::LEDGER_ACCESS)?;
        Ok(self.journal.balance_of(account))
    }

    /// The ledger entry of `account`.
    pub fn deposit_info(&mut self, account: Address) -> Result<DepositInfo, CallError> {
        self.gas.charge(constants::gas::LEDGER_ACCESS)?;
        Ok(self.journal.deposit_info(account))
    }

    /// Withdraws `amount` from the deposit of the running code to `withdraw_address`.
    ///
    /// Only the owner of a deposit can withdraw from it, so the withdrawal always draws from the
    /// running code's own entry.
    pub fn withdraw_to(
        &mut self,
        withdraw_address: Address,
        amount: U256,
    ) -> Result<(), CallError> {
        self.gas.charge(constants::gas::LEDGER_ACCESS)?;
        let account = self.address;
        self.journal
            .debit(account, amount)
            .map_err(|err| CallError::revert_msg(&err.to_string()))?;
        self.journal.emit(EntryPointEvent::Withdrawn { account, withdraw_address, amount });
        Ok(())
    }

    /// The next nonce of the running code under `key`.
    pub fn get_nonce(&mut self, key: U192) -> Result<U256, CallError> {
        self.gas.charge(constants::gas::SLOAD)?;
        Ok(next_nonce(key, self.journal.nonce_sequence(self.address, key)))
    }

    /// Skips the next sequence number of the running code under `key`, invalidating any pending
    /// operation that uses it.
    pub fn increment_nonce(&mut self, key: U192) -> Result<(), CallError> {
        self.gas.charge(constants::gas::SSTORE)?;
        self.journal.increment_nonce(self.address, key);
        Ok(())
    }

    /// Tries to enter the engine again.
    ///
    /// Code only ever runs while a batch or a simulation holds the engine, so this always fails
    /// with [`SystemFault::ReentrancyDetected`] and changes nothing.
    pub fn process_batch(
        &mut self,
        ops: &[UserOperation],
        beneficiary: Address,
    ) -> Result<BatchReceipt, EntryPointError> {
        warn!(
            target: "mega_entrypoint::call",
            caller = %self.address,
            ops = ops.len(),
            %beneficiary,
            locked = self.journal.is_locked(),
            "reentrant call into the entry point rejected"
        );
        Err(SystemFault::ReentrancyDetected.into())
    }
}
