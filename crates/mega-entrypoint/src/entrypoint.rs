//! The batch coordinator: the engine's public surface.

use std::{
    ops::{Deref, DerefMut},
    sync::Arc,
};

use alloy_primitives::{aliases::U192, Address, B256, U256};
use tracing::{debug, info, info_span, warn};

use crate::{
    factory, next_nonce, AccountFactory, AccountInit, AdmissionError, ArithmeticError,
    BatchReceipt, BlockEnv, Code, DepositInfo, EntryPointConfig, EntryPointError,
    EntryPointEvent, ExecutionEngine, Journal, JournalCheckpoint, LedgerError, SimulationResult,
    SmartAccount, Sponsor, SystemFault, Target, UserOperation, ValidationEngine, ValidityWindow,
    WorldState,
};

/// The entry point: owns the world state and processes batches of operations against it.
///
/// A batch runs in two phases. Admission validates every operation and aborts the whole batch on
/// the first failure. Settlement then executes and charges every admitted operation, containing
/// each one's failures in its own outcome record. Holding `&mut self` for the whole batch is the
/// engine's critical section; code running inside the batch can only reach the engine through
/// [`CallContext::process_batch`](crate::CallContext::process_batch), which always fails.
#[derive(Debug, Default)]
pub struct EntryPoint {
    config: EntryPointConfig,
    env: BlockEnv,
    journal: Journal,
    logs: Vec<EntryPointEvent>,
}

impl EntryPoint {
    /// Creates an engine with empty state.
    pub fn new(config: EntryPointConfig) -> Self {
        Self { config, ..Default::default() }
    }

    /// Sets the block environment subsequent batches run in.
    pub fn with_block(mut self, env: BlockEnv) -> Self {
        self.env = env;
        self
    }

    /// Sets the block environment subsequent batches run in.
    pub fn set_block(&mut self, env: BlockEnv) {
        self.env = env;
    }

    /// The configuration.
    pub const fn config(&self) -> &EntryPointConfig {
        &self.config
    }

    /// The current block environment.
    pub const fn block(&self) -> &BlockEnv {
        &self.env
    }

    /// The committed state.
    pub const fn state(&self) -> &WorldState {
        self.journal.state()
    }

    /// Takes the events emitted outside of batches (deposits, withdrawals and stake changes).
    pub fn take_logs(&mut self) -> Vec<EntryPointEvent> {
        core::mem::take(&mut self.logs)
    }

    // ====== Code registration ======

    /// Deploys a smart account at `address`. Returns `false` if code already lives there.
    pub fn deploy_account(&mut self, address: Address, account: Arc<dyn SmartAccount>) -> bool {
        self.deploy(address, Code::Account(account))
    }

    /// Deploys a sponsor at `address`. Returns `false` if code already lives there.
    pub fn deploy_sponsor(&mut self, address: Address, sponsor: Arc<dyn Sponsor>) -> bool {
        self.deploy(address, Code::Sponsor(sponsor))
    }

    /// Deploys an account factory at `address`. Returns `false` if code already lives there.
    pub fn deploy_factory(&mut self, address: Address, factory: Arc<dyn AccountFactory>) -> bool {
        self.deploy(address, Code::Factory(factory))
    }

    /// Deploys callable code at `address`. Returns `false` if code already lives there.
    pub fn deploy_contract(&mut self, address: Address, target: Arc<dyn Target>) -> bool {
        self.deploy(address, Code::Contract(target))
    }

    fn deploy(&mut self, address: Address, code: Code) -> bool {
        let deployed = self.journal.deploy(address, code);
        self.commit();
        deployed
    }

    // ====== Deposits and stakes ======

    /// Adds `amount` to the deposit of `account`. Anyone may fund any account. Returns the new
    /// deposit.
    pub fn deposit_to(&mut self, account: Address, amount: U256) -> Result<U256, LedgerError> {
        self.ensure_unlocked()?;
        let total_deposit = self.journal.credit(account, amount)?;
        self.journal.emit(EntryPointEvent::Deposited { account, total_deposit });
        self.commit();
        Ok(total_deposit)
    }

    /// Withdraws `amount` from the deposit of `account` to `withdraw_address`.
    ///
    /// Only the account itself may withdraw from its deposit: `caller` must be `account`.
    pub fn withdraw_to(
        &mut self,
        caller: Address,
        account: Address,
        withdraw_address: Address,
        amount: U256,
    ) -> Result<(), LedgerError> {
        self.ensure_unlocked()?;
        if caller != account {
            return Err(LedgerError::Unauthorized { caller, account });
        }
        self.journal.debit(account, amount)?;
        self.journal.emit(EntryPointEvent::Withdrawn { account, withdraw_address, amount });
        self.commit();
        Ok(())
    }

    /// Locks `amount` more stake for `account` with the given unstake delay.
    pub fn add_stake(
        &mut self,
        account: Address,
        unstake_delay_sec: u32,
        amount: U256,
    ) -> Result<(), LedgerError> {
        self.ensure_unlocked()?;
        let min_unstake_delay = self.config.min_unstake_delay;
        let info = self.journal.update_deposit(account, |info| {
            info.add_stake(unstake_delay_sec, amount, min_unstake_delay)?;
            Ok(*info)
        })?;
        self.journal.emit(EntryPointEvent::StakeLocked {
            account,
            total_staked: info.stake,
            unstake_delay_sec,
        });
        self.commit();
        Ok(())
    }

    /// Starts the unstake delay of `account`. Returns the time the stake becomes withdrawable.
    pub fn unlock_stake(&mut self, account: Address) -> Result<u64, LedgerError> {
        self.ensure_unlocked()?;
        let now = self.env.timestamp;
        let withdraw_time = self.journal.update_deposit(account, |info| info.unlock_stake(now))?;
        self.journal.emit(EntryPointEvent::StakeUnlocked { account, withdraw_time });
        self.commit();
        Ok(withdraw_time)
    }

    /// Releases the unlocked stake of `account` to `withdraw_address`. Returns the amount.
    pub fn withdraw_stake(
        &mut self,
        account: Address,
        withdraw_address: Address,
    ) -> Result<U256, LedgerError> {
        self.ensure_unlocked()?;
        let now = self.env.timestamp;
        let amount = self.journal.update_deposit(account, |info| info.withdraw_stake(now))?;
        self.journal.emit(EntryPointEvent::StakeWithdrawn { account, withdraw_address, amount });
        self.commit();
        Ok(amount)
    }

    fn ensure_unlocked(&self) -> Result<(), SystemFault> {
        if self.journal.is_locked() {
            return Err(SystemFault::ReentrancyDetected);
        }
        Ok(())
    }

    fn commit(&mut self) {
        let events = self.journal.commit();
        self.logs.extend(events);
    }

    // ====== Queries ======

    /// The deposit of `account`.
    pub fn balance_of(&self, account: Address) -> U256 {
        self.journal.balance_of(account)
    }

    /// The ledger entry of `account`.
    pub fn deposit_info(&self, account: Address) -> DepositInfo {
        self.journal.deposit_info(account)
    }

    /// The next nonce of `sender` under `key`: the key in the upper 192 bits, the next sequence
    /// number in the lower 64.
    pub fn get_nonce(&self, sender: Address, key: U192) -> U256 {
        next_nonce(key, self.journal.nonce_sequence(sender, key))
    }

    /// The address the account described by `init` lives at, whether deployed or not.
    pub fn get_sender_address(&self, init: &AccountInit) -> Result<Address, AdmissionError> {
        factory::derive_sender_address(self.journal.state(), init)
    }

    /// The hash of `op` under this engine's address and chain id.
    pub fn user_op_hash(&self, op: &UserOperation) -> B256 {
        op.hash(self.config.address, self.config.chain_id)
    }

    /// A storage slot of the contract at `address`.
    pub fn storage(&self, address: Address, slot: B256) -> B256 {
        self.journal.storage(address, slot)
    }

    // ====== Batches ======

    /// Admits, executes and settles `ops`, crediting the collected costs to `beneficiary`.
    ///
    /// If any operation fails admission, or the engine hits a [`SystemFault`], nothing from the
    /// batch persists and the error is returned. Otherwise the receipt holds one outcome record
    /// per operation, in order, and the batch's event log.
    pub fn process_batch(
        &mut self,
        ops: &[UserOperation],
        beneficiary: Address,
    ) -> Result<BatchReceipt, EntryPointError> {
        let span = info_span!("process_batch", ops = ops.len(), block = self.env.number);
        let _enter = span.enter();

        let mut scope = CriticalSection::enter(self)?;
        match scope.run_batch(ops, beneficiary) {
            Ok(mut receipt) => {
                info!(
                    successful = receipt.successful(),
                    failed = receipt.outcomes.len() - receipt.successful(),
                    collected = %receipt.collected,
                    "batch settled"
                );
                receipt.events = scope.commit();
                Ok(receipt)
            }
            Err(err) => {
                warn!(%err, "batch aborted");
                Err(err)
            }
        }
    }

    fn run_batch(
        &mut self,
        ops: &[UserOperation],
        beneficiary: Address,
    ) -> Result<BatchReceipt, EntryPointError> {
        let deposits_before = self.journal.state().ledger().total_deposits();

        let contexts =
            ValidationEngine::new(&mut self.journal, &self.env, &self.config).admit(ops)?;
        self.journal.emit(EntryPointEvent::BeforeExecution);
        let outcomes = ExecutionEngine::new(&mut self.journal, &self.env, &self.config)
            .settle(ops, &contexts)?;

        let collected = sum(outcomes.iter().map(|outcome| outcome.actual_cost), "collected")?;
        let reserved = sum(contexts.iter().map(|context| context.prefund), "reserved")?;
        if collected > reserved {
            return Err(SystemFault::InvariantViolation(format!(
                "collected {collected} exceeds reserved prefund {reserved}"
            ))
            .into());
        }
        if !collected.is_zero() {
            self.journal.credit(beneficiary, collected).map_err(SystemFault::from)?;
        }

        let withdrawn = sum(
            self.journal.events().iter().filter_map(|event| match event {
                EntryPointEvent::Withdrawn { amount, .. } => Some(*amount),
                _ => None,
            }),
            "withdrawn",
        )?;
        let deposits_after = self.journal.state().ledger().total_deposits();
        if deposits_after.checked_add(withdrawn) != Some(deposits_before) {
            return Err(SystemFault::InvariantViolation(format!(
                "deposits not conserved: {deposits_before} before, {deposits_after} after, \
                 {withdrawn} withdrawn"
            ))
            .into());
        }

        debug!(%beneficiary, %collected, %reserved, "batch fees collected");
        Ok(BatchReceipt { outcomes, events: Vec::new(), beneficiary, collected })
    }

    /// Previews `op` against the current state without changing it.
    ///
    /// Runs admission and, if it passes, settlement for the operation alone, then rolls
    /// everything back. Only a [`SystemFault`] is returned as an error; an admission failure is
    /// part of the result.
    pub fn simulate(&mut self, op: &UserOperation) -> Result<SimulationResult, EntryPointError> {
        let op_hash = self.user_op_hash(op);
        let span = info_span!("simulate", %op_hash);
        let _enter = span.enter();

        // dropping the section without committing discards the preview
        CriticalSection::enter(self)?.run_simulation(op, op_hash)
    }

    fn run_simulation(
        &mut self,
        op: &UserOperation,
        op_hash: B256,
    ) -> Result<SimulationResult, EntryPointError> {
        let admitted =
            ValidationEngine::new(&mut self.journal, &self.env, &self.config).admit_one(op);
        let context = match admitted {
            Ok(context) => context,
            Err(error) => {
                debug!(%error, "simulated operation would not be admitted");
                return Ok(SimulationResult {
                    op_hash,
                    would_admit: false,
                    admission_error: Some(error),
                    prefund: U256::ZERO,
                    pre_op_gas: 0,
                    window: ValidityWindow::UNBOUNDED,
                    execution_success: None,
                    estimated_gas: 0,
                    estimated_cost: U256::ZERO,
                });
            }
        };
        let outcome = ExecutionEngine::new(&mut self.journal, &self.env, &self.config)
            .settle_one(op, &context)?;
        Ok(SimulationResult {
            op_hash,
            would_admit: true,
            admission_error: None,
            prefund: context.prefund,
            pre_op_gas: context.pre_op_gas,
            window: context.window,
            execution_success: Some(outcome.success),
            estimated_gas: outcome.actual_gas_used,
            estimated_cost: outcome.actual_cost,
        })
    }
}

/// The engine's critical section: the journal is locked and checkpointed on entry. Unless
/// committed, leaving the section (including by unwinding) rolls back every change made inside
/// it. The lock is always released.
struct CriticalSection<'a> {
    entry_point: &'a mut EntryPoint,
    checkpoint: JournalCheckpoint,
    committed: bool,
}

impl<'a> CriticalSection<'a> {
    fn enter(entry_point: &'a mut EntryPoint) -> Result<Self, SystemFault> {
        entry_point.journal.lock()?;
        let checkpoint = entry_point.journal.checkpoint();
        Ok(Self { entry_point, checkpoint, committed: false })
    }

    /// Makes the section's changes permanent and hands out its events.
    fn commit(mut self) -> Vec<EntryPointEvent> {
        self.committed = true;
        self.entry_point.journal.commit()
    }
}

impl Deref for CriticalSection<'_> {
    type Target = EntryPoint;

    fn deref(&self) -> &Self::Target {
        &*self.entry_point
    }
}

impl DerefMut for CriticalSection<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut *self.entry_point
    }
}

impl Drop for CriticalSection<'_> {
    fn drop(&mut self) {
        if !self.committed {
            self.entry_point.journal.revert(self.checkpoint);
        }
        self.entry_point.journal.unlock();
    }
}

fn sum(
    values: impl IntoIterator<Item = U256>,
    operation: &'static str,
) -> Result<U256, SystemFault> {
    values
        .into_iter()
        .try_fold(U256::ZERO, U256::checked_add)
        .ok_or_else(|| ArithmeticError::new(operation).into())
}
