//! The execution engine: the fault-isolated settlement phase of a batch.
//!
//! Each admitted operation runs in its own journal scope. A failing execution payload is rolled
//! back and recorded in the operation's outcome; it never reaches sibling operations. Whatever
//! happened, the payer is charged for the gas the operation consumed and refunded the rest of its
//! prefund.

use alloy_primitives::U256;
use tracing::{debug, warn};

use crate::{
    actual_cost, constants::EXECUTE_USER_OP_SELECTOR, effective_gas_price, refund,
    unused_gas_penalty, ArithmeticError, BlockEnv, CallContext, CallError, Code,
    EntryPointConfig, EntryPointEvent, GasMeter, Journal, OperationContext, OutcomeRecord,
    PostOpMode, PostOpOutcome, PostOpRequest, SettlementFault, SponsorCoordinator, SystemFault,
    UserOperation,
};

/// Runs and settles admitted operations against a journal.
#[derive(Debug)]
pub struct ExecutionEngine<'a> {
    journal: &'a mut Journal,
    env: &'a BlockEnv,
    config: &'a EntryPointConfig,
}

impl<'a> ExecutionEngine<'a> {
    /// Creates an engine operating on `journal`.
    pub fn new(journal: &'a mut Journal, env: &'a BlockEnv, config: &'a EntryPointConfig) -> Self {
        Self { journal, env, config }
    }

    /// Settles every operation, in order, with the context admission produced for it.
    ///
    /// Returns one outcome record per operation. Only a [`SystemFault`] is returned as an error.
    pub fn settle(
        &mut self,
        ops: &[UserOperation],
        contexts: &[OperationContext],
    ) -> Result<Vec<OutcomeRecord>, SystemFault> {
        if ops.len() != contexts.len() {
            return Err(SystemFault::InvariantViolation(format!(
                "{} operations but {} admission contexts",
                ops.len(),
                contexts.len()
            )));
        }
        ops.iter().zip(contexts).map(|(op, context)| self.settle_one(op, context)).collect()
    }

    /// Settles a single admitted operation.
    pub fn settle_one(
        &mut self,
        op: &UserOperation,
        context: &OperationContext,
    ) -> Result<OutcomeRecord, SystemFault> {
        let OperationContext { op_hash, sender, nonce, sponsor, payer, prefund, .. } = *context;
        let gas_price = effective_gas_price(context.fees, self.env.base_fee);
        let scope = self.journal.checkpoint();
        let mut faults = Vec::new();

        // execution
        let mut meter = GasMeter::new(context.limits.call_gas_limit);
        let executed = self.execute(op, context, &mut meter)?;
        let execution_gas = meter.used();
        let mode = match executed {
            Ok(()) => PostOpMode::Success,
            Err(err) => {
                self.journal.revert(scope);
                warn!(
                    target: "mega_entrypoint::execution",
                    %op_hash, %sender, %err, "execution failed"
                );
                self.journal.emit(EntryPointEvent::UserOperationRevertReason {
                    op_hash,
                    sender,
                    nonce,
                    revert_reason: err.revert_data(),
                });
                faults.push(match err {
                    CallError::OutOfGas { limit } => {
                        SettlementFault::ExecutionOutOfGas { gas_limit: limit }
                    }
                    CallError::Revert(reason) => SettlementFault::ExecutionReverted { reason },
                });
                PostOpMode::ExecutionFailed
            }
        };
        let mut success = mode == PostOpMode::Success;

        let penalty = unused_gas_penalty(
            context.limits.call_gas_limit,
            execution_gas,
            self.config.unused_gas_penalty_percent,
            self.config.penalty_gas_threshold,
        );
        let mut gas_used = [execution_gas, penalty, self.config.settlement_overhead_gas]
            .into_iter()
            .try_fold(context.pre_op_gas, u64::checked_add)
            .ok_or(ArithmeticError::new("gas used"))?;

        // post-execution hook
        let mut post_op_failed = false;
        if let Some(sponsor) = sponsor {
            // a failed execution is already rolled back; only the hook itself is undone then
            let rollback = if success { scope } else { self.journal.checkpoint() };
            let request = PostOpRequest {
                op_hash,
                sponsor,
                mode,
                context: &context.sponsor_context,
                actual_cost: actual_cost(gas_used, gas_price)?,
                gas_price,
            };
            let (outcome, post_op_gas) =
                SponsorCoordinator::new(&mut *self.journal, self.env, self.config).post_op(
                    request,
                    context.post_op_gas_limit,
                    rollback,
                )?;
            gas_used =
                gas_used.checked_add(post_op_gas).ok_or(ArithmeticError::new("post-op gas"))?;
            match outcome {
                PostOpOutcome::Completed => {}
                PostOpOutcome::Recovered { reason } => {
                    success = false;
                    faults.push(SettlementFault::PostOpReverted { reason });
                }
                PostOpOutcome::Failed { second, .. } => {
                    success = false;
                    post_op_failed = true;
                    faults.push(SettlementFault::PostOpFailed { reason: second });
                }
            }
        }

        // fees
        let cost = actual_cost(gas_used, gas_price)?;
        let forfeited = if post_op_failed {
            true
        } else if cost > prefund {
            success = false;
            faults.push(SettlementFault::PrefundTooLow { prefund, actual_cost: cost });
            true
        } else {
            false
        };
        let collected = if forfeited { prefund } else { cost };
        if forfeited {
            warn!(
                target: "mega_entrypoint::execution",
                %op_hash, %payer, %prefund, %cost, "prefund forfeited"
            );
            self.journal.emit(EntryPointEvent::PrefundForfeited {
                op_hash,
                payer,
                prefund,
                actual_cost: cost,
            });
        }
        let refunded = refund(prefund, collected)?;
        if refunded > U256::ZERO {
            self.journal.credit(payer, refunded)?;
        }

        debug!(
            target: "mega_entrypoint::execution",
            %op_hash, %sender, success, gas_used, %collected, %refunded, "operation settled"
        );
        self.journal.emit(EntryPointEvent::UserOperationEvent {
            op_hash,
            sender,
            sponsor,
            nonce,
            success,
            actual_gas_cost: collected,
            actual_gas_used: gas_used,
        });
        Ok(OutcomeRecord {
            op_hash,
            sender,
            sponsor,
            nonce,
            success,
            actual_gas_used: gas_used,
            actual_cost: collected,
            faults,
        })
    }

    /// Hands the execution payload to the sender. Payloads starting with
    /// [`EXECUTE_USER_OP_SELECTOR`] get the whole operation and its hash instead.
    fn execute(
        &mut self,
        op: &UserOperation,
        context: &OperationContext,
        meter: &mut GasMeter,
    ) -> Result<Result<(), CallError>, SystemFault> {
        let account = self
            .journal
            .code(context.sender)
            .and_then(Code::as_account)
            .cloned()
            .ok_or_else(|| {
                SystemFault::InvariantViolation(format!(
                    "no account code at {} after admission",
                    context.sender
                ))
            })?;
        let (sender, caller) = (context.sender, self.config.address);
        let mut ctx =
            CallContext::new(&mut *self.journal, meter, self.env, self.config, sender, caller);
        Ok(if op.call_data.starts_with(&EXECUTE_USER_OP_SELECTOR) {
            account.execute_user_op(&mut ctx, op, context.op_hash)
        } else {
            account.execute(&mut ctx, &op.call_data).map(drop)
        })
    }
}
