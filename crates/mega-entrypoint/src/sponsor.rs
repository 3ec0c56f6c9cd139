//! The sponsor coordinator: the pre- and post-execution hooks of third-party fee sponsorship.

use std::sync::Arc;

use alloy_primitives::{Address, Bytes, B256, U256};
use tracing::{debug, warn};

use crate::{
    AdmissionError, BlockEnv, CallContext, CallError, Code, EntryPointConfig, EntryPointEvent,
    GasMeter, Journal, JournalCheckpoint, PostOpMode, Sponsor, Sponsorship, SystemFault,
    UserOperation,
};

/// How the post-execution hook of a sponsor ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PostOpOutcome {
    /// The first invocation succeeded.
    Completed,
    /// The first invocation failed and was rolled back together with the execution; the second,
    /// made with [`PostOpMode::PostOpFailed`], succeeded.
    Recovered {
        /// The revert data of the first invocation.
        reason: Bytes,
    },
    /// Both invocations failed. Nothing either of them did persists.
    Failed {
        /// The revert data of the first invocation.
        first: Bytes,
        /// The revert data of the second invocation.
        second: Bytes,
    },
}

/// What the post-execution hook of a sponsor is invoked with.
#[derive(Debug, Clone, Copy)]
pub struct PostOpRequest<'a> {
    /// The hash of the settled operation.
    pub op_hash: B256,
    /// The sponsor whose hook runs.
    pub sponsor: Address,
    /// How the execution payload ended.
    pub mode: PostOpMode,
    /// The context the sponsor returned from its validation.
    pub context: &'a Bytes,
    /// The cost charged so far, excluding the hook itself.
    pub actual_cost: U256,
    /// The effective gas price of the operation.
    pub gas_price: u128,
}

/// Drives the two hooks a sponsor takes part in.
#[derive(Debug)]
pub struct SponsorCoordinator<'a> {
    journal: &'a mut Journal,
    env: &'a BlockEnv,
    config: &'a EntryPointConfig,
}

impl<'a> SponsorCoordinator<'a> {
    /// Creates a coordinator operating on `journal`.
    pub fn new(journal: &'a mut Journal, env: &'a BlockEnv, config: &'a EntryPointConfig) -> Self {
        Self { journal, env, config }
    }

    /// Asks `sponsor` whether it pays for `op`, charging its check against `meter`.
    ///
    /// Fails if no sponsor code lives at the address, if the check reverts or denies the
    /// operation, or if it runs out of verification gas.
    pub fn validate(
        &mut self,
        sponsor: Address,
        op: &UserOperation,
        op_hash: B256,
        max_cost: U256,
        meter: &mut GasMeter,
    ) -> Result<Sponsorship, AdmissionError> {
        let code = lookup(self.journal, sponsor).ok_or_else(|| AdmissionError::SponsorshipRejected {
            sponsor,
            reason: "no sponsor code".to_string(),
        })?;

        let caller = self.config.address;
        let mut ctx =
            CallContext::new(&mut *self.journal, meter, self.env, self.config, sponsor, caller);
        let sponsorship = code.validate_sponsorship(&mut ctx, op, op_hash, max_cost).map_err(
            |err| match err {
                CallError::OutOfGas { limit } => {
                    AdmissionError::VerificationGasExceeded { party: sponsor, limit }
                }
                CallError::Revert(reason) => AdmissionError::SponsorshipRejected {
                    sponsor,
                    reason: String::from_utf8_lossy(&reason).into_owned(),
                },
            },
        )?;
        if !sponsorship.validation.authorized {
            return Err(AdmissionError::SponsorshipRejected {
                sponsor,
                reason: "sponsorship denied".to_string(),
            });
        }
        debug!(target: "mega_entrypoint::sponsor", %sponsor, %op_hash, "sponsorship accepted");
        Ok(sponsorship)
    }

    /// Runs the post-execution hook of the request's sponsor.
    ///
    /// The hook is invoked at most twice. If the first invocation fails, everything done since
    /// `rollback` (the execution payload included) is undone and the hook is invoked once more with
    /// [`PostOpMode::PostOpFailed`]. If that fails too, it is undone as well. Both invocations
    /// share one meter of `post_op_gas_limit`; the gas they used is returned with the outcome.
    pub fn post_op(
        &mut self,
        request: PostOpRequest<'_>,
        post_op_gas_limit: u64,
        rollback: JournalCheckpoint,
    ) -> Result<(PostOpOutcome, u64), SystemFault> {
        let PostOpRequest { op_hash, sponsor, mode, .. } = request;
        let code = lookup(self.journal, sponsor).ok_or_else(|| {
            SystemFault::InvariantViolation(format!("no sponsor code at {sponsor} after admission"))
        })?;
        let mut meter = GasMeter::new(post_op_gas_limit);

        let Err(err) = self.invoke(&code, request, &mut meter) else {
            return Ok((PostOpOutcome::Completed, meter.used()));
        };
        let first = err.revert_data();
        self.journal.revert(rollback);
        warn!(
            target: "mega_entrypoint::sponsor",
            %sponsor, %op_hash, ?mode, %err, "post-op reverted"
        );
        self.journal.emit(EntryPointEvent::PostOpReverted {
            op_hash,
            sponsor,
            mode,
            revert_reason: first.clone(),
        });

        let retry = PostOpRequest { mode: PostOpMode::PostOpFailed, ..request };
        let checkpoint = self.journal.checkpoint();
        let Err(err) = self.invoke(&code, retry, &mut meter) else {
            return Ok((PostOpOutcome::Recovered { reason: first }, meter.used()));
        };
        let second = err.revert_data();
        self.journal.revert(checkpoint);
        warn!(target: "mega_entrypoint::sponsor", %sponsor, %op_hash, %err, "post-op failed twice");
        self.journal.emit(EntryPointEvent::PostOpReverted {
            op_hash,
            sponsor,
            mode: retry.mode,
            revert_reason: second.clone(),
        });
        Ok((PostOpOutcome::Failed { first, second }, meter.used()))
    }

    fn invoke(
        &mut self,
        code: &Arc<dyn Sponsor>,
        request: PostOpRequest<'_>,
        meter: &mut GasMeter,
    ) -> Result<(), CallError> {
        let caller = self.config.address;
        let mut ctx = CallContext::new(
            &mut *self.journal,
            meter,
            self.env,
            self.config,
            request.sponsor,
            caller,
        );
        let PostOpRequest { mode, context, actual_cost, gas_price, .. } = request;
        code.post_op(&mut ctx, mode, context, actual_cost, gas_price)
    }
}

fn lookup(journal: &Journal, sponsor: Address) -> Option<Arc<dyn Sponsor>> {
    journal.code(sponsor).and_then(Code::as_sponsor).cloned()
}
