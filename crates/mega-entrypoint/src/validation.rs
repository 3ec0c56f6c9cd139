//! The validation engine: the all-or-nothing admission phase of a batch.
//!
//! Every operation goes through the same checks, in order:
//!
//! 1. The sender exists, or is materialized from the initialization payload at exactly the
//!    declared address.
//! 2. The nonce matches the next sequence number of its key, which is then consumed.
//! 3. The payer (the sponsor if there is one, the sender otherwise) can cover the worst-case cost,
//!    which is reserved against its deposit.
//! 4. The sender accepts the authorization proof within the verification gas limit.
//! 5. The sponsor, if any, agrees to pay within what is left of the verification gas.
//! 6. The current time lies in the intersection of the validity windows of both.
//!
//! The first failure rolls back everything admitted so far.

use alloy_primitives::{Address, Bytes, B256, U256};
use tracing::debug;

use crate::{
    factory, required_prefund, AdmissionError, BlockEnv, CallContext, CallError, Code,
    EntryPointConfig, EntryPointError, EntryPointEvent, GasFees, GasLimits, GasMeter, Journal,
    SponsorCoordinator, UserOperation, ValidityWindow,
};

/// What admission learned about an operation, consumed by settlement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationContext {
    /// The operation hash.
    pub op_hash: B256,
    /// The sender.
    pub sender: Address,
    /// The full nonce the operation consumed.
    pub nonce: U256,
    /// The sponsor, if any.
    pub sponsor: Option<Address>,
    /// The party whose deposit the prefund was reserved against.
    pub payer: Address,
    /// The declared gas limits.
    pub limits: GasLimits,
    /// The declared fee parameters.
    pub fees: GasFees,
    /// The gas the sponsor's post-execution hook may consume.
    pub post_op_gas_limit: u64,
    /// The reserved worst-case cost.
    pub prefund: U256,
    /// The opaque context the sponsor asked to get back after execution.
    pub sponsor_context: Bytes,
    /// The intersection of the validity windows of the sender and the sponsor.
    pub window: ValidityWindow,
    /// The pre-verification gas plus the verification gas actually used.
    pub pre_op_gas: u64,
}

/// Runs the admission checks against a journal.
#[derive(Debug)]
pub struct ValidationEngine<'a> {
    journal: &'a mut Journal,
    env: &'a BlockEnv,
    config: &'a EntryPointConfig,
}

impl<'a> ValidationEngine<'a> {
    /// Creates an engine operating on `journal`.
    pub fn new(journal: &'a mut Journal, env: &'a BlockEnv, config: &'a EntryPointConfig) -> Self {
        Self { journal, env, config }
    }

    /// Admits every operation of `ops`, in order.
    ///
    /// Returns one context per operation. If any operation fails, every change made by the
    /// admission of the batch is rolled back and the failure is returned with its index.
    pub fn admit(
        &mut self,
        ops: &[UserOperation],
    ) -> Result<Vec<OperationContext>, EntryPointError> {
        let checkpoint = self.journal.checkpoint();
        let mut contexts = Vec::with_capacity(ops.len());
        for (index, op) in ops.iter().enumerate() {
            match self.admit_one(op) {
                Ok(context) => contexts.push(context),
                Err(error) => {
                    debug!(
                        target: "mega_entrypoint::validation",
                        index, %error, "admission failed"
                    );
                    self.journal.revert(checkpoint);
                    return Err(EntryPointError::Admission { index, error });
                }
            }
        }
        Ok(contexts)
    }

    /// Admits a single operation. On failure the journal may hold partial changes; the caller
    /// rolls them back.
    pub fn admit_one(&mut self, op: &UserOperation) -> Result<OperationContext, AdmissionError> {
        let op_hash = op.hash(self.config.address, self.config.chain_id);
        let limits = op.gas_limits();
        let fees = op.gas_fees();
        let sponsor = op.sponsor_address();
        let mut meter = GasMeter::new(limits.verification_gas_limit);

        // 1. sender
        let created = self.ensure_sender(op, &mut meter)?;
        if let Some(factory) = created {
            self.journal.emit(EntryPointEvent::AccountDeployed {
                op_hash,
                sender: op.sender,
                factory,
                sponsor,
            });
        }

        // 2. nonce
        let (key, sequence) = (op.nonce_key(), op.nonce_sequence());
        self.journal.use_nonce(op.sender, key, sequence).map_err(|expected| {
            AdmissionError::NonceMismatch { key, expected, provided: sequence }
        })?;

        // 3. prefund
        let prefund = required_prefund(limits, fees, op.post_op_gas_limit())
            .map_err(|_| AdmissionError::GasValuesOverflow)?;
        let payer = op.payer();
        self.reserve(payer, sponsor, prefund)?;

        // 4. account
        let account = self
            .journal
            .code(op.sender)
            .and_then(Code::as_account)
            .cloned()
            .ok_or(AdmissionError::AccountNotDeployed(op.sender))?;
        let (sender, caller) = (op.sender, self.config.address);
        let mut ctx =
            CallContext::new(&mut *self.journal, &mut meter, self.env, self.config, sender, caller);
        let validation = account.validate_user_op(&mut ctx, op, op_hash).map_err(|err| match err {
            CallError::OutOfGas { limit } => {
                AdmissionError::VerificationGasExceeded { party: op.sender, limit }
            }
            CallError::Revert(reason) => AdmissionError::AuthorizationRejected {
                reason: String::from_utf8_lossy(&reason).into_owned(),
            },
        })?;
        if !validation.authorized {
            return Err(AdmissionError::AuthorizationRejected {
                reason: "invalid authorization proof".to_string(),
            });
        }

        // 5. sponsor
        let mut window = validation.window;
        let mut sponsor_context = Bytes::new();
        if let Some(sponsor) = sponsor {
            let sponsorship = SponsorCoordinator::new(&mut *self.journal, self.env, self.config)
                .validate(sponsor, op, op_hash, prefund, &mut meter)?;
            window = window.intersect(sponsorship.validation.window);
            sponsor_context = sponsorship.context;
        }

        // 6. window
        let now = self.env.timestamp;
        if now < window.valid_after {
            return Err(AdmissionError::WindowNotYetValid { valid_after: window.valid_after, now });
        }
        if window.valid_until != 0 && now > window.valid_until {
            return Err(AdmissionError::WindowExpired { valid_until: window.valid_until, now });
        }

        // bounded by `max_gas`, which did not overflow
        let pre_op_gas = limits.pre_verification_gas + meter.used();
        debug!(
            target: "mega_entrypoint::validation",
            %op_hash, sender = %op.sender, %payer, %prefund, pre_op_gas, "operation admitted"
        );
        Ok(OperationContext {
            op_hash,
            sender: op.sender,
            nonce: op.nonce,
            sponsor,
            payer,
            limits,
            fees,
            post_op_gas_limit: op.post_op_gas_limit(),
            prefund,
            sponsor_context,
            window,
            pre_op_gas,
        })
    }

    /// Makes sure the sender exists. Returns the factory if it was materialized.
    fn ensure_sender(
        &mut self,
        op: &UserOperation,
        meter: &mut GasMeter,
    ) -> Result<Option<Address>, AdmissionError> {
        let exists = self.journal.has_code(op.sender);
        match (&op.init, exists) {
            (None, true) => Ok(None),
            (None, false) => Err(AdmissionError::AccountNotDeployed(op.sender)),
            (Some(_), true) => Err(AdmissionError::SenderAlreadyConstructed(op.sender)),
            (Some(init), false) => {
                let derived = factory::derive_sender_address(self.journal.state(), init)?;
                if derived != op.sender {
                    return Err(AdmissionError::AccountDerivationMismatch {
                        declared: op.sender,
                        derived,
                    });
                }
                factory::materialize_account(&mut *self.journal, init, meter)?;
                Ok(Some(init.factory))
            }
        }
    }

    /// Reserves `prefund` against the deposit of `payer`.
    fn reserve(
        &mut self,
        payer: Address,
        sponsor: Option<Address>,
        prefund: U256,
    ) -> Result<(), AdmissionError> {
        if self.journal.debit(payer, prefund).is_ok() {
            return Ok(());
        }
        let available = self.journal.balance_of(payer);
        Err(match sponsor {
            Some(sponsor) => AdmissionError::SponsorshipRejected {
                sponsor,
                reason: format!("deposit {available} too low for prefund {prefund}"),
            },
            None => AdmissionError::InsufficientPrefund { required: prefund, available },
        })
    }
}
