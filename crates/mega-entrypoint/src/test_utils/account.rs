use std::sync::Arc;

use alloy_primitives::{aliases::U192, b256, keccak256, Address, Bytes, B256};
use alloy_sol_types::{sol, SolCall, SolInterface};

use super::recover_signer;
use crate::{
    constants, AccountFactory, CallContext, CallError, SmartAccount, UserOperation,
    ValidationData, ValidityWindow,
};

sol! {
    /// The execution payloads understood by [`EcdsaAccount`].
    interface IEcdsaAccount {
        function execute(address dest, bytes func) external;
        function executeBatch(address[] dest, bytes[] func) external;
        function incrementNonce(uint192 key) external;
    }
}

/// The storage slot where [`EcdsaAccount`] records the hash of the last operation it executed
/// through the self-aware convention.
pub const LAST_OP_HASH_SLOT: B256 =
    b256!("0x00000000000000000000000000000000000000000000000000000000000000a1");

/// A minimal owner-controlled account: a single ECDSA signer authorizes operations, and the
/// execution payload forwards one or several calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EcdsaAccount {
    owner: Address,
    window: ValidityWindow,
}

impl EcdsaAccount {
    /// Creates an account controlled by `owner`.
    pub const fn new(owner: Address) -> Self {
        Self { owner, window: ValidityWindow::UNBOUNDED }
    }

    /// Restricts every operation the account authorizes to `window`.
    pub const fn with_window(mut self, window: ValidityWindow) -> Self {
        self.window = window;
        self
    }

    /// The owner.
    pub const fn owner(&self) -> Address {
        self.owner
    }
}

impl SmartAccount for EcdsaAccount {
    fn validate_user_op(
        &self,
        ctx: &mut CallContext<'_>,
        op: &UserOperation,
        op_hash: B256,
    ) -> Result<ValidationData, CallError> {
        if !ctx.called_by_entry_point() {
            return Err(CallError::revert_msg("account: not from entry point"));
        }
        ctx.charge_gas(constants::gas::ECRECOVER)?;
        if recover_signer(op_hash, &op.signature) != Some(self.owner) {
            return Ok(ValidationData::rejected());
        }
        Ok(ValidationData::authorized().with_window(self.window))
    }

    fn execute(&self, ctx: &mut CallContext<'_>, data: &Bytes) -> Result<Bytes, CallError> {
        if !ctx.called_by_entry_point() && ctx.caller() != ctx.address() {
            return Err(CallError::revert_msg("account: not from entry point"));
        }
        if data.is_empty() {
            return Ok(Bytes::new());
        }
        match IEcdsaAccount::IEcdsaAccountCalls::abi_decode(data, true) {
            Ok(IEcdsaAccount::IEcdsaAccountCalls::execute(call)) => ctx.call(call.dest, &call.func),
            Ok(IEcdsaAccount::IEcdsaAccountCalls::executeBatch(call)) => {
                if call.dest.len() != call.func.len() {
                    return Err(CallError::revert_msg("account: wrong array lengths"));
                }
                for (dest, func) in call.dest.iter().zip(&call.func) {
                    ctx.call(*dest, func)?;
                }
                Ok(Bytes::new())
            }
            Ok(IEcdsaAccount::IEcdsaAccountCalls::incrementNonce(call)) => {
                ctx.increment_nonce(call.key)?;
                Ok(Bytes::new())
            }
            Err(_) => Err(CallError::revert_msg("account: unknown payload")),
        }
    }

    fn execute_user_op(
        &self,
        ctx: &mut CallContext<'_>,
        op: &UserOperation,
        op_hash: B256,
    ) -> Result<(), CallError> {
        ctx.sstore(LAST_OP_HASH_SLOT, op_hash)?;
        let payload = &op.call_data[constants::EXECUTE_USER_OP_SELECTOR.len()..];
        self.execute(ctx, &Bytes::copy_from_slice(payload)).map(drop)
    }
}

/// Deploys [`EcdsaAccount`]s at addresses derived from their owner and a salt.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EcdsaAccountFactory;

impl AccountFactory for EcdsaAccountFactory {
    fn init_code_hash(&self, owner: Address) -> B256 {
        keccak256([b"EcdsaAccount".as_slice(), owner.as_slice()].concat())
    }

    fn instantiate(&self, owner: Address) -> Arc<dyn SmartAccount> {
        Arc::new(EcdsaAccount::new(owner))
    }
}

/// Encodes a payload making an [`EcdsaAccount`] call `dest` with `func`.
pub fn execute_call(dest: Address, func: Bytes) -> Bytes {
    IEcdsaAccount::executeCall { dest, func }.abi_encode().into()
}

/// Encodes a payload making an [`EcdsaAccount`] call every `dest` with the matching `func`.
pub fn execute_batch_call(dest: Vec<Address>, func: Vec<Bytes>) -> Bytes {
    IEcdsaAccount::executeBatchCall { dest, func }.abi_encode().into()
}

/// Encodes a payload making an [`EcdsaAccount`] skip the next sequence number under `key`. The
/// account only accepts it from itself or the entry point.
pub fn increment_nonce_call(key: U192) -> Bytes {
    IEcdsaAccount::incrementNonceCall { key }.abi_encode().into()
}

/// Wraps `payload` in the self-aware execution convention.
pub fn self_aware_call(payload: &Bytes) -> Bytes {
    [constants::EXECUTE_USER_OP_SELECTOR.as_slice(), payload.as_ref()].concat().into()
}
