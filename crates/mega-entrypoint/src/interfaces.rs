//! Capability interfaces of the code the entry point runs.
//!
//! The engine never reaches account, sponsor or target logic through inheritance. Each piece of
//! code is registered at an address as one of the narrow capabilities below and looked up by
//! address when an operation needs it. All capabilities are invoked synchronously through a
//! [`CallContext`] whose gas meter bounds them.

use core::fmt::Debug;
use std::sync::Arc;

use alloy_primitives::{Address, Bytes, B256, U256};
use auto_impl::auto_impl;

use crate::{
    derive_account_address, CallContext, CallError, PostOpMode, UserOperation, ValidationData,
};

/// The capabilities of a smart account: validating operations sent on its behalf and executing
/// their payload.
#[auto_impl(&, Box, Arc)]
pub trait SmartAccount: Debug + Send + Sync {
    /// Checks the authorization proof of `op`.
    ///
    /// Returning [`ValidationData::rejected`] or an error refuses admission of the whole batch.
    /// Running out of verification gas is reported as such, not as a rejection.
    fn validate_user_op(
        &self,
        ctx: &mut CallContext<'_>,
        op: &UserOperation,
        op_hash: B256,
    ) -> Result<ValidationData, CallError>;

    /// Executes a raw execution payload.
    fn execute(&self, ctx: &mut CallContext<'_>, data: &Bytes) -> Result<Bytes, CallError>;

    /// Executes an operation whose payload asks for the whole operation and its hash.
    ///
    /// Accounts that do not support this convention revert.
    fn execute_user_op(
        &self,
        ctx: &mut CallContext<'_>,
        op: &UserOperation,
        op_hash: B256,
    ) -> Result<(), CallError> {
        let _ = (ctx, op, op_hash);
        Err(CallError::revert_msg("executeUserOp not supported"))
    }
}

/// What a sponsor returns when it agrees to pay for an operation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Sponsorship {
    /// Opaque context handed back to the sponsor's post-execution hook.
    pub context: Bytes,
    /// The sponsor's verdict and validity window.
    pub validation: ValidationData,
}

/// The capabilities of a third party paying for operations.
#[auto_impl(&, Box, Arc)]
pub trait Sponsor: Debug + Send + Sync {
    /// Decides whether to pay for `op`, whose worst-case cost is `max_cost`.
    fn validate_sponsorship(
        &self,
        ctx: &mut CallContext<'_>,
        op: &UserOperation,
        op_hash: B256,
        max_cost: U256,
    ) -> Result<Sponsorship, CallError>;

    /// Runs after the operation settled. Invoked at most twice per operation: once with the
    /// execution result and, if that fails, once more with [`PostOpMode::PostOpFailed`].
    fn post_op(
        &self,
        ctx: &mut CallContext<'_>,
        mode: PostOpMode,
        context: &Bytes,
        actual_cost: U256,
        gas_price: u128,
    ) -> Result<(), CallError>;
}

/// Arbitrary code an execution payload may call.
#[auto_impl(&, Box, Arc)]
pub trait Target: Debug + Send + Sync {
    /// Handles a call carrying `data`.
    fn call(&self, ctx: &mut CallContext<'_>, data: &Bytes) -> Result<Bytes, CallError>;
}

/// A deployer of accounts at deterministic addresses.
///
/// The address of an account is a pure function of the factory's address, the salt and the
/// fingerprint of the account's initialization code, which commits to the owner. It can be
/// computed before deployment and always equals the address the account is deployed at.
#[auto_impl(&, Box, Arc)]
pub trait AccountFactory: Debug + Send + Sync {
    /// The fingerprint of the initialization code of an account owned by `owner`.
    fn init_code_hash(&self, owner: Address) -> B256;

    /// Builds the account code for `owner`.
    fn instantiate(&self, owner: Address) -> Arc<dyn SmartAccount>;

    /// The address an account for `owner` and `salt` is deployed at by the factory living at
    /// `factory`.
    fn derive_address(&self, factory: Address, owner: Address, salt: B256) -> Address {
        derive_account_address(factory, salt, self.init_code_hash(owner))
    }
}
