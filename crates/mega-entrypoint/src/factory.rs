//! Deterministic account derivation and materialization.
//!
//! An account's address is `create2(factory, salt, init_code_hash)`, where the init code hash is
//! the factory's fingerprint of the account code for a given owner. Derivation is pure, so the
//! address can be handed out before the account exists; materialization deploys the account at
//! exactly that address and is idempotent.

use alloy_primitives::{Address, B256};
use tracing::debug;

use crate::{constants, AccountInit, AdmissionError, Code, GasMeter, Journal, WorldState};

/// The address an account is deployed at by `deployer` for `salt` and the given init code hash.
pub fn derive_account_address(deployer: Address, salt: B256, init_code_hash: B256) -> Address {
    deployer.create2(salt, init_code_hash)
}

/// Computes the address `init` materializes an account at, without deploying anything.
pub fn derive_sender_address(
    state: &WorldState,
    init: &AccountInit,
) -> Result<Address, AdmissionError> {
    let factory = state
        .code(init.factory)
        .and_then(Code::as_factory)
        .ok_or(AdmissionError::UnknownFactory(init.factory))?;
    Ok(factory.derive_address(init.factory, init.owner, init.salt))
}

/// Deploys the account described by `init`, charging the deployment against `meter`.
///
/// Returns the address of the account. If code already lives at that address nothing is
/// deployed or charged.
pub(crate) fn materialize_account(
    journal: &mut Journal,
    init: &AccountInit,
    meter: &mut GasMeter,
) -> Result<Address, AdmissionError> {
    let factory = journal
        .code(init.factory)
        .and_then(Code::as_factory)
        .cloned()
        .ok_or(AdmissionError::UnknownFactory(init.factory))?;
    let address = factory.derive_address(init.factory, init.owner, init.salt);
    if journal.has_code(address) {
        return Ok(address);
    }

    meter.charge(constants::gas::CREATE).map_err(|_| AdmissionError::VerificationGasExceeded {
        party: init.factory,
        limit: meter.limit(),
    })?;
    journal.deploy(address, Code::Account(factory.instantiate(init.owner)));
    debug!(
        target: "mega_entrypoint::factory",
        %address, factory = %init.factory, owner = %init.owner, "account materialized"
    );
    Ok(address)
}
