use std::sync::Arc;

use alloy_primitives::{address, Address, Bytes, B256, U256};

use super::{
    execute_call, Counter, EcdsaAccount, EcdsaAccountFactory, GasBurner, Panicker,
    ReentrantTarget, Recurser, Reverter, TestSigner,
};
use crate::{AccountInit, BlockEnv, EntryPoint, EntryPointConfig, SponsorData, UserOperation};

/// The address of the [`EcdsaAccountFactory`] deployed by [`test_entry_point`].
pub const FACTORY: Address = address!("0x00000000000000000000000000000000000fac70");
/// The address of the [`Counter`] deployed by [`test_entry_point`].
pub const COUNTER: Address = address!("0x000000000000000000000000000000000000c0de");
/// The address of the [`Reverter`] deployed by [`test_entry_point`].
pub const REVERTER: Address = address!("0x000000000000000000000000000000000000dead");
/// The address of the [`GasBurner`] deployed by [`test_entry_point`].
pub const GAS_BURNER: Address = address!("0x000000000000000000000000000000000000b00b");
/// The address of the [`ReentrantTarget`] deployed by [`test_entry_point`].
pub const REENTRANT: Address = address!("0x000000000000000000000000000000000000ee00");
/// The address of the [`Recurser`] deployed by [`test_entry_point`].
pub const RECURSER: Address = address!("0x000000000000000000000000000000000000eeee");
/// The address of the [`Panicker`] deployed by [`test_entry_point`].
pub const PANICKER: Address = address!("0x000000000000000000000000000000000000d1ed");
/// The beneficiary the tests collect fees to.
pub const BENEFICIARY: Address = address!("0x000000000000000000000000000000000000bbbb");

/// The gas burnt by the [`GasBurner`] deployed by [`test_entry_point`].
pub const BURNED_GAS: u64 = 60_000;
/// The timestamp of the block [`test_entry_point`] runs in.
pub const BLOCK_TIMESTAMP: u64 = 1_000;
/// The base fee of the block [`test_entry_point`] runs in.
pub const BASE_FEE: u128 = 1;
/// A deposit large enough for any test operation.
pub const FUNDING: U256 = U256::from_limbs([1_000_000_000_000_000_000, 0, 0, 0]);

/// The default block environment of the tests.
pub const fn test_block() -> BlockEnv {
    BlockEnv { number: 1, timestamp: BLOCK_TIMESTAMP, base_fee: BASE_FEE }
}

/// Creates an engine with `config`, the test block, and a factory and the test targets deployed.
pub fn test_entry_point(config: EntryPointConfig) -> EntryPoint {
    let mut entry_point = EntryPoint::new(config).with_block(test_block());
    entry_point.deploy_factory(FACTORY, Arc::new(EcdsaAccountFactory));
    entry_point.deploy_contract(COUNTER, Arc::new(Counter));
    entry_point.deploy_contract(REVERTER, Arc::new(Reverter("target reverted")));
    entry_point.deploy_contract(GAS_BURNER, Arc::new(GasBurner(BURNED_GAS)));
    entry_point.deploy_contract(REENTRANT, Arc::new(ReentrantTarget));
    entry_point.deploy_contract(RECURSER, Arc::new(Recurser));
    entry_point.deploy_contract(PANICKER, Arc::new(Panicker));
    entry_point
}

/// The initialization payload of the account of `signer` under `salt`.
pub fn account_init(signer: &TestSigner, salt: u64) -> AccountInit {
    AccountInit { factory: FACTORY, owner: signer.address(), salt: B256::from(U256::from(salt)) }
}

/// Deploys the account of `signer` at its derived address and funds it with `deposit`.
pub fn deploy_funded_account(
    entry_point: &mut EntryPoint,
    signer: &TestSigner,
    deposit: U256,
) -> Address {
    let sender = entry_point.get_sender_address(&account_init(signer, 0)).unwrap();
    entry_point.deploy_account(sender, Arc::new(EcdsaAccount::new(signer.address())));
    if !deposit.is_zero() {
        entry_point.deposit_to(sender, deposit).unwrap();
    }
    sender
}

/// An unsigned operation from `sender` with the default test gas parameters: 21 000
/// pre-verification gas, 100 000 verification and execution gas, and a maximum fee of 10 with a
/// priority fee of 1.
pub fn user_op(sender: Address, nonce: U256, call_data: Bytes) -> UserOperation {
    UserOperation {
        sender,
        nonce,
        call_data,
        call_gas_limit: 100_000,
        verification_gas_limit: 100_000,
        pre_verification_gas: 21_000,
        max_fee_per_gas: 10,
        max_priority_fee_per_gas: 1,
        ..Default::default()
    }
}

/// An unsigned operation from `sender` calling the [`Counter`].
pub fn counter_op(sender: Address, nonce: U256) -> UserOperation {
    user_op(sender, nonce, execute_call(COUNTER, Bytes::new()))
}

/// Makes `op` sponsored by `sponsor`, with the given post-op gas allowance.
pub fn sponsored(mut op: UserOperation, sponsor: Address, post_op_gas_limit: u64) -> UserOperation {
    op.sponsor = Some(SponsorData { sponsor, post_op_gas_limit, data: Bytes::new() });
    op
}

/// Signs `op` for `entry_point` with `signer`.
pub fn sign(entry_point: &EntryPoint, signer: &TestSigner, mut op: UserOperation) -> UserOperation {
    op.signature = signer.sign(entry_point.user_op_hash(&op));
    op
}
