//! Tests for sponsored operations and the post-execution hook.

use std::sync::{atomic::Ordering, Arc};

use alloy_primitives::{address, Address, Bytes, B256, U256};
use mega_entrypoint::{
    test_utils::{
        counter_op, deploy_funded_account, execute_call, sign, sponsored, test_entry_point,
        user_op, Counter, DepositSponsor, TestSigner, BENEFICIARY, COUNTER, FUNDING,
        PostOpInvocation, LAST_POST_OP_MODE_SLOT, REVERTER,
    },
    EntryPoint, EntryPointConfig, EntryPointEvent, PostOpMode, SettlementFault,
};

const SPONSOR: Address = address!("0x0000000000000000000000000000000000005050");
const POST_OP_GAS_LIMIT: u64 = 50_000;
/// Pre-verification gas, the signature recovery and the sponsorship check.
const PRE_OP_GAS: u64 = 29_000;
/// The counter call and the penalty for its unused execution gas.
const EXECUTION_GAS: u64 = 22_800 + 7_720;
/// One post-op invocation of the test sponsor: a single storage write.
const POST_OP_GAS: u64 = 20_000;
const PREFUND: U256 =
    U256::from_limbs([(21_000 + 100_000 + 100_000 + POST_OP_GAS_LIMIT) * 10, 0, 0, 0]);

fn sponsor_reason() -> Bytes {
    Bytes::from_static(b"sponsor: post-op failed")
}

/// An engine with a funded sponsor and an unfunded account.
fn setup(sponsor: DepositSponsor) -> (EntryPoint, TestSigner, Address) {
    let mut entry_point = test_entry_point(EntryPointConfig::default());
    entry_point.deploy_sponsor(SPONSOR, Arc::new(sponsor));
    entry_point.deposit_to(SPONSOR, FUNDING).unwrap();
    let alice = TestSigner::from_seed(1);
    let account = deploy_funded_account(&mut entry_point, &alice, U256::ZERO);
    entry_point.take_logs();
    (entry_point, alice, account)
}

#[test]
fn test_sponsor_pays_and_post_op_runs_once() {
    let sponsor = DepositSponsor::new();
    let calls = sponsor.post_op_calls();
    let (mut entry_point, alice, account) = setup(sponsor);

    let op = sponsored(counter_op(account, U256::ZERO), SPONSOR, POST_OP_GAS_LIMIT);
    let op = sign(&entry_point, &alice, op);
    let receipt = entry_point.process_batch(&[op], BENEFICIARY).unwrap();

    let outcome = &receipt.outcomes[0];
    let gas_used = PRE_OP_GAS + EXECUTION_GAS + POST_OP_GAS;
    assert!(outcome.success);
    assert_eq!(outcome.sponsor, Some(SPONSOR));
    assert_eq!(outcome.actual_gas_used, gas_used);
    assert_eq!(outcome.actual_cost, U256::from(gas_used * 2));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(entry_point.storage(SPONSOR, LAST_POST_OP_MODE_SLOT), B256::with_last_byte(1));
    assert_eq!(entry_point.balance_of(SPONSOR), FUNDING - outcome.actual_cost);
    assert_eq!(entry_point.balance_of(account), U256::ZERO);
    assert_eq!(entry_point.balance_of(BENEFICIARY), outcome.actual_cost);
}

#[test]
fn test_post_op_failure_rolls_back_execution_and_retries() {
    let sponsor = DepositSponsor::new().failing_post_op(1);
    let calls = sponsor.post_op_calls();
    let (mut entry_point, alice, account) = setup(sponsor);

    let op = sponsored(counter_op(account, U256::ZERO), SPONSOR, POST_OP_GAS_LIMIT);
    let op = sign(&entry_point, &alice, op);
    let op_hash = entry_point.user_op_hash(&op);
    let receipt = entry_point.process_batch(&[op], BENEFICIARY).unwrap();

    let outcome = &receipt.outcomes[0];
    assert!(!outcome.success);
    assert!(!outcome.prefund_forfeited());
    assert_eq!(outcome.faults, vec![SettlementFault::PostOpReverted { reason: sponsor_reason() }]);
    assert_eq!(outcome.actual_gas_used, PRE_OP_GAS + EXECUTION_GAS + 2 * POST_OP_GAS);
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    // the counter increment went with the first invocation; only the retry persists
    assert_eq!(entry_point.storage(COUNTER, Counter::SLOT), B256::ZERO);
    assert_eq!(entry_point.storage(SPONSOR, LAST_POST_OP_MODE_SLOT), B256::with_last_byte(3));
    assert!(receipt.events.contains(&EntryPointEvent::PostOpReverted {
        op_hash,
        sponsor: SPONSOR,
        mode: PostOpMode::Success,
        revert_reason: sponsor_reason(),
    }));
    // the nonce stays consumed
    assert_eq!(entry_point.get_nonce(account, Default::default()), U256::from(1));
}

#[test]
fn test_post_op_retry_keeps_the_request_and_switches_mode() {
    let sponsor = DepositSponsor::new().failing_post_op(1);
    let invocations = sponsor.invocations();
    let (mut entry_point, alice, account) = setup(sponsor);

    let op = sponsored(counter_op(account, U256::ZERO), SPONSOR, POST_OP_GAS_LIMIT);
    let op = sign(&entry_point, &alice, op);
    entry_point.process_batch(&[op], BENEFICIARY).unwrap();

    let first = PostOpInvocation {
        mode: PostOpMode::Success,
        context: Bytes::copy_from_slice(account.as_slice()),
        actual_cost: U256::from((PRE_OP_GAS + EXECUTION_GAS) * 2),
        gas_price: 2,
    };
    let retry = PostOpInvocation { mode: PostOpMode::PostOpFailed, ..first.clone() };
    assert_eq!(*invocations.lock().unwrap(), vec![first, retry]);
}

#[test]
fn test_post_op_failing_twice_forfeits_the_prefund() {
    let sponsor = DepositSponsor::new().failing_post_op(usize::MAX);
    let calls = sponsor.post_op_calls();
    let (mut entry_point, alice, account) = setup(sponsor);

    let op = sponsored(counter_op(account, U256::ZERO), SPONSOR, POST_OP_GAS_LIMIT);
    let op = sign(&entry_point, &alice, op);
    let op_hash = entry_point.user_op_hash(&op);
    let receipt = entry_point.process_batch(&[op], BENEFICIARY).unwrap();

    let outcome = &receipt.outcomes[0];
    assert!(!outcome.success);
    assert!(outcome.prefund_forfeited());
    assert_eq!(outcome.faults, vec![SettlementFault::PostOpFailed { reason: sponsor_reason() }]);
    assert_eq!(outcome.actual_cost, PREFUND);
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    assert_eq!(entry_point.storage(COUNTER, Counter::SLOT), B256::ZERO);
    assert_eq!(entry_point.storage(SPONSOR, LAST_POST_OP_MODE_SLOT), B256::ZERO);
    assert_eq!(entry_point.balance_of(SPONSOR), FUNDING - PREFUND);
    assert_eq!(entry_point.balance_of(BENEFICIARY), PREFUND);
    let reverted = receipt
        .events
        .iter()
        .filter(|event| matches!(event, EntryPointEvent::PostOpReverted { .. }))
        .count();
    assert_eq!(reverted, 2);
    assert!(receipt.events.iter().any(|event| matches!(
        event,
        EntryPointEvent::PrefundForfeited { op_hash: hash, payer, prefund, .. }
            if *hash == op_hash && *payer == SPONSOR && *prefund == PREFUND
    )));
}

#[test]
fn test_post_op_after_failed_execution() {
    let sponsor = DepositSponsor::new();
    let (mut entry_point, alice, account) = setup(sponsor);

    let op = user_op(account, U256::ZERO, execute_call(REVERTER, Bytes::new()));
    let op = sign(&entry_point, &alice, sponsored(op, SPONSOR, POST_OP_GAS_LIMIT));
    let receipt = entry_point.process_batch(&[op], BENEFICIARY).unwrap();

    let outcome = &receipt.outcomes[0];
    assert!(!outcome.success);
    assert!(!outcome.prefund_forfeited());
    assert_eq!(
        outcome.faults,
        vec![SettlementFault::ExecutionReverted { reason: Bytes::from_static(b"target reverted") }]
    );
    assert_eq!(entry_point.storage(SPONSOR, LAST_POST_OP_MODE_SLOT), B256::with_last_byte(2));
    assert_eq!(entry_point.storage(REVERTER, B256::ZERO), B256::ZERO);
}

#[test]
fn test_post_op_failure_after_failed_execution_keeps_revert_reason() {
    let sponsor = DepositSponsor::new().failing_post_op(usize::MAX);
    let (mut entry_point, alice, account) = setup(sponsor);

    let op = user_op(account, U256::ZERO, execute_call(REVERTER, Bytes::new()));
    let op = sign(&entry_point, &alice, sponsored(op, SPONSOR, POST_OP_GAS_LIMIT));
    let receipt = entry_point.process_batch(&[op], BENEFICIARY).unwrap();

    let outcome = &receipt.outcomes[0];
    assert!(outcome.prefund_forfeited());
    assert_eq!(outcome.actual_cost, PREFUND);
    assert_eq!(
        outcome.faults,
        vec![
            SettlementFault::ExecutionReverted { reason: Bytes::from_static(b"target reverted") },
            SettlementFault::PostOpFailed { reason: sponsor_reason() },
        ]
    );
    assert!(receipt
        .events
        .iter()
        .any(|event| matches!(event, EntryPointEvent::UserOperationRevertReason { .. })));
}

#[test]
fn test_post_op_bounded_by_its_gas_limit() {
    let sponsor = DepositSponsor::new();
    let calls = sponsor.post_op_calls();
    let (mut entry_point, alice, account) = setup(sponsor);

    // too little for the hook's storage write, twice over
    let op = sponsored(counter_op(account, U256::ZERO), SPONSOR, POST_OP_GAS / 2);
    let op = sign(&entry_point, &alice, op);
    let receipt = entry_point.process_batch(&[op], BENEFICIARY).unwrap();

    let outcome = &receipt.outcomes[0];
    assert!(outcome.prefund_forfeited());
    assert_eq!(outcome.faults, vec![SettlementFault::PostOpFailed { reason: Bytes::new() }]);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}
