//! Tests for the all-or-nothing admission phase.

use std::sync::Arc;

use alloy_primitives::{address, aliases::U192, Address, U256};
use mega_entrypoint::{
    encode_nonce,
    test_utils::{
        account_init, counter_op, deploy_funded_account, sign, sponsored, test_entry_point,
        DepositSponsor, EcdsaAccount, TestSigner, BENEFICIARY, BLOCK_TIMESTAMP, FUNDING,
    },
    AdmissionError, EntryPoint, EntryPointConfig, EntryPointError, EntryPointEvent,
    ValidityWindow,
};

const SPONSOR: Address = address!("0x0000000000000000000000000000000000005050");

fn admission_error(
    result: Result<impl core::fmt::Debug, EntryPointError>,
) -> (usize, AdmissionError) {
    match result.unwrap_err() {
        EntryPointError::Admission { index, error } => (index, error),
        err => panic!("expected an admission error, got {err:?}"),
    }
}

fn snapshot(entry_point: &EntryPoint, accounts: &[Address]) -> Vec<(U256, U256)> {
    accounts
        .iter()
        .map(|&account| {
            (entry_point.balance_of(account), entry_point.get_nonce(account, U192::ZERO))
        })
        .collect()
}

#[test]
fn test_insufficient_prefund_aborts_without_changes() {
    let mut entry_point = test_entry_point(EntryPointConfig::default());
    let (alice, bob) = (TestSigner::from_seed(1), TestSigner::from_seed(2));
    let rich = deploy_funded_account(&mut entry_point, &alice, FUNDING);
    let poor = deploy_funded_account(&mut entry_point, &bob, U256::from(1_000));
    let before = snapshot(&entry_point, &[rich, poor, BENEFICIARY]);

    let ops = vec![
        sign(&entry_point, &alice, counter_op(rich, U256::ZERO)),
        sign(&entry_point, &bob, counter_op(poor, U256::ZERO)),
    ];
    let (index, error) = admission_error(entry_point.process_batch(&ops, BENEFICIARY));

    assert_eq!(index, 1);
    assert_eq!(
        error,
        AdmissionError::InsufficientPrefund {
            required: U256::from(221_000u64 * 10),
            available: U256::from(1_000),
        }
    );
    assert_eq!(snapshot(&entry_point, &[rich, poor, BENEFICIARY]), before);
}

#[test]
fn test_derivation_mismatch() {
    let mut entry_point = test_entry_point(EntryPointConfig::default());
    let alice = TestSigner::from_seed(1);
    let declared = address!("0x00000000000000000000000000000000000a11ce");
    entry_point.deposit_to(declared, FUNDING).unwrap();

    let mut op = counter_op(declared, U256::ZERO);
    op.init = Some(account_init(&alice, 0));
    let derived = entry_point.get_sender_address(&account_init(&alice, 0)).unwrap();
    let (_, error) = admission_error(entry_point.process_batch(&[op], BENEFICIARY));

    assert_eq!(error, AdmissionError::AccountDerivationMismatch { declared, derived });
    assert!(entry_point.state().code(derived).is_none());
}

#[test]
fn test_account_materialized_from_init_payload() {
    let mut entry_point = test_entry_point(EntryPointConfig::default());
    let alice = TestSigner::from_seed(1);
    let init = account_init(&alice, 7);
    let sender = entry_point.get_sender_address(&init).unwrap();
    entry_point.deposit_to(sender, FUNDING).unwrap();

    let mut op = counter_op(sender, U256::ZERO);
    op.init = Some(init);
    let op = sign(&entry_point, &alice, op);
    let op_hash = entry_point.user_op_hash(&op);
    let receipt = entry_point.process_batch(&[op.clone()], BENEFICIARY).unwrap();

    assert!(receipt.outcomes[0].success);
    assert!(entry_point.state().code(sender).and_then(|code| code.as_account()).is_some());
    assert_eq!(
        receipt.events[0],
        EntryPointEvent::AccountDeployed { op_hash, sender, factory: init.factory, sponsor: None }
    );

    // an existing sender must not carry an initialization payload
    let mut again = op;
    again.nonce = U256::from(1);
    let again = sign(&entry_point, &alice, again);
    let (_, error) = admission_error(entry_point.process_batch(&[again], BENEFICIARY));
    assert_eq!(error, AdmissionError::SenderAlreadyConstructed(sender));
}

#[test]
fn test_missing_account_and_unknown_factory() {
    let mut entry_point = test_entry_point(EntryPointConfig::default());
    let alice = TestSigner::from_seed(1);
    let nobody = address!("0x0000000000000000000000000000000000000bad");

    let op = sign(&entry_point, &alice, counter_op(nobody, U256::ZERO));
    let (_, error) = admission_error(entry_point.process_batch(&[op], BENEFICIARY));
    assert_eq!(error, AdmissionError::AccountNotDeployed(nobody));

    let mut init = account_init(&alice, 0);
    init.factory = nobody;
    let mut op = counter_op(nobody, U256::ZERO);
    op.init = Some(init);
    let (_, error) = admission_error(entry_point.process_batch(&[op], BENEFICIARY));
    assert_eq!(error, AdmissionError::UnknownFactory(nobody));
}

#[test]
fn test_failed_admission_rolls_back_materialized_accounts_and_nonces() {
    let mut entry_point = test_entry_point(EntryPointConfig::default());
    let (alice, bob) = (TestSigner::from_seed(1), TestSigner::from_seed(2));
    let init = account_init(&alice, 0);
    let new_account = entry_point.get_sender_address(&init).unwrap();
    entry_point.deposit_to(new_account, FUNDING).unwrap();
    let existing = deploy_funded_account(&mut entry_point, &bob, FUNDING);
    let before = snapshot(&entry_point, &[new_account, existing, BENEFICIARY]);

    let mut first = counter_op(new_account, U256::ZERO);
    first.init = Some(init);
    let ops = vec![
        sign(&entry_point, &alice, first),
        sign(&entry_point, &bob, counter_op(existing, U256::ZERO)),
        // replays the nonce just consumed
        sign(&entry_point, &bob, counter_op(existing, U256::ZERO)),
    ];
    let (index, error) = admission_error(entry_point.process_batch(&ops, BENEFICIARY));

    assert_eq!(index, 2);
    assert_eq!(error, AdmissionError::NonceMismatch { key: U192::ZERO, expected: 1, provided: 0 });
    assert!(entry_point.state().code(new_account).is_none());
    assert_eq!(snapshot(&entry_point, &[new_account, existing, BENEFICIARY]), before);
}

#[test]
fn test_nonce_keys_are_independent_streams() {
    let mut entry_point = test_entry_point(EntryPointConfig::default());
    let alice = TestSigner::from_seed(1);
    let account = deploy_funded_account(&mut entry_point, &alice, FUNDING);
    let key = U192::from(5u64);

    let ops = vec![
        sign(&entry_point, &alice, counter_op(account, encode_nonce(key, 0))),
        sign(&entry_point, &alice, counter_op(account, encode_nonce(U192::ZERO, 0))),
        sign(&entry_point, &alice, counter_op(account, encode_nonce(key, 1))),
    ];
    let receipt = entry_point.process_batch(&ops, BENEFICIARY).unwrap();
    assert_eq!(receipt.successful(), 3);
    assert_eq!(entry_point.get_nonce(account, key), encode_nonce(key, 2));
    assert_eq!(entry_point.get_nonce(account, U192::ZERO), encode_nonce(U192::ZERO, 1));

    // a gap is refused
    let gap = sign(&entry_point, &alice, counter_op(account, encode_nonce(key, 3)));
    let (_, error) = admission_error(entry_point.process_batch(&[gap], BENEFICIARY));
    assert_eq!(error, AdmissionError::NonceMismatch { key, expected: 2, provided: 3 });
}

#[test]
fn test_wrong_signer_is_rejected() {
    let mut entry_point = test_entry_point(EntryPointConfig::default());
    let (alice, mallory) = (TestSigner::from_seed(1), TestSigner::from_seed(66));
    let account = deploy_funded_account(&mut entry_point, &alice, FUNDING);

    let op = sign(&entry_point, &mallory, counter_op(account, U256::ZERO));
    let (_, error) = admission_error(entry_point.process_batch(&[op], BENEFICIARY));
    assert!(matches!(error, AdmissionError::AuthorizationRejected { .. }));
    assert_eq!(entry_point.balance_of(account), FUNDING);
}

#[test]
fn test_signature_is_bound_to_chain_id() {
    let mut entry_point = test_entry_point(EntryPointConfig::default());
    let alice = TestSigner::from_seed(1);
    let account = deploy_funded_account(&mut entry_point, &alice, FUNDING);

    let other_chain = EntryPoint::new(EntryPointConfig::default().with_chain_id(1));
    let op = sign(&other_chain, &alice, counter_op(account, U256::ZERO));
    let (_, error) = admission_error(entry_point.process_batch(&[op], BENEFICIARY));
    assert!(matches!(error, AdmissionError::AuthorizationRejected { .. }));
}

#[test]
fn test_verification_gas_exceeded() {
    let mut entry_point = test_entry_point(EntryPointConfig::default());
    let alice = TestSigner::from_seed(1);
    let account = deploy_funded_account(&mut entry_point, &alice, FUNDING);

    let mut op = counter_op(account, U256::ZERO);
    op.verification_gas_limit = 1_000;
    let op = sign(&entry_point, &alice, op);
    let (_, error) = admission_error(entry_point.process_batch(&[op], BENEFICIARY));
    assert_eq!(error, AdmissionError::VerificationGasExceeded { party: account, limit: 1_000 });
}

#[test]
fn test_gas_values_overflow() {
    let mut entry_point = test_entry_point(EntryPointConfig::default());
    let alice = TestSigner::from_seed(1);
    let account = deploy_funded_account(&mut entry_point, &alice, FUNDING);

    let mut op = counter_op(account, U256::ZERO);
    op.call_gas_limit = u64::MAX;
    let op = sign(&entry_point, &alice, op);
    let (_, error) = admission_error(entry_point.process_batch(&[op], BENEFICIARY));
    assert_eq!(error, AdmissionError::GasValuesOverflow);
}

#[test]
fn test_account_window_not_yet_valid_and_expired() {
    let mut entry_point = test_entry_point(EntryPointConfig::default());
    let alice = TestSigner::from_seed(1);
    let early = address!("0x000000000000000000000000000000000000ea41");
    let late = address!("0x0000000000000000000000000000000000001a7e");
    for (address, window) in [
        (early, ValidityWindow::new(BLOCK_TIMESTAMP + 1, 0)),
        (late, ValidityWindow::new(0, BLOCK_TIMESTAMP - 1)),
    ] {
        let account = EcdsaAccount::new(alice.address()).with_window(window);
        entry_point.deploy_account(address, Arc::new(account));
        entry_point.deposit_to(address, FUNDING).unwrap();
    }

    let op = sign(&entry_point, &alice, counter_op(early, U256::ZERO));
    let (_, error) = admission_error(entry_point.process_batch(&[op], BENEFICIARY));
    assert_eq!(
        error,
        AdmissionError::WindowNotYetValid { valid_after: BLOCK_TIMESTAMP + 1, now: BLOCK_TIMESTAMP }
    );

    let op = sign(&entry_point, &alice, counter_op(late, U256::ZERO));
    let (_, error) = admission_error(entry_point.process_batch(&[op], BENEFICIARY));
    assert_eq!(
        error,
        AdmissionError::WindowExpired { valid_until: BLOCK_TIMESTAMP - 1, now: BLOCK_TIMESTAMP }
    );
}

#[test]
fn test_windows_are_intersected_with_the_sponsor() {
    let mut entry_point = test_entry_point(EntryPointConfig::default());
    let alice = TestSigner::from_seed(1);
    let account = address!("0x000000000000000000000000000000000000a11c");
    let window = ValidityWindow::new(0, BLOCK_TIMESTAMP + 10);
    let owned = EcdsaAccount::new(alice.address()).with_window(window);
    entry_point.deploy_account(account, Arc::new(owned));
    let sponsor = DepositSponsor::new().with_window(ValidityWindow::new(BLOCK_TIMESTAMP + 5, 0));
    entry_point.deploy_sponsor(SPONSOR, Arc::new(sponsor));
    entry_point.deposit_to(SPONSOR, FUNDING).unwrap();

    let op = sponsored(counter_op(account, U256::ZERO), SPONSOR, 50_000);
    let op = sign(&entry_point, &alice, op);
    let (_, error) = admission_error(entry_point.process_batch(&[op.clone()], BENEFICIARY));
    assert_eq!(
        error,
        AdmissionError::WindowNotYetValid { valid_after: BLOCK_TIMESTAMP + 5, now: BLOCK_TIMESTAMP }
    );

    let mut block = *entry_point.block();
    block.timestamp = BLOCK_TIMESTAMP + 7;
    entry_point.set_block(block);
    assert!(entry_point.process_batch(&[op], BENEFICIARY).is_ok());
}

#[test]
fn test_sponsor_without_deposit_is_rejected_even_if_sender_could_pay() {
    let mut entry_point = test_entry_point(EntryPointConfig::default());
    let alice = TestSigner::from_seed(1);
    let account = deploy_funded_account(&mut entry_point, &alice, FUNDING);
    entry_point.deploy_sponsor(SPONSOR, Arc::new(DepositSponsor::new()));
    entry_point.deposit_to(SPONSOR, U256::from(10)).unwrap();

    let op = sponsored(counter_op(account, U256::ZERO), SPONSOR, 50_000);
    let op = sign(&entry_point, &alice, op);
    let (_, error) = admission_error(entry_point.process_batch(&[op], BENEFICIARY));
    assert!(matches!(
        error,
        AdmissionError::SponsorshipRejected { sponsor, .. } if sponsor == SPONSOR
    ));
    assert_eq!(entry_point.balance_of(SPONSOR), U256::from(10));
    assert_eq!(entry_point.balance_of(account), FUNDING);
}

#[test]
fn test_denying_sponsor_and_missing_sponsor_code() {
    let mut entry_point = test_entry_point(EntryPointConfig::default());
    let alice = TestSigner::from_seed(1);
    let account = deploy_funded_account(&mut entry_point, &alice, U256::ZERO);
    entry_point.deploy_sponsor(SPONSOR, Arc::new(DepositSponsor::new().denying()));
    entry_point.deposit_to(SPONSOR, FUNDING).unwrap();

    let op = sign(&entry_point, &alice, sponsored(counter_op(account, U256::ZERO), SPONSOR, 0));
    let (_, error) = admission_error(entry_point.process_batch(&[op], BENEFICIARY));
    assert_eq!(
        error,
        AdmissionError::SponsorshipRejected { sponsor: SPONSOR, reason: "sponsor: denied".into() }
    );

    let ghost = address!("0x0000000000000000000000000000000000006057");
    entry_point.deposit_to(ghost, FUNDING).unwrap();
    let op = sign(&entry_point, &alice, sponsored(counter_op(account, U256::ZERO), ghost, 0));
    let (_, error) = admission_error(entry_point.process_batch(&[op], BENEFICIARY));
    assert_eq!(
        error,
        AdmissionError::SponsorshipRejected { sponsor: ghost, reason: "no sponsor code".into() }
    );
    assert_eq!(entry_point.balance_of(ghost), FUNDING);
}

#[test]
fn test_sponsor_running_out_of_verification_gas() {
    let mut entry_point = test_entry_point(EntryPointConfig::default());
    let alice = TestSigner::from_seed(1);
    let account = deploy_funded_account(&mut entry_point, &alice, U256::ZERO);
    let greedy = DepositSponsor::new().with_validation_gas(99_000);
    entry_point.deploy_sponsor(SPONSOR, Arc::new(greedy));
    entry_point.deposit_to(SPONSOR, FUNDING).unwrap();

    // the account check already spent 3 000 of the 100 000 verification gas
    let op = sign(&entry_point, &alice, sponsored(counter_op(account, U256::ZERO), SPONSOR, 0));
    let (_, error) = admission_error(entry_point.process_batch(&[op], BENEFICIARY));
    assert_eq!(error, AdmissionError::VerificationGasExceeded { party: SPONSOR, limit: 100_000 });
}
