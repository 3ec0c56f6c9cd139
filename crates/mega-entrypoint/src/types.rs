//! The operation data model.

use alloy_primitives::{aliases::U192, keccak256, Address, Bytes, B256, U256};
use alloy_sol_types::SolValue;
use serde::{Deserialize, Serialize};

/// The payload used to materialize a sender account that does not exist yet.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AccountInit {
    /// The factory that deploys the account.
    pub factory: Address,
    /// The owner the account is deployed for.
    pub owner: Address,
    /// The deployment salt.
    pub salt: B256,
}

impl AccountInit {
    /// Encodes the payload as `factory || owner || salt`.
    pub fn encode(&self) -> Bytes {
        let mut buf = Vec::with_capacity(72);
        buf.extend_from_slice(self.factory.as_slice());
        buf.extend_from_slice(self.owner.as_slice());
        buf.extend_from_slice(self.salt.as_slice());
        buf.into()
    }
}

/// The sponsor section of an operation.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SponsorData {
    /// The sponsor paying for the operation.
    pub sponsor: Address,
    /// The gas the sponsor's post-execution hook may consume.
    pub post_op_gas_limit: u64,
    /// Sponsor-specific data, opaque to the engine.
    pub data: Bytes,
}

impl SponsorData {
    /// Encodes the section as `sponsor || uint128(post_op_gas_limit) || data`.
    pub fn encode(&self) -> Bytes {
        let mut buf = Vec::with_capacity(36 + self.data.len());
        buf.extend_from_slice(self.sponsor.as_slice());
        buf.extend_from_slice(&u128::from(self.post_op_gas_limit).to_be_bytes());
        buf.extend_from_slice(&self.data);
        buf.into()
    }
}

/// The three gas limits declared by an operation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GasLimits {
    /// Gas paid for the work done before validation (calldata, bundling overhead).
    pub pre_verification_gas: u64,
    /// Gas allotted to account creation and to each of the account and sponsor checks.
    pub verification_gas_limit: u64,
    /// Gas allotted to the execution payload.
    pub call_gas_limit: u64,
}

/// The two fee parameters declared by an operation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GasFees {
    /// The maximum total price per unit of gas.
    pub max_fee_per_gas: u128,
    /// The maximum price per unit of gas above the base price.
    pub max_priority_fee_per_gas: u128,
}

/// A self-describing request for a conditional state change, validated and executed by the
/// entry point rather than natively.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserOperation {
    /// The account the operation runs as.
    pub sender: Address,
    /// The replay-protection nonce: `key (192 bits) || sequence (64 bits)`.
    pub nonce: U256,
    /// Materializes the sender if it does not exist yet.
    pub init: Option<AccountInit>,
    /// The execution payload handed to the sender.
    pub call_data: Bytes,
    /// See [`GasLimits::call_gas_limit`].
    pub call_gas_limit: u64,
    /// See [`GasLimits::verification_gas_limit`].
    pub verification_gas_limit: u64,
    /// See [`GasLimits::pre_verification_gas`].
    pub pre_verification_gas: u64,
    /// See [`GasFees::max_fee_per_gas`].
    pub max_fee_per_gas: u128,
    /// See [`GasFees::max_priority_fee_per_gas`].
    pub max_priority_fee_per_gas: u128,
    /// The optional sponsor paying for the operation.
    pub sponsor: Option<SponsorData>,
    /// The authorization proof checked by the sender.
    pub signature: Bytes,
}

impl UserOperation {
    /// The nonce key of this operation.
    pub fn nonce_key(&self) -> U192 {
        split_nonce(self.nonce).0
    }

    /// The sequence number of this operation within its key.
    pub fn nonce_sequence(&self) -> u64 {
        split_nonce(self.nonce).1
    }

    /// The declared gas limits.
    pub const fn gas_limits(&self) -> GasLimits {
        GasLimits {
            pre_verification_gas: self.pre_verification_gas,
            verification_gas_limit: self.verification_gas_limit,
            call_gas_limit: self.call_gas_limit,
        }
    }

    /// The declared fee parameters.
    pub const fn gas_fees(&self) -> GasFees {
        GasFees {
            max_fee_per_gas: self.max_fee_per_gas,
            max_priority_fee_per_gas: self.max_priority_fee_per_gas,
        }
    }

    /// The sponsor address, if any.
    pub fn sponsor_address(&self) -> Option<Address> {
        self.sponsor.as_ref().map(|sponsor| sponsor.sponsor)
    }

    /// The gas the sponsor's post-execution hook may consume, zero without a sponsor.
    pub fn post_op_gas_limit(&self) -> u64 {
        self.sponsor.as_ref().map_or(0, |sponsor| sponsor.post_op_gas_limit)
    }

    /// The party whose deposit pays for the operation.
    pub fn payer(&self) -> Address {
        self.sponsor_address().unwrap_or(self.sender)
    }

    /// Hashes every field except the signature.
    pub fn packed_hash(&self) -> B256 {
        let init = self.init.as_ref().map(AccountInit::encode).unwrap_or_default();
        let sponsor = self.sponsor.as_ref().map(SponsorData::encode).unwrap_or_default();
        let account_gas_limits =
            pack_u128(u128::from(self.verification_gas_limit), u128::from(self.call_gas_limit));
        let gas_fees = pack_u128(self.max_priority_fee_per_gas, self.max_fee_per_gas);

        let encoded = (
            self.sender,
            self.nonce,
            keccak256(&init),
            keccak256(&self.call_data),
            account_gas_limits,
            U256::from(self.pre_verification_gas),
            gas_fees,
            keccak256(&sponsor),
        )
            .abi_encode();
        keccak256(encoded)
    }

    /// The operation hash: the packed hash bound to an entry point and a chain.
    pub fn hash(&self, entry_point: Address, chain_id: u64) -> B256 {
        keccak256((self.packed_hash(), entry_point, U256::from(chain_id)).abi_encode())
    }
}

/// Splits a nonce into its key and sequence number.
pub fn split_nonce(nonce: U256) -> (U192, u64) {
    let [sequence, k0, k1, k2] = *nonce.as_limbs();
    (U192::from_limbs([k0, k1, k2]), sequence)
}

/// Joins a nonce key and a sequence number into a nonce.
pub fn encode_nonce(key: U192, sequence: u64) -> U256 {
    let [k0, k1, k2] = *key.as_limbs();
    U256::from_limbs([sequence, k0, k1, k2])
}

/// The full nonce that follows once `sequence` numbers were used under `key`.
///
/// An exhausted key reads as the first nonce of the next key. The all-ones key saturates.
pub fn next_nonce(key: U192, sequence: u128) -> U256 {
    encode_nonce(key, 0).saturating_add(U256::from(sequence))
}

fn pack_u128(high: u128, low: u128) -> B256 {
    let mut word = B256::ZERO;
    word[..16].copy_from_slice(&high.to_be_bytes());
    word[16..].copy_from_slice(&low.to_be_bytes());
    word
}

/// The period in which an operation may be accepted. A `valid_until` of zero means the window
/// never closes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ValidityWindow {
    /// The earliest acceptance time.
    pub valid_after: u64,
    /// The latest acceptance time, zero for no expiry.
    pub valid_until: u64,
}

impl ValidityWindow {
    /// A window that is always open.
    pub const UNBOUNDED: Self = Self { valid_after: 0, valid_until: 0 };

    /// Creates a new window.
    pub const fn new(valid_after: u64, valid_until: u64) -> Self {
        Self { valid_after, valid_until }
    }

    /// The intersection of two windows: the later start and the earlier non-zero end.
    pub fn intersect(self, other: Self) -> Self {
        let valid_until = match (self.valid_until, other.valid_until) {
            (0, until) | (until, 0) => until,
            (a, b) => a.min(b),
        };
        Self { valid_after: self.valid_after.max(other.valid_after), valid_until }
    }
}

/// What an account or a sponsor returns from its validation check.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ValidationData {
    /// Whether the authorization proof was accepted.
    pub authorized: bool,
    /// The window in which the validating party accepts the operation.
    pub window: ValidityWindow,
}

impl ValidationData {
    /// Accepted, without time restriction.
    pub const fn authorized() -> Self {
        Self { authorized: true, window: ValidityWindow::UNBOUNDED }
    }

    /// Rejected.
    pub const fn rejected() -> Self {
        Self { authorized: false, window: ValidityWindow::UNBOUNDED }
    }

    /// Sets the validity window.
    pub const fn with_window(mut self, window: ValidityWindow) -> Self {
        self.window = window;
        self
    }
}

/// The environment a batch runs in.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockEnv {
    /// The block number.
    pub number: u64,
    /// The block timestamp, used to check validity windows and stake delays.
    pub timestamp: u64,
    /// The network base price per unit of gas.
    pub base_fee: u128,
}
