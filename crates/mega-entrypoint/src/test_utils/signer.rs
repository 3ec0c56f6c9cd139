use alloy_primitives::{keccak256, Address, Bytes, B256};
use k256::ecdsa::{RecoveryId, Signature, SigningKey, VerifyingKey};

/// An ECDSA key pair used to sign operation hashes in tests.
#[derive(derive_more::Debug, Clone)]
pub struct TestSigner {
    #[debug(skip)]
    key: SigningKey,
    address: Address,
}

impl TestSigner {
    /// Creates a signer whose secret key is derived from `seed`.
    pub fn from_seed(seed: u64) -> Self {
        let secret = keccak256(seed.to_be_bytes());
        let key = SigningKey::from_slice(secret.as_slice()).unwrap();
        let address = public_key_to_address(key.verifying_key());
        Self { key, address }
    }

    /// The address of the signer.
    pub const fn address(&self) -> Address {
        self.address
    }

    /// Signs `hash`, returning `r || s || v` with `v` in `{27, 28}`.
    pub fn sign(&self, hash: B256) -> Bytes {
        let (signature, recovery_id) = self.key.sign_prehash_recoverable(hash.as_slice()).unwrap();
        let mut bytes = signature.to_bytes().to_vec();
        bytes.push(recovery_id.to_byte() + 27);
        bytes.into()
    }
}

/// Recovers the address that signed `hash`, if `signature` is a well-formed `r || s || v`.
pub fn recover_signer(hash: B256, signature: &[u8]) -> Option<Address> {
    let [rs @ .., v] = signature else { return None };
    if rs.len() != 64 {
        return None;
    }
    let recovery_id = RecoveryId::try_from(v.checked_sub(27)?).ok()?;
    let signature = Signature::from_slice(rs).ok()?;
    let key = VerifyingKey::recover_from_prehash(hash.as_slice(), &signature, recovery_id).ok()?;
    Some(public_key_to_address(&key))
}

/// The address of an uncompressed public key: the last 20 bytes of the hash of `x || y`.
pub fn public_key_to_address(key: &VerifyingKey) -> Address {
    let point = key.to_encoded_point(false);
    Address::from_slice(&keccak256(&point.as_bytes()[1..])[12..])
}
