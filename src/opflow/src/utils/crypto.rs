//! Cryptographic helpers for delegated-key signing.
//!
//! Purpose: sign the entry point's canonical operation hash as an EIP-191 personal message and
//! recover the signer again before anything leaves the process.

use alloy_primitives::{Address, B256};
use k256::ecdsa::{RecoveryId, Signature, SigningKey, VerifyingKey};
use sha3::{Digest, Keccak256};

use crate::account::constants::{SIGNATURE_LEN, SIGNATURE_V_OFFSET};

pub fn keccak256_bytes(bytes: &[u8]) -> B256 {
    let mut h = Keccak256::new();
    h.update(bytes);
    B256::from_slice(h.finalize().as_slice())
}

/// Ethereum address of a secp256k1 public key: last 20 bytes of keccak256(x || y).
pub fn address_of(key: &VerifyingKey) -> Address {
    let point = key.to_encoded_point(false);
    // Skip the 0x04 SEC1 tag byte.
    let hash = keccak256_bytes(&point.as_bytes()[1..]);
    Address::from_slice(&hash[12..])
}

/// `keccak256("\x19Ethereum Signed Message:\n32" || hash)`.
pub fn eip191_digest(hash: B256) -> B256 {
    let mut buf = Vec::with_capacity(28 + 32);
    buf.extend_from_slice(b"\x19Ethereum Signed Message:\n32");
    buf.extend_from_slice(hash.as_slice());
    keccak256_bytes(&buf)
}

/// Sign a 32-byte digest, returning `r || s || v` with v in {27, 28}.
pub fn sign_digest(
    key: &SigningKey,
    digest: B256,
) -> Result<[u8; SIGNATURE_LEN], k256::ecdsa::Error> {
    let (signature, recovery_id) = key.sign_prehash_recoverable(digest.as_slice())?;
    let mut out = [0u8; SIGNATURE_LEN];
    out[..64].copy_from_slice(&signature.to_bytes());
    out[64] = recovery_id.to_byte() + SIGNATURE_V_OFFSET;
    Ok(out)
}

/// Recover the signer address from a digest and an `r || s || v` signature.
///
/// Accepts v in {0, 1, 27, 28}.
pub fn recover_address(
    digest: B256,
    sig: &[u8; SIGNATURE_LEN],
) -> Result<Address, k256::ecdsa::Error> {
    let signature = Signature::from_slice(&sig[..64])?;
    let v = match sig[64] {
        v @ (0 | 1) => v,
        v @ (27 | 28) => v - SIGNATURE_V_OFFSET,
        _ => return Err(k256::ecdsa::Error::new()),
    };
    let recovery_id = RecoveryId::from_byte(v).ok_or_else(k256::ecdsa::Error::new)?;
    let key = VerifyingKey::recover_from_prehash(digest.as_slice(), &signature, recovery_id)?;
    Ok(address_of(&key))
}

#[cfg(test)]
mod tests {
    use super::*;

    // Well-known test vector: private key 0x...01 controls 0x7E5F...0D5Bdf.
    fn key_one() -> SigningKey {
        let mut bytes = [0u8; 32];
        bytes[31] = 1;
        SigningKey::from_slice(&bytes).unwrap()
    }

    #[test]
    fn test_address_of_known_key() {
        let expected: Address = "0x7E5F4552091A69125d5DfCb7b8C2659029395Bdf".parse().unwrap();
        assert_eq!(address_of(key_one().verifying_key()), expected);
    }

    #[test]
    fn test_sign_then_recover() {
        let key = key_one();
        let digest = eip191_digest(keccak256_bytes(b"operation"));
        let sig = sign_digest(&key, digest).unwrap();
        assert!(sig[64] == 27 || sig[64] == 28);
        assert_eq!(recover_address(digest, &sig).unwrap(), address_of(key.verifying_key()));

        let mut raw_v = sig;
        raw_v[64] -= 27;
        assert_eq!(recover_address(digest, &raw_v).unwrap(), address_of(key.verifying_key()));
    }

    #[test]
    fn test_rejects_unknown_v() {
        let digest = eip191_digest(B256::ZERO);
        let mut sig = sign_digest(&key_one(), digest).unwrap();
        sig[64] = 5;
        assert!(recover_address(digest, &sig).is_err());
    }

    #[test]
    fn test_eip191_digest_matches_alloy() {
        let hash = keccak256_bytes(b"hello");
        assert_eq!(eip191_digest(hash), alloy_primitives::eip191_hash_message(hash));
    }
}
