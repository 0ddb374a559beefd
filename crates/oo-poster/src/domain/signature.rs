//! # Attestor Signatures (secp256k1)
//!
//! Recovers the attestor address from a payload signature.
//!
//! The signed digest is the Ethereum prefixed-message hash of the raw
//! message bytes:
//!
//! ```text
//! digest = keccak256("\x19Ethereum Signed Message:\n32" || keccak256(message))
//! ```
//!
//! ## Security Notes
//!
//! - **Malleability (EIP-2)**: S must be strictly less than n/2
//! - **Scalar Range**: R and S must be in [1, n-1]
//! - Range checks run in constant time via `subtle`

use super::entities::{Address, Attestor, Hash, Payload};
use super::errors::SignatureError;
use k256::ecdsa::{RecoveryId, Signature, VerifyingKey};
use rayon::prelude::*;
use sha3::{Digest, Keccak256};
use std::collections::HashSet;
use subtle::{Choice, ConstantTimeEq};

/// secp256k1 curve order n
const SECP256K1_ORDER: [u8; 32] = [
    0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFE,
    0xBA, 0xAE, 0xDC, 0xE6, 0xAF, 0x48, 0xA0, 0x3B, 0xBF, 0xD2, 0x5E, 0x8C, 0xD0, 0x36, 0x41, 0x41,
];

/// n/2, the exclusive upper bound for S.
const SECP256K1_HALF_ORDER: [u8; 32] = [
    0x7F, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF,
    0x5D, 0x57, 0x6E, 0x73, 0x57, 0xA4, 0x50, 0x1D, 0xDF, 0xE9, 0x2F, 0x46, 0x68, 0x1B, 0x20, 0xA0,
];

const ETH_MESSAGE_PREFIX: &[u8] = b"\x19Ethereum Signed Message:\n32";

/// Signature length in bytes: r (32) || s (32) || v (1).
pub const SIGNATURE_LENGTH: usize = 65;

/// Split `r || s || v` signature.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EcdsaSignature {
    /// R component
    pub r: [u8; 32],
    /// S component
    pub s: [u8; 32],
    /// Recovery byte (0, 1, 27 or 28)
    pub v: u8,
}

impl EcdsaSignature {
    /// Parse a 65-byte signature.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, SignatureError> {
        if bytes.len() != SIGNATURE_LENGTH {
            return Err(SignatureError::InvalidLength(bytes.len()));
        }
        let mut r = [0u8; 32];
        let mut s = [0u8; 32];
        r.copy_from_slice(&bytes[..32]);
        s.copy_from_slice(&bytes[32..64]);
        Ok(Self { r, s, v: bytes[64] })
    }

    /// Serialize back to 65 bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(SIGNATURE_LENGTH);
        out.extend_from_slice(&self.r);
        out.extend_from_slice(&self.s);
        out.push(self.v);
        out
    }
}

/// Recovers attestor identities from payload signatures.
///
/// With a trusted set, a signature only verifies if it recovers one of the
/// trusted addresses. A tampered message recovers an unrelated address.
#[derive(Debug, Clone, Default)]
pub struct SignatureVerifier {
    trusted: Option<HashSet<Attestor>>,
}

impl SignatureVerifier {
    /// Verifier accepting any recoverable signer.
    pub fn new() -> Self {
        Self { trusted: None }
    }

    /// Verifier accepting only signers in `attestors`.
    pub fn trusting(attestors: impl IntoIterator<Item = Attestor>) -> Self {
        Self {
            trusted: Some(attestors.into_iter().collect()),
        }
    }

    /// Whether `attestor` would be accepted.
    pub fn is_trusted(&self, attestor: &Attestor) -> bool {
        self.trusted
            .as_ref()
            .map_or(true, |trusted| trusted.contains(attestor))
    }

    /// Recover the address that signed `message`.
    ///
    /// Fails if the signature is malformed, no key can be recovered, or the
    /// recovered signer is not trusted.
    pub fn verify(&self, message: &[u8], signature: &[u8]) -> Result<Attestor, SignatureError> {
        let sig = EcdsaSignature::from_bytes(signature)?;

        if !is_valid_scalar(&sig.r) || !is_valid_scalar(&sig.s) {
            return Err(SignatureError::InvalidFormat);
        }

        if !is_low_s(&sig.s) {
            return Err(SignatureError::MalleableSignature);
        }

        let signer = recover_address(&message_digest(message), &sig)?;
        if !self.is_trusted(&signer) {
            return Err(SignatureError::UnknownSigner);
        }
        Ok(signer)
    }

    /// Recover signers for many payloads in parallel, preserving order.
    pub fn verify_batch(&self, payloads: &[Payload]) -> Vec<Result<Attestor, SignatureError>> {
        payloads
            .par_iter()
            .map(|p| self.verify(&p.message, &p.signature))
            .collect()
    }
}

/// Keccak256 hash function.
pub fn keccak256(data: &[u8]) -> Hash {
    let mut hasher = Keccak256::new();
    hasher.update(data);
    let result = hasher.finalize();
    let mut hash = [0u8; 32];
    hash.copy_from_slice(&result);
    hash
}

/// Digest an attestor signs for `message`.
pub fn message_digest(message: &[u8]) -> Hash {
    let inner = keccak256(message);
    let mut prefixed = Vec::with_capacity(ETH_MESSAGE_PREFIX.len() + inner.len());
    prefixed.extend_from_slice(ETH_MESSAGE_PREFIX);
    prefixed.extend_from_slice(&inner);
    keccak256(&prefixed)
}

/// Recover the signer's address from a digest and signature.
pub fn recover_address(digest: &Hash, signature: &EcdsaSignature) -> Result<Address, SignatureError> {
    let recovery_id = parse_recovery_id(signature.v)?;

    let mut sig_bytes = [0u8; 64];
    sig_bytes[..32].copy_from_slice(&signature.r);
    sig_bytes[32..].copy_from_slice(&signature.s);
    let sig = Signature::from_slice(&sig_bytes).map_err(|_| SignatureError::InvalidFormat)?;

    let recovered_key = VerifyingKey::recover_from_prehash(digest, &sig, recovery_id)
        .map_err(|_| SignatureError::RecoveryFailed)?;

    Ok(address_from_pubkey(&recovered_key))
}

/// Derive an address from a public key: last 20 bytes of keccak256(x || y).
pub fn address_from_pubkey(public_key: &VerifyingKey) -> Address {
    let encoded = public_key.to_encoded_point(false);
    // Skip the 0x04 prefix
    let hash = keccak256(&encoded.as_bytes()[1..]);

    let mut address = [0u8; 20];
    address.copy_from_slice(&hash[12..]);
    Address(address)
}

/// Check that S is strictly below n/2, in constant time.
pub(crate) fn is_low_s(s: &[u8; 32]) -> bool {
    let mut less = Choice::from(0u8);
    let mut greater = Choice::from(0u8);

    for (s_byte, h_byte) in s.iter().zip(SECP256K1_HALF_ORDER.iter()) {
        let not_decided = !(less | greater);
        less |= not_decided & Choice::from((s_byte < h_byte) as u8);
        greater |= not_decided & Choice::from((s_byte > h_byte) as u8);
    }

    less.into()
}

/// Check that a scalar lies in [1, n-1], in constant time.
fn is_valid_scalar(scalar: &[u8; 32]) -> bool {
    let mut is_zero = Choice::from(1u8);
    for &byte in scalar {
        is_zero &= byte.ct_eq(&0u8);
    }

    let mut less = Choice::from(0u8);
    let mut greater = Choice::from(0u8);
    for (s_byte, n_byte) in scalar.iter().zip(SECP256K1_ORDER.iter()) {
        let not_decided = !(less | greater);
        less |= not_decided & Choice::from((s_byte < n_byte) as u8);
        greater |= not_decided & Choice::from((s_byte > n_byte) as u8);
    }

    (!is_zero & less).into()
}

/// Valid v values: 0, 1, 27, 28
fn parse_recovery_id(v: u8) -> Result<RecoveryId, SignatureError> {
    let id = match v {
        0 | 27 => 0,
        1 | 28 => 1,
        _ => return Err(SignatureError::InvalidRecoveryId(v)),
    };

    RecoveryId::try_from(id).map_err(|_| SignatureError::InvalidRecoveryId(v))
}

/// s' = n - s
#[cfg(any(test, feature = "test-utils"))]
pub(crate) fn invert_s(s: &[u8; 32]) -> [u8; 32] {
    let mut result = [0u8; 32];
    let mut borrow: i32 = 0;

    for i in (0..32).rev() {
        let diff = (SECP256K1_ORDER[i] as i32) - (s[i] as i32) - borrow;
        if diff < 0 {
            result[i] = (diff + 256) as u8;
            borrow = 1;
        } else {
            result[i] = diff as u8;
            borrow = 0;
        }
    }

    result
}
