//! Deterministic attestors for tests and local runs.
//!
//! Keys are derived from a one-byte seed, so the same seed always yields
//! the same address.

use crate::domain::codec;
use crate::domain::entities::{Address, Attestor, Observation, Payload, VerifiedPayload};
use crate::domain::errors::{PayloadError, SignatureError};
use crate::domain::signature::{address_from_pubkey, invert_s, is_low_s, message_digest};
use k256::ecdsa::SigningKey;

/// Signing key standing in for a real reporter.
#[derive(Clone)]
pub struct TestAttestor {
    key: SigningKey,
    address: Address,
}

impl std::fmt::Debug for TestAttestor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestAttestor")
            .field("address", &self.address)
            .finish()
    }
}

impl TestAttestor {
    /// Attestor whose secret key is 32 copies of `seed`. Seed 0 is not a
    /// valid key.
    pub fn from_seed(seed: u8) -> Result<Self, SignatureError> {
        let key = SigningKey::from_slice(&[seed; 32]).map_err(|_| SignatureError::InvalidFormat)?;
        let address = address_from_pubkey(key.verifying_key());
        Ok(Self { key, address })
    }

    /// Address the contract stores this attestor's records under.
    pub fn address(&self) -> Attestor {
        self.address
    }

    /// 65-byte low-S `r || s || v` signature over `message`.
    pub fn sign(&self, message: &[u8]) -> Result<Vec<u8>, SignatureError> {
        let digest = message_digest(message);
        let (sig, recid) = self
            .key
            .sign_prehash_recoverable(&digest)
            .map_err(|_| SignatureError::InvalidFormat)?;

        let bytes = sig.to_bytes();
        let mut r = [0u8; 32];
        let mut s = [0u8; 32];
        r.copy_from_slice(&bytes[..32]);
        s.copy_from_slice(&bytes[32..]);

        let mut v = recid.to_byte();
        if !is_low_s(&s) {
            s = invert_s(&s);
            v ^= 1;
        }

        let mut out = Vec::with_capacity(65);
        out.extend_from_slice(&r);
        out.extend_from_slice(&s);
        out.push(v + 27);
        Ok(out)
    }

    /// Encode and sign `observations`.
    pub fn payload(&self, observations: &[Observation]) -> Result<Payload, PayloadError> {
        let message = codec::encode(observations)?;
        let signature = self.sign(&message)?;
        Ok(Payload::new(message, signature))
    }

    /// Signed single-price payload.
    pub fn price_payload(&self, key: &str, value: u64, timestamp: u64) -> Result<Payload, PayloadError> {
        self.payload(&[Observation::numeric(key, value, timestamp)])
    }

    /// Signed payload that already went through verification.
    pub fn verified(&self, observations: &[Observation]) -> Result<VerifiedPayload, PayloadError> {
        let payload = self.payload(observations)?;
        Ok(VerifiedPayload::new(self.address, observations.to_vec(), payload))
    }
}
