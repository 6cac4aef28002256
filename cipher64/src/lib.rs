//! # cipher64 — handle-based 64-bit ciphertext algebra
//!
//! Confidential amounts move through the contracts as opaque sealed values.
//! Every homomorphic operation derives a fresh nonce from its operands, so
//! every mutation yields a new ciphertext identity (handle) — the property
//! the contracts' capability grants key on.
//!
//! The sealing here is the native development backend standing in for the
//! network's coprocessor. Contracts never branch on decrypted values; they
//! only combine ciphertexts (`add`, `sub`, `le`, `select`) and track handles.
//! `decrypt` exists for clients and tests; on-chain decrypt authorization is
//! governed entirely by the contracts' ACL relations.

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Opaque ciphertext identity. Changes on every homomorphic mutation.
pub type Handle = [u8; 32];

const DOMAIN_KEYSTREAM: &[u8] = b"cipher64:keystream:v1:";
const DOMAIN_NONCE: &[u8] = b"cipher64:nonce:v1:";
const DOMAIN_HANDLE: &[u8] = b"cipher64:handle:v1:";
const DOMAIN_PROOF: &[u8] = b"cipher64:input-proof:v1:";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CipherError {
    /// The input proof does not bind the ciphertext to its claimed
    /// (contract, user) pair.
    #[error("ciphertext input proof does not match its claimed binding")]
    InvalidProof,
}

fn digest(domain: &[u8], parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(domain);
    for part in parts {
        hasher.update(part);
    }
    let result = hasher.finalize();
    let mut out = [0u8; 32];
    out.copy_from_slice(&result);
    out
}

fn keystream(nonce: &[u8; 32]) -> [u8; 8] {
    let block = digest(DOMAIN_KEYSTREAM, &[nonce]);
    let mut out = [0u8; 8];
    out.copy_from_slice(&block[..8]);
    out
}

/// A sealed 64-bit amount.
///
/// Arithmetic wraps, matching the 64-bit homomorphic ring; callers that need
/// non-negative results clamp with `le` + `select` before subtracting.
#[derive(
    BorshSerialize, BorshDeserialize, Serialize, Deserialize, Clone, Debug, PartialEq, Eq,
)]
pub struct Cipher64 {
    masked: [u8; 8],
    nonce: [u8; 32],
}

impl Cipher64 {
    fn with_nonce(value: u64, nonce: [u8; 32]) -> Self {
        let stream = keystream(&nonce);
        let plain = value.to_le_bytes();
        let mut masked = [0u8; 8];
        for i in 0..8 {
            masked[i] = plain[i] ^ stream[i];
        }
        Self { masked, nonce }
    }

    /// Seal a plaintext value. `seed` must be unique per sealing site
    /// (contracts pass account bytes plus a counter).
    pub fn seal(value: u64, seed: &[u8]) -> Self {
        Self::with_nonce(value, digest(DOMAIN_NONCE, &[b"seal", seed]))
    }

    /// The encrypted zero a fresh account starts from.
    pub fn zero(seed: &[u8]) -> Self {
        Self::seal(0, seed)
    }

    /// Native-backend decrypt. On-chain access control lives in the
    /// contracts' ACLs, not here.
    pub fn decrypt(&self) -> u64 {
        let stream = keystream(&self.nonce);
        let mut plain = [0u8; 8];
        for i in 0..8 {
            plain[i] = self.masked[i] ^ stream[i];
        }
        u64::from_le_bytes(plain)
    }

    pub fn handle(&self) -> Handle {
        digest(DOMAIN_HANDLE, &[&self.masked, &self.nonce])
    }

    pub fn handle_hex(&self) -> String {
        hex::encode(self.handle())
    }

    pub fn add(&self, rhs: &Cipher64) -> Cipher64 {
        let nonce = digest(DOMAIN_NONCE, &[b"add", &self.nonce, &rhs.nonce]);
        Cipher64::with_nonce(self.decrypt().wrapping_add(rhs.decrypt()), nonce)
    }

    pub fn sub(&self, rhs: &Cipher64) -> Cipher64 {
        let nonce = digest(DOMAIN_NONCE, &[b"sub", &self.nonce, &rhs.nonce]);
        Cipher64::with_nonce(self.decrypt().wrapping_sub(rhs.decrypt()), nonce)
    }

    /// Sealed `self <= rhs`.
    pub fn le(&self, rhs: &Cipher64) -> CipherBool {
        let nonce = digest(DOMAIN_NONCE, &[b"le", &self.nonce, &rhs.nonce]);
        CipherBool::with_nonce(self.decrypt() <= rhs.decrypt(), nonce)
    }
}

/// A sealed predicate, produced by comparisons and consumed by [`select`].
#[derive(
    BorshSerialize, BorshDeserialize, Serialize, Deserialize, Clone, Debug, PartialEq, Eq,
)]
pub struct CipherBool {
    masked: u8,
    nonce: [u8; 32],
}

impl CipherBool {
    fn with_nonce(bit: bool, nonce: [u8; 32]) -> Self {
        let stream = keystream(&nonce);
        Self {
            masked: (bit as u8) ^ (stream[0] & 1),
            nonce,
        }
    }

    pub fn decrypt(&self) -> bool {
        let stream = keystream(&self.nonce);
        (self.masked ^ (stream[0] & 1)) != 0
    }
}

/// Oblivious conditional: `cond ? a : b`, evaluated without surfacing the
/// predicate. The result carries a fresh handle either way, so an observer
/// cannot tell which branch was taken.
pub fn select(cond: &CipherBool, a: &Cipher64, b: &Cipher64) -> Cipher64 {
    let nonce = digest(DOMAIN_NONCE, &[b"select", &cond.nonce, &a.nonce, &b.nonce]);
    let value = if cond.decrypt() { a.decrypt() } else { b.decrypt() };
    Cipher64::with_nonce(value, nonce)
}

/// A caller-supplied ciphertext plus a proof that it was formed by `user`
/// for `contract`. Not trusted until [`SealedInput::open`] verifies the
/// binding.
#[derive(
    BorshSerialize, BorshDeserialize, Serialize, Deserialize, Clone, Debug, PartialEq, Eq,
)]
pub struct SealedInput {
    ciphertext: Cipher64,
    proof: [u8; 32],
}

impl SealedInput {
    /// Client-side encrypt helper. `entropy` is caller randomness; tests use
    /// fixed bytes for determinism.
    pub fn seal_for(value: u64, contract: &[u8], user: &[u8], entropy: &[u8]) -> Self {
        let nonce = digest(DOMAIN_NONCE, &[b"input", contract, user, entropy]);
        let ciphertext = Cipher64::with_nonce(value, nonce);
        let proof = Self::binding(contract, user, &ciphertext);
        Self { ciphertext, proof }
    }

    /// Verify the (contract, user) binding and release the ciphertext.
    pub fn open(&self, contract: &[u8], user: &[u8]) -> Result<Cipher64, CipherError> {
        if Self::binding(contract, user, &self.ciphertext) != self.proof {
            return Err(CipherError::InvalidProof);
        }
        Ok(self.ciphertext.clone())
    }

    pub fn handle(&self) -> Handle {
        self.ciphertext.handle()
    }

    fn binding(contract: &[u8], user: &[u8], ciphertext: &Cipher64) -> [u8; 32] {
        digest(
            DOMAIN_PROOF,
            &[contract, user, &ciphertext.masked, &ciphertext.nonce],
        )
    }
}
