//! Deterministic hashing and signing primitives shared by every protocol module.
//!
//! `H`, `HArr` and `HInt` are pure functions of the caller's canonical textual
//! serialization: any verifier reconstructing derived indices from the same input must
//! obtain identical results. RSA-PSS signing is kept separate (SHA-256 rather than
//! SHA3-256) to mirror the original's split between `crypto/rsa`+`crypto/sha256` for
//! identity and `golang.org/x/crypto/sha3` for deterministic derivation.

use std::fmt::Display;

use rand::Rng;
use rsa::pss::{Signature, SigningKey, VerifyingKey};
use rsa::sha2::Sha256;
use rsa::signature::{RandomizedSigner, SignatureEncoding, Verifier};
use rsa::{RsaPrivateKey, RsaPublicKey};
use sha3::{Digest, Sha3_256};

use crate::error::LorError;

/// 32-byte SHA3-256 digest of the canonical textual form of `x`.
pub fn h<T: Display>(x: &T) -> [u8; 32] {
    let mut hasher = Sha3_256::new();
    hasher.update(x.to_string().as_bytes());
    hasher.finalize().into()
}

/// `H` hex-encoded, used wherever a string id is needed (map keys, wire ids).
pub fn h_str<T: Display>(x: &T) -> String {
    hex::encode(h(x))
}

/// Length-8 XOR-folded word stream derived from `H(x)`, used as an expandable source of
/// non-negative integers for deterministic index derivation.
pub fn h_arr<T: Display>(x: &T) -> [u32; 8] {
    let digest = h(x);
    let mut result = [0u32; 8];
    for (index, byte) in digest.iter().enumerate() {
        result[index / 4] ^= (*byte as u32) << ((index % 4) * 8);
    }
    result
}

/// XOR of the eight words of `HArr(x)`.
pub fn h_int<T: Display>(x: &T) -> u32 {
    h_arr(x).iter().fold(0u32, |acc, word| acc ^ word)
}

/// A lazily-refilling queue of hash-derived words, used by the pop-and-fill selection
/// procedures in `cooperation.rs` and `fractal.rs`, and by `random_indexes` below.
/// Mirrors the original's `rnd []int` local variable: consume one word at a time; only
/// when the queue runs dry is it refilled, from `HArr` of the caller-supplied seed (for
/// the ring/committee selections, the current, possibly still-unfilled, selection state).
#[derive(Default)]
pub struct WordQueue {
    words: std::collections::VecDeque<u32>,
}

impl WordQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pops the next word, refilling from `HArr(seed)` first if empty.
    pub fn next<T: Display>(&mut self, seed: &T) -> u32 {
        if self.words.is_empty() {
            self.words.extend(h_arr(seed));
        }
        self.words.pop_front().expect("just refilled")
    }
}

/// Draws a length-`k` sequence of indices in `[0, n)`. The first index is drawn from a
/// non-deterministic source; each subsequent index comes off the same `HArr`-derived word
/// queue, taken modulo the shrinking pool size `(n - i)` at that position, and the queue
/// is only re-seeded (from the result built so far) once it runs dry.
///
/// Mirrors the original's `tools.RandomIndexes`: it fills its word array once from the
/// result accumulated so far, drains all eight words across successive iterations, and
/// only recomputes the hash once that array is exhausted. It yields indices into a
/// conceptually shrinking pool, consumed by the Byzantine branches of fractal- and
/// committee-selection in `fractal.rs`.
pub fn random_indexes(n: usize, k: usize) -> Vec<usize> {
    let mut result = Vec::with_capacity(k);
    result.push(rand::thread_rng().gen_range(0..n));
    let mut queue = WordQueue::new();
    for i in 1..k {
        let word = queue.next(&format_ints(&result)) as usize;
        result.push(word % (n - i));
    }
    result
}

/// Mirrors Go's `fmt.Sprint([]int{...})`, which renders `[1 2 3]` (space-separated, no
/// commas). Rust's `{:?}` on a slice would emit commas and silently desync the hash stream
/// from the original.
fn format_ints(values: &[usize]) -> String {
    let mut out = String::from("[");
    for (i, value) in values.iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        out.push_str(&value.to_string());
    }
    out.push(']');
    out
}

/// Textual join used wherever the original hashes a `[]string` (coin ids, CR ids, trader
/// ids). Go's `fmt.Sprint` on a slice renders `[a b c]`; this reproduces that shape so a
/// verifier hashing the same ids in the same order gets the same digest.
pub fn join_ids<S: AsRef<str>>(ids: &[S]) -> String {
    let mut out = String::from("[");
    for (i, id) in ids.iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        out.push_str(id.as_ref());
    }
    out.push(']');
    out
}

/// Generates a fresh RSA keypair of `bits` size. CPU-bound; callers on an async runtime
/// should run this via `tokio::task::spawn_blocking`.
pub fn generate_private_key(bits: usize) -> Result<RsaPrivateKey, LorError> {
    let mut rng = rand::rngs::OsRng;
    RsaPrivateKey::new(&mut rng, bits).map_err(|_| LorError::InvalidSignature)
}

/// Signs `payload` with `private_key` using RSA-PSS over SHA-256, returning the
/// hex-encoded signature. PSS padding draws a fresh random salt on every call, so
/// re-minting a coin of the same `(owner, type)` never collides on id; the scheme
/// carries the per-operation randomness spec.md §4.2 requires.
pub fn sign(payload: &str, private_key: &RsaPrivateKey) -> Result<String, LorError> {
    let signing_key = SigningKey::<Sha256>::new(private_key.clone());
    let mut rng = rand::rngs::OsRng;
    let signature = signing_key.sign_with_rng(&mut rng, payload.as_bytes());
    Ok(hex::encode(signature.to_bytes()))
}

/// Verifies `signature` (hex-encoded) over `payload` under `public_key`.
pub fn verify(payload: &str, signature: &str, public_key: &RsaPublicKey) -> Result<(), LorError> {
    let bytes = hex::decode(signature).map_err(|_| LorError::InvalidSignature)?;
    let sig = Signature::try_from(bytes.as_slice()).map_err(|_| LorError::InvalidSignature)?;
    let verifying_key = VerifyingKey::<Sha256>::new(public_key.clone());
    verifying_key
        .verify(payload.as_bytes(), &sig)
        .map_err(|_| LorError::InvalidSignature)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn h_is_deterministic() {
        let a = h(&"trader-1-coin-0".to_string());
        let b = h(&"trader-1-coin-0".to_string());
        assert_eq!(a, b);
    }

    #[test]
    fn h_differs_on_different_input() {
        let a = h_str(&"alpha".to_string());
        let b = h_str(&"beta".to_string());
        assert_ne!(a, b);
    }

    #[test]
    fn h_arr_has_eight_words() {
        let arr = h_arr(&"whatever".to_string());
        assert_eq!(arr.len(), 8);
    }

    #[test]
    fn h_int_is_xor_of_h_arr() {
        let x = "folding".to_string();
        let arr = h_arr(&x);
        let expected = arr.iter().fold(0u32, |acc, w| acc ^ w);
        assert_eq!(h_int(&x), expected);
    }

    #[test]
    fn random_indexes_has_k_entries_in_range() {
        let result = random_indexes(10, 5);
        assert_eq!(result.len(), 5);
        assert!(result.iter().all(|&i| i < 10));
    }

    #[test]
    fn sign_and_verify_round_trip() {
        let key = generate_private_key(1024).expect("keygen");
        let public = key.to_public_key();
        let signature = sign("trader-0", &key).expect("sign");
        assert!(verify("trader-0", &signature, &public).is_ok());
    }

    #[test]
    fn verify_rejects_tampered_payload() {
        let key = generate_private_key(1024).expect("keygen");
        let public = key.to_public_key();
        let signature = sign("trader-0", &key).expect("sign");
        assert!(verify("trader-1", &signature, &public).is_err());
    }

    #[test]
    fn resigning_same_payload_yields_distinct_signatures() {
        let key = generate_private_key(1024).expect("keygen");
        let a = sign("trader-0-0", &key).expect("sign");
        let b = sign("trader-0-0", &key).expect("sign");
        assert_ne!(a, b, "PSS-equivalent signing must carry per-operation randomness");
    }

    #[test]
    fn join_ids_matches_go_fmt_sprint_shape() {
        let ids = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        assert_eq!(join_ids(&ids), "[a b c]");
    }

    #[test]
    fn format_ints_matches_go_fmt_sprint_shape() {
        assert_eq!(format_ints(&[1, 2, 3]), "[1 2 3]");
        assert_eq!(format_ints(&[]), "[]");
    }
}
