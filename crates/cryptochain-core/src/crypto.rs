//! Content hashing and secp256k1 signing.
//!
//! Every hash input is reduced to its canonical JSON text (object keys in
//! sorted order), the texts are sorted and joined with a single space, and the
//! result is fed to SHA-256. Sorting makes the digest independent of argument
//! order, so callers must never rely on position to distinguish inputs.

use crate::constants::HASH_SIZE;
use secp256k1::{ecdsa::Signature, Message, PublicKey, SecretKey, SECP256K1};
use serde::Serialize;
use sha2::{Digest, Sha256};

pub type Digest32 = [u8; HASH_SIZE];

/// Canonical text of a value: JSON through `serde_json::Value`, whose maps keep
/// keys sorted.
pub fn canonical<T: Serialize + ?Sized>(value: &T) -> String {
    serde_json::to_value(value)
        .map(|v| v.to_string())
        .unwrap_or_default()
}

/// Raw SHA-256 over the sorted, space-joined parts.
pub fn digest<I>(parts: I) -> Digest32
where
    I: IntoIterator<Item = String>,
{
    let mut parts: Vec<String> = parts.into_iter().collect();
    parts.sort();
    let mut out = [0u8; HASH_SIZE];
    out.copy_from_slice(&Sha256::digest(parts.join(" ").as_bytes()));
    out
}

/// Hex digest over already-canonicalized parts.
pub fn crypto_hash<I>(parts: I) -> String
where
    I: IntoIterator<Item = String>,
{
    hex::encode(digest(parts))
}

/// Hash any number of serializable values: `crypto_hash!(a, b, c)`.
#[macro_export]
macro_rules! crypto_hash {
    ($($input:expr),+ $(,)?) => {
        $crate::crypto::crypto_hash([$($crate::crypto::canonical(&$input)),+])
    };
}

/// Signs `hash(data)` and returns the hex-encoded compact signature.
pub fn sign<T: Serialize + ?Sized>(secret_key: &SecretKey, data: &T) -> String {
    let message = message_for(data);
    hex::encode(SECP256K1.sign_ecdsa(&message, secret_key).serialize_compact())
}

/// Checks `signature` over `hash(data)` against a hex-encoded public key.
/// Malformed keys or signatures verify as `false`.
pub fn verify_signature<T: Serialize + ?Sized>(public_key: &str, data: &T, signature: &str) -> bool {
    let Ok(key_bytes) = hex::decode(public_key) else {
        return false;
    };
    let Ok(public_key) = PublicKey::from_slice(&key_bytes) else {
        return false;
    };
    let Ok(sig_bytes) = hex::decode(signature) else {
        return false;
    };
    let Ok(signature) = Signature::from_compact(&sig_bytes) else {
        return false;
    };
    SECP256K1
        .verify_ecdsa(&message_for(data), &signature, &public_key)
        .is_ok()
}

fn message_for<T: Serialize + ?Sized>(data: &T) -> Message {
    Message::from_digest(digest([canonical(data)]))
}
