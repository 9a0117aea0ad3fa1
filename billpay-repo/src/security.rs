//! Hashing for API keys and transaction PINs.

use rand::Rng;
use rand::distr::Alphanumeric;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use billpay_types::AccountId;

/// Hashes an API key using SHA-256.
pub fn hash_api_key(key: &str) -> String {
    let hash = Sha256::digest(key.as_bytes());
    hex::encode(hash)
}

/// Verifies an API key against a stored hash using constant-time comparison.
pub fn verify_api_key(input: &str, stored_hash: &str) -> bool {
    let input_hash = hash_api_key(input);
    input_hash.as_bytes().ct_eq(stored_hash.as_bytes()).into()
}

/// Generates a fresh `sk_`-prefixed API key.
pub fn generate_api_key() -> String {
    let raw: String = rand::rng()
        .sample_iter(&Alphanumeric)
        .take(32)
        .map(char::from)
        .collect();
    format!("sk_{}", raw)
}

/// Hashes a PIN salted with the owning account id.
pub fn hash_pin(account_id: AccountId, pin: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(account_id.as_uuid().as_bytes());
    hasher.update(b":");
    hasher.update(pin.as_bytes());
    hex::encode(hasher.finalize())
}

/// Checks a PIN against the stored hash in constant time.
pub fn verify_pin(account_id: AccountId, pin: &str, stored_hash: &str) -> bool {
    let input_hash = hash_pin(account_id, pin);
    input_hash.as_bytes().ct_eq(stored_hash.as_bytes()).into()
}
