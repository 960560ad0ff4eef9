//! Credential Hashing Module
//!
//! Salted digest scheme for the local credential store. Demo-grade by
//! design: a single SHA-256 pass keeps raw passwords out of storage but is
//! not a substitute for an iterated KDF in a real deployment.

use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};

/// Default salt size in bytes (32 hex characters).
pub const DEFAULT_SALT_LEN: usize = 16;

/// Digest `"{salt_hex}:{secret}"` as lowercase hex.
///
/// Deterministic for a given input pair; infallible.
pub fn hash_secret(salt_hex: &str, secret: &str) -> String {
    let digest = Sha256::digest(format!("{salt_hex}:{secret}").as_bytes());
    hex::encode(digest)
}

/// Generate a random salt of `byte_len` bytes, hex-encoded, from the OS
/// cryptographic random source.
pub fn random_salt_hex(byte_len: usize) -> String {
    let mut bytes = vec![0u8; byte_len];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_deterministic() {
        let salt = random_salt_hex(DEFAULT_SALT_LEN);
        assert_eq!(hash_secret(&salt, "hunter2"), hash_secret(&salt, "hunter2"));
    }

    #[test]
    fn hash_is_lowercase_hex_sha256() {
        let digest = hash_secret("00ff", "pw");
        assert_eq!(digest.len(), 64);
        assert!(digest.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn different_salts_produce_different_hashes() {
        let salt_a = random_salt_hex(DEFAULT_SALT_LEN);
        let salt_b = random_salt_hex(DEFAULT_SALT_LEN);
        assert_ne!(salt_a, salt_b);
        assert_ne!(hash_secret(&salt_a, "pw"), hash_secret(&salt_b, "pw"));
    }

    #[test]
    fn different_secrets_produce_different_hashes() {
        let salt = random_salt_hex(DEFAULT_SALT_LEN);
        assert_ne!(hash_secret(&salt, "pw"), hash_secret(&salt, "pw2"));
    }

    #[test]
    fn salt_has_requested_length() {
        assert_eq!(random_salt_hex(DEFAULT_SALT_LEN).len(), DEFAULT_SALT_LEN * 2);
        assert_eq!(random_salt_hex(8).len(), 16);
    }

    #[test]
    fn salt_and_secret_are_separated() {
        // The ':' separator keeps ("ab", "c") and ("a", "bc") distinct.
        assert_ne!(hash_secret("ab", "c"), hash_secret("a", "bc"));
    }
}
