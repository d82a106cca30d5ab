//! The password-hashing collaborator (§1: "the password-hashing function
//! (a pure function)"). Grounded directly on the source's
//! `hash_password`/`generate_salt_hash`: `sha256(password + salt +
//! pepper)`, hex-encoded. The salt is random per user; the pepper is
//! process-wide configuration loaded at startup, never per-user.

use rand::RngCore;
use sha2::{Digest, Sha256};

pub const SALT_LEN: usize = 16;

pub fn generate_salt() -> Vec<u8> {
    let mut salt = vec![0u8; SALT_LEN];
    rand::rngs::OsRng.fill_bytes(&mut salt);
    salt
}

/// `sha256(password || salt || pepper)`, hex-encoded.
pub fn hash_password(password: &str, salt: &[u8], pepper: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(password.as_bytes());
    hasher.update(salt);
    hasher.update(pepper);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_inputs_hash_the_same() {
        let salt = b"fixed-salt";
        let pepper = b"fixed-pepper";
        assert_eq!(hash_password("hunter2", salt, pepper), hash_password("hunter2", salt, pepper));
    }

    #[test]
    fn different_passwords_hash_differently() {
        let salt = b"fixed-salt";
        let pepper = b"fixed-pepper";
        assert_ne!(hash_password("hunter2", salt, pepper), hash_password("hunter3", salt, pepper));
    }

    #[test]
    fn salt_generation_is_random() {
        assert_ne!(generate_salt(), generate_salt());
    }
}
