//! Credential derivation: (username, password) → token hash + key pair

use argon2::{Algorithm, Argon2, Params, Version};
use hkdf::Hkdf;
use secrecy::{ExposeSecret, SecretString};
use sha2::{Digest, Sha256};
use zeroize::Zeroize;

use crate::{hex, KEY_SIZE};

/// A 256-bit secret key derived from a password or recovered from a mask.
///
/// Zeroized on drop to prevent secrets lingering in memory.
#[derive(Clone)]
pub struct SecretKey {
    bytes: [u8; KEY_SIZE],
}

impl SecretKey {
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }
}

impl PartialEq for SecretKey {
    fn eq(&self, other: &Self) -> bool {
        self.bytes == other.bytes
    }
}

impl Eq for SecretKey {}

impl Drop for SecretKey {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// Argon2id parameters for credential derivation.
///
/// Must stay fixed per store: the token hash that identifies an account is a
/// function of these costs.
#[derive(Debug, Clone)]
pub struct KdfParams {
    /// Memory cost in KiB (default: 65536 = 64 MiB)
    pub mem_cost_kib: u32,
    /// Time cost / iterations (default: 3)
    pub time_cost: u32,
    /// Parallelism (default: 4)
    pub parallelism: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            mem_cost_kib: 65536,
            time_cost: 3,
            parallelism: 4,
        }
    }
}

/// The three independent secrets derived from one (username, password) pair.
#[derive(Debug, Clone)]
pub struct DerivedCredentials {
    /// Public account identifier, safe to store (hex)
    pub token_hash: String,
    /// Encrypts the bulk store; never stored
    pub public_key: SecretKey,
    /// Encrypts the restricted sub-partition; never stored
    pub private_key: SecretKey,
}

/// Derive the credential triple from a username and password.
///
/// Deterministic: the same inputs always yield the same outputs, and the
/// three outputs are pairwise independent (separate HKDF domains). The salt
/// is the first 16 bytes of SHA-256(username), so no per-account salt needs
/// to be stored before the account is known.
pub fn derive_credentials(
    username: &str,
    password: &SecretString,
    params: &KdfParams,
) -> anyhow::Result<DerivedCredentials> {
    let salt = username_salt(username);

    let argon2_params = Params::new(
        params.mem_cost_kib,
        params.time_cost,
        params.parallelism,
        Some(KEY_SIZE),
    )
    .map_err(|e| anyhow::anyhow!("invalid Argon2id params: {e}"))?;

    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, argon2_params);

    let mut base = [0u8; KEY_SIZE];
    argon2
        .hash_password_into(password.expose_secret().as_bytes(), &salt, &mut base)
        .map_err(|e| anyhow::anyhow!("Argon2id KDF failed: {e}"))?;

    let token_hash_bytes = hkdf_derive(&base, b"satchel-token-hash")?;
    let public_key = hkdf_derive(&base, b"satchel-public-key")?;
    let private_key = hkdf_derive(&base, b"satchel-private-key")?;
    base.zeroize();

    Ok(DerivedCredentials {
        token_hash: hex::encode(&token_hash_bytes),
        public_key: SecretKey::from_bytes(public_key),
        private_key: SecretKey::from_bytes(private_key),
    })
}

/// Deterministic per-user salt: first 16 bytes of SHA-256(username).
fn username_salt(username: &str) -> [u8; 16] {
    let digest = Sha256::digest(username.as_bytes());
    let mut salt = [0u8; 16];
    salt.copy_from_slice(&digest[..16]);
    salt
}

/// HKDF-SHA256 key derivation with a domain-specific info string.
fn hkdf_derive(ikm: &[u8; KEY_SIZE], info: &[u8]) -> anyhow::Result<[u8; KEY_SIZE]> {
    let hkdf = Hkdf::<Sha256>::new(None, ikm);
    let mut okm = [0u8; KEY_SIZE];
    hkdf.expand(info, &mut okm)
        .map_err(|e| anyhow::anyhow!("HKDF expand failed: {e}"))?;
    Ok(okm)
}

#[cfg(test)]
pub(crate) fn test_params() -> KdfParams {
    KdfParams {
        mem_cost_kib: 1024,
        time_cost: 1,
        parallelism: 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derivation_deterministic() {
        let password = SecretString::from("correct horse battery staple");
        let params = test_params();

        let a = derive_credentials("alice", &password, &params).unwrap();
        let b = derive_credentials("alice", &password, &params).unwrap();

        assert_eq!(a.token_hash, b.token_hash, "token hash must be deterministic");
        assert_eq!(a.public_key, b.public_key);
        assert_eq!(a.private_key, b.private_key);
    }

    #[test]
    fn test_three_secrets_pairwise_distinct() {
        let creds =
            derive_credentials("alice", &SecretString::from("pw1"), &test_params()).unwrap();

        assert_ne!(creds.public_key, creds.private_key);
        assert_ne!(creds.token_hash, hex::encode(creds.public_key.as_bytes()));
        assert_ne!(creds.token_hash, hex::encode(creds.private_key.as_bytes()));
    }

    #[test]
    fn test_different_passwords_unrelated() {
        let params = test_params();
        let a = derive_credentials("alice", &SecretString::from("pw1"), &params).unwrap();
        let b = derive_credentials("alice", &SecretString::from("pw2"), &params).unwrap();

        assert_ne!(a.token_hash, b.token_hash);
        assert_ne!(a.public_key, b.public_key);
        assert_ne!(a.private_key, b.private_key);
    }

    #[test]
    fn test_different_usernames_unrelated() {
        let params = test_params();
        let password = SecretString::from("shared password");
        let a = derive_credentials("alice", &password, &params).unwrap();
        let b = derive_credentials("bob", &password, &params).unwrap();

        assert_ne!(a.token_hash, b.token_hash);
        assert_ne!(a.public_key, b.public_key);
    }

    #[test]
    fn test_token_hash_is_hex() {
        let creds =
            derive_credentials("alice", &SecretString::from("pw"), &test_params()).unwrap();
        assert_eq!(creds.token_hash.len(), KEY_SIZE * 2);
        assert!(creds.token_hash.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_debug_redacts_key_material() {
        let creds =
            derive_credentials("alice", &SecretString::from("pw"), &test_params()).unwrap();
        let debug = format!("{:?}", creds.public_key);
        assert!(debug.contains("REDACTED"));
    }
}
