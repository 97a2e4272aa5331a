//! Sealing of staged payloads at rest under the master key.
//!
//! Uses XChaCha20-Poly1305 with a random nonce.
//! Output: `[24-byte nonce][ciphertext + 16-byte tag]`

use chacha20poly1305::{
    aead::{Aead, KeyInit},
    XChaCha20Poly1305, XNonce,
};
use rand::RngCore;

use crate::kdf::SecretKey;
use crate::{NONCE_SIZE, TAG_SIZE};

/// Encrypt a payload under the given key.
pub fn seal_payload(key: &SecretKey, plaintext: &[u8]) -> anyhow::Result<Vec<u8>> {
    let cipher = XChaCha20Poly1305::new(key.as_bytes().into());

    let mut nonce_bytes = [0u8; NONCE_SIZE];
    rand::thread_rng().fill_bytes(&mut nonce_bytes);
    let nonce = XNonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|e| anyhow::anyhow!("payload sealing failed: {e}"))?;

    let mut result = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    result.extend_from_slice(&nonce_bytes);
    result.extend_from_slice(&ciphertext);
    Ok(result)
}

/// Decrypt a payload sealed by `seal_payload`.
pub fn open_payload(key: &SecretKey, sealed: &[u8]) -> anyhow::Result<Vec<u8>> {
    if sealed.len() < NONCE_SIZE + TAG_SIZE {
        anyhow::bail!(
            "sealed payload too short: {} bytes (expected at least {})",
            sealed.len(),
            NONCE_SIZE + TAG_SIZE
        );
    }

    let (nonce_bytes, ciphertext) = sealed.split_at(NONCE_SIZE);
    let nonce = XNonce::from_slice(nonce_bytes);
    let cipher = XChaCha20Poly1305::new(key.as_bytes().into());

    cipher
        .decrypt(nonce, ciphertext)
        .map_err(|_| anyhow::anyhow!("payload opening failed: wrong key or corrupted data"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::KEY_SIZE;

    fn test_key(byte: u8) -> SecretKey {
        SecretKey::from_bytes([byte; KEY_SIZE])
    }

    #[test]
    fn test_seal_open_roundtrip() {
        let key = test_key(7);
        let sealed = seal_payload(&key, b"staged document body").unwrap();
        let opened = open_payload(&key, &sealed).unwrap();
        assert_eq!(opened, b"staged document body");
    }

    #[test]
    fn test_open_with_wrong_key_fails() {
        let sealed = seal_payload(&test_key(1), b"secret").unwrap();
        assert!(open_payload(&test_key(2), &sealed).is_err());
    }

    #[test]
    fn test_nonces_differ_per_seal() {
        let key = test_key(9);
        let a = seal_payload(&key, b"same payload").unwrap();
        let b = seal_payload(&key, b"same payload").unwrap();
        assert_ne!(a[..NONCE_SIZE], b[..NONCE_SIZE]);
        assert_ne!(a, b);
    }

    #[test]
    fn test_truncated_payload_is_error() {
        let key = test_key(3);
        assert!(open_payload(&key, &[0u8; 10]).is_err());
    }
}
