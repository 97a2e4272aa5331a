//! Session token table, process-memory only.
//!
//! Tokens carry the unmasked keys for the lifetime of a session. They are
//! reference data: losing the table forces re-login, never data loss, since
//! the store's ciphertext is independent of any session.

use rand::RngCore;
use std::collections::HashMap;
use std::sync::Mutex;

use satchel_core::AuthFactor;
use satchel_crypto::{hex, SecretKey};

/// A live session credential. The id travels to the client as a cookie; the
/// keys never leave process memory.
#[derive(Debug, Clone)]
pub struct Token {
    /// Unguessable random id (32 random bytes, hex)
    pub id: String,
    /// Token hash of the account this session belongs to
    pub token_hash: String,
    /// Unmasked public master key
    pub encryption_key: SecretKey,
    /// Unmasked private master key, or None if this factor was never supplied
    pub private_encryption_key: Option<SecretKey>,
    /// How the session was authenticated
    pub factor: AuthFactor,
}

/// In-memory table of live sessions, with its own lock. It does not need to
/// be consistent with the on-disk store beyond "a revoked token is never
/// subsequently returned as valid."
#[derive(Default)]
pub struct TokenStore {
    tokens: Mutex<HashMap<String, Token>>,
}

impl TokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue a fresh token for an authenticated account.
    pub fn create(
        &self,
        token_hash: &str,
        encryption_key: SecretKey,
        private_encryption_key: Option<SecretKey>,
        factor: AuthFactor,
    ) -> Token {
        let token = Token {
            id: random_id(),
            token_hash: token_hash.to_string(),
            encryption_key,
            private_encryption_key,
            factor,
        };
        self.tokens
            .lock()
            .expect("token store lock")
            .insert(token.id.clone(), token.clone());
        tracing::debug!(token_hash, "session token issued");
        token
    }

    /// Look up a live token by id. Unknown ids (expired sessions, stale
    /// cookies) are a miss, never a panic.
    pub fn lookup(&self, id: &str) -> Option<Token> {
        self.tokens.lock().expect("token store lock").get(id).cloned()
    }

    /// Revoke a token. Revoking an unknown id is a no-op.
    pub fn revoke(&self, id: &str) {
        if self
            .tokens
            .lock()
            .expect("token store lock")
            .remove(id)
            .is_some()
        {
            tracing::debug!("session token revoked");
        }
    }

    /// Number of live sessions.
    pub fn len(&self) -> usize {
        self.tokens.lock().expect("token store lock").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn random_id() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(&bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use satchel_crypto::KEY_SIZE;

    fn key(byte: u8) -> SecretKey {
        SecretKey::from_bytes([byte; KEY_SIZE])
    }

    #[test]
    fn test_create_lookup_roundtrip() {
        let store = TokenStore::new();
        let token = store.create("hash-a", key(1), Some(key(2)), AuthFactor::Knowledge);

        let found = store.lookup(&token.id).unwrap();
        assert_eq!(found.token_hash, "hash-a");
        assert_eq!(found.encryption_key, key(1));
        assert_eq!(found.factor, AuthFactor::Knowledge);
    }

    #[test]
    fn test_ids_are_unguessable_length_and_unique() {
        let store = TokenStore::new();
        let a = store.create("h", key(1), None, AuthFactor::None);
        let b = store.create("h", key(1), None, AuthFactor::None);
        assert_eq!(a.id.len(), 64);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_revoked_token_never_returned() {
        let store = TokenStore::new();
        let token = store.create("h", key(1), None, AuthFactor::Knowledge);
        store.revoke(&token.id);
        assert!(store.lookup(&token.id).is_none());
        // Revoking again is harmless
        store.revoke(&token.id);
    }

    #[test]
    fn test_unknown_id_is_a_miss() {
        let store = TokenStore::new();
        assert!(store.lookup("no-such-token").is_none());
    }
}
