//! Account store: one record per local account, persisted as a JSON map
//! keyed by token hash, flushed atomically via temp+rename.
//!
//! The whole store has one state machine, not one per account: an empty
//! store bootstraps the first login into the first account, every later
//! login validates against the stored token hashes and recovers the master
//! keys through the account's XOR masks.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use satchel_core::{SatchelError, SatchelResult};
use satchel_crypto::{DerivedCredentials, SecretKey, XorMask};

/// Persisted account record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountRecord {
    /// Unique user name, chosen at first login
    pub user_name: String,
    /// Public account identifier derived from (username, password)
    pub token_hash: String,
    /// password-derived public key ⊕ master key
    pub public_mask: XorMask,
    /// password-derived private key ⊕ private master key
    pub private_mask: XorMask,
    /// Base URL of the remote tracker this mirror follows
    pub remote_url: String,
    /// Conduit API token consumed by the synchronization layer
    pub conduit_api_token: Option<String>,
    /// UI theme name
    pub theme: String,
    /// Free-form settings (hidden columns and the like)
    pub configuration: serde_json::Value,
}

/// Result of a successful login check against the store.
#[derive(Debug)]
pub enum LoginOutcome {
    /// Empty store: this login created the first account. The derived keys
    /// *are* the master keys (identity masks).
    Bootstrapped {
        account: AccountRecord,
        master_key: SecretKey,
        private_master_key: SecretKey,
    },
    /// Known token hash: master keys recovered through the stored masks.
    Authenticated {
        account: AccountRecord,
        master_key: SecretKey,
        private_master_key: SecretKey,
    },
}

struct Inner {
    accounts: HashMap<String, AccountRecord>,
    dirty: bool,
}

/// On-disk account table with an in-memory mirror.
///
/// All mutating operations take the store lock so a concurrent login never
/// observes a half-applied password change.
pub struct AccountStore {
    db_path: PathBuf,
    inner: Mutex<Inner>,
}

impl AccountStore {
    /// Load or create the account table at the given path.
    ///
    /// A file that exists but fails to parse (including masks of the wrong
    /// shape) is a fatal error: the store cannot be safely opened, so the
    /// engine refuses to start rather than guess.
    pub fn open(db_path: &Path) -> Result<Self> {
        let accounts = if db_path.exists() {
            let content = std::fs::read_to_string(db_path)
                .with_context(|| format!("reading account table: {}", db_path.display()))?;
            serde_json::from_str(&content)
                .with_context(|| format!("parsing account table: {}", db_path.display()))?
        } else {
            HashMap::new()
        };

        Ok(AccountStore {
            db_path: db_path.to_path_buf(),
            inner: Mutex::new(Inner {
                accounts,
                dirty: false,
            }),
        })
    }

    /// Whether no account exists yet (first-run state).
    pub fn is_empty(&self) -> bool {
        self.inner.lock().expect("account store lock").accounts.is_empty()
    }

    /// Look up an account by its token hash.
    pub fn get(&self, token_hash: &str) -> Option<AccountRecord> {
        self.inner
            .lock()
            .expect("account store lock")
            .accounts
            .get(token_hash)
            .cloned()
    }

    /// Run the login check for freshly derived credentials.
    ///
    /// Empty store: bootstrap the first account with identity masks and
    /// report `Bootstrapped`. Unknown token hash on a non-empty store:
    /// `SatchelError::Authentication`; the caller cannot tell "no such
    /// account" from "wrong password"; the `no_accounts_exist` boolean below
    /// exists only to pick between those two paths.
    pub fn authenticate(
        &self,
        username: &str,
        creds: &DerivedCredentials,
    ) -> SatchelResult<LoginOutcome> {
        let mut inner = self.inner.lock().expect("account store lock");
        let no_accounts_exist = inner.accounts.is_empty();

        if no_accounts_exist {
            let account = AccountRecord {
                user_name: username.to_string(),
                token_hash: creds.token_hash.clone(),
                public_mask: XorMask::identity(),
                private_mask: XorMask::identity(),
                remote_url: String::new(),
                conduit_api_token: None,
                theme: "light".into(),
                configuration: serde_json::Value::Null,
            };
            inner
                .accounts
                .insert(creds.token_hash.clone(), account.clone());
            inner.dirty = true;
            flush_locked(&self.db_path, &mut inner).map_err(SatchelError::Other)?;
            tracing::info!(user = username, "bootstrapped first account");

            return Ok(LoginOutcome::Bootstrapped {
                account,
                master_key: creds.public_key.clone(),
                private_master_key: creds.private_key.clone(),
            });
        }

        let account = inner
            .accounts
            .get(&creds.token_hash)
            .cloned()
            .ok_or(SatchelError::Authentication)?;

        let master_key = account.public_mask.unmask(&creds.public_key);
        let private_master_key = account.private_mask.unmask(&creds.private_key);

        Ok(LoginOutcome::Authenticated {
            account,
            master_key,
            private_master_key,
        })
    }

    /// Atomically replace an account's credentials after a password change.
    ///
    /// Both masks arrive fully computed; this method only swaps the record
    /// under the old token hash for one under the new hash and persists in a
    /// single flush. Callers verify the old password *before* calling, so a
    /// failure anywhere earlier is a pure no-op on stored state.
    pub fn replace_credentials(
        &self,
        old_token_hash: &str,
        new_token_hash: &str,
        new_public_mask: XorMask,
        new_private_mask: XorMask,
    ) -> SatchelResult<()> {
        let mut inner = self.inner.lock().expect("account store lock");

        let mut account = inner
            .accounts
            .remove(old_token_hash)
            .ok_or(SatchelError::Authentication)?;
        account.token_hash = new_token_hash.to_string();
        account.public_mask = new_public_mask;
        account.private_mask = new_private_mask;
        let user = account.user_name.clone();
        inner.accounts.insert(new_token_hash.to_string(), account);
        inner.dirty = true;
        flush_locked(&self.db_path, &mut inner).map_err(SatchelError::Other)?;
        tracing::info!(user = %user, "account credentials replaced");
        Ok(())
    }

    /// Insert an additional account record, masks already computed by the
    /// caller against the live master keys. Fails when the token hash is
    /// already taken.
    pub fn insert_account(&self, record: AccountRecord) -> SatchelResult<()> {
        let mut inner = self.inner.lock().expect("account store lock");
        if inner.accounts.contains_key(&record.token_hash) {
            return Err(SatchelError::Storage("token hash already in use".into()));
        }
        let user = record.user_name.clone();
        inner.accounts.insert(record.token_hash.clone(), record);
        inner.dirty = true;
        flush_locked(&self.db_path, &mut inner).map_err(SatchelError::Other)?;
        tracing::info!(user = %user, "account added");
        Ok(())
    }

    /// Update the remote endpoint fields submitted alongside a login form.
    pub fn set_remote(
        &self,
        token_hash: &str,
        remote_url: Option<String>,
        conduit_api_token: Option<String>,
    ) -> SatchelResult<()> {
        let mut inner = self.inner.lock().expect("account store lock");
        let account = inner
            .accounts
            .get_mut(token_hash)
            .ok_or_else(|| SatchelError::NotFound("account".into()))?;
        if let Some(url) = remote_url {
            account.remote_url = url;
        }
        if let Some(token) = conduit_api_token {
            account.conduit_api_token = Some(token);
        }
        inner.dirty = true;
        flush_locked(&self.db_path, &mut inner).map_err(SatchelError::Other)
    }
}

/// Flush dirty state to disk using an atomic write (write then rename).
fn flush_locked(db_path: &Path, inner: &mut Inner) -> Result<()> {
    if !inner.dirty {
        return Ok(());
    }

    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating store dir: {}", parent.display()))?;
    }

    let json =
        serde_json::to_string_pretty(&inner.accounts).context("serializing account table")?;

    let tmp_path = db_path.with_extension("tmp");
    std::fs::write(&tmp_path, &json)
        .with_context(|| format!("writing account table temp: {}", tmp_path.display()))?;
    std::fs::rename(&tmp_path, db_path)
        .with_context(|| format!("renaming account table: {}", db_path.display()))?;

    inner.dirty = false;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::SecretString;
    use satchel_crypto::{derive_credentials, KdfParams};

    fn cheap_params() -> KdfParams {
        KdfParams {
            mem_cost_kib: 1024,
            time_cost: 1,
            parallelism: 1,
        }
    }

    fn creds(user: &str, password: &str) -> DerivedCredentials {
        derive_credentials(user, &SecretString::from(password), &cheap_params()).unwrap()
    }

    #[test]
    fn test_bootstrap_then_authenticate() {
        let dir = tempfile::tempdir().unwrap();
        let store = AccountStore::open(&dir.path().join("accounts.json")).unwrap();
        assert!(store.is_empty());

        let c = creds("alice", "pw1");
        let first = store.authenticate("alice", &c).unwrap();
        let master_at_bootstrap = match first {
            LoginOutcome::Bootstrapped { master_key, .. } => master_key,
            other => panic!("expected Bootstrapped, got {other:?}"),
        };
        assert!(!store.is_empty());

        // Second login with the same password recovers the same master key
        let second = store.authenticate("alice", &c).unwrap();
        match second {
            LoginOutcome::Authenticated { master_key, .. } => {
                assert_eq!(master_key, master_at_bootstrap);
            }
            other => panic!("expected Authenticated, got {other:?}"),
        }
    }

    #[test]
    fn test_wrong_password_is_authentication_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = AccountStore::open(&dir.path().join("accounts.json")).unwrap();
        store.authenticate("alice", &creds("alice", "pw1")).unwrap();

        let result = store.authenticate("alice", &creds("alice", "wrong"));
        assert!(matches!(result, Err(SatchelError::Authentication)));
        // No mutation on failure
        assert_eq!(
            store.inner.lock().unwrap().accounts.len(),
            1,
            "failed login must not create accounts"
        );
    }

    #[test]
    fn test_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("accounts.json");
        let c = creds("alice", "pw1");

        {
            let store = AccountStore::open(&path).unwrap();
            store.authenticate("alice", &c).unwrap();
        }

        let store = AccountStore::open(&path).unwrap();
        assert!(!store.is_empty());
        match store.authenticate("alice", &c).unwrap() {
            LoginOutcome::Authenticated { account, .. } => {
                assert_eq!(account.user_name, "alice");
            }
            other => panic!("expected Authenticated, got {other:?}"),
        }
    }

    #[test]
    fn test_corrupted_table_refuses_to_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("accounts.json");
        // Masks must be exactly four words; three is a corrupted store
        std::fs::write(
            &path,
            r#"{"deadbeef":{"user_name":"alice","token_hash":"deadbeef",
                "public_mask":[1,2,3],"private_mask":[1,2,3,4],
                "remote_url":"","conduit_api_token":null,"theme":"light",
                "configuration":null}}"#,
        )
        .unwrap();

        assert!(AccountStore::open(&path).is_err());
    }

    #[test]
    fn test_set_remote_updates_record() {
        let dir = tempfile::tempdir().unwrap();
        let store = AccountStore::open(&dir.path().join("accounts.json")).unwrap();
        let c = creds("alice", "pw1");
        store.authenticate("alice", &c).unwrap();

        store
            .set_remote(
                &c.token_hash,
                Some("https://tracker.example.com".into()),
                Some("api-abc123".into()),
            )
            .unwrap();

        let account = store.get(&c.token_hash).unwrap();
        assert_eq!(account.remote_url, "https://tracker.example.com");
        assert_eq!(account.conduit_api_token.as_deref(), Some("api-abc123"));
    }
}
