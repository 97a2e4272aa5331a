//! Login and password-change protocols, orchestrated over the account and
//! token stores.
//!
//! Password change flow (atomic w.r.t. concurrent logins):
//!   1. Verify the old password by re-running the login check
//!   2. Derive the new credential triple
//!   3. Compute both new masks fully in memory
//!   4. Persist new token hash + masks in one flush
//!   5. Revoke the old session token, issue a replacement
//!
//! The persist step runs last, so any failure beforehand is a pure no-op;
//! the account is never left in a state where neither password unlocks it.

use secrecy::SecretString;

use satchel_core::{ApiStatus, AuthFactor, SatchelError, SatchelResult};
use satchel_crypto::{derive_credentials, KdfParams, SecretKey, XorMask};

use crate::store::{AccountStore, LoginOutcome};
use crate::tokens::{Token, TokenStore};

/// JSON-facing result of a login or password-change request.
#[derive(Debug)]
pub struct AuthResponse {
    pub status: ApiStatus,
    /// Session token on success, None on failure
    pub token: Option<Token>,
}

/// Orchestrates KeyDerivation, AccountStore, and TokenStore.
pub struct AuthEngine {
    accounts: AccountStore,
    tokens: TokenStore,
    kdf: KdfParams,
}

impl AuthEngine {
    pub fn new(accounts: AccountStore, kdf: KdfParams) -> Self {
        Self {
            accounts,
            tokens: TokenStore::new(),
            kdf,
        }
    }

    pub fn accounts(&self) -> &AccountStore {
        &self.accounts
    }

    pub fn tokens(&self) -> &TokenStore {
        &self.tokens
    }

    /// Run the login protocol for submitted credentials.
    ///
    /// Wrong password and unknown account produce the identical
    /// `AuthenticationError` response, so account enumeration is not possible
    /// from the outside.
    pub fn login(&self, username: &str, password: &SecretString) -> SatchelResult<AuthResponse> {
        let creds = derive_credentials(username, password, &self.kdf)?;

        let outcome = match self.accounts.authenticate(username, &creds) {
            Ok(outcome) => outcome,
            Err(SatchelError::Authentication) => {
                tracing::info!(user = username, "login rejected");
                return Ok(AuthResponse {
                    status: ApiStatus::AuthenticationError,
                    token: None,
                });
            }
            Err(e) => return Err(e),
        };

        let (status, account, master_key, private_master_key) = match outcome {
            LoginOutcome::Bootstrapped {
                account,
                master_key,
                private_master_key,
            } => (
                ApiStatus::BootstrappedNewAccount,
                account,
                master_key,
                private_master_key,
            ),
            LoginOutcome::Authenticated {
                account,
                master_key,
                private_master_key,
            } => (ApiStatus::Ok, account, master_key, private_master_key),
        };

        let token = self.tokens.create(
            &account.token_hash,
            master_key,
            Some(private_master_key),
            AuthFactor::Knowledge,
        );
        tracing::info!(user = username, "login succeeded");

        Ok(AuthResponse {
            status,
            token: Some(token),
        })
    }

    /// Issue a session authenticated by OS-level identity rather than a
    /// password. No private key is available to such a session until a
    /// password is supplied.
    pub fn login_external(&self, token_hash: &str, master_key: SecretKey) -> Token {
        self.tokens
            .create(token_hash, master_key, None, AuthFactor::ExternalIdentity)
    }

    /// Change an account's password without touching the store's ciphertext.
    pub fn change_password(
        &self,
        session_id: &str,
        username: &str,
        old_password: &SecretString,
        new_password: &SecretString,
    ) -> SatchelResult<AuthResponse> {
        // An empty store has nothing to change. Checked before the login
        // check runs, which would otherwise bootstrap a first account out of
        // the submitted "old" credentials.
        if self.accounts.is_empty() {
            tracing::info!(user = username, "password change rejected");
            return Ok(AuthResponse {
                status: ApiStatus::AuthenticationError,
                token: None,
            });
        }

        // Step 1: verify the old password
        let old_creds = derive_credentials(username, old_password, &self.kdf)?;
        let (master_key, private_master_key) =
            match self.accounts.authenticate(username, &old_creds) {
                Ok(LoginOutcome::Authenticated {
                    master_key,
                    private_master_key,
                    ..
                }) => (master_key, private_master_key),
                // A password change can never bootstrap; an empty store has
                // nothing to change
                Ok(LoginOutcome::Bootstrapped { .. }) | Err(SatchelError::Authentication) => {
                    tracing::info!(user = username, "password change rejected");
                    return Ok(AuthResponse {
                        status: ApiStatus::AuthenticationError,
                        token: None,
                    });
                }
                Err(e) => return Err(e),
            };

        // Steps 2–3: new triple and both masks, fully in memory
        let new_creds = derive_credentials(username, new_password, &self.kdf)?;
        let new_public_mask = XorMask::mask(&new_creds.public_key, &master_key);
        let new_private_mask = XorMask::mask(&new_creds.private_key, &private_master_key);

        // Step 4: one persisted swap
        self.accounts.replace_credentials(
            &old_creds.token_hash,
            &new_creds.token_hash,
            new_public_mask,
            new_private_mask,
        )?;

        // Step 5: old session out, replacement in
        self.tokens.revoke(session_id);
        let token = self.tokens.create(
            &new_creds.token_hash,
            master_key,
            Some(private_master_key),
            AuthFactor::Knowledge,
        );
        tracing::info!(user = username, "password changed");

        Ok(AuthResponse {
            status: ApiStatus::Ok,
            token: Some(token),
        })
    }

    /// Create an additional account that unlocks the same store.
    ///
    /// The new account's masks wrap the calling session's master keys with
    /// the new user's independently chosen password. This is what lets
    /// several credentials open one ciphertext.
    pub fn add_account(
        &self,
        session_id: &str,
        new_username: &str,
        new_password: &SecretString,
    ) -> SatchelResult<AuthResponse> {
        let session = self.require_session(session_id)?;
        let private_master_key = self.require_private_key(&session)?;

        let creds = derive_credentials(new_username, new_password, &self.kdf)?;
        let record = crate::store::AccountRecord {
            user_name: new_username.to_string(),
            token_hash: creds.token_hash.clone(),
            public_mask: XorMask::mask(&creds.public_key, &session.encryption_key),
            private_mask: XorMask::mask(&creds.private_key, &private_master_key),
            remote_url: String::new(),
            conduit_api_token: None,
            theme: "light".into(),
            configuration: serde_json::Value::Null,
        };

        match self.accounts.insert_account(record) {
            Ok(()) => Ok(AuthResponse {
                status: ApiStatus::Ok,
                token: None,
            }),
            Err(SatchelError::Storage(_)) => Ok(AuthResponse {
                status: ApiStatus::Nok,
                token: None,
            }),
            Err(e) => Err(e),
        }
    }

    /// Record the remote endpoint fields submitted alongside a login form
    /// on the session's account.
    pub fn update_remote(
        &self,
        session_id: &str,
        remote_url: Option<String>,
        conduit_api_token: Option<String>,
    ) -> SatchelResult<()> {
        let session = self.require_session(session_id)?;
        self.accounts
            .set_remote(&session.token_hash, remote_url, conduit_api_token)
    }

    /// Destroy a session. Unknown ids are a no-op.
    pub fn logout(&self, session_id: &str) {
        self.tokens.revoke(session_id);
    }

    /// Resolve a request's session cookie to a live token.
    ///
    /// Stale cookies (inactivity timeout, restart) fail the request, they
    /// never crash it.
    pub fn require_session(&self, session_id: &str) -> SatchelResult<Token> {
        self.tokens
            .lookup(session_id)
            .ok_or_else(|| SatchelError::AccessDenied("unknown or expired session".into()))
    }

    /// Resolve the private master key of a session, failing when the session
    /// was authenticated without a password.
    pub fn require_private_key(&self, token: &Token) -> SatchelResult<SecretKey> {
        token
            .private_encryption_key
            .clone()
            .ok_or_else(|| SatchelError::AccessDenied("private partition locked".into()))
    }
}
