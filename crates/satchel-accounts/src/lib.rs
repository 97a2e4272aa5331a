//! satchel-accounts: local accounts and session credentials
//!
//! One encrypted store, several independent passwords. Each account record
//! stores a token hash (public identifier) and two XOR masks that recover the
//! shared master keys from that account's password-derived keys. Session
//! tokens are process-memory only; losing them forces re-login, never data
//! loss.

pub mod engine;
pub mod store;
pub mod tokens;

pub use engine::{AuthEngine, AuthResponse};
pub use store::{AccountRecord, AccountStore, LoginOutcome};
pub use tokens::{Token, TokenStore};
