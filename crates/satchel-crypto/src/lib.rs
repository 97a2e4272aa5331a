//! satchel-crypto: key management for the local encrypted store
//!
//! The store is always encrypted under one fixed master key. Passwords never
//! encrypt anything directly:
//!
//! ```text
//! (username, password)
//!   └── Argon2id(password, salt = SHA-256(username)[..16])  → base secret
//!         ├── HKDF "satchel-token-hash"  → TokenHash (stored, public id)
//!         ├── HKDF "satchel-public-key"  → public key (never stored)
//!         └── HKDF "satchel-private-key" → private key (never stored)
//!
//! account record stores   mask = public key ⊕ master key
//! login recovers          master key = mask ⊕ public key
//! ```
//!
//! Changing a password recomputes the stored mask only; the store's
//! ciphertext is untouched.

pub mod hex;
pub mod kdf;
pub mod mask;
pub mod seal;

pub use kdf::{derive_credentials, DerivedCredentials, KdfParams, SecretKey};
pub use mask::XorMask;
pub use seal::{open_payload, seal_payload};

/// Size of a derived key in bytes (256-bit)
pub const KEY_SIZE: usize = 32;

/// Size of an XChaCha20-Poly1305 nonce (192-bit)
pub const NONCE_SIZE: usize = 24;

/// Size of a Poly1305 authentication tag
pub const TAG_SIZE: usize = 16;
