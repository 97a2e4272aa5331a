//! XOR key masks: the mechanism that lets a password change without
//! re-encrypting the store.
//!
//! The store is encrypted under one fixed master key. Each account stores
//! `mask = password-derived key ⊕ master key`; login recovers the master key
//! as `mask ⊕ freshly derived key`. XOR is its own inverse, so a password
//! change only overwrites the stored mask.

use serde::{Deserialize, Serialize};

use crate::kdf::SecretKey;
use crate::KEY_SIZE;

/// Number of 64-bit words in a mask (8 key bytes packed per word)
pub const MASK_WORDS: usize = KEY_SIZE / 8;

/// A fixed-width XOR mask between two 256-bit keys.
///
/// Stored in account records. Deserializing anything other than exactly
/// four words fails, which is what makes corrupted masks a fatal open error
/// rather than a silent mis-decryption.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct XorMask(pub [u64; MASK_WORDS]);

impl XorMask {
    /// Positionwise XOR of two keys, packed 8 bytes per little-endian word.
    pub fn mask(secret: &SecretKey, reference: &SecretKey) -> Self {
        let a = secret.as_bytes();
        let b = reference.as_bytes();
        let mut words = [0u64; MASK_WORDS];
        for (i, word) in words.iter_mut().enumerate() {
            let offset = i * 8;
            let wa = u64::from_le_bytes(a[offset..offset + 8].try_into().unwrap());
            let wb = u64::from_le_bytes(b[offset..offset + 8].try_into().unwrap());
            *word = wa ^ wb;
        }
        XorMask(words)
    }

    /// Recover the reference key from the mask and the secret it was taken
    /// against: `XorMask::mask(a, b).unmask(a) == b`.
    pub fn unmask(&self, secret: &SecretKey) -> SecretKey {
        let a = secret.as_bytes();
        let mut out = [0u8; KEY_SIZE];
        for (i, word) in self.0.iter().enumerate() {
            let offset = i * 8;
            let wa = u64::from_le_bytes(a[offset..offset + 8].try_into().unwrap());
            out[offset..offset + 8].copy_from_slice(&(wa ^ word).to_le_bytes());
        }
        SecretKey::from_bytes(out)
    }

    /// The mask of a key against itself: all-zero words. Used when the first
    /// account bootstraps the store and the derived key *is* the master key,
    /// so the bootstrap and steady-state login paths stay identical.
    pub fn identity() -> Self {
        XorMask([0u64; MASK_WORDS])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(byte: u8) -> SecretKey {
        SecretKey::from_bytes([byte; KEY_SIZE])
    }

    #[test]
    fn test_unmask_recovers_reference() {
        let a = key(0x17);
        let b = key(0xC4);
        let mask = XorMask::mask(&a, &b);
        assert_eq!(mask.unmask(&a), b);
    }

    #[test]
    fn test_unmask_with_reference_recovers_secret() {
        let a = key(0x17);
        let b = key(0xC4);
        let mask = XorMask::mask(&a, &b);
        // XOR symmetry: unmasking with the other operand yields the first
        assert_eq!(mask.unmask(&b), a);
    }

    #[test]
    fn test_identity_mask_is_fixpoint() {
        let a = key(0x42);
        assert_eq!(XorMask::mask(&a, &a), XorMask::identity());
        assert_eq!(XorMask::identity().unmask(&a), a);
    }

    #[test]
    fn test_serde_shape_is_four_words() {
        let mask = XorMask([1, 2, 3, 4]);
        let json = serde_json::to_string(&mask).unwrap();
        assert_eq!(json, "[1,2,3,4]");

        // Wrong-length masks must fail to deserialize, not truncate
        assert!(serde_json::from_str::<XorMask>("[1,2,3]").is_err());
        assert!(serde_json::from_str::<XorMask>("[1,2,3,4,5]").is_err());
    }
}

#[cfg(test)]
mod proptest_suite {
    use super::*;
    use proptest::prelude::*;

    fn arb_key() -> impl Strategy<Value = SecretKey> {
        prop::array::uniform32(any::<u8>()).prop_map(SecretKey::from_bytes)
    }

    proptest! {
        #[test]
        fn mask_unmask_involution(a in arb_key(), b in arb_key()) {
            let mask = XorMask::mask(&a, &b);
            prop_assert_eq!(mask.unmask(&a), b.clone());
            prop_assert_eq!(mask.unmask(&b), a);
        }

        #[test]
        fn mask_symmetric_in_operands(a in arb_key(), b in arb_key()) {
            // XOR commutes, so the mask itself does not depend on operand order
            prop_assert_eq!(XorMask::mask(&a, &b), XorMask::mask(&b, &a));
        }

        #[test]
        fn double_unmask_is_identity(a in arb_key(), b in arb_key()) {
            let mask = XorMask::mask(&a, &b);
            let recovered = mask.unmask(&a);
            prop_assert_eq!(XorMask::mask(&a, &recovered), mask);
        }
    }
}
