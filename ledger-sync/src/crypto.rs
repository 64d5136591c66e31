//! Hashing for ledger state
//!
//! This module provides:
//! - SHA-256 hashing over concatenated byte parts (leaf keys, ledger headers)
//! - Leaf hashing over key plus canonical encoding
//! - Pair hashing for Merkle interior nodes

use crate::types::{Hash256, LedgerEntry, LedgerKey};
use crate::Result;
use sha2::{Digest, Sha256};

/// Hash the concatenation of `parts`
pub fn hash_parts(parts: &[&[u8]]) -> Hash256 {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part);
    }
    Hash256::from_bytes(hasher.finalize().into())
}

/// Hash a pair of hashes (used for internal nodes)
pub fn hash_pair(left: &Hash256, right: &Hash256) -> Hash256 {
    hash_parts(&[left.as_bytes(), right.as_bytes()])
}

/// Hash a state leaf: key followed by its canonical encoding
pub fn hash_leaf(key: &LedgerKey, entry: &LedgerEntry) -> Result<Hash256> {
    let body = bincode::serialize(entry)?;
    Ok(hash_parts(&[key.as_bytes(), &body]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FeeSettings;

    #[test]
    fn test_hash_parts_matches_single_update() {
        let split = hash_parts(&[b"hello ", b"world"]);
        let joined = hash_parts(&[b"hello world"]);
        assert_eq!(split, joined);
    }

    #[test]
    fn test_hash_pair_order_matters() {
        let a = hash_parts(&[b"a"]);
        let b = hash_parts(&[b"b"]);
        assert_ne!(hash_pair(&a, &b), hash_pair(&b, &a));
    }

    #[test]
    fn test_leaf_hash_tracks_content() {
        let fees = |base_fee| {
            LedgerEntry::FeeSettings(FeeSettings {
                base_fee,
                reserve_base: 20,
                reserve_increment: 5,
            })
        };
        let key = fees(10).key();
        assert_eq!(
            hash_leaf(&key, &fees(10)).unwrap(),
            hash_leaf(&key, &fees(10)).unwrap()
        );
        assert_ne!(
            hash_leaf(&key, &fees(10)).unwrap(),
            hash_leaf(&key, &fees(11)).unwrap()
        );
    }
}
