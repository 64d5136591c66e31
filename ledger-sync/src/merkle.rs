//! Merkle root over ordered state leaves
//!
//! Leaves are leaf hashes taken in key order, so the root is a pure function
//! of the state content. A level with an odd count pairs its last hash with
//! itself.

use crate::crypto::hash_pair;
use crate::types::Hash256;

/// Root of the binary SHA-256 tree over `leaves`; zero when there are none
pub fn merkle_root(leaves: &[Hash256]) -> Hash256 {
    let mut level = match leaves {
        [] => return Hash256::ZERO,
        [only] => return *only,
        _ => leaves.to_vec(),
    };

    while level.len() > 1 {
        level = level
            .chunks(2)
            .map(|pair| match pair {
                [left, right] => hash_pair(left, right),
                [single] => hash_pair(single, single),
                _ => unreachable!("chunks(2) yields one or two items"),
            })
            .collect();
    }
    level[0]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::hash_parts;

    fn leaf(n: u8) -> Hash256 {
        hash_parts(&[&[n]])
    }

    #[test]
    fn test_no_leaves_is_zero() {
        assert!(merkle_root(&[]).is_zero());
    }

    #[test]
    fn test_single_leaf_is_its_own_root() {
        assert_eq!(merkle_root(&[leaf(1)]), leaf(1));
    }

    #[test]
    fn test_odd_level_pairs_last_with_itself() {
        let (a, b, c) = (leaf(1), leaf(2), leaf(3));
        let expected = hash_pair(&hash_pair(&a, &b), &hash_pair(&c, &c));
        assert_eq!(merkle_root(&[a, b, c]), expected);
    }

    #[test]
    fn test_order_matters() {
        assert_ne!(merkle_root(&[leaf(1), leaf(2)]), merkle_root(&[leaf(2), leaf(1)]));
    }
}
