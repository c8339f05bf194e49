//! Merkle tree implementation using Keccak256
//!
//! A binary hash tree over eligibility leaves with two fixed rules:
//!
//! - **Sorted pairs.** Every parent is `keccak256(min(a, b) || max(a, b))`, so a
//!   proof is just a list of sibling hashes with no left/right bits.
//! - **Carry-up.** When a level has an odd number of nodes the last one is
//!   promoted to the next level unchanged. No duplication, no padding.
//!
//! Leaves are placed in ascending byte order before the first level is
//! paired. The root therefore depends only on the set of leaves, never on
//! the order of the input list.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::hash::{keccak_hash, Hash};
use crate::leaf::{hash_leaf, Amount, Identity};
use crate::types::{CoreError, Result};

pub use crate::hash::{HASH_SIZE, ZERO_HASH};

/// Hash two sibling nodes into their parent, smaller hash first
#[inline]
pub fn hash_sorted_pair(a: &Hash, b: &Hash) -> Hash {
    if a <= b {
        keccak_hash(&[a, b])
    } else {
        keccak_hash(&[b, a])
    }
}

/// An inclusion proof (sibling hashes from leaf to root)
///
/// Levels where the node was carried up contribute no sibling, so the
/// length can be shorter than the tree depth.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerkleProof {
    #[serde(with = "crate::serde_hex::hash_vec")]
    pub siblings: Vec<Hash>,
}

impl MerkleProof {
    pub fn new(siblings: Vec<Hash>) -> Self {
        Self { siblings }
    }

    /// Proof of a single-leaf tree
    pub fn empty() -> Self {
        Self::default()
    }

    /// Fold the siblings into a root starting from `leaf`
    pub fn compute_root(&self, leaf: &Hash) -> Hash {
        self.siblings
            .iter()
            .fold(*leaf, |acc, sibling| hash_sorted_pair(&acc, sibling))
    }

    /// Verify this proof against a leaf and root
    pub fn verify(&self, leaf: &Hash, root: &Hash) -> bool {
        &self.compute_root(leaf) == root
    }

    pub fn len(&self) -> usize {
        self.siblings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.siblings.is_empty()
    }
}

/// Binary hash tree over a fixed set of leaves
///
/// All levels are kept in memory so proofs are a lookup, not a rebuild.
#[derive(Clone, Debug)]
pub struct MerkleTree {
    /// `levels[0]` holds the sorted leaves, the last level holds the root
    levels: Vec<Vec<Hash>>,
    /// Leaf hash -> position in `levels[0]` (first occurrence wins)
    index: HashMap<Hash, usize>,
}

impl MerkleTree {
    /// Build a tree over the given leaf hashes
    ///
    /// Fails with `EmptyTree` on zero leaves.
    pub fn build(leaves: &[Hash]) -> Result<Self> {
        if leaves.is_empty() {
            return Err(CoreError::EmptyTree);
        }

        let mut sorted = leaves.to_vec();
        sorted.sort_unstable();

        let mut index = HashMap::with_capacity(sorted.len());
        for (position, leaf) in sorted.iter().enumerate() {
            index.entry(*leaf).or_insert(position);
        }

        let levels = build_levels(sorted);
        Ok(Self { levels, index })
    }

    /// Root hash
    pub fn root(&self) -> Hash {
        // build_levels always ends with a single-node level
        self.levels[self.levels.len() - 1][0]
    }

    /// Number of leaves
    pub fn leaf_count(&self) -> usize {
        self.levels[0].len()
    }

    /// Number of hashing levels above the leaves
    pub fn depth(&self) -> usize {
        self.levels.len() - 1
    }

    /// Leaves in canonical (sorted) order
    pub fn leaves(&self) -> &[Hash] {
        &self.levels[0]
    }

    /// Canonical position of a leaf hash
    pub fn position(&self, leaf: &Hash) -> Option<usize> {
        self.index.get(leaf).copied()
    }

    /// Proof for the leaf at canonical `position`
    pub fn proof(&self, position: usize) -> Option<MerkleProof> {
        if position >= self.leaf_count() {
            return None;
        }

        let mut siblings = Vec::with_capacity(self.depth());
        let mut idx = position;

        for level in &self.levels[..self.levels.len() - 1] {
            let sibling_idx = idx ^ 1;
            // An unpaired last node is carried up and has no sibling
            if sibling_idx < level.len() {
                siblings.push(level[sibling_idx]);
            }
            idx >>= 1;
        }

        Some(MerkleProof { siblings })
    }

    /// Proof for a leaf hash
    pub fn proof_for_leaf(&self, leaf: &Hash) -> Option<MerkleProof> {
        self.position(leaf).and_then(|p| self.proof(p))
    }

    /// Proof for an (identity, amount) pair
    ///
    /// Fails with `LeafNotFound` when the pair was not part of the build.
    pub fn prove_leaf(&self, identity: &Identity, amount: &Amount) -> Result<MerkleProof> {
        self.proof_for_leaf(&hash_leaf(identity, amount))
            .ok_or_else(|| CoreError::LeafNotFound {
                identity: identity.to_string(),
                amount: amount.to_string(),
            })
    }

    /// Check that a leaf is in this tree
    pub fn contains(&self, leaf: &Hash) -> bool {
        self.index.contains_key(leaf)
    }
}

/// Pair nodes level by level until one remains
fn build_levels(leaves: Vec<Hash>) -> Vec<Vec<Hash>> {
    let mut current_level = leaves;
    let mut levels = Vec::new();

    while current_level.len() > 1 {
        let mut next_level = Vec::with_capacity(current_level.len().div_ceil(2));

        for chunk in current_level.chunks(2) {
            match chunk {
                [left, right] => next_level.push(hash_sorted_pair(left, right)),
                [odd] => next_level.push(*odd),
                _ => unreachable!("chunks(2) yields one or two nodes"),
            }
        }

        levels.push(current_level);
        current_level = next_level;
    }

    levels.push(current_level);
    levels
}

/// Compute just the root of a leaf set
pub fn compute_root(leaves: &[Hash]) -> Result<Hash> {
    MerkleTree::build(leaves).map(|tree| tree.root())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::hash_bytes;

    fn leaves(n: u8) -> Vec<Hash> {
        (0..n).map(|i| hash_bytes(&[i])).collect()
    }

    #[test]
    fn test_sorted_pair_commutes() {
        let a = hash_bytes(b"left");
        let b = hash_bytes(b"right");
        assert_eq!(hash_sorted_pair(&a, &b), hash_sorted_pair(&b, &a));
    }

    #[test]
    fn test_empty_tree() {
        assert!(matches!(MerkleTree::build(&[]), Err(CoreError::EmptyTree)));
    }

    #[test]
    fn test_single_leaf() {
        let leaf = hash_bytes(b"only");
        let tree = MerkleTree::build(&[leaf]).unwrap();

        assert_eq!(tree.root(), leaf);
        assert_eq!(tree.depth(), 0);
        let proof = tree.proof(0).unwrap();
        assert!(proof.is_empty());
        assert!(proof.verify(&leaf, &tree.root()));
    }

    #[test]
    fn test_two_leaves() {
        let l = leaves(2);
        let tree = MerkleTree::build(&l).unwrap();
        assert_eq!(tree.root(), hash_sorted_pair(&l[0], &l[1]));
    }

    #[test]
    fn test_odd_node_is_carried_up() {
        let mut l = leaves(3);
        l.sort();
        let tree = MerkleTree::build(&l).unwrap();

        // Level 1 is [H(l0, l1), l2]; root pairs those two
        let expected = hash_sorted_pair(&hash_sorted_pair(&l[0], &l[1]), &l[2]);
        assert_eq!(tree.root(), expected);

        // The carried leaf has a single sibling
        let proof = tree.proof(2).unwrap();
        assert_eq!(proof.len(), 1);
        assert!(proof.verify(&l[2], &tree.root()));
    }

    #[test]
    fn test_every_proof_verifies() {
        for n in 1..=17u8 {
            let l = leaves(n);
            let tree = MerkleTree::build(&l).unwrap();
            for leaf in &l {
                let proof = tree.proof_for_leaf(leaf).unwrap();
                assert!(proof.verify(leaf, &tree.root()), "n={} failed", n);
            }
        }
    }

    #[test]
    fn test_levels_shape() {
        let tree = MerkleTree::build(&leaves(5)).unwrap();
        // 5 -> 3 -> 2 -> 1
        assert_eq!(tree.depth(), 3);
        assert_eq!(tree.leaf_count(), 5);
    }

    #[test]
    fn test_order_independent_root() {
        let l = leaves(9);
        let mut reversed = l.clone();
        reversed.reverse();
        assert_eq!(compute_root(&l).unwrap(), compute_root(&reversed).unwrap());
    }

    #[test]
    fn test_out_of_range_proof() {
        let tree = MerkleTree::build(&leaves(4)).unwrap();
        assert!(tree.proof(4).is_none());
        assert!(tree.proof_for_leaf(&hash_bytes(b"missing")).is_none());
    }

    #[test]
    fn test_prove_leaf_not_found() {
        let id = Identity::new([1u8; 20]);
        let tree = MerkleTree::build(&[hash_leaf(&id, &Amount::from(10u64))]).unwrap();

        assert!(tree.prove_leaf(&id, &Amount::from(10u64)).is_ok());
        assert!(matches!(
            tree.prove_leaf(&id, &Amount::from(11u64)),
            Err(CoreError::LeafNotFound { .. })
        ));
    }

    #[test]
    fn test_duplicate_leaves_still_verify() {
        let leaf = hash_bytes(b"dup");
        let other = hash_bytes(b"other");
        let tree = MerkleTree::build(&[leaf, other, leaf]).unwrap();

        assert_eq!(tree.leaf_count(), 3);
        let proof = tree.proof_for_leaf(&leaf).unwrap();
        assert!(proof.verify(&leaf, &tree.root()));
    }
}
