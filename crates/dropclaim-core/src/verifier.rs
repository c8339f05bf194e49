//! Merkle membership verification
//!
//! Pure functions with no state: the relayer runs them as an advisory check
//! and the enforcement point runs the same fold authoritatively against its
//! own stored root.

use crate::hash::Hash;
use crate::leaf::{hash_leaf, Amount, Identity};
use crate::merkle::MerkleProof;
use crate::types::EligibilityEntry;

/// Verify that `(identity, amount)` is a member of the tree with `root`
pub fn verify(identity: &Identity, amount: &Amount, proof: &MerkleProof, root: &Hash) -> bool {
    verify_leaf(&hash_leaf(identity, amount), proof, root)
}

/// Verify a precomputed leaf hash
pub fn verify_leaf(leaf: &Hash, proof: &MerkleProof, root: &Hash) -> bool {
    proof.verify(leaf, root)
}

/// Verify an eligibility entry
pub fn verify_entry(entry: &EligibilityEntry, proof: &MerkleProof, root: &Hash) -> bool {
    verify(&entry.identity, &entry.amount, proof, root)
}
