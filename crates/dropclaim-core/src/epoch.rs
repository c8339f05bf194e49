//! Eligibility epochs
//!
//! An epoch is one immutable version of the eligibility list together with
//! the tree built over it. Publishing a new list means building a new epoch;
//! nothing in an epoch is ever mutated.

use std::collections::HashSet;

use crate::hash::Hash;
use crate::leaf::{Amount, Identity};
use crate::merkle::MerkleTree;
use crate::types::{CoreError, EligibilityEntry, ProofBundle, Result};

/// One published version of the eligibility list
#[derive(Clone, Debug)]
pub struct Epoch {
    version: u64,
    entries: Vec<EligibilityEntry>,
    tree: MerkleTree,
}

impl Epoch {
    /// Build an epoch from an eligibility list
    ///
    /// Rejects empty lists and lists that name the same identity twice.
    pub fn new(version: u64, entries: Vec<EligibilityEntry>) -> Result<Self> {
        let mut seen = HashSet::with_capacity(entries.len());
        for entry in &entries {
            if !seen.insert(entry.identity) {
                return Err(CoreError::DuplicateIdentity(entry.identity.to_string()));
            }
        }

        let leaves: Vec<Hash> = entries.iter().map(EligibilityEntry::leaf).collect();
        let tree = MerkleTree::build(&leaves)?;

        Ok(Self { version, entries, tree })
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn root(&self) -> Hash {
        self.tree.root()
    }

    /// The public list, in publication order, without proofs
    pub fn entries(&self) -> &[EligibilityEntry] {
        &self.entries
    }

    pub fn tree(&self) -> &MerkleTree {
        &self.tree
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Amount listed for an identity, if any
    pub fn amount_of(&self, identity: &Identity) -> Option<Amount> {
        self.entries
            .iter()
            .find(|e| &e.identity == identity)
            .map(|e| e.amount)
    }

    /// Proof bundle for an exact (identity, amount) pair
    ///
    /// A listed identity with a different amount is `LeafNotFound`, the same
    /// as an unlisted identity.
    pub fn proof_for(&self, identity: &Identity, amount: &Amount) -> Result<ProofBundle> {
        let leaf = crate::leaf::hash_leaf(identity, amount);
        let proof = self.tree.prove_leaf(identity, amount)?;
        Ok(ProofBundle {
            proof,
            root: self.root(),
            leaf,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::verifier::verify;

    fn entry(byte: u8, amount: u64) -> EligibilityEntry {
        EligibilityEntry::new(Identity::new([byte; 20]), Amount::from(amount))
    }

    #[test]
    fn test_epoch_rejects_empty() {
        assert!(matches!(Epoch::new(1, vec![]), Err(CoreError::EmptyTree)));
    }

    #[test]
    fn test_epoch_rejects_duplicate_identity() {
        let result = Epoch::new(1, vec![entry(1, 100), entry(2, 5), entry(1, 7)]);
        assert!(matches!(result, Err(CoreError::DuplicateIdentity(_))));
    }

    #[test]
    fn test_proof_for_listed_entry() {
        let epoch = Epoch::new(3, vec![entry(1, 100), entry(2, 50), entry(3, 200)]).unwrap();
        let e = &epoch.entries()[1];
        let bundle = epoch.proof_for(&e.identity, &e.amount).unwrap();

        assert_eq!(bundle.root, epoch.root());
        assert_eq!(bundle.leaf, e.leaf());
        assert!(verify(&e.identity, &e.amount, &bundle.proof, &bundle.root));
    }

    #[test]
    fn test_amount_mismatch_is_not_found() {
        let epoch = Epoch::new(1, vec![entry(1, 100)]).unwrap();
        let result = epoch.proof_for(&Identity::new([1; 20]), &Amount::from(99u64));
        assert!(matches!(result, Err(CoreError::LeafNotFound { .. })));
    }

    #[test]
    fn test_public_list_keeps_order() {
        let entries = vec![entry(3, 1), entry(1, 2), entry(2, 3)];
        let epoch = Epoch::new(1, entries.clone()).unwrap();
        assert_eq!(epoch.entries(), entries.as_slice());
        assert_eq!(epoch.amount_of(&Identity::new([1; 20])), Some(Amount::from(2u64)));
        assert_eq!(epoch.amount_of(&Identity::new([9; 20])), None);
    }
}
