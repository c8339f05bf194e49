//! Tests for eligibility trees, proofs and epochs

use dropclaim_core::hash::{hash_bytes, keccak_hash, Hash};
use dropclaim_core::leaf::{encode, encode_str, hash_leaf, Amount, Identity, LEAF_ENCODING_LEN};
use dropclaim_core::merkle::{compute_root, hash_sorted_pair, MerkleProof, MerkleTree};
use dropclaim_core::types::{CoreError, EligibilityEntry};
use dropclaim_core::verifier::verify;
use dropclaim_core::Epoch;

fn id(byte: u8) -> Identity {
    Identity::new([byte; 20])
}

fn amount(v: u64) -> Amount {
    Amount::from(v)
}

fn three_entries() -> Vec<EligibilityEntry> {
    vec![
        EligibilityEntry::new(id(0xa1), amount(100)),
        EligibilityEntry::new(id(0xb2), amount(50)),
        EligibilityEntry::new(id(0xc3), amount(200)),
    ]
}

// === Leaf encoding tests ===

#[test]
fn test_leaf_encoding_layout() {
    let bytes = encode(&id(0x11), &amount(1));

    assert_eq!(bytes.len(), LEAF_ENCODING_LEN);
    assert_eq!(&bytes[..20], &[0x11u8; 20]);
    assert!(bytes[20..51].iter().all(|b| *b == 0));
    assert_eq!(bytes[51], 1);
}

#[test]
fn test_leaf_hash_is_keccak_of_encoding() {
    let bytes = encode(&id(0x22), &amount(12345));
    assert_eq!(hash_leaf(&id(0x22), &amount(12345)), keccak_hash(&[&bytes]));
}

#[test]
fn test_encode_str_normalizes_case() {
    let lower = encode_str("0xabcdefabcdefabcdefabcdefabcdefabcdefabcd", "7").unwrap();
    let upper = encode_str("0xABCDEFABCDEFABCDEFABCDEFABCDEFABCDEFABCD", "7").unwrap();
    assert_eq!(lower, upper);
}

#[test]
fn test_encode_str_rejects_bad_input() {
    assert!(matches!(
        encode_str("0x1234", "7"),
        Err(CoreError::InvalidIdentity(_))
    ));
    assert!(matches!(
        encode_str("0xabcdefabcdefabcdefabcdefabcdefabcdefabcd", "-1"),
        Err(CoreError::InvalidAmount(_))
    ));
    // 2^256
    let too_big = "115792089237316195423570985008687907853269984665640564039457584007913129639936";
    assert!(matches!(
        encode_str("0xabcdefabcdefabcdefabcdefabcdefabcdefabcd", too_big),
        Err(CoreError::AmountOverflow(_))
    ));
}

// === Tree scenarios ===

#[test]
fn test_single_leaf_scenario() {
    let a = id(0xa1);
    let leaf = hash_leaf(&a, &amount(100));
    let tree = MerkleTree::build(&[leaf]).unwrap();

    assert_eq!(tree.root(), leaf);
    let proof = tree.prove_leaf(&a, &amount(100)).unwrap();
    assert!(proof.is_empty());
    assert!(verify(&a, &amount(100), &MerkleProof::empty(), &tree.root()));
}

#[test]
fn test_three_leaf_scenario() {
    let entries = three_entries();
    let epoch = Epoch::new(1, entries.clone()).unwrap();
    let root = epoch.root();

    for e in &entries {
        let bundle = epoch.proof_for(&e.identity, &e.amount).unwrap();
        assert!(verify(&e.identity, &e.amount, &bundle.proof, &root));
    }

    // Swap amounts between A and C and reuse the earlier proofs
    let proof_a = epoch.proof_for(&entries[0].identity, &entries[0].amount).unwrap().proof;
    let proof_c = epoch.proof_for(&entries[2].identity, &entries[2].amount).unwrap().proof;
    assert!(!verify(&entries[0].identity, &entries[2].amount, &proof_a, &root));
    assert!(!verify(&entries[2].identity, &entries[0].amount, &proof_c, &root));
}

#[test]
fn test_three_leaf_root_shape() {
    let mut leaves: Vec<Hash> = three_entries().iter().map(|e| e.leaf()).collect();
    leaves.sort();

    let expected = hash_sorted_pair(&hash_sorted_pair(&leaves[0], &leaves[1]), &leaves[2]);
    assert_eq!(compute_root(&leaves).unwrap(), expected);
}

#[test]
fn test_proof_from_other_tree_fails() {
    let epoch_a = Epoch::new(1, three_entries()).unwrap();
    let mut other = three_entries();
    other.push(EligibilityEntry::new(id(0xd4), amount(1)));
    let epoch_b = Epoch::new(2, other).unwrap();

    let e = &three_entries()[1];
    let proof = epoch_a.proof_for(&e.identity, &e.amount).unwrap().proof;
    assert!(!verify(&e.identity, &e.amount, &proof, &epoch_b.root()));
}

#[test]
fn test_truncated_proof_fails() {
    let leaves: Vec<Hash> = (0..8u8).map(|i| hash_bytes(&[i])).collect();
    let tree = MerkleTree::build(&leaves).unwrap();
    let proof = tree.proof_for_leaf(&leaves[3]).unwrap();

    let truncated = MerkleProof::new(proof.siblings[..proof.len() - 1].to_vec());
    assert!(!truncated.verify(&leaves[3], &tree.root()));
}

#[test]
fn test_proof_length_bound() {
    for n in [1usize, 2, 3, 7, 8, 9, 100] {
        let leaves: Vec<Hash> = (0..n).map(|i| hash_bytes(&i.to_le_bytes())).collect();
        let tree = MerkleTree::build(&leaves).unwrap();
        let bound = (n as f64).log2().ceil() as usize;
        for position in 0..n {
            assert!(tree.proof(position).unwrap().len() <= bound);
        }
    }
}

// === Epoch tests ===

#[test]
fn test_epoch_root_independent_of_list_order() {
    let mut reordered = three_entries();
    reordered.reverse();

    let a = Epoch::new(1, three_entries()).unwrap();
    let b = Epoch::new(1, reordered).unwrap();
    assert_eq!(a.root(), b.root());
}

#[test]
fn test_epoch_unlisted_identity() {
    let epoch = Epoch::new(1, three_entries()).unwrap();
    assert!(matches!(
        epoch.proof_for(&id(0xee), &amount(100)),
        Err(CoreError::LeafNotFound { .. })
    ));
}

#[test]
fn test_proof_bundle_json() {
    let epoch = Epoch::new(1, three_entries()).unwrap();
    let e = &three_entries()[0];
    let bundle = epoch.proof_for(&e.identity, &e.amount).unwrap();

    let json = serde_json::to_value(&bundle).unwrap();
    assert!(json["root"].as_str().unwrap().starts_with("0x"));
    assert_eq!(json["proof"]["siblings"].as_array().unwrap().len(), bundle.proof.len());

    let back: dropclaim_core::ProofBundle = serde_json::from_value(json).unwrap();
    assert_eq!(back, bundle);
}
