//! Property tests for tree construction and membership proofs

use std::collections::BTreeMap;

use dropclaim_core::leaf::{Amount, Identity};
use dropclaim_core::types::EligibilityEntry;
use dropclaim_core::verifier::verify;
use dropclaim_core::Epoch;
use primitive_types::U256;
use proptest::prelude::*;

/// Eligibility lists with unique identities
fn entries_strategy() -> impl Strategy<Value = Vec<EligibilityEntry>> {
    prop::collection::btree_map(any::<[u8; 20]>(), 1u64.., 1..48).prop_map(|map: BTreeMap<[u8; 20], u64>| {
        map.into_iter()
            .map(|(id, amount)| EligibilityEntry::new(Identity::new(id), Amount::from(amount)))
            .collect()
    })
}

proptest! {
    #[test]
    fn prop_every_listed_entry_verifies(entries in entries_strategy()) {
        let epoch = Epoch::new(1, entries.clone()).unwrap();
        for e in &entries {
            let bundle = epoch.proof_for(&e.identity, &e.amount).unwrap();
            prop_assert!(verify(&e.identity, &e.amount, &bundle.proof, &epoch.root()));
        }
    }

    #[test]
    fn prop_wrong_amount_never_verifies(entries in entries_strategy(), bump in 1u64..1000) {
        let epoch = Epoch::new(1, entries.clone()).unwrap();
        let e = &entries[0];
        let proof = epoch.proof_for(&e.identity, &e.amount).unwrap().proof;
        let forged = Amount::new(e.amount.value() + U256::from(bump));
        prop_assert!(!verify(&e.identity, &forged, &proof, &epoch.root()));
    }

    #[test]
    fn prop_root_ignores_list_order(entries in entries_strategy(), seed in any::<u64>()) {
        let mut shuffled = entries.clone();
        let len = shuffled.len();
        shuffled.rotate_left((seed as usize) % len);
        shuffled.reverse();

        let a = Epoch::new(1, entries).unwrap();
        let b = Epoch::new(1, shuffled).unwrap();
        prop_assert_eq!(a.root(), b.root());
    }

    #[test]
    fn prop_build_is_deterministic(entries in entries_strategy()) {
        let a = Epoch::new(1, entries.clone()).unwrap();
        let b = Epoch::new(1, entries).unwrap();
        prop_assert_eq!(a.root(), b.root());
    }

    #[test]
    fn prop_unlisted_identity_has_no_proof(entries in entries_strategy(), stranger in any::<[u8; 20]>()) {
        let stranger = Identity::new(stranger);
        prop_assume!(entries.iter().all(|e| e.identity != stranger));

        let epoch = Epoch::new(1, entries).unwrap();
        prop_assert!(epoch.proof_for(&stranger, &Amount::from(1u64)).is_err());
    }
}
