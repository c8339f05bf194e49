//! Dropclaim Core - claim primitives for Merkle-gated reward drops
//!
//! This crate holds everything a claimant, a relayer and an enforcement point
//! must agree on bit for bit. None of it touches I/O or clocks.
//!
//! # Components
//!
//! - `hash` - Keccak256 helpers
//! - `leaf` - Identity/amount types and the 52-byte leaf encoding
//! - `merkle` - Sorted-pair Merkle tree with odd-node carry-up
//! - `verifier` - Stateless membership checks
//! - `epoch` - One published version of the eligibility list
//! - `intent` - Claim intents and their EIP-712 digest
//! - `signature` - secp256k1 signing and signer recovery
//! - `types` - Common types (EligibilityEntry, ProofBundle, CoreError)

pub mod hash;
pub mod leaf;
pub mod merkle;
pub mod verifier;
pub mod epoch;
pub mod intent;
pub mod signature;
pub mod types;

mod serde_hex;

// Re-exports for convenience
pub use hash::{keccak_hash, Hash, HASH_SIZE};
pub use leaf::{hash_leaf, Amount, Identity};
pub use merkle::{MerkleProof, MerkleTree};
pub use verifier::verify;
pub use epoch::Epoch;
pub use intent::{ClaimDomain, ClaimIntent, Nonce};
pub use signature::{recover_signer, sign_intent, verify_intent, ClaimSignature};
pub use types::{CoreError, EligibilityEntry, ProofBundle, Result};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::leaf::{Amount, Identity};
    pub use crate::merkle::{MerkleProof, MerkleTree};
    pub use crate::epoch::Epoch;
    pub use crate::intent::{ClaimDomain, ClaimIntent, Nonce};
    pub use crate::signature::ClaimSignature;
    pub use crate::types::{CoreError, EligibilityEntry, ProofBundle};
}
