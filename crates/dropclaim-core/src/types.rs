//! Common types for Dropclaim
//!
//! Defines the eligibility entry, the proof bundle served to relayers and the
//! crate-wide error type.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::hash::Hash;
use crate::leaf::{Amount, Identity};
use crate::merkle::MerkleProof;

/// One row of an eligibility list
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EligibilityEntry {
    /// Recipient identity (20-byte address)
    pub identity: Identity,
    /// Reward amount
    pub amount: Amount,
}

impl EligibilityEntry {
    /// Create a new entry
    pub fn new(identity: Identity, amount: Amount) -> Self {
        Self { identity, amount }
    }

    /// Leaf hash of this entry
    pub fn leaf(&self) -> Hash {
        crate::leaf::hash_leaf(&self.identity, &self.amount)
    }
}

/// Inclusion proof together with the root it was generated against
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofBundle {
    /// Sibling hashes from leaf to root
    pub proof: MerkleProof,
    /// Root of the epoch the proof belongs to
    #[serde(with = "crate::serde_hex::hash")]
    pub root: Hash,
    /// Leaf hash the proof starts from
    #[serde(with = "crate::serde_hex::hash")]
    pub leaf: Hash,
}

/// Errors raised by the claim primitives
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// Identity could not be normalized to 20 bytes
    #[error("Invalid identity: {0}")]
    InvalidIdentity(String),

    /// Amount is not a decimal unsigned integer
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    /// Amount does not fit in 256 bits
    #[error("Amount overflows 256 bits: {0}")]
    AmountOverflow(String),

    /// Tree requested over zero leaves
    #[error("Cannot build a Merkle tree from zero leaves")]
    EmptyTree,

    /// (identity, amount) pair is not in the tree
    #[error("Leaf not found for {identity} / {amount}")]
    LeafNotFound { identity: String, amount: String },

    /// Eligibility list lists the same identity twice
    #[error("Duplicate identity in eligibility list: {0}")]
    DuplicateIdentity(String),

    /// Signature encoding or recovery failure
    #[error("Signature invalid: {0}")]
    SignatureInvalid(String),

    /// Signing domain is missing required parameters
    #[error("Invalid signing domain: {0}")]
    InvalidDomain(String),

    /// Structurally malformed input
    #[error("Malformed input: {0}")]
    Malformed(String),
}

pub type Result<T> = std::result::Result<T, CoreError>;
