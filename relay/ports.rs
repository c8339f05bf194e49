//! Collaborator interfaces
//!
//! The coordinator never talks to a concrete proof service, ledger or clock;
//! it is handed trait objects so tests and simulations can substitute the
//! in-memory versions from [`crate::memory`].

use core::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use dropclaim_core::hash::Hash;
use dropclaim_core::leaf::{Amount, Identity};
use dropclaim_core::merkle::MerkleProof;
use dropclaim_core::types::{EligibilityEntry, ProofBundle};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::pending::TrackingRef;

/// Answer of the proof source for one (identity, amount) pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProofLookup {
    Found(ProofBundle),
    /// No entry matches exactly; a listed identity with another amount lands here too
    NotEligible,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SourceError {
    #[error("proof source unavailable: {0}")]
    Unavailable(String),

    #[error("no eligibility list has been published")]
    NoEpoch,

    #[error("proof source returned inconsistent data: {0}")]
    Inconsistent(String),
}

/// Where proofs and the published list come from
#[async_trait]
pub trait ProofSource: Send + Sync {
    async fn proof_for(&self, identity: &Identity, amount: &Amount) -> Result<ProofLookup, SourceError>;

    async fn current_root(&self) -> Result<Hash, SourceError>;

    /// Public list without proofs
    async fn public_list(&self) -> Result<Vec<EligibilityEntry>, SourceError>;
}

/// Ledger transaction id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TxId(pub u64);

impl fmt::Display for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tx#{}", self.0)
    }
}

/// A claim forwarded to the enforcement point
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimAction {
    pub reference: TrackingRef,
    pub recipient: Identity,
    pub amount: Amount,
    pub proof: MerkleProof,
    /// Root the proof was generated against (advisory; the ledger uses its own)
    pub root: Hash,
}

/// Acceptance of a claim into the ledger's queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxReceipt {
    pub tx: TxId,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// The ledger refused the claim; retrying the same call will not help
    #[error("reverted: {0}")]
    Reverted(String),

    /// The recipient's claim flag is already set
    #[error("already claimed by {0}")]
    AlreadyClaimed(Identity),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("request timed out")]
    Timeout,
}

impl LedgerError {
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Reverted(_) | Self::AlreadyClaimed(_))
    }
}

/// Outcome reported asynchronously by the enforcement point
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LedgerEvent {
    Claimed {
        tx: TxId,
        recipient: Identity,
        amount: Amount,
    },
    Rejected {
        tx: TxId,
        reason: String,
    },
}

impl LedgerEvent {
    pub fn tx(&self) -> TxId {
        match self {
            Self::Claimed { tx, .. } | Self::Rejected { tx, .. } => *tx,
        }
    }
}

/// The authoritative claim contract
#[async_trait]
pub trait EnforcementPoint: Send + Sync {
    async fn claimed(&self, identity: &Identity) -> Result<bool, LedgerError>;

    async fn claim(&self, action: &ClaimAction) -> Result<TxReceipt, LedgerError>;

    async fn root(&self) -> Result<Hash, LedgerError>;
}

/// Wall clock in unix seconds
pub trait Clock: Send + Sync {
    fn now(&self) -> u64;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0)
    }
}
