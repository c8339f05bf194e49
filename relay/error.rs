//! Relay error types and the caller-facing rejection taxonomy

use core::fmt;

use dropclaim_core::types::CoreError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ports::{LedgerError, SourceError};

#[derive(Error, Debug)]
pub enum RelayError {
    #[error("Malformed request: {0}")]
    Malformed(String),

    #[error("Intent expired at {deadline} (now {now})")]
    Expired { deadline: u64, now: u64 },

    #[error("Nonce {0} is already reserved or consumed")]
    ReplayRejected(String),

    #[error("A claim for {0} is already in flight")]
    InFlight(String),

    #[error("Invalid signature: {0}")]
    SignatureInvalid(String),

    #[error("Not eligible: {0}")]
    NotEligible(String),

    #[error("Already claimed: {0}")]
    AlreadyClaimed(String),

    #[error("Proof source error: {0}")]
    Source(#[from] SourceError),

    #[error("Enforcement point error: {0}")]
    Ledger(LedgerError),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

pub type Result<T> = std::result::Result<T, RelayError>;

impl From<CoreError> for RelayError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::InvalidIdentity(_)
            | CoreError::InvalidAmount(_)
            | CoreError::AmountOverflow(_)
            | CoreError::Malformed(_) => Self::Malformed(err.to_string()),
            CoreError::SignatureInvalid(msg) => Self::SignatureInvalid(msg),
            CoreError::LeafNotFound { identity, amount } => {
                Self::NotEligible(format!("{} is not listed for {}", identity, amount))
            }
            CoreError::InvalidDomain(_) | CoreError::EmptyTree | CoreError::DuplicateIdentity(_) => {
                Self::Configuration(err.to_string())
            }
        }
    }
}

impl From<LedgerError> for RelayError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::AlreadyClaimed(identity) => Self::AlreadyClaimed(identity.to_string()),
            other => Self::Ledger(other),
        }
    }
}

/// Rejection categories reported to callers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionKind {
    Malformed,
    Expired,
    ReplayRejected,
    SignatureInvalid,
    NotEligible,
    AlreadyClaimed,
    SubmissionFailed,
    Configuration,
}

impl fmt::Display for RejectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Malformed => "malformed",
            Self::Expired => "expired",
            Self::ReplayRejected => "replay_rejected",
            Self::SignatureInvalid => "signature_invalid",
            Self::NotEligible => "not_eligible",
            Self::AlreadyClaimed => "already_claimed",
            Self::SubmissionFailed => "submission_failed",
            Self::Configuration => "configuration",
        };
        f.write_str(s)
    }
}

/// What a caller sees when a submission is turned away
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rejection {
    pub kind: RejectionKind,
    pub message: String,
    /// `true` when resubmitting the same intent later may succeed
    pub retryable: bool,
}

impl RelayError {
    pub fn kind(&self) -> RejectionKind {
        match self {
            Self::Malformed(_) => RejectionKind::Malformed,
            Self::Expired { .. } => RejectionKind::Expired,
            Self::ReplayRejected(_) | Self::InFlight(_) => RejectionKind::ReplayRejected,
            Self::SignatureInvalid(_) => RejectionKind::SignatureInvalid,
            Self::NotEligible(_) => RejectionKind::NotEligible,
            Self::AlreadyClaimed(_) => RejectionKind::AlreadyClaimed,
            Self::Source(_) | Self::Ledger(_) => RejectionKind::SubmissionFailed,
            Self::Configuration(_) => RejectionKind::Configuration,
        }
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Source(_) | Self::InFlight(_) => true,
            Self::Ledger(e) => e.is_retryable(),
            _ => false,
        }
    }

    /// Caller-facing view; collaborator error text stays in the logs
    pub fn rejection(&self) -> Rejection {
        let message = match self {
            Self::Source(_) => "eligibility service unavailable, try again later".to_string(),
            Self::Ledger(LedgerError::Reverted(_)) => "claim was reverted by the enforcement point".to_string(),
            Self::Ledger(_) => "enforcement point unreachable, try again later".to_string(),
            other => other.to_string(),
        };
        Rejection {
            kind: self.kind(),
            message,
            retryable: self.is_retryable(),
        }
    }
}
