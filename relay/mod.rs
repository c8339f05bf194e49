//! Dropclaim Relay
//!
//! Accepts signed claim intents, checks them against the published
//! eligibility root and forwards the survivors to the enforcement point.
//!
//! ## Submission Flow
//!
//! 1. **Shape and deadline**: malformed or expired intents are turned away
//!    before any state is touched.
//! 2. **Nonce reservation**: the intent's nonce is reserved; a concurrent
//!    duplicate is rejected on the spot.
//! 3. **Verification**: the signature must recover to the recipient, and the
//!    proof source must hold a proof for exactly `(recipient, amount)`.
//! 4. **Forwarding**: the claim goes to the enforcement point with bounded
//!    retries. The nonce stays reserved until the ledger reports an outcome.
//! 5. **Outcome**: `Claimed` consumes the nonce for good; `Rejected` or a
//!    confirmation timeout releases it so the same intent may be retried.

pub mod config;
pub mod coordinator;
pub mod error;
pub mod history;
pub mod logging;
pub mod memory;
pub mod pending;
pub mod ports;
pub mod replay;

mod striped;

pub use config::{RelayConfig, RetryPolicy};
pub use coordinator::{ClaimRequest, RelayCoordinator, SubmissionAck};
pub use error::{Rejection, RejectionKind, RelayError, Result};
pub use history::{ClaimHistory, ClaimStats, ClaimStatus};
pub use memory::{ManualClock, MemoryLedger, MemoryProofSource};
pub use pending::{PendingAction, PendingActions, TrackingRef};
pub use ports::{
    ClaimAction, Clock, EnforcementPoint, LedgerError, LedgerEvent, ProofLookup, ProofSource,
    SourceError, SystemClock, TxId, TxReceipt,
};
pub use replay::{MemoryNonceStore, NonceReservation, NonceState, NonceStore, ReplayGuard};
