//! In-memory collaborators
//!
//! `MemoryProofSource` serves a published epoch, `MemoryLedger` plays the
//! enforcement point (independent proof check, permanent claimed flags,
//! operator-only root rotation) and `ManualClock` lets tests move time.
//! The CLI simulation runs on these as well.

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dropclaim_core::epoch::Epoch;
use dropclaim_core::hash::Hash;
use dropclaim_core::leaf::{Amount, Identity};
use dropclaim_core::types::{CoreError, EligibilityEntry};
use dropclaim_core::verifier::verify;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info};

use crate::ports::{
    ClaimAction, Clock, EnforcementPoint, LedgerError, LedgerEvent, ProofLookup, ProofSource,
    SourceError, TxId, TxReceipt,
};

/// Proof source backed by an [`Epoch`]
#[derive(Default)]
pub struct MemoryProofSource {
    epoch: RwLock<Option<Arc<Epoch>>>,
    offline: AtomicBool,
}

impl MemoryProofSource {
    pub fn new(epoch: Epoch) -> Self {
        Self {
            epoch: RwLock::new(Some(Arc::new(epoch))),
            offline: AtomicBool::new(false),
        }
    }

    /// Replace the served epoch
    pub fn publish(&self, epoch: Epoch) {
        info!(version = epoch.version(), entries = epoch.len(), "publishing eligibility epoch");
        *self.epoch.write() = Some(Arc::new(epoch));
    }

    pub fn epoch(&self) -> Option<Arc<Epoch>> {
        self.epoch.read().clone()
    }

    /// Simulate an outage
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn current(&self) -> Result<Arc<Epoch>, SourceError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(SourceError::Unavailable("memory proof source is offline".into()));
        }
        self.epoch().ok_or(SourceError::NoEpoch)
    }
}

#[async_trait]
impl ProofSource for MemoryProofSource {
    async fn proof_for(&self, identity: &Identity, amount: &Amount) -> Result<ProofLookup, SourceError> {
        match self.current()?.proof_for(identity, amount) {
            Ok(bundle) => Ok(ProofLookup::Found(bundle)),
            Err(CoreError::LeafNotFound { .. }) => Ok(ProofLookup::NotEligible),
            Err(e) => Err(SourceError::Inconsistent(e.to_string())),
        }
    }

    async fn current_root(&self) -> Result<Hash, SourceError> {
        Ok(self.current()?.root())
    }

    async fn public_list(&self) -> Result<Vec<EligibilityEntry>, SourceError> {
        Ok(self.current()?.entries().to_vec())
    }
}

#[derive(Debug, Clone)]
struct QueuedClaim {
    tx: TxId,
    recipient: Identity,
    amount: Amount,
}

struct LedgerState {
    root: Hash,
    version: u64,
    claimed: HashSet<Identity>,
    queue: VecDeque<QueuedClaim>,
    next_tx: u64,
    fail_next: u32,
    submissions: u64,
}

/// Enforcement point kept in memory
///
/// `claim` only queues a transaction. Outcomes are produced by
/// `finalize_next` / `finalize_all` / `reject`, which return the events the
/// relay would observe.
pub struct MemoryLedger {
    operator: Identity,
    state: Mutex<LedgerState>,
}

impl MemoryLedger {
    pub fn new(operator: Identity, root: Hash, version: u64) -> Self {
        Self {
            operator,
            state: Mutex::new(LedgerState {
                root,
                version,
                claimed: HashSet::new(),
                queue: VecDeque::new(),
                next_tx: 1,
                fail_next: 0,
                submissions: 0,
            }),
        }
    }

    pub fn for_epoch(operator: Identity, epoch: &Epoch) -> Self {
        Self::new(operator, epoch.root(), epoch.version())
    }

    /// Rotate the root; only the operator may, and only to a newer version
    pub fn set_root(&self, caller: &Identity, root: Hash, version: u64) -> Result<(), LedgerError> {
        if caller != &self.operator {
            return Err(LedgerError::Reverted("caller is not the operator".into()));
        }
        let mut state = self.state.lock();
        if version <= state.version {
            return Err(LedgerError::Reverted(format!(
                "epoch version {} is not newer than {}",
                version, state.version
            )));
        }
        state.root = root;
        state.version = version;
        info!(version, "enforcement root rotated");
        Ok(())
    }

    pub fn version(&self) -> u64 {
        self.state.lock().version
    }

    pub fn is_claimed(&self, identity: &Identity) -> bool {
        self.state.lock().claimed.contains(identity)
    }

    /// Fail the next `n` submissions with a transport error
    pub fn fail_next_submissions(&self, n: u32) {
        self.state.lock().fail_next = n;
    }

    /// Transactions waiting to be finalized
    pub fn queued(&self) -> usize {
        self.state.lock().queue.len()
    }

    /// Every `claim` call, including failed ones
    pub fn submissions(&self) -> u64 {
        self.state.lock().submissions
    }

    /// Execute the oldest queued transaction
    pub fn finalize_next(&self) -> Option<LedgerEvent> {
        let mut state = self.state.lock();
        let queued = state.queue.pop_front()?;
        if !state.claimed.insert(queued.recipient) {
            debug!(tx = %queued.tx, "claim reverted at execution: already claimed");
            return Some(LedgerEvent::Rejected {
                tx: queued.tx,
                reason: "already claimed".into(),
            });
        }
        Some(LedgerEvent::Claimed {
            tx: queued.tx,
            recipient: queued.recipient,
            amount: queued.amount,
        })
    }

    pub fn finalize_all(&self) -> Vec<LedgerEvent> {
        std::iter::from_fn(|| self.finalize_next()).collect()
    }

    /// Drop a queued transaction as if it reverted
    pub fn reject(&self, tx: TxId, reason: &str) -> Option<LedgerEvent> {
        let mut state = self.state.lock();
        let position = state.queue.iter().position(|q| q.tx == tx)?;
        state.queue.remove(position);
        Some(LedgerEvent::Rejected {
            tx,
            reason: reason.to_string(),
        })
    }
}

#[async_trait]
impl EnforcementPoint for MemoryLedger {
    async fn claimed(&self, identity: &Identity) -> Result<bool, LedgerError> {
        Ok(self.is_claimed(identity))
    }

    async fn claim(&self, action: &ClaimAction) -> Result<TxReceipt, LedgerError> {
        let mut state = self.state.lock();
        state.submissions += 1;

        if state.fail_next > 0 {
            state.fail_next -= 1;
            return Err(LedgerError::Transport("injected failure".into()));
        }
        if state.claimed.contains(&action.recipient) {
            return Err(LedgerError::AlreadyClaimed(action.recipient));
        }
        // Checked against the ledger's own root, never the relayer's
        if !verify(&action.recipient, &action.amount, &action.proof, &state.root) {
            return Err(LedgerError::Reverted("invalid proof".into()));
        }

        let tx = TxId(state.next_tx);
        state.next_tx += 1;
        state.queue.push_back(QueuedClaim {
            tx,
            recipient: action.recipient,
            amount: action.amount,
        });
        debug!(%tx, recipient = %action.recipient, "claim queued");
        Ok(TxReceipt { tx })
    }

    async fn root(&self) -> Result<Hash, LedgerError> {
        Ok(self.state.lock().root)
    }
}

/// Clock that only moves when told to
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    pub fn new(now: u64) -> Self {
        Self {
            now: AtomicU64::new(now),
        }
    }

    pub fn set(&self, now: u64) {
        self.now.store(now, Ordering::SeqCst);
    }

    pub fn advance(&self, secs: u64) {
        self.now.fetch_add(secs, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pending::TrackingRef;
    use dropclaim_core::merkle::MerkleProof;

    fn entry(byte: u8, amount: u64) -> EligibilityEntry {
        EligibilityEntry::new(Identity::new([byte; 20]), Amount::from(amount))
    }

    fn epoch(version: u64) -> Epoch {
        Epoch::new(version, vec![entry(1, 100), entry(2, 50), entry(3, 200)]).unwrap()
    }

    fn action_for(epoch: &Epoch, byte: u8, amount: u64) -> ClaimAction {
        let recipient = Identity::new([byte; 20]);
        let amount = Amount::from(amount);
        let bundle = epoch.proof_for(&recipient, &amount).unwrap();
        ClaimAction {
            reference: TrackingRef::from_bytes([byte; 32]),
            recipient,
            amount,
            proof: bundle.proof,
            root: bundle.root,
        }
    }

    #[tokio::test]
    async fn test_proof_source_lookup() {
        let source = MemoryProofSource::new(epoch(1));

        let found = source.proof_for(&Identity::new([2; 20]), &Amount::from(50u64)).await.unwrap();
        assert!(matches!(found, ProofLookup::Found(_)));

        let wrong_amount = source.proof_for(&Identity::new([2; 20]), &Amount::from(51u64)).await.unwrap();
        assert_eq!(wrong_amount, ProofLookup::NotEligible);

        assert_eq!(source.public_list().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_proof_source_outage_and_empty() {
        let source = MemoryProofSource::default();
        assert_eq!(source.current_root().await, Err(SourceError::NoEpoch));

        source.publish(epoch(1));
        source.set_offline(true);
        assert!(matches!(source.current_root().await, Err(SourceError::Unavailable(_))));
    }

    #[tokio::test]
    async fn test_ledger_claim_and_finalize() {
        let e = epoch(1);
        let ledger = MemoryLedger::for_epoch(Identity::new([0xff; 20]), &e);
        let action = action_for(&e, 1, 100);

        let receipt = ledger.claim(&action).await.unwrap();
        assert_eq!(ledger.queued(), 1);
        assert!(!ledger.is_claimed(&action.recipient));

        let event = ledger.finalize_next().unwrap();
        assert_eq!(event.tx(), receipt.tx);
        assert!(matches!(event, LedgerEvent::Claimed { .. }));
        assert!(ledger.claimed(&action.recipient).await.unwrap());

        assert_eq!(
            ledger.claim(&action).await,
            Err(LedgerError::AlreadyClaimed(action.recipient))
        );
    }

    #[tokio::test]
    async fn test_ledger_double_queue_second_reverts() {
        let e = epoch(1);
        let ledger = MemoryLedger::for_epoch(Identity::new([0xff; 20]), &e);
        let action = action_for(&e, 2, 50);

        ledger.claim(&action).await.unwrap();
        ledger.claim(&action).await.unwrap();
        let events = ledger.finalize_all();
        assert!(matches!(events[0], LedgerEvent::Claimed { .. }));
        assert!(matches!(events[1], LedgerEvent::Rejected { .. }));
    }

    #[tokio::test]
    async fn test_ledger_reverifies_proof() {
        let e = epoch(1);
        let ledger = MemoryLedger::for_epoch(Identity::new([0xff; 20]), &e);

        let mut forged = action_for(&e, 1, 100);
        forged.amount = Amount::from(1_000u64);
        assert!(matches!(ledger.claim(&forged).await, Err(LedgerError::Reverted(_))));

        let mut empty = action_for(&e, 1, 100);
        empty.proof = MerkleProof::empty();
        assert!(ledger.claim(&empty).await.is_err());
    }

    #[tokio::test]
    async fn test_ledger_failure_injection() {
        let e = epoch(1);
        let ledger = MemoryLedger::for_epoch(Identity::new([0xff; 20]), &e);
        ledger.fail_next_submissions(2);
        let action = action_for(&e, 3, 200);

        assert!(matches!(ledger.claim(&action).await, Err(LedgerError::Transport(_))));
        assert!(matches!(ledger.claim(&action).await, Err(LedgerError::Transport(_))));
        assert!(ledger.claim(&action).await.is_ok());
        assert_eq!(ledger.submissions(), 3);
    }

    #[test]
    fn test_set_root_operator_only() {
        let operator = Identity::new([0xff; 20]);
        let e = epoch(1);
        let ledger = MemoryLedger::for_epoch(operator, &e);
        let next = epoch(2);

        assert!(ledger.set_root(&Identity::new([1; 20]), next.root(), 2).is_err());
        assert!(ledger.set_root(&operator, next.root(), 1).is_err());
        assert!(ledger.set_root(&operator, next.root(), 2).is_ok());
        assert_eq!(ledger.version(), 2);
    }

    #[test]
    fn test_reject_queued() {
        let ledger = MemoryLedger::new(Identity::new([0xff; 20]), [0u8; 32], 1);
        assert!(ledger.reject(TxId(9), "gone").is_none());
    }

    #[test]
    fn test_manual_clock() {
        let clock = ManualClock::new(1_000);
        clock.advance(5);
        assert_eq!(clock.now(), 1_005);
        clock.set(10);
        assert_eq!(clock.now(), 10);
    }
}
