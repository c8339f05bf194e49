//! Relay coordinator
//!
//! Drives each submission through
//! `Received -> DeadlineChecked -> NonceReserved -> SignatureVerified ->
//! EligibilityVerified -> NotYetClaimed -> Submitted -> {Confirmed | Failed}`.
//! Any failed step aborts the pipeline; the nonce reservation and the
//! recipient's in-flight slot are guards, so an abort (or a dropped future)
//! before `Submitted` leaves no state behind.

use std::sync::Arc;
use std::time::Duration;

use dropclaim_core::hash::to_hex;
use dropclaim_core::intent::{ClaimIntent, Nonce};
use dropclaim_core::leaf::Identity;
use dropclaim_core::signature::{verify_intent, ClaimSignature};
use dropclaim_core::verifier::verify;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, info_span, warn, Instrument};

use crate::config::RelayConfig;
use crate::error::{RelayError, Result};
use crate::history::{ClaimHistory, ClaimRecord, ClaimStats, ClaimStatus};
use crate::pending::{PendingAction, PendingActions, TrackingRef};
use crate::ports::{
    ClaimAction, Clock, EnforcementPoint, LedgerError, LedgerEvent, ProofLookup, ProofSource,
    SourceError, TxId, TxReceipt,
};
use crate::replay::{MemoryNonceStore, NonceState, NonceStore, ReplayGuard};
use crate::striped::Striped;

/// A signed intent as received from a claimant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimRequest {
    pub intent: ClaimIntent,
    pub signature: ClaimSignature,
}

/// Returned once the enforcement point has accepted the claim
///
/// Acceptance is not confirmation; poll [`RelayCoordinator::status`] with
/// the reference for the final outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionAck {
    pub reference: TrackingRef,
    pub tx: TxId,
    pub recipient: Identity,
    pub nonce: Nonce,
    pub submitted_at: u64,
}

/// Outcome for a transaction the relay has not recorded yet
struct EarlyOutcome {
    event: LedgerEvent,
    received_at: u64,
}

pub struct RelayCoordinator {
    config: RelayConfig,
    proofs: Arc<dyn ProofSource>,
    ledger: Arc<dyn EnforcementPoint>,
    clock: Arc<dyn Clock>,
    replay: ReplayGuard,
    pending: PendingActions,
    history: ClaimHistory,
    early: Striped<TxId, EarlyOutcome>,
}

impl RelayCoordinator {
    /// Validate configuration, check collaborators and start accepting claims
    pub async fn start(
        config: RelayConfig,
        proofs: Arc<dyn ProofSource>,
        ledger: Arc<dyn EnforcementPoint>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        Self::with_nonce_store(config, proofs, ledger, clock, Arc::new(MemoryNonceStore::new())).await
    }

    pub async fn with_nonce_store(
        config: RelayConfig,
        proofs: Arc<dyn ProofSource>,
        ledger: Arc<dyn EnforcementPoint>,
        clock: Arc<dyn Clock>,
        nonces: Arc<dyn NonceStore>,
    ) -> Result<Self> {
        config.validate()?;

        let root = proofs.current_root().await.map_err(|e| {
            warn!(error = %e, "proof source unreachable at startup");
            RelayError::Configuration(format!("proof source unreachable at startup: {}", e))
        })?;

        match ledger.root().await {
            Ok(ledger_root) if ledger_root != root => warn!(
                published = %to_hex(&root),
                enforced = %to_hex(&ledger_root),
                "published root differs from the enforcement point root"
            ),
            Ok(_) => debug!("published root matches the enforcement point"),
            Err(e) => warn!(error = %e, "could not read the enforcement point root"),
        }

        info!(
            domain = %config.domain.name,
            version = %config.domain.version,
            chain_id = config.domain.chain_id,
            root = %to_hex(&root),
            "relay coordinator started"
        );

        Ok(Self {
            config,
            proofs,
            ledger,
            clock,
            replay: ReplayGuard::new(nonces),
            pending: PendingActions::new(),
            history: ClaimHistory::new(),
            early: Striped::default(),
        })
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    /// Run a signed intent through the pipeline
    pub async fn submit(&self, request: ClaimRequest) -> Result<SubmissionAck> {
        let span = info_span!(
            "submit",
            recipient = %request.intent.recipient,
            nonce = %request.intent.nonce
        );

        async {
            let result = self.process(request).await;
            if let Err(e) = &result {
                self.history.record_rejected();
                warn!(kind = %e.kind(), error = %e, "submission rejected");
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn process(&self, request: ClaimRequest) -> Result<SubmissionAck> {
        let ClaimRequest { intent, signature } = request;

        intent.validate_shape()?;

        let now = self.clock.now();
        if intent.is_expired(now) {
            return Err(RelayError::Expired {
                deadline: intent.deadline,
                now,
            });
        }

        let reservation = self
            .replay
            .reserve(intent.nonce)
            .ok_or_else(|| RelayError::ReplayRejected(intent.nonce.to_string()))?;
        debug!("nonce reserved");

        verify_intent(&intent, &self.config.domain, &signature)?;
        debug!("signature verified");

        let bundle = match self.proofs.proof_for(&intent.recipient, &intent.amount).await? {
            ProofLookup::Found(bundle) => bundle,
            ProofLookup::NotEligible => {
                return Err(RelayError::NotEligible(format!(
                    "{} is not listed for {}",
                    intent.recipient, intent.amount
                )))
            }
        };
        if bundle.proof.len() > self.config.max_proof_len {
            return Err(SourceError::Inconsistent(format!(
                "proof of length {} exceeds the limit of {}",
                bundle.proof.len(),
                self.config.max_proof_len
            ))
            .into());
        }
        let published = self.proofs.current_root().await?;
        if bundle.root != published {
            return Err(SourceError::Inconsistent(format!(
                "proof is for root {} but {} is published",
                to_hex(&bundle.root),
                to_hex(&published)
            ))
            .into());
        }
        // Advisory: the enforcement point re-verifies against its own root
        if !verify(&intent.recipient, &intent.amount, &bundle.proof, &published) {
            return Err(RelayError::NotEligible(format!(
                "proof for {} does not reach the published root",
                intent.recipient
            )));
        }
        debug!(root = %to_hex(&published), "eligibility verified");

        if self.ledger.claimed(&intent.recipient).await? {
            return Err(RelayError::AlreadyClaimed(intent.recipient.to_string()));
        }

        let reference = TrackingRef::for_intent(&intent, &self.config.domain);
        let slot = self
            .pending
            .begin(reference, intent.recipient)
            .ok_or_else(|| RelayError::InFlight(intent.recipient.to_string()))?;

        let action = ClaimAction {
            reference,
            recipient: intent.recipient,
            amount: intent.amount,
            proof: bundle.proof,
            root: bundle.root,
        };
        let receipt = self.forward(&action).await?;

        // Submitted: from here only an outcome event or a timeout settles the nonce
        let nonce = reservation.hand_off();
        let submitted_at = self.clock.now();
        let pending = PendingAction {
            reference,
            recipient: intent.recipient,
            amount: intent.amount,
            nonce,
            tx: receipt.tx,
            submitted_at,
        };
        let early = self.early.with(&receipt.tx, |early| {
            self.history.record_submitted(&pending);
            slot.commit(pending);
            early.remove(&receipt.tx)
        });

        info!(tx = %receipt.tx, %reference, "claim submitted");
        if let Some(outcome) = early {
            debug!(tx = %receipt.tx, "applying outcome reported before the receipt");
            self.handle_event(outcome.event);
        }
        Ok(SubmissionAck {
            reference,
            tx: receipt.tx,
            recipient: intent.recipient,
            nonce,
            submitted_at,
        })
    }

    /// Send a claim to the enforcement point, retrying transient failures
    async fn forward(&self, action: &ClaimAction) -> std::result::Result<TxReceipt, LedgerError> {
        let policy = &self.config.retry;
        let mut attempt = 1;

        loop {
            let outcome = match timeout(policy.request_timeout, self.ledger.claim(action)).await {
                Ok(outcome) => outcome,
                Err(_) => Err(LedgerError::Timeout),
            };

            match outcome {
                Ok(receipt) => return Ok(receipt),
                Err(e) if e.is_retryable() && attempt < policy.max_attempts => {
                    warn!(attempt, max_attempts = policy.max_attempts, error = %e, "forward failed, retrying");
                    attempt += 1;
                    sleep(policy.retry_delay).await;
                }
                Err(e) => {
                    warn!(attempt, error = %e, "forward failed");
                    return Err(e);
                }
            }
        }
    }

    /// Apply an outcome reported by the enforcement point
    ///
    /// Duplicate and late events are absorbed; the returned status is the
    /// reference's status after the event. An event for a transaction the
    /// relay has not recorded reports `Unknown` and is held for up to the
    /// confirmation timeout in case its submission is still being recorded.
    pub fn handle_event(&self, event: LedgerEvent) -> ClaimStatus {
        let now = self.clock.now();
        let tx = event.tx();

        // `process` records a submission under this same lock
        let (action, reference) = self.early.with(&tx, |early| {
            if let Some(action) = self.pending.take_by_tx(&tx) {
                return (Some(action), None);
            }
            let reference = self.history.reference_for_tx(&tx);
            if reference.is_none() {
                early.insert(
                    tx,
                    EarlyOutcome {
                        event: event.clone(),
                        received_at: now,
                    },
                );
            }
            (None, reference)
        });

        match event {
            LedgerEvent::Claimed { tx, recipient, amount } => {
                if let Some(action) = action {
                    if !self.replay.consume(&action.nonce) {
                        warn!(%tx, nonce = %action.nonce, "confirmed nonce was not reserved");
                    }
                    self.history.record_confirmed(&action.reference, now);
                    info!(%tx, %recipient, %amount, reference = %action.reference, "claim confirmed");
                    return ClaimStatus::Confirmed;
                }

                match reference.and_then(|r| self.history.get(&r)) {
                    Some(record) if record.status == ClaimStatus::Confirmed => {
                        debug!(%tx, "duplicate confirmation ignored");
                        ClaimStatus::Confirmed
                    }
                    Some(record) => {
                        self.confirm_late(&record, tx, now);
                        ClaimStatus::Confirmed
                    }
                    None => {
                        warn!(%tx, %recipient, "confirmation for an unknown transaction");
                        ClaimStatus::Unknown
                    }
                }
            }
            LedgerEvent::Rejected { tx, reason } => {
                if let Some(action) = action {
                    self.replay.release(&action.nonce);
                    self.history
                        .record_failed(&action.reference, "rejected by the enforcement point", now);
                    warn!(%tx, %reason, reference = %action.reference, "claim rejected");
                    return self.history.status(&action.reference);
                }

                match reference {
                    Some(reference) => {
                        debug!(%tx, "late or duplicate rejection ignored");
                        self.history.status(&reference)
                    }
                    None => {
                        warn!(%tx, %reason, "rejection for an unknown transaction");
                        ClaimStatus::Unknown
                    }
                }
            }
        }
    }

    /// A claim we had already given up on went through after all
    ///
    /// The nonce is consumed even if a retry of the same intent holds it.
    fn confirm_late(&self, record: &ClaimRecord, tx: TxId, now: u64) {
        if record.tx != tx {
            if let Some(retry) = self.pending.take(&record.reference) {
                debug!(retry_tx = %retry.tx, "retry superseded by the earlier transaction");
            }
        }
        if self.replay.settle(&record.nonce) {
            debug!(nonce = %record.nonce, "nonce consumed by late confirmation");
        }
        self.history.record_confirmed(&record.reference, now);
        info!(%tx, reference = %record.reference, "late confirmation recorded");
    }

    /// Fail every pending claim older than the confirmation timeout
    pub fn expire_pending(&self) -> Vec<TrackingRef> {
        let now = self.clock.now();
        let window = self.config.confirmation_timeout.as_secs();
        self.early
            .for_each_shard(|early| early.retain(|_, o| now <= o.received_at.saturating_add(window)));

        let stale = self.pending.expired(now, window);

        stale
            .into_iter()
            .filter_map(|reference| {
                let action = self.pending.take(&reference)?;
                self.replay.release(&action.nonce);
                self.history.record_failed(&reference, "confirmation timed out", now);
                warn!(tx = %action.tx, %reference, "claim timed out awaiting confirmation");
                Some(reference)
            })
            .collect()
    }

    pub fn status(&self, reference: &TrackingRef) -> ClaimStatus {
        if self.pending.contains(reference) {
            ClaimStatus::Pending
        } else {
            self.history.status(reference)
        }
    }

    pub fn record(&self, reference: &TrackingRef) -> Option<ClaimRecord> {
        self.history.get(reference)
    }

    pub fn stats(&self) -> ClaimStats {
        self.history.stats()
    }

    pub fn nonce_state(&self, nonce: &Nonce) -> NonceState {
        self.replay.state(nonce)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Drop settled history older than the retention window
    pub fn prune_history(&self) -> usize {
        let removed = self
            .history
            .prune(self.clock.now(), self.config.history_retention.as_secs());
        if removed > 0 {
            debug!(removed, "pruned claim history");
        }
        removed
    }

    /// Periodically expire timed-out claims and prune history
    pub fn spawn_maintenance(self: &Arc<Self>, period: Duration) -> JoinHandle<()> {
        let coordinator = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                coordinator.expire_pending();
                coordinator.prune_history();
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetryPolicy;
    use crate::memory::{ManualClock, MemoryLedger, MemoryProofSource};
    use dropclaim_core::epoch::Epoch;
    use dropclaim_core::intent::ClaimDomain;
    use dropclaim_core::leaf::Amount;
    use dropclaim_core::signature::{identity_of, sign_intent};
    use dropclaim_core::types::EligibilityEntry;
    use k256::ecdsa::SigningKey;

    const NOW: u64 = 1_700_000_000;

    struct Fixture {
        coordinator: RelayCoordinator,
        ledger: Arc<MemoryLedger>,
        clock: Arc<ManualClock>,
        key: SigningKey,
    }

    fn domain() -> ClaimDomain {
        ClaimDomain::new("Dropclaim", "1", 1, Identity::new([0xcc; 20]))
    }

    async fn fixture() -> Fixture {
        let key = SigningKey::from_slice(&[0x11; 32]).unwrap();
        let epoch = Epoch::new(
            1,
            vec![
                EligibilityEntry::new(identity_of(&key), Amount::from(100u64)),
                EligibilityEntry::new(Identity::new([2; 20]), Amount::from(50u64)),
            ],
        )
        .unwrap();

        let ledger = Arc::new(MemoryLedger::for_epoch(Identity::new([0xff; 20]), &epoch));
        let clock = Arc::new(ManualClock::new(NOW));
        let config = RelayConfig::new(domain()).with_retry(RetryPolicy::immediate(1));
        let coordinator = RelayCoordinator::start(
            config,
            Arc::new(MemoryProofSource::new(epoch)),
            ledger.clone(),
            clock.clone(),
        )
        .await
        .unwrap();

        Fixture {
            coordinator,
            ledger,
            clock,
            key,
        }
    }

    fn request(key: &SigningKey, amount: u64, nonce: u64) -> ClaimRequest {
        let intent = ClaimIntent::new(identity_of(key), Amount::from(amount), Nonce::from(nonce), NOW + 3600);
        let signature = sign_intent(&intent, &domain(), key).unwrap();
        ClaimRequest { intent, signature }
    }

    #[tokio::test]
    async fn test_submit_and_confirm() {
        let f = fixture().await;
        let ack = f.coordinator.submit(request(&f.key, 100, 1)).await.unwrap();

        assert_eq!(f.coordinator.status(&ack.reference), ClaimStatus::Pending);
        assert_eq!(f.coordinator.nonce_state(&ack.nonce), NonceState::Reserved);

        let event = f.ledger.finalize_next().unwrap();
        assert_eq!(f.coordinator.handle_event(event.clone()), ClaimStatus::Confirmed);
        assert_eq!(f.coordinator.status(&ack.reference), ClaimStatus::Confirmed);
        assert_eq!(f.coordinator.nonce_state(&ack.nonce), NonceState::Consumed);

        // Duplicate confirmation is a no-op
        assert_eq!(f.coordinator.handle_event(event), ClaimStatus::Confirmed);
        assert_eq!(f.coordinator.stats().confirmed, 1);
    }

    #[tokio::test]
    async fn test_wrong_amount_not_eligible_releases_nonce() {
        let f = fixture().await;
        let err = f.coordinator.submit(request(&f.key, 101, 2)).await.unwrap_err();

        assert!(matches!(err, RelayError::NotEligible(_)));
        assert_eq!(f.coordinator.nonce_state(&Nonce::from(2)), NonceState::Unused);
    }

    #[tokio::test]
    async fn test_expired_before_reservation() {
        let f = fixture().await;
        f.clock.advance(3601);
        let err = f.coordinator.submit(request(&f.key, 100, 3)).await.unwrap_err();

        assert!(matches!(err, RelayError::Expired { .. }));
        assert_eq!(f.coordinator.nonce_state(&Nonce::from(3)), NonceState::Unused);
        assert_eq!(f.coordinator.stats().rejected, 1);
    }

    #[tokio::test]
    async fn test_timeout_then_late_confirmation() {
        let f = fixture().await;
        let ack = f.coordinator.submit(request(&f.key, 100, 4)).await.unwrap();

        f.clock.advance(f.coordinator.config().confirmation_timeout.as_secs() + 1);
        assert_eq!(f.coordinator.expire_pending(), vec![ack.reference]);
        assert_eq!(f.coordinator.status(&ack.reference), ClaimStatus::Failed);
        assert_eq!(f.coordinator.nonce_state(&ack.nonce), NonceState::Unused);

        let event = f.ledger.finalize_next().unwrap();
        assert_eq!(f.coordinator.handle_event(event), ClaimStatus::Confirmed);
        assert_eq!(f.coordinator.status(&ack.reference), ClaimStatus::Confirmed);
        assert_eq!(f.coordinator.nonce_state(&ack.nonce), NonceState::Consumed);
    }

    #[tokio::test]
    async fn test_unknown_tx_event() {
        let f = fixture().await;
        let status = f.coordinator.handle_event(LedgerEvent::Rejected {
            tx: TxId(999),
            reason: "n/a".into(),
        });
        assert_eq!(status, ClaimStatus::Unknown);
    }
}
