//! Claim outcome history and statistics

use std::collections::HashMap;

use dropclaim_core::intent::Nonce;
use dropclaim_core::leaf::{Amount, Identity};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::pending::{PendingAction, TrackingRef};
use crate::ports::TxId;

/// Status reported for a tracking reference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimStatus {
    Pending,
    Confirmed,
    Failed,
    Unknown,
}

impl ClaimStatus {
    pub fn is_settled(&self) -> bool {
        matches!(self, Self::Confirmed | Self::Failed)
    }
}

/// Last known state of one submission
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimRecord {
    pub reference: TrackingRef,
    pub recipient: Identity,
    pub amount: Amount,
    pub nonce: Nonce,
    pub tx: TxId,
    pub status: ClaimStatus,
    /// Why a claim failed
    pub reason: Option<String>,
    /// Unix seconds of the last transition
    pub updated_at: u64,
}

/// Aggregate counters over the relay's lifetime
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ClaimStats {
    /// Forwards accepted by the enforcement point (a retry counts again)
    pub submitted: u64,
    pub confirmed: u64,
    pub failed: u64,
    /// `submit` calls that returned an error, including forwards the
    /// enforcement point refused or never answered
    pub rejected: u64,
    /// `confirmed / submitted`
    pub success_rate: f64,
}

#[derive(Default)]
struct HistoryInner {
    records: HashMap<TrackingRef, ClaimRecord>,
    by_tx: HashMap<TxId, TrackingRef>,
    submitted: u64,
    confirmed: u64,
    failed: u64,
    rejected: u64,
}

#[derive(Default)]
pub struct ClaimHistory {
    inner: RwLock<HistoryInner>,
}

impl ClaimHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a forwarded claim as pending
    ///
    /// A reference that is already confirmed stays confirmed.
    pub fn record_submitted(&self, action: &PendingAction) {
        let mut inner = self.inner.write();
        inner.submitted += 1;
        inner.by_tx.insert(action.tx, action.reference);
        if inner.records.get(&action.reference).map(|r| r.status) == Some(ClaimStatus::Confirmed) {
            return;
        }
        inner.records.insert(
            action.reference,
            ClaimRecord {
                reference: action.reference,
                recipient: action.recipient,
                amount: action.amount,
                nonce: action.nonce,
                tx: action.tx,
                status: ClaimStatus::Pending,
                reason: None,
                updated_at: action.submitted_at,
            },
        );
    }

    /// Mark confirmed; `false` if unknown or already confirmed
    ///
    /// A record that had been failed by a timeout is flipped to confirmed.
    pub fn record_confirmed(&self, reference: &TrackingRef, at: u64) -> bool {
        let mut inner = self.inner.write();
        let previous = match inner.records.get_mut(reference) {
            Some(record) if record.status != ClaimStatus::Confirmed => {
                let previous = record.status;
                record.status = ClaimStatus::Confirmed;
                record.reason = None;
                record.updated_at = at;
                previous
            }
            _ => return false,
        };
        if previous == ClaimStatus::Failed {
            inner.failed = inner.failed.saturating_sub(1);
        }
        inner.confirmed += 1;
        true
    }

    /// Mark failed; only a pending record can fail
    pub fn record_failed(&self, reference: &TrackingRef, reason: &str, at: u64) -> bool {
        let mut inner = self.inner.write();
        match inner.records.get_mut(reference) {
            Some(record) if record.status == ClaimStatus::Pending => {
                record.status = ClaimStatus::Failed;
                record.reason = Some(reason.to_string());
                record.updated_at = at;
            }
            _ => return false,
        }
        inner.failed += 1;
        true
    }

    pub fn record_rejected(&self) {
        self.inner.write().rejected += 1;
    }

    pub fn status(&self, reference: &TrackingRef) -> ClaimStatus {
        self.inner
            .read()
            .records
            .get(reference)
            .map(|r| r.status)
            .unwrap_or(ClaimStatus::Unknown)
    }

    pub fn get(&self, reference: &TrackingRef) -> Option<ClaimRecord> {
        self.inner.read().records.get(reference).cloned()
    }

    pub fn record_for_tx(&self, tx: &TxId) -> Option<ClaimRecord> {
        let inner = self.inner.read();
        inner
            .by_tx
            .get(tx)
            .and_then(|reference| inner.records.get(reference))
            .filter(|record| record.tx == *tx)
            .cloned()
    }

    /// Reference `tx` was submitted for, even if a retry has replaced it
    pub fn reference_for_tx(&self, tx: &TxId) -> Option<TrackingRef> {
        self.inner.read().by_tx.get(tx).copied()
    }

    pub fn stats(&self) -> ClaimStats {
        let inner = self.inner.read();
        let success_rate = if inner.submitted == 0 {
            0.0
        } else {
            inner.confirmed as f64 / inner.submitted as f64
        };
        ClaimStats {
            submitted: inner.submitted,
            confirmed: inner.confirmed,
            failed: inner.failed,
            rejected: inner.rejected,
            success_rate,
        }
    }

    /// Drop settled records last updated more than `retention_secs` ago
    ///
    /// Counters are not affected. Returns the number of records removed.
    pub fn prune(&self, now: u64, retention_secs: u64) -> usize {
        let mut inner = self.inner.write();
        let before = inner.records.len();
        inner
            .records
            .retain(|_, r| !(r.status.is_settled() && now > r.updated_at.saturating_add(retention_secs)));

        let HistoryInner { records, by_tx, .. } = &mut *inner;
        by_tx.retain(|_, reference| records.contains_key(reference));

        before - records.len()
    }

    pub fn len(&self) -> usize {
        self.inner.read().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
