//! Claims forwarded to the enforcement point and awaiting an outcome

use core::fmt;
use core::str::FromStr;

use dropclaim_core::hash::{hash_from_hex, to_hex, Hash};
use dropclaim_core::intent::{ClaimDomain, ClaimIntent, Nonce};
use dropclaim_core::leaf::{Amount, Identity};
use dropclaim_core::types::CoreError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::ports::TxId;
use crate::striped::Striped;

/// Opaque handle a caller uses to poll a submission
///
/// It is the intent's signing digest, so resubmitting the identical intent
/// after a failure yields the same reference.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TrackingRef(Hash);

impl TrackingRef {
    pub fn for_intent(intent: &ClaimIntent, domain: &ClaimDomain) -> Self {
        Self(intent.signing_digest(domain))
    }

    pub const fn from_bytes(bytes: Hash) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &Hash {
        &self.0
    }
}

impl fmt::Display for TrackingRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&to_hex(&self.0))
    }
}

impl fmt::Debug for TrackingRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TrackingRef({})", self)
    }
}

impl FromStr for TrackingRef {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, CoreError> {
        hash_from_hex(s).map(Self)
    }
}

impl Serialize for TrackingRef {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for TrackingRef {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// A claim in the `Submitted` state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingAction {
    pub reference: TrackingRef,
    pub recipient: Identity,
    pub amount: Amount,
    pub nonce: Nonce,
    pub tx: TxId,
    /// Unix seconds
    pub submitted_at: u64,
}

/// Pending actions with recipient and transaction indexes
///
/// Each index is lock-striped on its own key. A recipient holds at most one
/// in-flight slot: it is taken before forwarding and freed when the outcome
/// arrives or the forward fails.
#[derive(Default)]
pub struct PendingActions {
    actions: Striped<TrackingRef, PendingAction>,
    in_flight: Striped<Identity, TrackingRef>,
    by_tx: Striped<TxId, TrackingRef>,
}

impl PendingActions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the in-flight slot for `recipient`
    ///
    /// `None` when another claim for the same recipient is already in flight.
    pub fn begin(&self, reference: TrackingRef, recipient: Identity) -> Option<InFlightSlot<'_>> {
        let taken = self.in_flight.with(&recipient, |slots| {
            if slots.contains_key(&recipient) {
                false
            } else {
                slots.insert(recipient, reference);
                true
            }
        });

        taken.then_some(InFlightSlot {
            pending: self,
            recipient,
            reference,
            armed: true,
        })
    }

    pub fn get(&self, reference: &TrackingRef) -> Option<PendingAction> {
        self.actions.with(reference, |map| map.get(reference).cloned())
    }

    pub fn contains(&self, reference: &TrackingRef) -> bool {
        self.actions.with(reference, |map| map.contains_key(reference))
    }

    /// Remove an action; only the first caller gets it
    pub fn take(&self, reference: &TrackingRef) -> Option<PendingAction> {
        let action = self.actions.with(reference, |map| map.remove(reference))?;
        self.by_tx.with(&action.tx, |map| map.remove(&action.tx));
        self.free_slot(&action.recipient, reference);
        Some(action)
    }

    pub fn take_by_tx(&self, tx: &TxId) -> Option<PendingAction> {
        let reference = self.by_tx.with(tx, |map| map.remove(tx))?;
        self.take(&reference)
    }

    /// References submitted more than `timeout_secs` before `now`
    pub fn expired(&self, now: u64, timeout_secs: u64) -> Vec<TrackingRef> {
        let mut stale = Vec::new();
        self.actions.for_each_shard(|map| {
            stale.extend(
                map.values()
                    .filter(|a| now > a.submitted_at.saturating_add(timeout_secs))
                    .map(|a| a.reference),
            );
        });
        stale
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn insert(&self, action: PendingAction) {
        let reference = action.reference;
        self.by_tx.with(&action.tx, |map| map.insert(action.tx, reference));
        self.actions.with(&reference, |map| map.insert(reference, action));
    }

    fn free_slot(&self, recipient: &Identity, reference: &TrackingRef) {
        self.in_flight.with(recipient, |slots| {
            if slots.get(recipient) == Some(reference) {
                slots.remove(recipient);
            }
        });
    }
}

/// A recipient's in-flight slot, freed on drop unless committed
#[must_use = "dropping the slot frees it"]
pub struct InFlightSlot<'a> {
    pending: &'a PendingActions,
    recipient: Identity,
    reference: TrackingRef,
    armed: bool,
}

impl InFlightSlot<'_> {
    /// Record the submitted action; the slot stays taken until it settles
    pub fn commit(mut self, action: PendingAction) {
        self.armed = false;
        self.pending.insert(action);
    }
}

impl Drop for InFlightSlot<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.pending.free_slot(&self.recipient, &self.reference);
        }
    }
}
