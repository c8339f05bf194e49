//! Nonce replay protection
//!
//! Every nonce is in exactly one of three states. `Consumed` is terminal and
//! is only reached on a confirmed claim: normally from `Reserved`, or through
//! `settle` when the confirmation arrives after the relay gave up waiting.
//!
//! ```text
//! Unused --reserve--> Reserved --consume--> Consumed
//!    ^                   |
//!    +------release------+
//!
//! Unused | Reserved --settle--> Consumed
//! ```

use std::sync::Arc;

use dropclaim_core::intent::Nonce;
use serde::{Deserialize, Serialize};

use crate::striped::Striped;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NonceState {
    Unused,
    Reserved,
    Consumed,
}

/// Backing store for nonce states
///
/// Each method is one atomic check-and-set on a single nonce.
pub trait NonceStore: Send + Sync {
    /// `Unused -> Reserved`; `false` if the nonce was not unused
    fn reserve(&self, nonce: &Nonce) -> bool;

    /// `Reserved -> Unused`; `false` if the nonce was not reserved
    fn release(&self, nonce: &Nonce) -> bool;

    /// `Reserved -> Consumed`; `false` if the nonce was not reserved
    fn consume(&self, nonce: &Nonce) -> bool;

    /// `Unused | Reserved -> Consumed`; `false` if it was already consumed
    ///
    /// A reservation that still holds the nonce loses it: its later release
    /// or consume is a no-op.
    fn settle(&self, nonce: &Nonce) -> bool;

    fn lookup(&self, nonce: &Nonce) -> NonceState;
}

/// In-memory nonce store with per-shard locking
///
/// Unused nonces are not stored.
#[derive(Default)]
pub struct MemoryNonceStore {
    states: Striped<Nonce, NonceState>,
}

impl MemoryNonceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_stripes(stripes: usize) -> Self {
        Self {
            states: Striped::new(stripes),
        }
    }

    /// Reserved plus consumed nonces
    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl NonceStore for MemoryNonceStore {
    fn reserve(&self, nonce: &Nonce) -> bool {
        self.states.with(nonce, |map| {
            if map.contains_key(nonce) {
                false
            } else {
                map.insert(*nonce, NonceState::Reserved);
                true
            }
        })
    }

    fn release(&self, nonce: &Nonce) -> bool {
        self.states.with(nonce, |map| {
            if map.get(nonce) == Some(&NonceState::Reserved) {
                map.remove(nonce);
                true
            } else {
                false
            }
        })
    }

    fn consume(&self, nonce: &Nonce) -> bool {
        self.states.with(nonce, |map| match map.get_mut(nonce) {
            Some(state) if *state == NonceState::Reserved => {
                *state = NonceState::Consumed;
                true
            }
            _ => false,
        })
    }

    fn settle(&self, nonce: &Nonce) -> bool {
        self.states
            .with(nonce, |map| map.insert(*nonce, NonceState::Consumed))
            != Some(NonceState::Consumed)
    }

    fn lookup(&self, nonce: &Nonce) -> NonceState {
        self.states
            .with(nonce, |map| map.get(nonce).copied())
            .unwrap_or(NonceState::Unused)
    }
}

/// Front door to a [`NonceStore`] handing out RAII reservations
#[derive(Clone)]
pub struct ReplayGuard {
    store: Arc<dyn NonceStore>,
}

impl ReplayGuard {
    pub fn new(store: Arc<dyn NonceStore>) -> Self {
        Self { store }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryNonceStore::new()))
    }

    /// Reserve `nonce`, or `None` if it is already reserved or consumed
    pub fn reserve(&self, nonce: Nonce) -> Option<NonceReservation> {
        self.store.reserve(&nonce).then(|| NonceReservation {
            nonce,
            store: Arc::clone(&self.store),
            armed: true,
        })
    }

    pub fn release(&self, nonce: &Nonce) -> bool {
        self.store.release(nonce)
    }

    pub fn consume(&self, nonce: &Nonce) -> bool {
        self.store.consume(nonce)
    }

    /// Consume a nonce whose claim is known to have succeeded
    pub fn settle(&self, nonce: &Nonce) -> bool {
        self.store.settle(nonce)
    }

    pub fn state(&self, nonce: &Nonce) -> NonceState {
        self.store.lookup(nonce)
    }
}

/// A reserved nonce that goes back to `Unused` when dropped
///
/// Dropping the reservation (an early return, a cancelled future) undoes
/// the reservation. Once the claim has been accepted by the ledger the
/// reservation is handed off and from then on only an outcome event or a
/// confirmation timeout may release or consume the nonce.
#[must_use = "dropping a reservation releases the nonce"]
pub struct NonceReservation {
    nonce: Nonce,
    store: Arc<dyn NonceStore>,
    armed: bool,
}

impl NonceReservation {
    pub fn nonce(&self) -> &Nonce {
        &self.nonce
    }

    /// Keep the nonce reserved past the lifetime of this guard
    pub fn hand_off(mut self) -> Nonce {
        self.armed = false;
        self.nonce
    }

    /// Mark the nonce consumed
    pub fn consume(mut self) -> bool {
        self.armed = false;
        self.store.consume(&self.nonce)
    }
}

impl Drop for NonceReservation {
    fn drop(&mut self) {
        if self.armed {
            self.store.release(&self.nonce);
        }
    }
}
