//! Single-slot hand-off of prepared chains to the audio thread.
//!
//! Producers publish under a short-held mutex. The consumer never waits: it
//! checks an atomic flag and uses `try_lock`, skipping the block if a
//! producer happens to hold the lock. A new proposal replaces any that has
//! not been adopted yet; the replaced chain is dropped on the producer's
//! thread.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::chain::RenderChain;

struct Slot {
    pending: Mutex<Option<Box<RenderChain>>>,
    has_pending: AtomicBool,
    superseded: AtomicU64,
}

/// Create a connected publisher/receiver pair
pub fn channel() -> (ChainPublisher, ChainReceiver) {
    let slot = Arc::new(Slot {
        pending: Mutex::new(None),
        has_pending: AtomicBool::new(false),
        superseded: AtomicU64::new(0),
    });
    (
        ChainPublisher {
            slot: Arc::clone(&slot),
        },
        ChainReceiver { slot },
    )
}

/// Producer side; clone freely
#[derive(Clone)]
pub struct ChainPublisher {
    slot: Arc<Slot>,
}

impl ChainPublisher {
    /// Offer a chain for adoption. Returns true if it replaced a proposal
    /// that was never adopted.
    pub fn publish(&self, chain: Box<RenderChain>) -> bool {
        let stale = {
            let mut pending = self.slot.pending.lock();
            let stale = pending.replace(chain);
            self.slot.has_pending.store(true, Ordering::Release);
            stale
        };
        match stale {
            Some(old) => {
                self.slot.superseded.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(version = old.version(), "unadopted chain proposal replaced");
                true
            }
            None => false,
        }
    }

    /// Drop any proposal that has not been adopted
    pub fn discard(&self) -> bool {
        let stale = {
            let mut pending = self.slot.pending.lock();
            self.slot.has_pending.store(false, Ordering::Release);
            pending.take()
        };
        stale.is_some()
    }

    pub fn has_pending(&self) -> bool {
        self.slot.has_pending.load(Ordering::Acquire)
    }

    /// Proposals replaced before the engine adopted them
    pub fn superseded(&self) -> u64 {
        self.slot.superseded.load(Ordering::Relaxed)
    }
}

/// Consumer side, owned by the audio thread
pub struct ChainReceiver {
    slot: Arc<Slot>,
}

impl ChainReceiver {
    /// Take the pending chain without blocking. `None` when nothing is
    /// pending or a producer currently holds the slot.
    pub fn try_take(&self) -> Option<Box<RenderChain>> {
        if !self.slot.has_pending.load(Ordering::Acquire) {
            return None;
        }
        let mut pending = self.slot.pending.try_lock()?;
        self.slot.has_pending.store(false, Ordering::Release);
        pending.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::{EffectChain, UnitSpec};

    fn prepared(kind: &str) -> Box<RenderChain> {
        let chain = EffectChain::build(&[UnitSpec::new(kind)]).unwrap();
        Box::new(chain.prepare(48000.0, 64))
    }

    #[test]
    fn second_proposal_wins() {
        let (publisher, receiver) = channel();
        let first = prepared("gain");
        let second = prepared("reverb");
        let second_version = second.version();

        assert!(!publisher.publish(first));
        assert!(publisher.publish(second));
        assert_eq!(publisher.superseded(), 1);

        let adopted = receiver.try_take().unwrap();
        assert_eq!(adopted.version(), second_version);
        assert!(receiver.try_take().is_none());
    }

    #[test]
    fn contended_slot_is_skipped() {
        let (publisher, receiver) = channel();
        publisher.publish(prepared("gain"));

        let guard = publisher.slot.pending.lock();
        assert!(receiver.try_take().is_none());
        drop(guard);

        assert!(receiver.try_take().is_some());
    }

    #[test]
    fn discard_clears_pending() {
        let (publisher, receiver) = channel();
        publisher.publish(prepared("delay"));
        assert!(publisher.has_pending());
        assert!(publisher.discard());
        assert!(!publisher.has_pending());
        assert!(receiver.try_take().is_none());
        assert!(!publisher.discard());
    }
}
