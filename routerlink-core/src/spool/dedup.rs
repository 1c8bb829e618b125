//! Anti-Duplicate Filter
//!
//! Bounded, disk-persisted set of recently seen payload fingerprints. A
//! half-open connection can make the router retransmit data that was
//! already received and acknowledged; this filter is the last-resort
//! idempotency guard against those near-term retransmission storms. It
//! is not a security control: fingerprints are exact-match truncated
//! hashes, and false negatives across eviction are accepted.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::frame::payload_fingerprint;
use crate::store::{ChannelStore, StoreError};

/// Fingerprints remembered before the oldest is evicted.
pub const DEDUP_CAPACITY: usize = 20;

/// FIFO fingerprint ring with synchronous persistence.
pub struct DuplicateFilter {
    store: Arc<ChannelStore>,
    seen: Mutex<VecDeque<u32>>,
}

impl DuplicateFilter {
    /// Loads the persisted fingerprint set for this instance.
    pub fn new(store: Arc<ChannelStore>) -> Result<Self, StoreError> {
        let mut seen: VecDeque<u32> = store.load_fingerprints()?.into();
        while seen.len() > DEDUP_CAPACITY {
            seen.pop_front();
        }
        Ok(DuplicateFilter {
            store,
            seen: Mutex::new(seen),
        })
    }

    /// Membership test with insert-on-miss. Returns true when the
    /// payload was already seen within the eviction window. The full set
    /// is rewritten to the store after every insertion, under this
    /// filter's own lock.
    pub fn already_seen(&self, payload: &[u8]) -> Result<bool, StoreError> {
        let fingerprint = payload_fingerprint(payload);
        let mut seen = self.seen.lock();
        if seen.contains(&fingerprint) {
            debug!(
                fingerprint = %format_args!("{:08x}", fingerprint),
                "dropping duplicate payload"
            );
            return Ok(true);
        }

        seen.push_back(fingerprint);
        while seen.len() > DEDUP_CAPACITY {
            seen.pop_front();
        }
        let snapshot: Vec<u32> = seen.iter().copied().collect();
        self.store.replace_fingerprints(&snapshot)?;
        Ok(false)
    }

    /// Number of remembered fingerprints.
    pub fn len(&self) -> usize {
        self.seen.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.lock().is_empty()
    }
}
