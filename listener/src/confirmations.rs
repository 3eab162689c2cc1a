//! Confirmation escalation for re-requested ids.
//!
//! A request id that has already been fulfilled and then shows up again is
//! most likely a reorg replay. Each prior fulfillment doubles the
//! confirmations demanded, up to a cap.

use sortes_types::RequestId;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

/// `base * 2^dup_count`, saturating, then capped.
pub fn required_confirmations(base: u64, dup_count: u64, cap: u64) -> u64 {
    let factor = if dup_count >= u64::from(u64::BITS) {
        u64::MAX
    } else {
        1u64 << dup_count
    };
    base.saturating_mul(factor).min(cap)
}

/// Fulfillment counts per request id, forgotten after a block lookback.
pub struct ResponseCounter {
    counts: HashMap<RequestId, u64>,
    /// Min-heap of (fulfillment block, id) driving expiry.
    expiry: BinaryHeap<Reverse<(u64, RequestId)>>,
    lookback: u64,
}

impl ResponseCounter {
    pub fn new(lookback: u64) -> Self {
        Self {
            counts: HashMap::new(),
            expiry: BinaryHeap::new(),
            lookback,
        }
    }

    pub fn record(&mut self, request_id: RequestId, block_number: u64) {
        *self.counts.entry(request_id).or_insert(0) += 1;
        self.expiry.push(Reverse((block_number, request_id)));
    }

    pub fn count(&self, request_id: &RequestId) -> u64 {
        self.counts.get(request_id).copied().unwrap_or(0)
    }

    /// Drop every id with a fulfillment at or below `latest_head - lookback`.
    /// Any expiring fulfillment clears the id's whole count, including newer
    /// fulfillments still inside the window. Returns the number of heap
    /// entries removed.
    pub fn prune(&mut self, latest_head: u64) -> usize {
        let mut removed = 0;
        while let Some(Reverse((block, request_id))) = self.expiry.peek().copied() {
            if block.saturating_add(self.lookback) > latest_head {
                break;
            }
            self.expiry.pop();
            self.counts.remove(&request_id);
            removed += 1;
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }
}
