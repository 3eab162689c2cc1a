//! Requests waiting for confirmations.
//!
//! Entries live in a slot arena: removal leaves a hole that the next push
//! reuses, so draining is a single pass with no shifting.

use sortes_types::{RawLog, RequestId, Timestamp};
use std::collections::HashSet;

use crate::events::RandomWordsRequested;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PendingRequest {
    /// Block at which enough confirmations will have accrued.
    pub confirmed_at_block: u64,
    pub request: RandomWordsRequested,
    pub log: RawLog,
    pub first_seen: Timestamp,
    pub attempts: u32,
    pub last_try: Timestamp,
}

#[derive(Default)]
pub struct PendingQueue {
    slots: Vec<Option<PendingRequest>>,
    free: Vec<usize>,
    len: usize,
}

impl PendingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, request: PendingRequest) -> usize {
        self.len += 1;
        match self.free.pop() {
            Some(index) => {
                self.slots[index] = Some(request);
                index
            }
            None => {
                self.slots.push(Some(request));
                self.slots.len() - 1
            }
        }
    }

    /// Remove and return every entry matching `pred`, in slot order.
    pub fn drain_where<F>(&mut self, mut pred: F) -> Vec<PendingRequest>
    where
        F: FnMut(&PendingRequest) -> bool,
    {
        let mut out = Vec::new();
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if slot.as_ref().is_some_and(&mut pred) {
                if let Some(request) = slot.take() {
                    out.push(request);
                    self.free.push(index);
                }
            }
        }
        self.len -= out.len();
        if self.len == 0 {
            self.slots.clear();
            self.free.clear();
        }
        out
    }

    pub fn iter(&self) -> impl Iterator<Item = &PendingRequest> {
        self.slots.iter().flatten()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    /// Distinct request ids queued. A request re-emitted after a reorg or
    /// replay has one entry per log but counts once here.
    pub fn unique_request_count(&self) -> usize {
        self.iter()
            .map(|r| r.request.request_id)
            .collect::<HashSet<RequestId>>()
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}
