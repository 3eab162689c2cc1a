//! Filtering of re-delivered logs.
//!
//! The log source delivers at least once, so the same log can arrive again
//! after a resubscription. A log is identified by block hash, block number and
//! index: the same event re-emitted on a different fork is a different log.

use parking_lot::Mutex;
use sortes_types::{LogKey, RawLog};
use std::collections::HashSet;

struct DedupState {
    seen: HashSet<LogKey>,
    last_prune_height: u64,
}

pub struct LogDeduper {
    state: Mutex<DedupState>,
    /// Keys this many blocks behind the newest log are forgotten on prune.
    lookback: u64,
    /// Minimum block distance between prunes.
    prune_interval: u64,
}

impl LogDeduper {
    pub fn new(lookback: u64, prune_interval: u64) -> Self {
        Self {
            state: Mutex::new(DedupState {
                seen: HashSet::new(),
                last_prune_height: 0,
            }),
            lookback,
            prune_interval,
        }
    }

    /// Returns `true` the first time a log is seen and `false` for repeats.
    pub fn should_deliver(&self, log: &RawLog) -> bool {
        let key = log.key();
        let mut state = self.state.lock();
        if !state.seen.insert(key) {
            return false;
        }

        if log.block_number.saturating_sub(state.last_prune_height) > self.prune_interval {
            let horizon = log.block_number.saturating_sub(self.lookback);
            state.seen.retain(|k| k.block_number >= horizon);
            state.last_prune_height = log.block_number;
        }
        true
    }

    /// Forget everything, e.g. before the log source replays history.
    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.seen.clear();
        state.last_prune_height = 0;
    }

    pub fn len(&self) -> usize {
        self.state.lock().seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
