//! Nullable log and head sources.
//!
//! Tests push logs and heads in by hand; delivery is synchronous, straight
//! into the registered sinks.

use async_trait::async_trait;
use parking_lot::Mutex;
use sortes_listener::{HeadBroadcaster, HeadSink, ListenerError, LogBroadcaster, LogSink, Unsubscribe};
use sortes_types::{Address, BlockHash, Head, LogKey, RawLog};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

type LogSinks = Arc<Mutex<Vec<(u64, Address, Arc<dyn LogSink>)>>>;

/// Records consumption per log key and delivers emitted logs to every sink
/// registered for the emitting address.
#[derive(Default)]
pub struct NullLogBroadcaster {
    sinks: LogSinks,
    next_id: AtomicU64,
    consumed: Mutex<HashSet<LogKey>>,
    fail_consumption_checks: AtomicBool,
}

impl NullLogBroadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver a log to matching subscribers.
    pub fn emit(&self, log: RawLog) {
        let sinks: Vec<_> = self
            .sinks
            .lock()
            .iter()
            .filter(|(_, address, _)| *address == log.address)
            .map(|(_, _, sink)| Arc::clone(sink))
            .collect();
        for sink in sinks {
            sink.handle_log(log.clone());
        }
    }

    /// Tell every subscriber a replay is starting.
    pub fn start_replay(&self) {
        let sinks: Vec<_> = self.sinks.lock().iter().map(|(_, _, s)| Arc::clone(s)).collect();
        for sink in sinks {
            sink.on_replay_started();
        }
    }

    pub fn is_consumed(&self, log: &RawLog) -> bool {
        self.consumed.lock().contains(&log.key())
    }

    pub fn consumed_count(&self) -> usize {
        self.consumed.lock().len()
    }

    /// Make `was_already_consumed` fail until switched back.
    pub fn set_consumption_checks_failing(&self, failing: bool) {
        self.fail_consumption_checks.store(failing, Ordering::SeqCst);
    }

    pub fn subscriber_count(&self) -> usize {
        self.sinks.lock().len()
    }
}

#[async_trait]
impl LogBroadcaster for NullLogBroadcaster {
    fn register(&self, coordinator: Address, sink: Arc<dyn LogSink>) -> Unsubscribe {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.sinks.lock().push((id, coordinator, sink));
        let sinks = Arc::clone(&self.sinks);
        Unsubscribe::new(move || sinks.lock().retain(|(other, _, _)| *other != id))
    }

    async fn was_already_consumed(&self, log: &RawLog) -> Result<bool, ListenerError> {
        if self.fail_consumption_checks.load(Ordering::SeqCst) {
            return Err(ListenerError::ConsumptionCheck("nullable failure".into()));
        }
        Ok(self.is_consumed(log))
    }

    async fn mark_consumed(&self, log: &RawLog) -> Result<(), ListenerError> {
        self.consumed.lock().insert(log.key());
        Ok(())
    }
}

type HeadSinks = Arc<Mutex<Vec<(u64, Arc<dyn HeadSink>)>>>;

#[derive(Default)]
pub struct NullHeadBroadcaster {
    current: Mutex<Option<Head>>,
    sinks: HeadSinks,
    next_id: AtomicU64,
}

impl NullHeadBroadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with `number` as the current head.
    pub fn at(number: u64) -> Self {
        let broadcaster = Self::new();
        *broadcaster.current.lock() = Some(head(number));
        broadcaster
    }

    /// Publish a new head to every subscriber.
    pub fn new_head(&self, number: u64) {
        let head = head(number);
        *self.current.lock() = Some(head);
        let sinks: Vec<_> = self.sinks.lock().iter().map(|(_, s)| Arc::clone(s)).collect();
        for sink in sinks {
            sink.on_new_head(head);
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sinks.lock().len()
    }
}

fn head(number: u64) -> Head {
    let mut hash = [0u8; 32];
    hash[24..].copy_from_slice(&number.to_be_bytes());
    Head::new(number, BlockHash::new(hash))
}

impl HeadBroadcaster for NullHeadBroadcaster {
    fn subscribe(&self, sink: Arc<dyn HeadSink>) -> (Option<Head>, Unsubscribe) {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.sinks.lock().push((id, sink));
        let sinks = Arc::clone(&self.sinks);
        let current = *self.current.lock();
        (
            current,
            Unsubscribe::new(move || sinks.lock().retain(|(other, _)| *other != id)),
        )
    }
}
