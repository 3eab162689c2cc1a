//! Seams to the chain-facing collaborators.
//!
//! The listener never talks to a chain client directly. Log and head
//! subscriptions, coordinator reads and transaction submission all go
//! through these traits so the node can wire real clients and tests can
//! wire the in-memory ones.

use async_trait::async_trait;
use sortes_types::{Address, Head, RawLog, RequestId, TxHash, U256};
use std::fmt;
use std::sync::Arc;

use crate::ListenerError;

/// Receiver side of a log subscription.
pub trait LogSink: Send + Sync {
    /// Called for every log, possibly more than once. Must not block.
    fn handle_log(&self, log: RawLog);

    /// The source is about to replay history from an earlier block.
    fn on_replay_started(&self);
}

/// Receiver side of a head subscription.
pub trait HeadSink: Send + Sync {
    fn on_new_head(&self, head: Head);
}

/// Handle returned by a subscription; calling it ends the subscription.
pub struct Unsubscribe(Box<dyn FnOnce() + Send + Sync>);

impl Unsubscribe {
    pub fn new(f: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self(Box::new(f))
    }

    pub fn noop() -> Self {
        Self::new(|| {})
    }

    pub fn call(self) {
        (self.0)()
    }
}

impl fmt::Debug for Unsubscribe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Unsubscribe")
    }
}

/// At-least-once log delivery with per-log consumption tracking.
#[async_trait]
pub trait LogBroadcaster: Send + Sync {
    /// Subscribe to logs emitted by `coordinator`.
    fn register(&self, coordinator: Address, sink: Arc<dyn LogSink>) -> Unsubscribe;

    async fn was_already_consumed(&self, log: &RawLog) -> Result<bool, ListenerError>;

    async fn mark_consumed(&self, log: &RawLog) -> Result<(), ListenerError>;
}

pub trait HeadBroadcaster: Send + Sync {
    /// Subscribe to new heads. Returns the current head, if known.
    fn subscribe(&self, sink: Arc<dyn HeadSink>) -> (Option<Head>, Unsubscribe);
}

/// A subscription's funds as the coordinator reports them.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Subscription {
    pub balance: U256,
}

/// Read-only view of the coordinator contract.
#[async_trait]
pub trait CoordinatorReader: Send + Sync {
    /// For each id, whether the coordinator no longer holds a commitment
    /// for it. Results are positional.
    async fn is_fulfilled(&self, request_ids: &[RequestId]) -> Result<Vec<bool>, ListenerError>;

    /// The subscription `sub_id`, or `None` once it no longer exists
    /// (the coordinator call reverts for cancelled subscriptions).
    async fn subscription(&self, sub_id: u64) -> Result<Option<Subscription>, ListenerError>;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TxRequest {
    pub from: Address,
    pub to: Address,
    pub payload: Vec<u8>,
    pub gas_limit: u64,
    /// Requests this transaction fulfills.
    pub request_ids: Vec<RequestId>,
}

#[async_trait]
pub trait TxSubmitter: Send + Sync {
    async fn submit(&self, tx: TxRequest) -> Result<TxHash, ListenerError>;
}
