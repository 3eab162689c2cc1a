//! Randomness request listener.
//!
//! Watches a coordinator for randomness requests, waits until each has the
//! confirmations it needs, proves it with the job's VRF key and submits the
//! fulfillment, batching where a batch coordinator is configured.

pub mod backoff;
pub mod batch;
pub mod chain;
pub mod config;
pub mod confirmations;
pub mod dedup;
pub mod error;
pub mod events;
pub mod listener;
pub mod mailbox;
pub mod metrics;
pub mod payload;
pub mod pending;
pub mod pipeline;

pub use backoff::Backoff;
pub use batch::{BatchFulfillment, BatchFulfillments, FulfillmentRun};
pub use chain::{
    CoordinatorReader, HeadBroadcaster, HeadSink, LogBroadcaster, LogSink, Subscription,
    TxRequest, TxSubmitter, Unsubscribe,
};
pub use config::{JobSpec, ListenerConfig};
pub use confirmations::{required_confirmations, ResponseCounter};
pub use dedup::LogDeduper;
pub use error::ListenerError;
pub use events::{
    decode_log, fulfilled_topic, requested_topic, CoordinatorEvent, RandomWordsFulfilled,
    RandomWordsRequested,
};
pub use listener::{ListenerDeps, RequestListener};
pub use mailbox::Mailbox;
pub use metrics::{JobMetrics, ListenerMetrics};
pub use payload::{encode_batch_fulfill, encode_fulfill};
pub use pending::{PendingQueue, PendingRequest};
pub use pipeline::{FulfillmentPipeline, KeyStorePipeline, PipelineOutput};
