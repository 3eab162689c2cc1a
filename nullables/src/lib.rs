//! Nullable infrastructure for deterministic testing.
//!
//! Every chain-facing seam of the listener (clock, log and head
//! subscriptions, coordinator reads, transaction submission) has an
//! in-memory implementation here that:
//! - Returns deterministic values
//! - Can be controlled programmatically
//! - Never touches the network
//!
//! Usage: swap real implementations for nullables in tests.

pub mod chain;
pub mod clock;
pub mod coordinator;
pub mod tx;

pub use chain::{NullHeadBroadcaster, NullLogBroadcaster};
pub use clock::NullClock;
pub use coordinator::NullCoordinator;
pub use tx::NullTxSubmitter;
