//! Sortes oracle node. Owns the VRF key store and runs the listeners.
//!
//! The node is the central coordinator that:
//! - Loads and validates configuration
//! - Unlocks the encrypted VRF keys
//! - Runs one request listener per configured job
//! - Owns the metrics registry shared by every listener
//! - Shuts everything down cleanly on signal

pub mod config;
pub mod error;
pub mod logging;
pub mod node;
pub mod shutdown;

pub use config::NodeConfig;
pub use error::NodeError;
pub use logging::{init_logging, LogFormat};
pub use node::{ChainClients, OracleNode};
pub use shutdown::ShutdownController;
