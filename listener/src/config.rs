//! Per-job listener configuration.

use serde::{Deserialize, Serialize};
use sortes_crypto::PublicKey;
use sortes_types::Address;
use std::time::Duration;

/// A VRF job: which key answers which coordinator, and from which accounts.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct JobSpec {
    pub name: String,
    pub public_key: PublicKey,
    pub coordinator_address: Address,
    /// Batch coordinator. Batching is used only when this is set and
    /// `listener.batch_fulfillment_enabled` is true.
    #[serde(default)]
    pub batch_coordinator_address: Option<Address>,
    /// Sending accounts, used round-robin.
    #[serde(default)]
    pub from_addresses: Vec<Address>,
    #[serde(default)]
    pub listener: ListenerConfig,
}

/// Tuning for a single request listener.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ListenerConfig {
    /// Node-wide floor on confirmations before a request is processed.
    #[serde(default = "default_min_incoming_confirmations")]
    pub min_incoming_confirmations: u64,

    /// Ceiling on escalated confirmations. The coordinator can only read
    /// the last 256 block hashes, so this must stay well below that.
    #[serde(default = "default_confirmation_cap")]
    pub confirmation_cap: u64,

    /// Added to each request's own minimum confirmations.
    #[serde(default)]
    pub requested_confs_delay: u64,

    /// Pending requests first seen longer ago than this are dropped.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    #[serde(default = "default_batch_fulfillment_enabled")]
    pub batch_fulfillment_enabled: bool,

    #[serde(default = "default_batch_gas_limit")]
    pub batch_gas_limit: u64,

    /// Safety factor applied to a batch's summed gas at submission.
    #[serde(default = "default_batch_gas_multiplier")]
    pub batch_gas_multiplier: f64,

    #[serde(default = "default_mailbox_capacity")]
    pub mailbox_capacity: usize,

    /// How long fulfillment counts are remembered, in blocks.
    #[serde(default = "default_response_lookback_blocks")]
    pub response_lookback_blocks: u64,

    #[serde(default = "default_dedup_lookback_blocks")]
    pub dedup_lookback_blocks: u64,

    #[serde(default = "default_dedup_prune_interval")]
    pub dedup_prune_interval: u64,

    #[serde(default = "default_poll_period_ms")]
    pub poll_period_ms: u64,

    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Zero disables retry backoff.
    #[serde(default)]
    pub backoff_initial_delay_secs: u64,

    #[serde(default = "default_backoff_max_delay_secs")]
    pub backoff_max_delay_secs: u64,

    /// Gas the coordinator spends verifying one proof, added to each
    /// request's callback gas limit.
    #[serde(default = "default_proof_verification_gas")]
    pub proof_verification_gas: u64,

    /// Gas price assumed when estimating the most a fulfillment can charge
    /// its subscription. A subscription whose balance cannot cover the
    /// estimate is left alone until it is topped up.
    #[serde(default = "default_max_gas_price_wei")]
    pub max_gas_price_wei: u64,
}

fn default_min_incoming_confirmations() -> u64 {
    3
}
fn default_confirmation_cap() -> u64 {
    200
}
fn default_request_timeout_secs() -> u64 {
    24 * 60 * 60
}
fn default_batch_fulfillment_enabled() -> bool {
    true
}
fn default_batch_gas_limit() -> u64 {
    2_500_000
}
fn default_batch_gas_multiplier() -> f64 {
    1.15
}
fn default_mailbox_capacity() -> usize {
    100_000
}
fn default_response_lookback_blocks() -> u64 {
    10_000
}
fn default_dedup_lookback_blocks() -> u64 {
    250
}
fn default_dedup_prune_interval() -> u64 {
    100
}
fn default_poll_period_ms() -> u64 {
    5_000
}
fn default_chunk_size() -> usize {
    20
}
fn default_backoff_max_delay_secs() -> u64 {
    60 * 60
}
fn default_proof_verification_gas() -> u64 {
    200_000
}
fn default_max_gas_price_wei() -> u64 {
    500_000_000_000
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            min_incoming_confirmations: default_min_incoming_confirmations(),
            confirmation_cap: default_confirmation_cap(),
            requested_confs_delay: 0,
            request_timeout_secs: default_request_timeout_secs(),
            batch_fulfillment_enabled: default_batch_fulfillment_enabled(),
            batch_gas_limit: default_batch_gas_limit(),
            batch_gas_multiplier: default_batch_gas_multiplier(),
            mailbox_capacity: default_mailbox_capacity(),
            response_lookback_blocks: default_response_lookback_blocks(),
            dedup_lookback_blocks: default_dedup_lookback_blocks(),
            dedup_prune_interval: default_dedup_prune_interval(),
            poll_period_ms: default_poll_period_ms(),
            chunk_size: default_chunk_size(),
            backoff_initial_delay_secs: 0,
            backoff_max_delay_secs: default_backoff_max_delay_secs(),
            proof_verification_gas: default_proof_verification_gas(),
            max_gas_price_wei: default_max_gas_price_wei(),
        }
    }
}

impl ListenerConfig {
    pub fn poll_period(&self) -> Duration {
        Duration::from_millis(self.poll_period_ms.max(1))
    }

    /// Gas limit for fulfilling a single request.
    pub fn fulfillment_gas(&self, callback_gas_limit: u32) -> u64 {
        u64::from(callback_gas_limit).saturating_add(self.proof_verification_gas)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_gives_defaults() {
        let config: ListenerConfig = toml::from_str("").unwrap();
        assert_eq!(config, ListenerConfig::default());
        assert_eq!(config.confirmation_cap, 200);
        assert_eq!(config.response_lookback_blocks, 10_000);
        assert_eq!(config.max_gas_price_wei, 500_000_000_000);
    }

    #[test]
    fn partial_toml_overrides() {
        let config: ListenerConfig = toml::from_str(
            r#"
            min_incoming_confirmations = 10
            batch_gas_limit = 1000
            "#,
        )
        .unwrap();
        assert_eq!(config.min_incoming_confirmations, 10);
        assert_eq!(config.batch_gas_limit, 1000);
        assert_eq!(config.chunk_size, 20);
    }

    #[test]
    fn poll_period_is_never_zero() {
        let config = ListenerConfig {
            poll_period_ms: 0,
            ..ListenerConfig::default()
        };
        assert_eq!(config.poll_period(), Duration::from_millis(1));
    }
}
