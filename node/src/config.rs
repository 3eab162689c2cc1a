//! Node configuration with TOML file support.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;

use sortes_keystore::KdfParams;
use sortes_listener::JobSpec;

use crate::{LogFormat, NodeError};

/// The coordinator can only read the most recent 256 block hashes, so a
/// request must be fulfilled before its block falls out of that window.
const MAX_CONFIRMATION_CAP: u64 = 256;

/// Configuration for an oracle node.
///
/// Can be loaded from a TOML file via [`NodeConfig::from_toml_file`] or
/// built programmatically (e.g. for tests).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Log format: "human" or "json".
    #[serde(default = "default_log_format")]
    pub log_format: String,

    /// Log level filter: "trace", "debug", "info", "warn", "error".
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Directory holding encrypted VRF key files.
    #[serde(default = "default_keystore_dir")]
    pub keystore_dir: PathBuf,

    /// Argon2id cost for newly encrypted keys.
    #[serde(default)]
    pub kdf: KdfParams,

    /// Whether to collect Prometheus metrics.
    #[serde(default)]
    pub enable_metrics: bool,

    /// VRF jobs, one request listener each.
    #[serde(default)]
    pub jobs: Vec<JobSpec>,
}

// ── Serde default helpers ──────────────────────────────────────────────

fn default_log_format() -> String {
    "human".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_keystore_dir() -> PathBuf {
    PathBuf::from("./sortes_keys")
}

// ── Impl ───────────────────────────────────────────────────────────────

impl NodeConfig {
    /// Load configuration from a TOML file.
    pub fn from_toml_file(path: &str) -> Result<Self, NodeError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| NodeError::Config(format!("{path}: {e}")))?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml_str(s: &str) -> Result<Self, NodeError> {
        toml::from_str(s).map_err(|e| NodeError::Config(e.to_string()))
    }

    /// Serialize the configuration to a TOML string.
    pub fn to_toml_string(&self) -> Result<String, NodeError> {
        toml::to_string_pretty(self).map_err(|e| NodeError::Config(e.to_string()))
    }

    pub fn log_format(&self) -> Result<LogFormat, NodeError> {
        self.log_format.parse()
    }

    /// Reject configurations the listeners cannot run with.
    pub fn validate(&self) -> Result<(), NodeError> {
        self.log_format()?;
        let mut names = HashSet::new();
        for job in &self.jobs {
            let fail = |msg: &str| Err(NodeError::Config(format!("job {:?}: {msg}", job.name)));
            if job.name.is_empty() {
                return Err(NodeError::Config("job with empty name".into()));
            }
            if !names.insert(job.name.as_str()) {
                return fail("duplicate job name");
            }
            if job.public_key.is_zero() {
                return fail("public_key is the zero key");
            }
            if job.coordinator_address.is_zero() {
                return fail("coordinator_address is zero");
            }
            if job.from_addresses.is_empty() {
                return fail("from_addresses is empty");
            }
            let listener = &job.listener;
            if listener.confirmation_cap >= MAX_CONFIRMATION_CAP {
                return fail("confirmation_cap must be below 256");
            }
            if listener.min_incoming_confirmations > listener.confirmation_cap {
                return fail("min_incoming_confirmations exceeds confirmation_cap");
            }
            if listener.chunk_size == 0 {
                return fail("chunk_size must be positive");
            }
            if listener.mailbox_capacity == 0 {
                return fail("mailbox_capacity must be positive");
            }
            if listener.batch_gas_multiplier.is_nan() || listener.batch_gas_multiplier < 1.0 {
                return fail("batch_gas_multiplier must be at least 1.0");
            }
        }
        Ok(())
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            log_format: default_log_format(),
            log_level: default_log_level(),
            keystore_dir: default_keystore_dir(),
            kdf: KdfParams::default(),
            enable_metrics: false,
            jobs: Vec::new(),
        }
    }
}
