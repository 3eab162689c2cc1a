//! Raw chain event logs and chain heads.

use serde::{Deserialize, Serialize};

use crate::{Address, BlockHash, TxHash};

/// An undecoded event log as delivered by the chain's log broadcaster.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawLog {
    pub address: Address,
    pub topics: Vec<[u8; 32]>,
    pub data: Vec<u8>,
    pub block_hash: BlockHash,
    pub block_number: u64,
    pub tx_hash: TxHash,
    pub log_index: u64,
    /// Set when the log was removed by a reorg.
    #[serde(default)]
    pub removed: bool,
}

impl RawLog {
    pub fn key(&self) -> LogKey {
        LogKey {
            block_hash: self.block_hash,
            block_number: self.block_number,
            log_index: self.log_index,
        }
    }
}

/// Identity of a log occurrence. The same log re-emitted after a reorg
/// onto a different block hash is a different key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct LogKey {
    pub block_hash: BlockHash,
    pub block_number: u64,
    pub log_index: u64,
}

/// A new canonical chain head.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Head {
    pub number: u64,
    pub hash: BlockHash,
}

impl Head {
    pub fn new(number: u64, hash: BlockHash) -> Self {
        Self { number, hash }
    }
}
