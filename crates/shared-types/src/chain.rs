//! # Chain Parameters
//!
//! Block-time and finality statistics reported by a chain spec.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Block statistics a chain parser reports for its chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockStats {
    /// Blocks a provider may lag behind before QoS sync flags it.
    pub allowed_block_lag: u32,
    /// Average time between blocks.
    pub average_block_time: Duration,
    /// Depth after which a block is considered irreversible.
    pub blocks_to_finalization: u32,
    /// Number of finalized block hashes carried in finalization data.
    pub blocks_in_finalization_data: u32,
}

impl BlockStats {
    /// Blocks needed to resolve a finality dispute.
    #[must_use]
    pub fn finality_window(&self) -> u64 {
        u64::from(self.blocks_to_finalization) + u64::from(self.blocks_in_finalization_data)
    }
}

/// On-chain spec metadata for one chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct ChainSpec {
    pub chain_id: String,
    pub average_block_time_ms: u64,
    pub blocks_to_finalization: u32,
    pub blocks_in_finalization_data: u32,
    #[serde(default)]
    pub allowed_block_lag: u32,
}

impl ChainSpec {
    /// Block statistics derived from this spec.
    #[must_use]
    pub fn block_stats(&self) -> BlockStats {
        BlockStats {
            allowed_block_lag: self.allowed_block_lag,
            average_block_time: Duration::from_millis(self.average_block_time_ms),
            blocks_to_finalization: self.blocks_to_finalization,
            blocks_in_finalization_data: self.blocks_in_finalization_data,
        }
    }
}

/// A block number paired with its hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHashEntry {
    pub block_num: u64,
    pub hash: String,
}
