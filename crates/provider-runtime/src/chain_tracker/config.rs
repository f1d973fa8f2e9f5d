//! Block tracker sizing.

use std::time::Duration;

use shared_types::BlockStats;

use crate::error::TrackerError;

/// Blocks of history served on top of the finality requirement.
pub const DEFAULT_TRACKER_MEMORY: u64 = 100;

/// Shortest interval the poller will use, whatever the block time.
const MIN_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Whole milliseconds in `duration`, saturating at `u64::MAX`.
#[must_use]
pub fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Sizing parameters of one chain tracker.
///
/// Recomputed for every endpoint at startup and never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockTrackerConfig {
    /// Depth of history needed to resolve finality disputes.
    pub blocks_to_save: u64,
    pub average_block_time: Duration,
    /// How far behind the latest block the provider still serves.
    pub server_block_memory: u64,
}

impl BlockTrackerConfig {
    /// Derive the config from chain-reported finality parameters.
    ///
    /// `blocks_to_save = blocks_to_finalization + blocks_in_finalization_data`
    /// and `server_block_memory = default_memory + blocks_to_save`.
    #[must_use]
    pub fn derive(
        average_block_time: Duration,
        blocks_to_finalization: u32,
        blocks_in_finalization_data: u32,
        default_memory: u64,
    ) -> Self {
        let blocks_to_save =
            u64::from(blocks_to_finalization) + u64::from(blocks_in_finalization_data);
        Self {
            blocks_to_save,
            average_block_time,
            server_block_memory: default_memory.saturating_add(blocks_to_save),
        }
    }

    /// Derive from a parser's block stats using [`DEFAULT_TRACKER_MEMORY`].
    #[must_use]
    pub fn from_block_stats(stats: &BlockStats) -> Self {
        Self::derive(
            stats.average_block_time,
            stats.blocks_to_finalization,
            stats.blocks_in_finalization_data,
            DEFAULT_TRACKER_MEMORY,
        )
    }

    /// Reject configs a tracker cannot run with.
    pub fn validate(&self) -> Result<(), TrackerError> {
        if self.blocks_to_save == 0 {
            return Err(TrackerError::InvalidConfig(
                "blocks_to_save must be at least 1".into(),
            ));
        }
        if self.average_block_time.is_zero() {
            return Err(TrackerError::InvalidConfig(
                "average_block_time must be positive".into(),
            ));
        }
        Ok(())
    }

    /// Interval between polls of the chain head.
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        (self.average_block_time / 2).max(MIN_POLL_INTERVAL)
    }
}
