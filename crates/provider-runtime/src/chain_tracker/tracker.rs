//! Polling chain tracker.

use std::collections::VecDeque;
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};
use shared_types::BlockHashEntry;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use crate::chain_tracker::BlockTrackerConfig;
use crate::error::TrackerError;
use crate::ports::{BlockTracker, ChainFetcher};

#[derive(Debug, Default)]
struct TrackerState {
    latest: u64,
    /// Oldest first, at most `blocks_to_save` entries.
    hashes: VecDeque<BlockHashEntry>,
}

/// Keeps the last `blocks_to_save` block hashes of one chain.
///
/// The poller task only holds a `Weak` handle, so dropping the last `Arc`
/// stops polling.
pub struct ChainTracker {
    fetcher: Arc<dyn ChainFetcher>,
    config: BlockTrackerConfig,
    state: RwLock<TrackerState>,
    poller: Mutex<Option<JoinHandle<()>>>,
}

impl ChainTracker {
    /// Fetch the initial window and start polling.
    pub async fn new(
        fetcher: Arc<dyn ChainFetcher>,
        config: BlockTrackerConfig,
    ) -> Result<Arc<Self>, TrackerError> {
        config.validate()?;

        let tracker = Arc::new(Self {
            fetcher,
            config,
            state: RwLock::new(TrackerState::default()),
            poller: Mutex::new(None),
        });
        tracker.refresh().await?;
        tracker.spawn_poller();
        Ok(tracker)
    }

    /// Pull the chain head; re-read the window if it moved or reorged.
    ///
    /// Returns whether the saved window changed.
    async fn refresh(&self) -> Result<bool, TrackerError> {
        let latest = self.fetcher.fetch_latest_block_num().await?;

        let known_top = {
            let state = self.state.read();
            state.hashes.back().cloned()
        };
        if let Some(top) = &known_top {
            if top.block_num == latest {
                let hash = self.fetcher.fetch_block_hash(latest).await?;
                if hash == top.hash {
                    return Ok(false);
                }
                debug!(block = latest, "Head hash changed, re-reading window");
            }
        }

        let first = latest.saturating_sub(self.config.blocks_to_save.saturating_sub(1));
        let window = usize::try_from(latest - first).map_or(0, |n| n.saturating_add(1));
        let mut hashes = VecDeque::with_capacity(window);
        for block_num in first..=latest {
            let hash = self.fetcher.fetch_block_hash(block_num).await?;
            hashes.push_back(BlockHashEntry { block_num, hash });
        }

        let mut state = self.state.write();
        state.latest = latest;
        state.hashes = hashes;
        Ok(true)
    }

    fn spawn_poller(self: &Arc<Self>) {
        let weak: Weak<Self> = Arc::downgrade(self);
        let interval = self.config.poll_interval();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // First tick completes immediately; the window is already fresh.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(tracker) = weak.upgrade() else {
                    break;
                };
                if let Err(e) = tracker.refresh().await {
                    warn!(error = %e, "Chain tracker poll failed");
                }
            }
        });
        *self.poller.lock() = Some(handle);
    }
}

impl Drop for ChainTracker {
    fn drop(&mut self) {
        if let Some(handle) = self.poller.get_mut().take() {
            handle.abort();
        }
    }
}

impl BlockTracker for ChainTracker {
    fn config(&self) -> &BlockTrackerConfig {
        &self.config
    }

    fn latest_block_num(&self) -> u64 {
        self.state.read().latest
    }

    fn block_hash(&self, block_num: u64) -> Option<String> {
        self.state
            .read()
            .hashes
            .iter()
            .find(|entry| entry.block_num == block_num)
            .map(|entry| entry.hash.clone())
    }

    fn latest_block_data(
        &self,
        from: u64,
        to: u64,
    ) -> Result<(u64, Vec<BlockHashEntry>), TrackerError> {
        let state = self.state.read();
        let oldest = state.hashes.front().map_or(state.latest, |e| e.block_num);
        if from > to || from < oldest || to > state.latest {
            return Err(TrackerError::OutOfRange {
                from,
                to,
                latest: state.latest,
            });
        }
        let entries = state
            .hashes
            .iter()
            .filter(|e| e.block_num >= from && e.block_num <= to)
            .cloned()
            .collect();
        Ok((state.latest, entries))
    }

    fn is_within_memory(&self, block_num: u64) -> bool {
        let latest = self.state.read().latest;
        block_num <= latest && latest - block_num <= self.config.server_block_memory
    }
}
