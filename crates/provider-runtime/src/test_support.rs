//! In-memory collaborators shared by unit tests.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use shared_types::{BlockHashEntry, PairingVerdict, RelayRequest};

use crate::chain_tracker::BlockTrackerConfig;
use crate::error::{StateTrackerError, TrackerError};
use crate::ports::{BlockTracker, ChainParser, EpochUpdatable, ReliabilityManager, StateTracker};

/// Pairs every consumer and accepts every payment.
#[derive(Default)]
pub struct NullStateTracker {
    pub payments: Mutex<Vec<Vec<RelayRequest>>>,
}

#[async_trait]
impl StateTracker for NullStateTracker {
    fn register_for_epoch_updates(&self, _: Arc<dyn EpochUpdatable>) {}

    fn register_chain_parser_for_spec_updates(&self, _: Arc<dyn ChainParser>, _: &str) {}

    fn register_reliability_manager_for_vote_updates(
        &self,
        _: Arc<dyn ReliabilityManager>,
        _: &str,
    ) {
    }

    async fn query_verify_pairing(
        &self,
        consumer: &str,
        block_height: u64,
    ) -> Result<PairingVerdict, StateTrackerError> {
        Ok(PairingVerdict {
            consumer: consumer.to_string(),
            valid: true,
            epoch: block_height,
        })
    }

    async fn tx_relay_payment(
        &self,
        requests: Vec<RelayRequest>,
    ) -> Result<String, StateTrackerError> {
        let mut payments = self.payments.lock();
        payments.push(requests);
        Ok(format!("tx-{}", payments.len()))
    }
}

/// Block tracker frozen at one head, saving `blocks_to_save` hashes.
pub struct FixedBlockTracker {
    latest: u64,
    config: BlockTrackerConfig,
}

impl FixedBlockTracker {
    pub fn new(latest: u64, config: BlockTrackerConfig) -> Self {
        Self { latest, config }
    }

    fn oldest(&self) -> u64 {
        (self.latest + 1).saturating_sub(self.config.blocks_to_save)
    }
}

impl BlockTracker for FixedBlockTracker {
    fn config(&self) -> &BlockTrackerConfig {
        &self.config
    }

    fn latest_block_num(&self) -> u64 {
        self.latest
    }

    fn block_hash(&self, block_num: u64) -> Option<String> {
        (self.oldest()..=self.latest)
            .contains(&block_num)
            .then(|| format!("0x{block_num:x}"))
    }

    fn latest_block_data(
        &self,
        from: u64,
        to: u64,
    ) -> Result<(u64, Vec<BlockHashEntry>), TrackerError> {
        if from < self.oldest() || to > self.latest || from > to {
            return Err(TrackerError::OutOfRange {
                from,
                to,
                latest: self.latest,
            });
        }
        let entries = (from..=to)
            .map(|block_num| BlockHashEntry {
                block_num,
                hash: format!("0x{block_num:x}"),
            })
            .collect();
        Ok((self.latest, entries))
    }

    fn is_within_memory(&self, block_num: u64) -> bool {
        block_num <= self.latest && self.latest - block_num <= self.config.server_block_memory
    }
}
