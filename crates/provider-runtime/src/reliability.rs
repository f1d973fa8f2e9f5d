//! # Reliability Manager
//!
//! Answers data-reliability queries and takes part in commit/reveal dispute
//! votes, using the hashes held by one endpoint's block tracker.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use rand::Rng;
use sha2::{Digest, Sha256};
use shared_types::{BlockHashEntry, VoteParams, VoteResponse, VoteStage};
use tracing::{debug, info, warn};

use crate::ports::{BlockTracker, EpochUpdatable, ReliabilityManager, VoteUpdatable};

/// Epochs an unfinished vote is kept before it is dropped.
pub const VOTE_EPOCHS_TO_KEEP: u64 = 3;

/// Commitment to a block hash: `sha256(nonce_be ‖ hash)`.
#[must_use]
pub fn vote_commitment(nonce: u64, block_hash: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(nonce.to_be_bytes());
    hasher.update(block_hash.as_bytes());
    hasher.finalize().into()
}

#[derive(Debug, Clone)]
struct VoteState {
    nonce: u64,
    block_hash: String,
    /// Epoch during which the commit was made.
    epoch: u64,
    closed: bool,
}

pub struct ProviderReliabilityManager {
    tracker: Arc<dyn BlockTracker>,
    votes: Mutex<HashMap<String, VoteState>>,
    current_epoch: AtomicU64,
}

impl ProviderReliabilityManager {
    pub fn new(tracker: Arc<dyn BlockTracker>) -> Self {
        Self {
            tracker,
            votes: Mutex::new(HashMap::new()),
            current_epoch: AtomicU64::new(0),
        }
    }

    /// The block tracker backing this manager.
    #[must_use]
    pub fn tracker(&self) -> &Arc<dyn BlockTracker> {
        &self.tracker
    }

    /// Votes currently held, finished or not.
    #[must_use]
    pub fn tracked_votes(&self) -> usize {
        self.votes.lock().len()
    }

    fn commit(&self, params: &VoteParams) -> Option<VoteResponse> {
        if !self.tracker.is_within_memory(params.request_block) {
            warn!(
                vote_id = %params.vote_id,
                block = params.request_block,
                latest = self.tracker.latest_block_num(),
                "Vote block is outside tracker memory"
            );
            return None;
        }
        let block_hash = self.tracker.block_hash(params.request_block)?;
        let nonce: u64 = rand::thread_rng().gen();
        let commit = vote_commitment(nonce, &block_hash);

        self.votes.lock().insert(
            params.vote_id.clone(),
            VoteState {
                nonce,
                block_hash,
                epoch: self.current_epoch.load(Ordering::SeqCst),
                closed: false,
            },
        );
        info!(vote_id = %params.vote_id, chain_id = %params.chain_id, "Committed to vote");
        Some(VoteResponse::Commit {
            vote_id: params.vote_id.clone(),
            commit,
        })
    }

    fn reveal(&self, params: &VoteParams) -> Option<VoteResponse> {
        let votes = self.votes.lock();
        let Some(state) = votes.get(&params.vote_id) else {
            debug!(vote_id = %params.vote_id, "Reveal for a vote we never committed to");
            return None;
        };
        if state.closed {
            return None;
        }
        Some(VoteResponse::Reveal {
            vote_id: params.vote_id.clone(),
            nonce: state.nonce,
            block_hash: state.block_hash.clone(),
        })
    }
}

impl VoteUpdatable for ProviderReliabilityManager {
    fn vote_handler(&self, params: &VoteParams) -> Option<VoteResponse> {
        match params.stage {
            VoteStage::Commit => self.commit(params),
            VoteStage::Reveal => self.reveal(params),
            VoteStage::Closed => {
                if let Some(state) = self.votes.lock().get_mut(&params.vote_id) {
                    state.closed = true;
                }
                None
            }
        }
    }
}

impl EpochUpdatable for ProviderReliabilityManager {
    fn update_epoch(&self, epoch: u64) {
        self.current_epoch.fetch_max(epoch, Ordering::SeqCst);
        let oldest = epoch.saturating_sub(VOTE_EPOCHS_TO_KEEP);
        let mut votes = self.votes.lock();
        let before = votes.len();
        votes.retain(|_, state| !state.closed && state.epoch >= oldest);
        if votes.len() != before {
            debug!(epoch, pruned = before - votes.len(), "Pruned finished votes");
        }
    }
}

impl ReliabilityManager for ProviderReliabilityManager {
    fn latest_block(&self) -> u64 {
        self.tracker.latest_block_num()
    }

    fn finalization_data(&self) -> Vec<BlockHashEntry> {
        let latest = self.tracker.latest_block_num();
        let first = (latest + 1).saturating_sub(self.tracker.config().blocks_to_save);
        match self.tracker.latest_block_data(first, latest) {
            Ok((_, entries)) => entries,
            Err(e) => {
                warn!(error = %e, "Finalization data unavailable");
                Vec::new()
            }
        }
    }
}
