//! # Relay, Pairing and Vote Payloads
//!
//! Values exchanged between the serving layer, the reward ledger and the
//! state tracker.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A consumer-signed claim for relayed compute units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayRequest {
    /// Consumer account that signed the claim.
    pub consumer: String,
    /// Provider account the claim pays.
    pub provider: String,
    pub chain_id: String,
    pub session_id: u64,
    /// Sequence number of the relay inside the session.
    pub relay_num: u64,
    /// Cumulative compute units consumed by the session so far.
    pub cu_sum: u64,
    /// Epoch the session belongs to.
    pub epoch: u64,
    pub block_height: u64,
    #[serde(default)]
    pub sig: Vec<u8>,
}

/// Result of a pairing verification query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairingVerdict {
    pub consumer: String,
    pub valid: bool,
    /// Epoch the verdict was evaluated against.
    pub epoch: u64,
}

/// Stage of a commit/reveal dispute vote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VoteStage {
    Commit,
    Reveal,
    /// The vote closed; local state may be discarded.
    Closed,
}

/// A dispute vote the provider is asked to take part in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteParams {
    pub vote_id: String,
    pub chain_id: String,
    /// Block whose hash is disputed.
    pub request_block: u64,
    pub stage: VoteStage,
}

/// The provider's answer to a vote event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum VoteResponse {
    Commit {
        vote_id: String,
        commit: [u8; 32],
    },
    Reveal {
        vote_id: String,
        nonce: u64,
        block_hash: String,
    },
}

impl VoteResponse {
    #[must_use]
    pub fn vote_id(&self) -> &str {
        match self {
            Self::Commit { vote_id, .. } | Self::Reveal { vote_id, .. } => vote_id,
        }
    }
}

impl fmt::Display for VoteResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Commit { vote_id, commit } => {
                write!(f, "commit vote={vote_id} hash={}", hex::encode(commit))
            }
            Self::Reveal {
                vote_id,
                nonce,
                block_hash,
            } => write!(f, "reveal vote={vote_id} nonce={nonce} block={block_hash}"),
        }
    }
}
