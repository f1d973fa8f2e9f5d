//! # Ports
//!
//! Contracts every collaborator of the orchestrator satisfies. The
//! orchestrator only ever holds these trait objects; concrete adapters live
//! in their own modules and are chosen by [`crate::wiring::ProviderComponents`].
//!
//! ```text
//!  ChainProxy ──→ ChainFetcher ──→ BlockTracker ──→ ReliabilityManager
//!                                                        ▲
//!  StateTracker ──epoch──→ SessionManager, RewardLedger  │
//!               ──spec───→ ChainParser                   │
//!               ──vote───────────────────────────────────┘
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use k256::ecdsa::SigningKey;
use serde_json::Value;
use shared_types::{
    ApiInterface, BlockHashEntry, BlockStats, ChainSpec, EndpointConfig, PairingVerdict,
    RelayRequest, VoteParams, VoteResponse,
};

use crate::chain_tracker::BlockTrackerConfig;
use crate::error::{ChainError, SessionError, SignerError, StateTrackerError, TrackerError};
use crate::server::{ServeContext, ServerHandle};

// =============================================================================
// EVENT OBSERVERS
// =============================================================================

/// Receives a notification at every epoch boundary.
pub trait EpochUpdatable: Send + Sync {
    fn update_epoch(&self, epoch: u64);
}

/// Receives on-chain spec changes for the chain it was registered for.
pub trait SpecUpdatable: Send + Sync {
    fn update_spec(&self, spec: &ChainSpec);
}

/// Receives dispute votes that need a response.
pub trait VoteUpdatable: Send + Sync {
    /// Returns the response to publish, if this stage needs one.
    fn vote_handler(&self, params: &VoteParams) -> Option<VoteResponse>;
}

// =============================================================================
// CHAIN ADAPTER
// =============================================================================

/// Parses chain capability metadata for one api interface.
pub trait ChainParser: SpecUpdatable {
    fn api_interface(&self) -> ApiInterface;

    /// Block-time and finality statistics for the current spec.
    fn block_stats(&self) -> BlockStats;
}

/// Forwards requests to the underlying chain node.
#[async_trait]
pub trait ChainProxy: Send + Sync {
    fn endpoint(&self) -> &EndpointConfig;

    fn api_interface(&self) -> ApiInterface;

    /// Send a JSON-RPC call and return its `result` member.
    async fn send_json_rpc(&self, method: &str, params: Value) -> Result<Value, ChainError>;

    /// Issue a REST GET against the node and return the decoded body.
    async fn send_rest(&self, path: &str) -> Result<Value, ChainError>;
}

/// Reads chain head data through a proxy.
#[async_trait]
pub trait ChainFetcher: Send + Sync {
    async fn fetch_latest_block_num(&self) -> Result<u64, ChainError>;

    async fn fetch_block_hash(&self, block_num: u64) -> Result<String, ChainError>;
}

// =============================================================================
// PER-ENDPOINT SERVICES
// =============================================================================

/// Rolling window of recent block hashes.
pub trait BlockTracker: Send + Sync {
    fn config(&self) -> &BlockTrackerConfig;

    fn latest_block_num(&self) -> u64;

    /// Hash of a block inside the saved window.
    fn block_hash(&self, block_num: u64) -> Option<String>;

    /// Latest block number plus the saved hashes in `from..=to`.
    fn latest_block_data(
        &self,
        from: u64,
        to: u64,
    ) -> Result<(u64, Vec<BlockHashEntry>), TrackerError>;

    /// Whether a block is recent enough to still be served.
    fn is_within_memory(&self, block_num: u64) -> bool;
}

/// Answers data-reliability queries and dispute votes for one chain.
pub trait ReliabilityManager: VoteUpdatable + EpochUpdatable {
    fn latest_block(&self) -> u64;

    /// Finalized hashes the provider attaches to a relay reply.
    fn finalization_data(&self) -> Vec<BlockHashEntry>;
}

/// Session and payment bookkeeping for one endpoint.
#[async_trait]
pub trait SessionManager: EpochUpdatable {
    fn endpoint(&self) -> &EndpointConfig;

    /// The state tracker pairings are verified against.
    fn state_tracker(&self) -> &Arc<dyn StateTracker>;

    fn current_epoch(&self) -> u64;

    /// Record a relay on a consumer session, opening it on first use.
    ///
    /// Returns the session's cumulative compute units.
    async fn record_relay(
        &self,
        consumer: &str,
        session_id: u64,
        epoch: u64,
        relay_num: u64,
        cu: u64,
    ) -> Result<u64, SessionError>;

    fn active_sessions(&self) -> usize;
}

/// Process-wide accumulator of relay payment claims.
#[async_trait]
pub trait RewardLedger: EpochUpdatable {
    /// The state tracker payments are submitted through.
    fn state_tracker(&self) -> &Arc<dyn StateTracker>;

    /// Store a claim. Returns `false` if a better claim for the same session
    /// is already held.
    fn send_new_proof(&self, proof: RelayRequest) -> bool;

    fn pending_claims(&self) -> usize;

    /// Submit every claim old enough to settle at `current_epoch`.
    ///
    /// Returns the number of claims submitted.
    async fn settle(&self, current_epoch: u64) -> Result<usize, StateTrackerError>;
}

// =============================================================================
// SHARED INFRASTRUCTURE
// =============================================================================

/// The node's sole channel to chain-level events and transactions.
///
/// Registration is one-shot at startup. Nothing is promised about the order
/// in which two registered components observe the same event.
#[async_trait]
pub trait StateTracker: Send + Sync {
    fn register_for_epoch_updates(&self, component: Arc<dyn EpochUpdatable>);

    fn register_chain_parser_for_spec_updates(
        &self,
        parser: Arc<dyn ChainParser>,
        chain_id: &str,
    );

    fn register_reliability_manager_for_vote_updates(
        &self,
        manager: Arc<dyn ReliabilityManager>,
        chain_id: &str,
    );

    async fn query_verify_pairing(
        &self,
        consumer: &str,
        block_height: u64,
    ) -> Result<PairingVerdict, StateTrackerError>;

    /// Submit a relay payment transaction; returns its id.
    async fn tx_relay_payment(&self, requests: Vec<RelayRequest>)
        -> Result<String, StateTrackerError>;
}

/// Named signing keys.
pub trait Keyring: Send + Sync {
    fn private_key(&self, name: &str) -> Result<SigningKey, SignerError>;

    /// SEC1-encoded public key bytes.
    fn public_key(&self, name: &str) -> Result<Vec<u8>, SignerError>;
}

/// The serving component of one endpoint.
pub trait RelayServer: Send + Sync {
    /// Start serving. Fire-and-forget: the server owns its own concurrency.
    fn serve(&self, ctx: ServeContext) -> ServerHandle;
}
