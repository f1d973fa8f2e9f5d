//! Error types for the provider runtime.
//!
//! Startup failures fall into two tiers:
//!
//! - [`ProviderError::Abortable`]: the state tracker could not be built.
//!   Nothing has been committed yet, so the caller may retry or exit.
//! - [`ProviderError::Fatal`]: anything from signer resolution through
//!   per-endpoint stack construction. The caller must terminate the process;
//!   no subset of endpoints is ever left serving.

use shared_types::{ApiInterface, EndpointKey, EndpointSummary};
use thiserror::Error;

use crate::chain_tracker::BlockTrackerConfig;

/// Errors from the chain adapter (parser, proxy, fetcher).
#[derive(Debug, Clone, Error)]
pub enum ChainError {
    /// No parser exists for this api interface name.
    #[error("unsupported api interface: {0}")]
    UnsupportedApiInterface(String),

    /// The interface is known but has no HTTP proxy.
    #[error("no chain proxy available for api interface {0}")]
    NoProxyForInterface(ApiInterface),

    /// The proxy needs at least one connection.
    #[error("parallel connections must be at least 1")]
    InvalidParallelConnections,

    /// The node URL could not be parsed.
    #[error("invalid node url {url}: {reason}")]
    InvalidNodeUrl { url: String, reason: String },

    /// Transport-level failure talking to the node.
    #[error("transport error: {0}")]
    Transport(String),

    /// The node answered with a JSON-RPC error object.
    #[error("node returned rpc error {code}: {message}")]
    Rpc { code: i64, message: String },

    /// The node answered with something we could not interpret.
    #[error("unexpected node response: {0}")]
    UnexpectedResponse(String),
}

/// Errors from the block tracker.
#[derive(Debug, Clone, Error)]
pub enum TrackerError {
    #[error("invalid tracker config: {0}")]
    InvalidConfig(String),

    #[error("fetching blocks failed: {0}")]
    Fetch(#[from] ChainError),

    /// Requested range is outside the saved window.
    #[error("block range {from}..={to} outside tracked window (latest {latest})")]
    OutOfRange { from: u64, to: u64, latest: u64 },
}

/// Errors from signer identity resolution.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignerError {
    #[error("no signing key name configured")]
    MissingKeyName,

    #[error("key {0} not found in keyring")]
    KeyNotFound(String),

    #[error("invalid secret for key {name}: {reason}")]
    InvalidSecret { name: String, reason: String },

    #[error("malformed public key: {0}")]
    MalformedPublicKey(String),
}

/// Errors from the state tracker.
#[derive(Debug, Clone, Error)]
pub enum StateTrackerError {
    #[error("invalid transaction factory: {0}")]
    InvalidTxFactory(String),

    #[error("relay payment with no relays")]
    EmptyPayment,

    #[error("signer unavailable: {0}")]
    Signer(#[from] SignerError),
}

/// Errors from the session manager.
#[derive(Debug, Clone, Error)]
pub enum SessionError {
    #[error("epoch {epoch} is outside the retained window (current {current})")]
    EpochOutOfWindow { epoch: u64, current: u64 },

    #[error("consumer {consumer} is not paired with this provider at epoch {epoch}")]
    NotPaired { consumer: String, epoch: u64 },

    #[error("relay {relay_num} is not newer than {last} in session {session_id}")]
    RelayNumOutOfOrder {
        session_id: u64,
        relay_num: u64,
        last: u64,
    },

    #[error("pairing check failed: {0}")]
    Pairing(#[from] StateTrackerError),
}

/// Failures that must terminate the process.
///
/// Every per-endpoint variant carries the endpoint's identifying parameters.
#[derive(Debug, Error)]
pub enum FatalError {
    #[error("failed resolving signer identity: {0}")]
    Signer(#[from] SignerError),

    #[error("failed creating chain parser for [{endpoint}]: {source}")]
    ChainParser {
        endpoint: EndpointSummary,
        #[source]
        source: ChainError,
    },

    #[error("failed creating chain proxy for [{endpoint}] (parallel connections {parallel_connections}): {source}")]
    ChainProxy {
        endpoint: EndpointSummary,
        parallel_connections: u32,
        #[source]
        source: ChainError,
    },

    #[error("failed creating block tracker for [{endpoint}] with {config:?}: {source}")]
    BlockTracker {
        endpoint: EndpointSummary,
        config: BlockTrackerConfig,
        #[source]
        source: TrackerError,
    },

    #[error("endpoint key {key} configured twice, check config file [{endpoint}]")]
    DuplicateEndpoint {
        key: EndpointKey,
        endpoint: EndpointSummary,
    },
}

impl FatalError {
    /// The endpoint the failure originated from, if it is endpoint-scoped.
    #[must_use]
    pub fn endpoint(&self) -> Option<&EndpointSummary> {
        match self {
            Self::Signer(_) => None,
            Self::ChainParser { endpoint, .. }
            | Self::ChainProxy { endpoint, .. }
            | Self::BlockTracker { endpoint, .. }
            | Self::DuplicateEndpoint { endpoint, .. } => Some(endpoint),
        }
    }
}

/// Error returned by [`crate::RpcProvider`] startup.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// State tracker construction failed before any resources were committed.
    #[error("state tracker construction failed: {0}")]
    Abortable(#[source] StateTrackerError),

    /// A wiring failure; the process must exit.
    #[error("fatal: {0}")]
    Fatal(#[from] FatalError),
}

impl ProviderError {
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal(_))
    }

    /// Process exit code the binary reports for this error.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Abortable(_) => 1,
            Self::Fatal(_) => 2,
        }
    }
}
