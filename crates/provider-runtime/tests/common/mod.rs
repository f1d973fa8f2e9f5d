//! In-memory collaborators for driving `RpcProvider` end to end.
//!
//! Every construction and registration is appended to a shared [`Log`], so
//! tests can assert on ordering as well as on outcomes.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use shared_types::{
    ApiInterface, BlockHashEntry, BlockStats, ChainSpec, EndpointConfig, PairingVerdict,
    RelayRequest,
};

use provider_runtime::chain_tracker::BlockTrackerConfig;
use provider_runtime::error::{ChainError, StateTrackerError, TrackerError};
use provider_runtime::ports::{
    BlockTracker, ChainFetcher, ChainParser, ChainProxy, EpochUpdatable, RelayServer,
    ReliabilityManager, RewardLedger, SessionManager, SpecUpdatable, StateTracker,
};
use provider_runtime::reliability::ProviderReliabilityManager;
use provider_runtime::rewards::RewardServer;
use provider_runtime::session::ProviderSessionManager;
use provider_runtime::signer::{ClientContext, InMemoryKeyring};
use provider_runtime::{ProviderComponents, ServeContext, ServerHandle, TxFactory};

/// One observable step of the bootstrap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    StateTracker,
    RewardLedger,
    SessionManager(String),
    ChainParser(String),
    ChainProxy { address: String, parallel: u32 },
    ChainFetcher(String),
    BlockTracker(String, BlockTrackerConfig),
    ReliabilityManager(String),
    RegisterEpoch,
    RegisterSpec(String),
    RegisterVote(String),
    Serve(String),
}

pub type Log = Arc<Mutex<Vec<Step>>>;

pub fn count(log: &Log, pred: impl Fn(&Step) -> bool) -> usize {
    log.lock().iter().filter(|step| pred(step)).count()
}

pub fn position(log: &Log, step: &Step) -> Option<usize> {
    log.lock().iter().position(|s| s == step)
}

pub fn jsonrpc(address: &str, url: &str) -> EndpointConfig {
    EndpointConfig::new(address, "ETH1", "jsonrpc", url)
}

pub fn client_ctx(from: Option<&str>) -> ClientContext {
    let mut keyring = InMemoryKeyring::new();
    keyring.generate("provider");
    ClientContext {
        chain_id: "lava".into(),
        from: from.map(str::to_string),
        keyring: Arc::new(keyring),
    }
}

// =============================================================================
// STATE TRACKER
// =============================================================================

pub struct RecordingStateTracker {
    log: Log,
}

#[async_trait]
impl StateTracker for RecordingStateTracker {
    fn register_for_epoch_updates(&self, component: Arc<dyn EpochUpdatable>) {
        component.update_epoch(1);
        self.log.lock().push(Step::RegisterEpoch);
    }

    fn register_chain_parser_for_spec_updates(&self, _: Arc<dyn ChainParser>, chain_id: &str) {
        self.log.lock().push(Step::RegisterSpec(chain_id.to_string()));
    }

    fn register_reliability_manager_for_vote_updates(
        &self,
        _: Arc<dyn ReliabilityManager>,
        chain_id: &str,
    ) {
        self.log.lock().push(Step::RegisterVote(chain_id.to_string()));
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
        Ok(format!("tx-{}", requests.len()))
    }
}

// =============================================================================
// CHAIN ADAPTER
// =============================================================================

pub struct FixedParser {
    api: ApiInterface,
    stats: BlockStats,
}

impl SpecUpdatable for FixedParser {
    fn update_spec(&self, _: &ChainSpec) {}
}

impl ChainParser for FixedParser {
    fn api_interface(&self) -> ApiInterface {
        self.api
    }

    fn block_stats(&self) -> BlockStats {
        self.stats
    }
}

pub struct NullProxy {
    endpoint: EndpointConfig,
    api: ApiInterface,
}

#[async_trait]
impl ChainProxy for NullProxy {
    fn endpoint(&self) -> &EndpointConfig {
        &self.endpoint
    }

    fn api_interface(&self) -> ApiInterface {
        self.api
    }

    async fn send_json_rpc(&self, method: &str, _: Value) -> Result<Value, ChainError> {
        Err(ChainError::Transport(format!("{method}: no node")))
    }

    async fn send_rest(&self, path: &str) -> Result<Value, ChainError> {
        Err(ChainError::Transport(format!("{path}: no node")))
    }
}

pub struct NullFetcher;

#[async_trait]
impl ChainFetcher for NullFetcher {
    async fn fetch_latest_block_num(&self) -> Result<u64, ChainError> {
        Ok(100)
    }

    async fn fetch_block_hash(&self, block_num: u64) -> Result<String, ChainError> {
        Ok(format!("0x{block_num:x}"))
    }
}

pub struct FrozenTracker {
    config: BlockTrackerConfig,
}

impl BlockTracker for FrozenTracker {
    fn config(&self) -> &BlockTrackerConfig {
        &self.config
    }

    fn latest_block_num(&self) -> u64 {
        100
    }

    fn block_hash(&self, block_num: u64) -> Option<String> {
        (block_num <= 100).then(|| format!("0x{block_num:x}"))
    }

    fn latest_block_data(
        &self,
        from: u64,
        to: u64,
    ) -> Result<(u64, Vec<BlockHashEntry>), TrackerError> {
        Ok((
            100,
            (from..=to.min(100))
                .map(|block_num| BlockHashEntry {
                    block_num,
                    hash: format!("0x{block_num:x}"),
                })
                .collect(),
        ))
    }

    fn is_within_memory(&self, block_num: u64) -> bool {
        block_num <= 100 && 100 - block_num <= self.config.server_block_memory
    }
}

pub struct RecordingServer {
    log: Log,
    served: Arc<Mutex<Vec<ServeContext>>>,
}

impl RelayServer for RecordingServer {
    fn serve(&self, ctx: ServeContext) -> ServerHandle {
        self.log
            .lock()
            .push(Step::Serve(ctx.endpoint.network_address.clone()));
        self.served.lock().push(ctx);
        ServerHandle::detached()
    }
}

// =============================================================================
// COMPONENTS
// =============================================================================

/// Failure injection for [`MockComponents`].
#[derive(Debug, Default, Clone)]
pub struct Failures {
    pub state_tracker: bool,
    /// Network address whose proxy fails.
    pub proxy_for: Option<String>,
    /// Network address whose block tracker fails.
    pub tracker_for: Option<String>,
}

pub struct MockComponents {
    pub log: Log,
    pub served: Arc<Mutex<Vec<ServeContext>>>,
    pub stats: BlockStats,
    pub failures: Failures,
}

impl MockComponents {
    pub fn new() -> Self {
        Self {
            log: Arc::new(Mutex::new(Vec::new())),
            served: Arc::new(Mutex::new(Vec::new())),
            stats: BlockStats {
                allowed_block_lag: 2,
                average_block_time: Duration::from_secs(12),
                blocks_to_finalization: 7,
                blocks_in_finalization_data: 3,
            },
            failures: Failures::default(),
        }
    }

    pub fn failing(failures: Failures) -> Self {
        Self {
            failures,
            ..Self::new()
        }
    }

    fn push(&self, step: Step) {
        self.log.lock().push(step);
    }
}

#[async_trait]
impl ProviderComponents for MockComponents {
    fn state_tracker(
        &self,
        tx_factory: &TxFactory,
        _: &ClientContext,
    ) -> Result<Arc<dyn StateTracker>, StateTrackerError> {
        self.push(Step::StateTracker);
        if self.failures.state_tracker {
            return Err(StateTrackerError::InvalidTxFactory(format!(
                "refusing chain {}",
                tx_factory.chain_id
            )));
        }
        Ok(Arc::new(RecordingStateTracker {
            log: Arc::clone(&self.log),
        }))
    }

    fn reward_ledger(&self, state_tracker: Arc<dyn StateTracker>) -> Arc<dyn RewardLedger> {
        self.push(Step::RewardLedger);
        RewardServer::new(state_tracker)
    }

    fn session_manager(
        &self,
        endpoint: &EndpointConfig,
        state_tracker: Arc<dyn StateTracker>,
    ) -> Arc<dyn SessionManager> {
        self.push(Step::SessionManager(endpoint.network_address.clone()));
        Arc::new(ProviderSessionManager::new(endpoint, state_tracker))
    }

    fn chain_parser(&self, api_interface: &str) -> Result<Arc<dyn ChainParser>, ChainError> {
        self.push(Step::ChainParser(api_interface.to_string()));
        let api = api_interface
            .parse()
            .map_err(|_| ChainError::UnsupportedApiInterface(api_interface.to_string()))?;
        Ok(Arc::new(FixedParser {
            api,
            stats: self.stats,
        }))
    }

    fn chain_proxy(
        &self,
        parallel_connections: u32,
        endpoint: &EndpointConfig,
        _: Duration,
    ) -> Result<Arc<dyn ChainProxy>, ChainError> {
        self.push(Step::ChainProxy {
            address: endpoint.network_address.clone(),
            parallel: parallel_connections,
        });
        if self.failures.proxy_for.as_deref() == Some(endpoint.network_address.as_str()) {
            return Err(ChainError::InvalidNodeUrl {
                url: endpoint.node_url.clone(),
                reason: "refused".into(),
            });
        }
        Ok(Arc::new(NullProxy {
            endpoint: endpoint.clone(),
            api: endpoint.api_interface.parse().unwrap_or(ApiInterface::JsonRpc),
        }))
    }

    fn chain_fetcher(&self, proxy: Arc<dyn ChainProxy>) -> Arc<dyn ChainFetcher> {
        self.push(Step::ChainFetcher(proxy.endpoint().network_address.clone()));
        Arc::new(NullFetcher)
    }

    async fn block_tracker(
        &self,
        _: Arc<dyn ChainFetcher>,
        config: BlockTrackerConfig,
    ) -> Result<Arc<dyn BlockTracker>, TrackerError> {
        // The fetcher is opaque, so attribute the tracker to the last proxy.
        let address = self
            .log
            .lock()
            .iter()
            .rev()
            .find_map(|step| match step {
                Step::ChainFetcher(address) => Some(address.clone()),
                _ => None,
            })
            .unwrap_or_default();
        self.push(Step::BlockTracker(address.clone(), config));
        if self.failures.tracker_for.as_deref() == Some(address.as_str()) {
            return Err(TrackerError::Fetch(ChainError::Transport("node down".into())));
        }
        Ok(Arc::new(FrozenTracker { config }))
    }

    fn reliability_manager(&self, tracker: Arc<dyn BlockTracker>) -> Arc<dyn ReliabilityManager> {
        let address = self
            .log
            .lock()
            .iter()
            .rev()
            .find_map(|step| match step {
                Step::BlockTracker(address, _) => Some(address.clone()),
                _ => None,
            })
            .unwrap_or_default();
        self.push(Step::ReliabilityManager(address));
        Arc::new(ProviderReliabilityManager::new(tracker))
    }

    fn relay_server(&self, _: &EndpointConfig) -> Arc<dyn RelayServer> {
        Arc::new(RecordingServer {
            log: Arc::clone(&self.log),
            served: Arc::clone(&self.served),
        })
    }
}
