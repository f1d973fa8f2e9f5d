//! # Component Wiring
//!
//! [`ProviderComponents`] is the one place that knows which concrete adapter
//! implements each port. The orchestrator asks it for every collaborator it
//! builds, so tests swap the whole set by passing their own implementation.
//!
//! ```text
//!                 ┌───────────────────────────┐
//!                 │      DefaultComponents    │
//!                 ├───────────────────────────┤
//!  state_tracker ─┤ ProviderStateTracker      │◄── InMemoryEventBus
//!  reward_ledger ─┤ RewardServer              │
//!  session_mgr   ─┤ ProviderSessionManager    │
//!  chain_parser  ─┤ SpecChainParser           │
//!  chain_proxy   ─┤ HttpChainProxy            │
//!  chain_fetcher ─┤ ProxyChainFetcher         │
//!  block_tracker ─┤ ChainTracker              │
//!  reliability   ─┤ ProviderReliabilityManager│
//!  relay_server  ─┤ RpcProviderServer         │
//!                 └───────────────────────────┘
//! ```

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use shared_bus::InMemoryEventBus;
use shared_types::{ChainSpec, EndpointConfig};

use crate::chain_tracker::{BlockTrackerConfig, ChainTracker};
use crate::chainlib::{HttpChainProxy, ProxyChainFetcher, SpecChainParser};
use crate::error::{ChainError, StateTrackerError, TrackerError};
use crate::ports::{
    BlockTracker, ChainFetcher, ChainParser, ChainProxy, RelayServer, ReliabilityManager,
    RewardLedger, SessionManager, StateTracker,
};
use crate::reliability::ProviderReliabilityManager;
use crate::rewards::{RewardServer, DEFAULT_SETTLEMENT_DELAY_EPOCHS};
use crate::server::RpcProviderServer;
use crate::session::{ProviderSessionManager, DEFAULT_EPOCHS_TO_KEEP};
use crate::signer::ClientContext;
use crate::statetracker::{ProviderStateTracker, StateTrackerConfig, TxFactory};

/// Constructors for every collaborator the orchestrator wires.
#[async_trait]
pub trait ProviderComponents: Send + Sync {
    fn state_tracker(
        &self,
        tx_factory: &TxFactory,
        client_ctx: &ClientContext,
    ) -> Result<Arc<dyn StateTracker>, StateTrackerError>;

    fn reward_ledger(&self, state_tracker: Arc<dyn StateTracker>) -> Arc<dyn RewardLedger>;

    fn session_manager(
        &self,
        endpoint: &EndpointConfig,
        state_tracker: Arc<dyn StateTracker>,
    ) -> Arc<dyn SessionManager>;

    fn chain_parser(&self, api_interface: &str) -> Result<Arc<dyn ChainParser>, ChainError>;

    fn chain_proxy(
        &self,
        parallel_connections: u32,
        endpoint: &EndpointConfig,
        average_block_time: Duration,
    ) -> Result<Arc<dyn ChainProxy>, ChainError>;

    fn chain_fetcher(&self, proxy: Arc<dyn ChainProxy>) -> Arc<dyn ChainFetcher>;

    async fn block_tracker(
        &self,
        fetcher: Arc<dyn ChainFetcher>,
        config: BlockTrackerConfig,
    ) -> Result<Arc<dyn BlockTracker>, TrackerError>;

    fn reliability_manager(&self, tracker: Arc<dyn BlockTracker>) -> Arc<dyn ReliabilityManager>;

    fn relay_server(&self, endpoint: &EndpointConfig) -> Arc<dyn RelayServer>;
}

/// Production adapters, all fed by one shared event bus.
pub struct DefaultComponents {
    bus: Arc<InMemoryEventBus>,
    specs: Vec<ChainSpec>,
    settlement_delay_epochs: u64,
    session_epochs_to_keep: u64,
}

impl DefaultComponents {
    pub fn new(bus: Arc<InMemoryEventBus>) -> Self {
        Self {
            bus,
            specs: Vec::new(),
            settlement_delay_epochs: DEFAULT_SETTLEMENT_DELAY_EPOCHS,
            session_epochs_to_keep: DEFAULT_EPOCHS_TO_KEEP,
        }
    }

    /// Specs the state tracker knows before the chain reports any.
    #[must_use]
    pub fn with_specs(mut self, specs: Vec<ChainSpec>) -> Self {
        self.specs = specs;
        self
    }

    #[must_use]
    pub fn with_settlement_delay(mut self, epochs: u64) -> Self {
        self.settlement_delay_epochs = epochs;
        self
    }

    #[must_use]
    pub fn with_session_window(mut self, epochs: u64) -> Self {
        self.session_epochs_to_keep = epochs;
        self
    }

    /// The bus the state tracker listens on.
    #[must_use]
    pub fn event_bus(&self) -> Arc<InMemoryEventBus> {
        Arc::clone(&self.bus)
    }
}

#[async_trait]
impl ProviderComponents for DefaultComponents {
    fn state_tracker(
        &self,
        tx_factory: &TxFactory,
        client_ctx: &ClientContext,
    ) -> Result<Arc<dyn StateTracker>, StateTrackerError> {
        let tracker: Arc<dyn StateTracker> = ProviderStateTracker::new(
            tx_factory.clone(),
            client_ctx.clone(),
            self.event_bus(),
            StateTrackerConfig {
                specs: self.specs.clone(),
            },
        )?;
        Ok(tracker)
    }

    fn reward_ledger(&self, state_tracker: Arc<dyn StateTracker>) -> Arc<dyn RewardLedger> {
        RewardServer::with_delay(state_tracker, self.settlement_delay_epochs)
    }

    fn session_manager(
        &self,
        endpoint: &EndpointConfig,
        state_tracker: Arc<dyn StateTracker>,
    ) -> Arc<dyn SessionManager> {
        Arc::new(ProviderSessionManager::with_window(
            endpoint,
            state_tracker,
            self.session_epochs_to_keep,
        ))
    }

    fn chain_parser(&self, api_interface: &str) -> Result<Arc<dyn ChainParser>, ChainError> {
        Ok(Arc::new(SpecChainParser::new(api_interface)?))
    }

    fn chain_proxy(
        &self,
        parallel_connections: u32,
        endpoint: &EndpointConfig,
        average_block_time: Duration,
    ) -> Result<Arc<dyn ChainProxy>, ChainError> {
        Ok(Arc::new(HttpChainProxy::new(
            parallel_connections,
            endpoint,
            average_block_time,
        )?))
    }

    fn chain_fetcher(&self, proxy: Arc<dyn ChainProxy>) -> Arc<dyn ChainFetcher> {
        Arc::new(ProxyChainFetcher::new(proxy))
    }

    async fn block_tracker(
        &self,
        fetcher: Arc<dyn ChainFetcher>,
        config: BlockTrackerConfig,
    ) -> Result<Arc<dyn BlockTracker>, TrackerError> {
        let tracker: Arc<dyn BlockTracker> = ChainTracker::new(fetcher, config).await?;
        Ok(tracker)
    }

    fn reliability_manager(&self, tracker: Arc<dyn BlockTracker>) -> Arc<dyn ReliabilityManager> {
        Arc::new(ProviderReliabilityManager::new(tracker))
    }

    fn relay_server(&self, _endpoint: &EndpointConfig) -> Arc<dyn RelayServer> {
        Arc::new(RpcProviderServer::new())
    }
}
