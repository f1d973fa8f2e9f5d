//! # RPC Provider Orchestrator
//!
//! Brings every configured endpoint to a serving state, or none of them.
//!
//! ## Startup Sequence
//!
//! 1. Build the state tracker (failure is [`ProviderError::Abortable`])
//! 2. Build the reward ledger on top of it
//! 3. Resolve the signer identity
//! 4. For each endpoint, in order:
//!    a. session manager, registered for epochs
//!    b. chain parser, registered for spec updates
//!    c. chain proxy
//!    d. block tracker config from the parser's block stats
//!    e. fetcher and block tracker
//!    f. reliability manager, registered for votes
//!    g. key uniqueness check
//!    h. registry insert
//!    i. start the serving component
//! 5. Wait for the interrupt
//!
//! Every failure from step 3 on is [`FatalError`]. Stacks are built one after
//! another; nothing runs concurrently until a stack's server is started.

use std::future::Future;
use std::sync::Arc;

use shared_types::EndpointConfig;
use tokio::sync::watch;
use tracing::{error, info};

use crate::chain_tracker::{self, BlockTrackerConfig};
use crate::error::{FatalError, ProviderError};
use crate::ports::{RewardLedger, StateTracker};
use crate::registry::{EndpointRegistry, EndpointStack, RegistryError};
use crate::server::ServeContext;
use crate::signer::{self, ClientContext, ProviderIdentity};
use crate::statetracker::TxFactory;
use crate::wiring::ProviderComponents;

/// Default cap on concurrent requests to one chain node.
pub const DEFAULT_PARALLEL_CONNECTIONS: u32 = 10;

/// Settings shared by every endpoint stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServeOptions {
    pub parallel_connections: u32,
    /// Relay cache backend address.
    pub cache: Option<String>,
}

impl Default for ServeOptions {
    fn default() -> Self {
        Self {
            parallel_connections: DEFAULT_PARALLEL_CONNECTIONS,
            cache: None,
        }
    }
}

/// Owns the singletons and the endpoint registry of one provider process.
pub struct RpcProvider {
    components: Arc<dyn ProviderComponents>,
    registry: EndpointRegistry,
    state_tracker: Option<Arc<dyn StateTracker>>,
    reward_ledger: Option<Arc<dyn RewardLedger>>,
    identity: Option<Arc<ProviderIdentity>>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
}

impl RpcProvider {
    pub fn new(components: Arc<dyn ProviderComponents>) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Self {
            components,
            registry: EndpointRegistry::new(),
            state_tracker: None,
            reward_ledger: None,
            identity: None,
            shutdown_tx,
            shutdown_rx,
        }
    }

    /// Bootstrap, then block until Ctrl+C.
    pub async fn start(
        &mut self,
        tx_factory: TxFactory,
        client_ctx: ClientContext,
        endpoints: Vec<EndpointConfig>,
        options: ServeOptions,
    ) -> Result<(), ProviderError> {
        let interrupt = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "Failed listening for interrupt");
            }
        };
        self.start_with_shutdown(tx_factory, client_ctx, endpoints, options, interrupt)
            .await
    }

    /// Bootstrap, then block until `signal` completes.
    ///
    /// Returns without tearing down the stacks; process exit is the caller's
    /// business.
    pub async fn start_with_shutdown<F>(
        &mut self,
        tx_factory: TxFactory,
        client_ctx: ClientContext,
        endpoints: Vec<EndpointConfig>,
        options: ServeOptions,
        signal: F,
    ) -> Result<(), ProviderError>
    where
        F: Future<Output = ()>,
    {
        self.bootstrap(tx_factory, client_ctx, endpoints, options)
            .await?;
        info!(endpoints = self.registry.len(), "Provider is serving. Press Ctrl+C to stop.");
        signal.await;
        info!("Interrupt received, exiting");
        Ok(())
    }

    /// Build the singletons and every endpoint stack, starting each server.
    pub async fn bootstrap(
        &mut self,
        tx_factory: TxFactory,
        client_ctx: ClientContext,
        endpoints: Vec<EndpointConfig>,
        options: ServeOptions,
    ) -> Result<(), ProviderError> {
        info!(endpoints = endpoints.len(), "Starting RPC provider");

        // 1. State tracker
        let state_tracker = self
            .components
            .state_tracker(&tx_factory, &client_ctx)
            .map_err(|e| {
                error!(error = %e, "Failed creating state tracker");
                ProviderError::Abortable(e)
            })?;
        self.state_tracker = Some(Arc::clone(&state_tracker));

        // 2. Reward ledger
        let reward_ledger = self.components.reward_ledger(Arc::clone(&state_tracker));
        state_tracker.register_for_epoch_updates(reward_ledger.clone());
        self.reward_ledger = Some(Arc::clone(&reward_ledger));
        info!("Reward ledger ready");

        // 3. Signer identity
        let identity = Arc::new(
            signer::resolve_identity(&client_ctx).map_err(|e| self.fatal(e.into()))?,
        );
        info!(
            key_name = %identity.key_name,
            address = %identity.address,
            "Resolved provider identity"
        );
        self.identity = Some(Arc::clone(&identity));

        if let Some((index, duplicate)) = EndpointRegistry::first_duplicate(&endpoints) {
            error!(index, endpoint = %duplicate, "Endpoint configured twice");
            return Err(self.fatal(FatalError::DuplicateEndpoint {
                key: duplicate.key(),
                endpoint: duplicate.summary(),
            }));
        }

        // 4. Endpoint stacks
        for endpoint in endpoints {
            self.build_stack(
                endpoint,
                &state_tracker,
                &reward_ledger,
                &identity,
                &options,
            )
            .await
            .map_err(|e| self.fatal(e))?;
        }

        self.registry.print_status();
        Ok(())
    }

    async fn build_stack(
        &self,
        endpoint: EndpointConfig,
        state_tracker: &Arc<dyn StateTracker>,
        reward_ledger: &Arc<dyn RewardLedger>,
        identity: &Arc<ProviderIdentity>,
        options: &ServeOptions,
    ) -> Result<(), FatalError> {
        let summary = endpoint.summary();
        info!(endpoint = %summary, "Building endpoint stack");

        // a. Session manager
        let session_manager = self
            .components
            .session_manager(&endpoint, Arc::clone(state_tracker));
        state_tracker.register_for_epoch_updates(session_manager.clone());

        // b. Chain parser
        let chain_parser = self
            .components
            .chain_parser(&endpoint.api_interface)
            .map_err(|source| FatalError::ChainParser {
                endpoint: summary.clone(),
                source,
            })?;
        state_tracker.register_chain_parser_for_spec_updates(
            Arc::clone(&chain_parser),
            &endpoint.chain_id,
        );
        let stats = chain_parser.block_stats();

        // c. Chain proxy
        let chain_proxy = self
            .components
            .chain_proxy(
                options.parallel_connections,
                &endpoint,
                stats.average_block_time,
            )
            .map_err(|source| FatalError::ChainProxy {
                endpoint: summary.clone(),
                parallel_connections: options.parallel_connections,
                source,
            })?;

        // d. Parameters may have been refined while the proxy was built
        let stats = chain_parser.block_stats();
        let tracker_config = BlockTrackerConfig::from_block_stats(&stats);
        info!(
            endpoint = %summary,
            blocks_to_save = tracker_config.blocks_to_save,
            server_block_memory = tracker_config.server_block_memory,
            average_block_time_ms = chain_tracker::millis(tracker_config.average_block_time),
            "Derived block tracker config"
        );

        // e. Fetcher and block tracker
        let fetcher = self.components.chain_fetcher(Arc::clone(&chain_proxy));
        let block_tracker = self
            .components
            .block_tracker(fetcher, tracker_config)
            .await
            .map_err(|source| FatalError::BlockTracker {
                endpoint: summary.clone(),
                config: tracker_config,
                source,
            })?;

        // f. Reliability manager
        let reliability_manager = self
            .components
            .reliability_manager(Arc::clone(&block_tracker));
        state_tracker.register_reliability_manager_for_vote_updates(
            Arc::clone(&reliability_manager),
            &endpoint.chain_id,
        );
        state_tracker.register_for_epoch_updates(reliability_manager.clone());

        // g. Key uniqueness
        let key = endpoint.key();
        if self.registry.contains(&key) {
            return Err(FatalError::DuplicateEndpoint {
                key,
                endpoint: summary,
            });
        }

        // h. Registry insert
        let stack = Arc::new(EndpointStack::new(
            endpoint.clone(),
            tracker_config,
            Arc::clone(&chain_parser),
            Arc::clone(&chain_proxy),
            block_tracker,
            Arc::clone(&reliability_manager),
            Arc::clone(&session_manager),
            Arc::clone(reward_ledger),
        ));
        self.registry
            .insert(Arc::clone(&stack))
            .map_err(|RegistryError::DuplicateKey(key)| FatalError::DuplicateEndpoint {
                key,
                endpoint: summary.clone(),
            })?;

        // i. Serve
        let server = self.components.relay_server(&endpoint);
        let handle = server.serve(ServeContext {
            endpoint,
            chain_parser,
            chain_proxy,
            reward_ledger: Arc::clone(reward_ledger),
            session_manager,
            reliability_manager,
            identity: Arc::clone(identity),
            cache: options.cache.clone(),
            shutdown: self.shutdown_rx.clone(),
        });
        stack.attach_server(handle);
        self.registry.mark_serving(&stack.key);
        info!(endpoint = %summary, key = %stack.key, "Endpoint serving");
        Ok(())
    }

    /// Log a fatal error and stop whatever already started.
    fn fatal(&self, err: FatalError) -> ProviderError {
        match err.endpoint() {
            Some(endpoint) => error!(endpoint = %endpoint, error = %err, "Fatal startup error"),
            None => error!(error = %err, "Fatal startup error"),
        }
        if !self.registry.is_empty() {
            info!(started = self.registry.len(), "Stopping endpoints started so far");
        }
        self.shutdown_tx.send_replace(true);
        ProviderError::Fatal(err)
    }

    /// Ask every started server to stop.
    pub fn shutdown(&self) {
        self.shutdown_tx.send_replace(true);
    }

    /// Receiver that flips to `true` once the provider stops its servers.
    #[must_use]
    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown_rx.clone()
    }

    #[must_use]
    pub fn registry(&self) -> &EndpointRegistry {
        &self.registry
    }

    #[must_use]
    pub fn state_tracker(&self) -> Option<&Arc<dyn StateTracker>> {
        self.state_tracker.as_ref()
    }

    #[must_use]
    pub fn reward_ledger(&self) -> Option<&Arc<dyn RewardLedger>> {
        self.reward_ledger.as_ref()
    }

    #[must_use]
    pub fn identity(&self) -> Option<&Arc<ProviderIdentity>> {
        self.identity.as_ref()
    }
}
