//! # Endpoint Registry
//!
//! Maps each endpoint key to the one stack serving it.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                       EndpointRegistry                         │
//! │                                                                │
//! │  ETH1|jsonrpc|a        ETH1|jsonrpc|b        LAV1|rest|c       │
//! │  ┌────────────┐        ┌────────────┐        ┌────────────┐    │
//! │  │ parser     │        │ parser     │        │ parser     │    │
//! │  │ proxy      │        │ proxy      │        │ proxy      │    │
//! │  │ tracker    │        │ tracker    │        │ tracker    │    │
//! │  │ reliability│        │ reliability│        │ reliability│    │
//! │  │ sessions   │        │ sessions   │        │ sessions   │    │
//! │  └─────┬──────┘        └─────┬──────┘        └─────┬──────┘    │
//! │        └─────────────────────┼─────────────────────┘           │
//! │                              ▼                                 │
//! │                 StateTracker + RewardLedger                    │
//! │                       (one of each)                            │
//! └────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Keys are unique by construction: [`EndpointRegistry::insert`] refuses a
//! key that is already present.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use shared_types::{EndpointConfig, EndpointKey};
use thiserror::Error;
use tracing::info;

use crate::chain_tracker::BlockTrackerConfig;
use crate::ports::{
    BlockTracker, ChainParser, ChainProxy, ReliabilityManager, RewardLedger, SessionManager,
};
use crate::server::ServerHandle;

/// Lifecycle of one endpoint stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackStatus {
    /// Built and registered, serving component not started yet.
    Registered,
    /// Serving component started.
    Serving,
}

/// Registry error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("endpoint key {0} is already registered")]
    DuplicateKey(EndpointKey),
}

/// The components serving one endpoint.
///
/// Everything except the reward ledger is owned by this stack alone.
pub struct EndpointStack {
    pub key: EndpointKey,
    pub endpoint: EndpointConfig,
    pub tracker_config: BlockTrackerConfig,
    pub chain_parser: Arc<dyn ChainParser>,
    pub chain_proxy: Arc<dyn ChainProxy>,
    pub block_tracker: Arc<dyn BlockTracker>,
    pub reliability_manager: Arc<dyn ReliabilityManager>,
    pub session_manager: Arc<dyn SessionManager>,
    /// The process-wide ledger, shared with every other stack.
    pub reward_ledger: Arc<dyn RewardLedger>,
    server: Mutex<Option<ServerHandle>>,
}

impl EndpointStack {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        endpoint: EndpointConfig,
        tracker_config: BlockTrackerConfig,
        chain_parser: Arc<dyn ChainParser>,
        chain_proxy: Arc<dyn ChainProxy>,
        block_tracker: Arc<dyn BlockTracker>,
        reliability_manager: Arc<dyn ReliabilityManager>,
        session_manager: Arc<dyn SessionManager>,
        reward_ledger: Arc<dyn RewardLedger>,
    ) -> Self {
        Self {
            key: endpoint.key(),
            endpoint,
            tracker_config,
            chain_parser,
            chain_proxy,
            block_tracker,
            reliability_manager,
            session_manager,
            reward_ledger,
            server: Mutex::new(None),
        }
    }

    /// Keep the handle of the started serving component.
    pub fn attach_server(&self, handle: ServerHandle) {
        *self.server.lock() = Some(handle);
    }

    /// Take the serving handle, e.g. to wait for it to stop.
    pub fn take_server(&self) -> Option<ServerHandle> {
        self.server.lock().take()
    }

    #[must_use]
    pub fn is_serving(&self) -> bool {
        self.server.lock().as_ref().is_some_and(ServerHandle::is_running)
    }
}

impl std::fmt::Debug for EndpointStack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EndpointStack")
            .field("key", &self.key)
            .field("tracker_config", &self.tracker_config)
            .finish_non_exhaustive()
    }
}

#[derive(Default)]
struct Entries {
    stacks: HashMap<EndpointKey, Arc<EndpointStack>>,
    status: HashMap<EndpointKey, StackStatus>,
}

/// Endpoint key → stack.
///
/// Stacks and their status live under one lock so they never disagree.
#[derive(Default)]
pub struct EndpointRegistry {
    entries: RwLock<Entries>,
}

impl EndpointRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// First entry whose key repeats an earlier one, with its index.
    #[must_use]
    pub fn first_duplicate(endpoints: &[EndpointConfig]) -> Option<(usize, &EndpointConfig)> {
        let mut seen = HashSet::with_capacity(endpoints.len());
        endpoints
            .iter()
            .enumerate()
            .find(|(_, endpoint)| !seen.insert(endpoint.key()))
    }

    #[must_use]
    pub fn contains(&self, key: &EndpointKey) -> bool {
        self.entries.read().stacks.contains_key(key)
    }

    /// Insert a stack under its key.
    pub fn insert(&self, stack: Arc<EndpointStack>) -> Result<(), RegistryError> {
        let mut entries = self.entries.write();
        if entries.stacks.contains_key(&stack.key) {
            return Err(RegistryError::DuplicateKey(stack.key.clone()));
        }
        info!(key = %stack.key, "Registered endpoint stack");
        entries
            .status
            .insert(stack.key.clone(), StackStatus::Registered);
        entries.stacks.insert(stack.key.clone(), stack);
        Ok(())
    }

    pub fn mark_serving(&self, key: &EndpointKey) {
        if let Some(status) = self.entries.write().status.get_mut(key) {
            *status = StackStatus::Serving;
        }
    }

    #[must_use]
    pub fn get(&self, key: &EndpointKey) -> Option<Arc<EndpointStack>> {
        self.entries.read().stacks.get(key).cloned()
    }

    #[must_use]
    pub fn status(&self, key: &EndpointKey) -> Option<StackStatus> {
        self.entries.read().status.get(key).copied()
    }

    /// All stacks, in key order.
    #[must_use]
    pub fn stacks(&self) -> Vec<Arc<EndpointStack>> {
        let mut stacks: Vec<_> = self.entries.read().stacks.values().cloned().collect();
        stacks.sort_by(|a, b| a.key.cmp(&b.key));
        stacks
    }

    #[must_use]
    pub fn keys(&self) -> Vec<EndpointKey> {
        let mut keys: Vec<_> = self.entries.read().stacks.keys().cloned().collect();
        keys.sort();
        keys
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().stacks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().stacks.is_empty()
    }

    /// Log every stack and its status.
    pub fn print_status(&self) {
        let entries = self.entries.read();
        let mut keys: Vec<_> = entries.stacks.keys().collect();
        keys.sort();
        info!(stacks = keys.len(), "Endpoint registry status");
        for key in keys {
            let state = entries.status.get(key).copied();
            info!(key = %key, status = ?state, "  endpoint");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chainlib::{HttpChainProxy, SpecChainParser};
    use crate::reliability::ProviderReliabilityManager;
    use crate::rewards::RewardServer;
    use crate::session::ProviderSessionManager;
    use crate::test_support::{FixedBlockTracker, NullStateTracker};
    use std::time::Duration;

    fn stack(endpoint: EndpointConfig) -> Arc<EndpointStack> {
        let state_tracker = Arc::new(NullStateTracker::default());
        let config = BlockTrackerConfig::derive(Duration::from_secs(1), 2, 1, 100);
        let tracker = Arc::new(FixedBlockTracker::new(10, config));
        Arc::new(EndpointStack::new(
            endpoint.clone(),
            config,
            Arc::new(SpecChainParser::new("jsonrpc").unwrap()),
            Arc::new(HttpChainProxy::new(1, &endpoint, Duration::from_secs(1)).unwrap()),
            tracker.clone(),
            Arc::new(ProviderReliabilityManager::new(tracker)),
            Arc::new(ProviderSessionManager::new(&endpoint, state_tracker.clone())),
            RewardServer::new(state_tracker),
        ))
    }

    fn endpoint(addr: &str, url: &str) -> EndpointConfig {
        EndpointConfig::new(addr, "ETH1", "jsonrpc", url)
    }

    #[test]
    fn test_insert_and_lookup() {
        let registry = EndpointRegistry::new();
        let a = stack(endpoint("a", "http://node-a"));
        registry.insert(a.clone()).unwrap();
        registry.insert(stack(endpoint("b", "http://node-b"))).unwrap();

        assert_eq!(registry.len(), 2);
        assert!(Arc::ptr_eq(&registry.get(&a.key).unwrap(), &a));
        assert_eq!(registry.status(&a.key), Some(StackStatus::Registered));
        registry.mark_serving(&a.key);
        assert_eq!(registry.status(&a.key), Some(StackStatus::Serving));
    }

    #[test]
    fn test_duplicate_key_rejected() {
        let registry = EndpointRegistry::new();
        registry.insert(stack(endpoint("a", "http://one"))).unwrap();
        let err = registry
            .insert(stack(endpoint("a", "http://two")))
            .unwrap_err();
        assert_eq!(
            err,
            RegistryError::DuplicateKey(EndpointKey::new("ETH1", "jsonrpc", "a"))
        );
        assert_eq!(registry.len(), 1);
        // The original stack survives
        let kept = registry.get(&EndpointKey::new("ETH1", "jsonrpc", "a")).unwrap();
        assert_eq!(kept.endpoint.node_url, "http://one");
    }

    #[test]
    fn test_first_duplicate_reports_second_entry() {
        let endpoints = vec![
            endpoint("a", "http://one"),
            endpoint("b", "http://two"),
            endpoint("a", "http://three"),
        ];
        let (index, dup) = EndpointRegistry::first_duplicate(&endpoints).unwrap();
        assert_eq!(index, 2);
        assert_eq!(dup.node_url, "http://three");

        assert!(EndpointRegistry::first_duplicate(&endpoints[..2]).is_none());
    }

    #[test]
    fn test_concurrent_insert_and_status() {
        let registry = EndpointRegistry::new();
        let stacks: Vec<_> = (0..32)
            .map(|i| stack(endpoint(&format!("127.0.0.1:{}", 3000 + i), "http://node")))
            .collect();

        std::thread::scope(|scope| {
            scope.spawn(|| {
                for stack in &stacks {
                    registry.insert(Arc::clone(stack)).unwrap();
                    registry.mark_serving(&stack.key);
                }
            });
            scope.spawn(|| {
                for _ in 0..64 {
                    registry.print_status();
                }
            });
        });

        assert_eq!(registry.len(), 32);
        assert!(registry
            .keys()
            .iter()
            .all(|key| registry.status(key) == Some(StackStatus::Serving)));
    }

    #[test]
    fn test_stack_server_handle() {
        let s = stack(endpoint("a", "http://one"));
        assert!(!s.is_serving());
        s.attach_server(ServerHandle::detached());
        assert!(!s.is_serving());
        assert!(s.take_server().is_some());
        assert!(s.take_server().is_none());
    }
}
