//! # Provider Session Manager
//!
//! Tracks consumer sessions and their compute-unit usage for one endpoint.
//! A consumer's pairing is verified through the state tracker the first
//! time a session of theirs is seen.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use shared_types::EndpointConfig;
use tracing::{debug, info};

use crate::error::SessionError;
use crate::ports::{EpochUpdatable, SessionManager, StateTracker};

/// Epochs of sessions kept besides the current one.
pub const DEFAULT_EPOCHS_TO_KEEP: u64 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct SessionKey {
    epoch: u64,
    session_id: u64,
}

#[derive(Debug, Clone, Default)]
struct SessionState {
    cu_sum: u64,
    last_relay_num: u64,
}

#[derive(Default)]
struct ConsumerSessions {
    sessions: HashMap<SessionKey, SessionState>,
}

/// Session bookkeeping bound to one endpoint and the shared state tracker.
pub struct ProviderSessionManager {
    endpoint: EndpointConfig,
    state_tracker: Arc<dyn StateTracker>,
    current_epoch: AtomicU64,
    epochs_to_keep: u64,
    consumers: RwLock<HashMap<String, ConsumerSessions>>,
}

impl ProviderSessionManager {
    pub fn new(endpoint: &EndpointConfig, state_tracker: Arc<dyn StateTracker>) -> Self {
        Self::with_window(endpoint, state_tracker, DEFAULT_EPOCHS_TO_KEEP)
    }

    pub fn with_window(
        endpoint: &EndpointConfig,
        state_tracker: Arc<dyn StateTracker>,
        epochs_to_keep: u64,
    ) -> Self {
        Self {
            endpoint: endpoint.clone(),
            state_tracker,
            current_epoch: AtomicU64::new(0),
            epochs_to_keep,
            consumers: RwLock::new(HashMap::new()),
        }
    }

    fn oldest_valid_epoch(&self, current: u64) -> u64 {
        current.saturating_sub(self.epochs_to_keep)
    }

    fn session_exists(&self, consumer: &str, key: SessionKey) -> bool {
        self.consumers
            .read()
            .get(consumer)
            .is_some_and(|c| c.sessions.contains_key(&key))
    }
}

impl EpochUpdatable for ProviderSessionManager {
    fn update_epoch(&self, epoch: u64) {
        let previous = self.current_epoch.fetch_max(epoch, Ordering::SeqCst);
        if epoch <= previous {
            return;
        }
        let oldest = self.oldest_valid_epoch(epoch);

        let mut consumers = self.consumers.write();
        for sessions in consumers.values_mut() {
            sessions.sessions.retain(|key, _| key.epoch >= oldest);
        }
        consumers.retain(|_, c| !c.sessions.is_empty());

        info!(
            chain_id = %self.endpoint.chain_id,
            api_interface = %self.endpoint.api_interface,
            epoch,
            consumers = consumers.len(),
            "Session manager moved to new epoch"
        );
    }
}

#[async_trait]
impl SessionManager for ProviderSessionManager {
    fn endpoint(&self) -> &EndpointConfig {
        &self.endpoint
    }

    fn state_tracker(&self) -> &Arc<dyn StateTracker> {
        &self.state_tracker
    }

    fn current_epoch(&self) -> u64 {
        self.current_epoch.load(Ordering::SeqCst)
    }

    async fn record_relay(
        &self,
        consumer: &str,
        session_id: u64,
        epoch: u64,
        relay_num: u64,
        cu: u64,
    ) -> Result<u64, SessionError> {
        let current = self.current_epoch();
        if epoch < self.oldest_valid_epoch(current) || epoch > current {
            return Err(SessionError::EpochOutOfWindow { epoch, current });
        }

        let key = SessionKey { epoch, session_id };
        if !self.session_exists(consumer, key) {
            let verdict = self.state_tracker.query_verify_pairing(consumer, epoch).await?;
            if !verdict.valid {
                return Err(SessionError::NotPaired {
                    consumer: consumer.to_string(),
                    epoch,
                });
            }
            debug!(consumer, session_id, epoch, "Opened consumer session");
        }

        let mut consumers = self.consumers.write();
        let session = consumers
            .entry(consumer.to_string())
            .or_default()
            .sessions
            .entry(key)
            .or_default();
        if relay_num <= session.last_relay_num {
            return Err(SessionError::RelayNumOutOfOrder {
                session_id,
                relay_num,
                last: session.last_relay_num,
            });
        }
        session.last_relay_num = relay_num;
        session.cu_sum = session.cu_sum.saturating_add(cu);
        Ok(session.cu_sum)
    }

    fn active_sessions(&self) -> usize {
        self.consumers
            .read()
            .values()
            .map(|c| c.sessions.len())
            .sum()
    }
}
