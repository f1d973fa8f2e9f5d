//! # Provider State Tracker
//!
//! The node's single channel to chain-level events. Components register
//! once at startup; a dispatcher task reads [`ProtocolEvent`]s from the
//! shared bus and fans each one out to every observer of that kind.
//!
//! ## Registration
//!
//! | Call | Observes |
//! |------|----------|
//! | `register_for_epoch_updates` | `NewEpoch` |
//! | `register_chain_parser_for_spec_updates` | `SpecUpdated` for one chain |
//! | `register_reliability_manager_for_vote_updates` | `VoteRequested` for one chain |
//!
//! A component registering after an epoch or spec is already known gets the
//! current value immediately. Observers of the same event are called in no
//! particular order.
//!
//! Observers are held as `Weak` handles: registered components keep the
//! tracker alive, never the other way round. Dropped observers are pruned the
//! next time their event kind is dispatched.

pub mod ticker;
pub mod tx;

pub use ticker::EpochTicker;
pub use tx::{RelayPaymentTx, TxFactory};

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use shared_bus::{
    EventFilter, EventPublisher, EventTopic, InMemoryEventBus, ProtocolEvent, Subscription,
};
use shared_types::{ChainSpec, PairingVerdict, RelayRequest, VoteParams};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::StateTrackerError;
use crate::ports::{ChainParser, EpochUpdatable, ReliabilityManager, StateTracker};
use crate::signer::{self, ClientContext};

/// Construction settings beyond the tx factory and client context.
#[derive(Debug, Clone, Default)]
pub struct StateTrackerConfig {
    /// Specs known before the chain reports any.
    pub specs: Vec<ChainSpec>,
}

#[derive(Default)]
struct Observers {
    epoch: Vec<Weak<dyn EpochUpdatable>>,
    spec: Vec<(String, Weak<dyn ChainParser>)>,
    vote: Vec<(String, Weak<dyn ReliabilityManager>)>,
}

impl Observers {
    /// Live epoch observers; dead handles are dropped.
    fn epoch(&mut self) -> Vec<Arc<dyn EpochUpdatable>> {
        self.epoch.retain(|observer| observer.strong_count() > 0);
        self.epoch.iter().filter_map(Weak::upgrade).collect()
    }

    fn spec(&mut self, chain_id: &str) -> Vec<Arc<dyn ChainParser>> {
        self.spec.retain(|(_, parser)| parser.strong_count() > 0);
        self.spec
            .iter()
            .filter(|(id, _)| id == chain_id)
            .filter_map(|(_, parser)| parser.upgrade())
            .collect()
    }

    fn vote(&mut self, chain_id: &str) -> Vec<Arc<dyn ReliabilityManager>> {
        self.vote.retain(|(_, manager)| manager.strong_count() > 0);
        self.vote
            .iter()
            .filter(|(id, _)| id == chain_id)
            .filter_map(|(_, manager)| manager.upgrade())
            .collect()
    }
}

/// State shared between the tracker handle and its dispatcher.
struct TrackerShared {
    tx_factory: TxFactory,
    client_ctx: ClientContext,
    bus: Arc<InMemoryEventBus>,
    observers: RwLock<Observers>,
    current_epoch: RwLock<Option<u64>>,
    specs: RwLock<HashMap<String, ChainSpec>>,
    /// consumer → epoch → paired providers
    pairings: RwLock<HashMap<String, BTreeMap<u64, Vec<String>>>>,
    sequence: AtomicU64,
}

pub struct ProviderStateTracker {
    shared: Arc<TrackerShared>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
}

impl ProviderStateTracker {
    /// Build the tracker and start dispatching bus events.
    ///
    /// Must be called inside a tokio runtime.
    pub fn new(
        tx_factory: TxFactory,
        client_ctx: ClientContext,
        bus: Arc<InMemoryEventBus>,
        config: StateTrackerConfig,
    ) -> Result<Arc<Self>, StateTrackerError> {
        tx_factory.validate()?;

        let specs = config
            .specs
            .into_iter()
            .map(|spec| (spec.chain_id.clone(), spec))
            .collect();

        let shared = Arc::new(TrackerShared {
            tx_factory,
            client_ctx,
            bus,
            observers: RwLock::new(Observers::default()),
            current_epoch: RwLock::new(None),
            specs: RwLock::new(specs),
            pairings: RwLock::new(HashMap::new()),
            sequence: AtomicU64::new(0),
        });

        // Subscribe before returning so nothing published afterwards is missed.
        let subscription = shared.bus.subscribe(EventFilter::topics(vec![
            EventTopic::Epoch,
            EventTopic::Spec,
            EventTopic::Vote,
            EventTopic::Pairing,
        ]));
        let handle = tokio::spawn(dispatch_loop(subscription, Arc::downgrade(&shared)));

        info!(
            tx_chain_id = %shared.tx_factory.chain_id,
            known_specs = shared.specs.read().len(),
            "State tracker started"
        );
        Ok(Arc::new(Self {
            shared,
            dispatcher: Mutex::new(Some(handle)),
        }))
    }

    #[must_use]
    pub fn current_epoch(&self) -> Option<u64> {
        *self.shared.current_epoch.read()
    }

    #[must_use]
    pub fn spec(&self, chain_id: &str) -> Option<ChainSpec> {
        self.shared.specs.read().get(chain_id).cloned()
    }

    #[must_use]
    pub fn tx_factory(&self) -> &TxFactory {
        &self.shared.tx_factory
    }

    /// Sequence number the next payment will use.
    #[must_use]
    pub fn next_sequence(&self) -> u64 {
        self.shared.sequence.load(Ordering::SeqCst)
    }

    /// Number of live registered observers per kind: (epoch, spec, vote).
    #[must_use]
    pub fn observer_counts(&self) -> (usize, usize, usize) {
        let observers = self.shared.observers.read();
        (
            observers.epoch.iter().filter(|o| o.strong_count() > 0).count(),
            observers.spec.iter().filter(|(_, o)| o.strong_count() > 0).count(),
            observers.vote.iter().filter(|(_, o)| o.strong_count() > 0).count(),
        )
    }
}

impl Drop for ProviderStateTracker {
    fn drop(&mut self) {
        if let Some(handle) = self.dispatcher.get_mut().take() {
            handle.abort();
        }
    }
}

async fn dispatch_loop(mut subscription: Subscription, shared: Weak<TrackerShared>) {
    debug!("State tracker dispatcher running");
    while let Some(event) = subscription.recv().await {
        let Some(shared) = shared.upgrade() else {
            break;
        };
        shared.dispatch(event).await;
    }
    debug!("State tracker dispatcher stopped");
}

impl TrackerShared {
    async fn dispatch(&self, event: ProtocolEvent) {
        match event {
            ProtocolEvent::NewEpoch { epoch } => self.on_new_epoch(epoch),
            ProtocolEvent::SpecUpdated(spec) => self.on_spec(spec),
            ProtocolEvent::VoteRequested(params) => self.on_vote(params).await,
            ProtocolEvent::PairingUpdated {
                epoch,
                consumer,
                providers,
            } => {
                debug!(%consumer, epoch, providers = providers.len(), "Pairing updated");
                self.pairings
                    .write()
                    .entry(consumer)
                    .or_default()
                    .insert(epoch, providers);
            }
            ProtocolEvent::VoteResponded { .. } | ProtocolEvent::RelayPaymentSubmitted { .. } => {}
        }
    }

    fn on_new_epoch(&self, epoch: u64) {
        {
            let mut current = self.current_epoch.write();
            if current.is_some_and(|known| known >= epoch) {
                debug!(epoch, "Ignoring stale epoch");
                return;
            }
            *current = Some(epoch);
        }
        self.prune_pairings(epoch);

        let observers = self.observers.write().epoch();
        info!(epoch, observers = observers.len(), "New epoch");
        for observer in observers {
            observer.update_epoch(epoch);
        }
    }

    fn on_spec(&self, spec: ChainSpec) {
        self.specs.write().insert(spec.chain_id.clone(), spec.clone());
        let parsers = self.observers.write().spec(&spec.chain_id);
        info!(chain_id = %spec.chain_id, parsers = parsers.len(), "Spec updated");
        for parser in parsers {
            parser.update_spec(&spec);
        }
    }

    async fn on_vote(&self, params: VoteParams) {
        let managers = self.observers.write().vote(&params.chain_id);
        if managers.is_empty() {
            debug!(vote_id = %params.vote_id, chain_id = %params.chain_id, "No manager for vote");
            return;
        }

        let provider = match signer::address_of(&self.client_ctx) {
            Ok(address) => address.to_string(),
            Err(e) => {
                warn!(error = %e, "Cannot answer vote without a signer address");
                return;
            }
        };
        for manager in managers {
            if let Some(response) = manager.vote_handler(&params) {
                debug!(%response, "Publishing vote response");
                self.bus
                    .publish(ProtocolEvent::VoteResponded {
                        provider: provider.clone(),
                        response,
                    })
                    .await;
            }
        }
    }

    /// Keep the newest pairing at or below `epoch` plus anything newer.
    fn prune_pairings(&self, epoch: u64) {
        let mut pairings = self.pairings.write();
        for by_epoch in pairings.values_mut() {
            if let Some(&floor) = by_epoch.range(..=epoch).next_back().map(|(e, _)| e) {
                *by_epoch = by_epoch.split_off(&floor);
            }
        }
    }
}

#[async_trait]
impl StateTracker for ProviderStateTracker {
    fn register_for_epoch_updates(&self, component: Arc<dyn EpochUpdatable>) {
        self.shared
            .observers
            .write()
            .epoch
            .push(Arc::downgrade(&component));
        let known = *self.shared.current_epoch.read();
        if let Some(epoch) = known {
            component.update_epoch(epoch);
        }
    }

    fn register_chain_parser_for_spec_updates(
        &self,
        parser: Arc<dyn ChainParser>,
        chain_id: &str,
    ) {
        self.shared
            .observers
            .write()
            .spec
            .push((chain_id.to_string(), Arc::downgrade(&parser)));
        let known = self.shared.specs.read().get(chain_id).cloned();
        if let Some(spec) = known {
            parser.update_spec(&spec);
        }
    }

    fn register_reliability_manager_for_vote_updates(
        &self,
        manager: Arc<dyn ReliabilityManager>,
        chain_id: &str,
    ) {
        self.shared
            .observers
            .write()
            .vote
            .push((chain_id.to_string(), Arc::downgrade(&manager)));
    }

    async fn query_verify_pairing(
        &self,
        consumer: &str,
        block_height: u64,
    ) -> Result<PairingVerdict, StateTrackerError> {
        let provider = signer::address_of(&self.shared.client_ctx)?.to_string();
        let pairings = self.shared.pairings.read();
        let entry = pairings
            .get(consumer)
            .and_then(|by_epoch| by_epoch.range(..=block_height).next_back());

        let verdict = match entry {
            Some((&epoch, providers)) => PairingVerdict {
                consumer: consumer.to_string(),
                valid: providers.iter().any(|p| *p == provider),
                epoch,
            },
            None => PairingVerdict {
                consumer: consumer.to_string(),
                valid: false,
                epoch: self.current_epoch().unwrap_or_default(),
            },
        };
        Ok(verdict)
    }

    async fn tx_relay_payment(
        &self,
        requests: Vec<RelayRequest>,
    ) -> Result<String, StateTrackerError> {
        if requests.is_empty() {
            return Err(StateTrackerError::EmptyPayment);
        }
        let creator = signer::address_of(&self.shared.client_ctx)?.to_string();
        let sequence = self.shared.sequence.fetch_add(1, Ordering::SeqCst);
        let tx = self
            .shared
            .tx_factory
            .relay_payment(creator, requests, sequence);
        let tx_id = uuid::Uuid::new_v4().to_string();

        info!(
            tx_id = %tx_id,
            creator = %tx.creator,
            relays = tx.relays.len(),
            sequence,
            gas_limit = tx.gas_limit,
            "Relay payment submitted"
        );
        self.shared
            .bus
            .publish(ProtocolEvent::RelayPaymentSubmitted {
                tx_id: tx_id.clone(),
                creator: tx.creator,
                relays: tx.relays.len(),
                sequence,
            })
            .await;
        Ok(tx_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chainlib::SpecChainParser;
    use crate::ports::VoteUpdatable;
    use crate::signer::InMemoryKeyring;
    use shared_types::{BlockHashEntry, VoteResponse, VoteStage};
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    const SECRET: &str = "4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318";

    fn client_ctx(from: Option<&str>) -> ClientContext {
        let mut keyring = InMemoryKeyring::new();
        keyring.insert_hex("provider", SECRET).unwrap();
        ClientContext {
            chain_id: "lava".into(),
            from: from.map(str::to_string),
            keyring: Arc::new(keyring),
        }
    }

    fn eth_spec(block_ms: u64) -> ChainSpec {
        ChainSpec {
            chain_id: "ETH1".into(),
            average_block_time_ms: block_ms,
            blocks_to_finalization: 7,
            blocks_in_finalization_data: 3,
            allowed_block_lag: 2,
        }
    }

    fn tracker(bus: &Arc<InMemoryEventBus>) -> Arc<ProviderStateTracker> {
        ProviderStateTracker::new(
            TxFactory::default(),
            client_ctx(Some("provider")),
            bus.clone(),
            StateTrackerConfig::default(),
        )
        .unwrap()
    }

    async fn eventually(mut check: impl FnMut() -> bool) {
        tokio::time::timeout(Duration::from_secs(2), async {
            while !check() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("condition not reached");
    }

    #[derive(Default)]
    struct EpochCounter {
        last: AtomicU64,
        calls: AtomicUsize,
    }

    impl EpochUpdatable for EpochCounter {
        fn update_epoch(&self, epoch: u64) {
            self.last.store(epoch, Ordering::SeqCst);
            self.calls.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Commits to every vote with a fixed hash.
    struct FixedVoter;

    impl VoteUpdatable for FixedVoter {
        fn vote_handler(&self, params: &VoteParams) -> Option<VoteResponse> {
            (params.stage == VoteStage::Commit).then(|| VoteResponse::Commit {
                vote_id: params.vote_id.clone(),
                commit: [7; 32],
            })
        }
    }

    impl EpochUpdatable for FixedVoter {
        fn update_epoch(&self, _: u64) {}
    }

    impl ReliabilityManager for FixedVoter {
        fn latest_block(&self) -> u64 {
            0
        }

        fn finalization_data(&self) -> Vec<BlockHashEntry> {
            Vec::new()
        }
    }

    #[tokio::test]
    async fn test_new_validates_tx_factory() {
        let bus = Arc::new(InMemoryEventBus::new());
        let err = ProviderStateTracker::new(
            TxFactory::new("", 1.0, "1ulava"),
            client_ctx(Some("provider")),
            bus.clone(),
            StateTrackerConfig::default(),
        )
        .err()
        .unwrap();
        assert!(matches!(err, StateTrackerError::InvalidTxFactory(_)));
    }

    #[tokio::test]
    async fn test_missing_signer_surfaces_on_use() {
        let bus = Arc::new(InMemoryEventBus::new());
        let tracker = ProviderStateTracker::new(
            TxFactory::default(),
            client_ctx(None),
            bus,
            StateTrackerConfig::default(),
        )
        .unwrap();
        let err = tracker.query_verify_pairing("alice", 1).await.unwrap_err();
        assert!(matches!(
            err,
            StateTrackerError::Signer(crate::error::SignerError::MissingKeyName)
        ));
    }

    #[tokio::test]
    async fn test_epoch_fan_out() {
        let bus = Arc::new(InMemoryEventBus::new());
        let tracker = tracker(&bus);
        let a = Arc::new(EpochCounter::default());
        let b = Arc::new(EpochCounter::default());
        tracker.register_for_epoch_updates(a.clone());
        tracker.register_for_epoch_updates(b.clone());

        bus.publish(ProtocolEvent::NewEpoch { epoch: 3 }).await;
        eventually(|| a.last.load(Ordering::SeqCst) == 3 && b.last.load(Ordering::SeqCst) == 3)
            .await;

        // Stale epochs are not redelivered
        bus.publish(ProtocolEvent::NewEpoch { epoch: 2 }).await;
        bus.publish(ProtocolEvent::NewEpoch { epoch: 4 }).await;
        eventually(|| a.last.load(Ordering::SeqCst) == 4).await;
        assert_eq!(a.calls.load(Ordering::SeqCst), 2);
        assert_eq!(tracker.observer_counts(), (2, 0, 0));
    }

    #[tokio::test]
    async fn test_dropped_observers_are_pruned() {
        let bus = Arc::new(InMemoryEventBus::new());
        let tracker = tracker(&bus);
        let kept = Arc::new(EpochCounter::default());
        let dropped = Arc::new(EpochCounter::default());
        tracker.register_for_epoch_updates(kept.clone());
        tracker.register_for_epoch_updates(dropped.clone());
        tracker.register_reliability_manager_for_vote_updates(Arc::new(FixedVoter), "ETH1");
        assert_eq!(tracker.observer_counts(), (2, 0, 0));

        let gone = Arc::downgrade(&dropped);
        drop(dropped);
        assert!(gone.upgrade().is_none());

        bus.publish(ProtocolEvent::NewEpoch { epoch: 5 }).await;
        eventually(|| kept.last.load(Ordering::SeqCst) == 5).await;
        assert_eq!(tracker.shared.observers.read().epoch.len(), 1);
    }

    #[tokio::test]
    async fn test_late_registration_gets_current_epoch() {
        let bus = Arc::new(InMemoryEventBus::new());
        let tracker = tracker(&bus);
        bus.publish(ProtocolEvent::NewEpoch { epoch: 9 }).await;
        eventually(|| tracker.current_epoch() == Some(9)).await;

        let late = Arc::new(EpochCounter::default());
        tracker.register_for_epoch_updates(late.clone());
        assert_eq!(late.last.load(Ordering::SeqCst), 9);
    }

    #[tokio::test]
    async fn test_spec_updates_scoped_by_chain() {
        let bus = Arc::new(InMemoryEventBus::new());
        let tracker = ProviderStateTracker::new(
            TxFactory::default(),
            client_ctx(Some("provider")),
            bus.clone(),
            StateTrackerConfig {
                specs: vec![eth_spec(12_000)],
            },
        )
        .unwrap();

        let eth = Arc::new(SpecChainParser::new("jsonrpc").unwrap());
        let other = Arc::new(SpecChainParser::new("jsonrpc").unwrap());
        tracker.register_chain_parser_for_spec_updates(eth.clone(), "ETH1");
        tracker.register_chain_parser_for_spec_updates(other.clone(), "LAV1");

        // Seeded spec delivered on registration
        assert_eq!(eth.spec(), Some(eth_spec(12_000)));
        assert_eq!(other.spec(), None);

        bus.publish(ProtocolEvent::SpecUpdated(eth_spec(2_000))).await;
        eventually(|| eth.spec() == Some(eth_spec(2_000))).await;
        assert_eq!(other.spec(), None);
        assert_eq!(tracker.spec("ETH1"), Some(eth_spec(2_000)));
    }

    #[tokio::test]
    async fn test_vote_response_republished() {
        let bus = Arc::new(InMemoryEventBus::new());
        let tracker = tracker(&bus);
        let voter = Arc::new(FixedVoter);
        tracker.register_reliability_manager_for_vote_updates(voter.clone(), "ETH1");
        let mut responses = bus.subscribe(EventFilter::topics(vec![EventTopic::Vote]));

        bus.publish(ProtocolEvent::VoteRequested(VoteParams {
            vote_id: "v1".into(),
            chain_id: "ETH1".into(),
            request_block: 10,
            stage: VoteStage::Commit,
        }))
        .await;

        // First event on the topic is our own request
        assert!(matches!(
            responses.recv().await,
            Some(ProtocolEvent::VoteRequested(_))
        ));
        let Some(ProtocolEvent::VoteResponded { provider, response }) =
            tokio::time::timeout(Duration::from_secs(2), responses.recv())
                .await
                .unwrap()
        else {
            panic!("expected a vote response");
        };
        assert!(provider.starts_with("0x"));
        assert_eq!(response.vote_id(), "v1");
    }

    #[tokio::test]
    async fn test_pairing_verdicts() {
        let bus = Arc::new(InMemoryEventBus::new());
        let tracker = tracker(&bus);
        let me = signer::address_of(&client_ctx(Some("provider")))
            .unwrap()
            .to_string();

        bus.publish(ProtocolEvent::PairingUpdated {
            epoch: 20,
            consumer: "alice".into(),
            providers: vec![me.clone()],
        })
        .await;
        bus.publish(ProtocolEvent::PairingUpdated {
            epoch: 20,
            consumer: "bob".into(),
            providers: vec!["0xsomeoneelse".into()],
        })
        .await;

        let tracker_ref = tracker.clone();
        eventually(move || tracker_ref.shared.pairings.read().len() == 2).await;

        let alice = tracker.query_verify_pairing("alice", 25).await.unwrap();
        assert!(alice.valid);
        assert_eq!(alice.epoch, 20);
        assert!(!tracker.query_verify_pairing("bob", 25).await.unwrap().valid);
        // Before the pairing existed
        assert!(!tracker.query_verify_pairing("alice", 10).await.unwrap().valid);
    }

    #[tokio::test]
    async fn test_relay_payment() {
        let bus = Arc::new(InMemoryEventBus::new());
        let tracker = tracker(&bus);
        let mut payments = bus.subscribe(EventFilter::topics(vec![EventTopic::Payment]));

        assert!(matches!(
            tracker.tx_relay_payment(Vec::new()).await,
            Err(StateTrackerError::EmptyPayment)
        ));

        let relay = RelayRequest {
            consumer: "alice".into(),
            provider: "me".into(),
            chain_id: "ETH1".into(),
            session_id: 1,
            relay_num: 1,
            cu_sum: 10,
            epoch: 1,
            block_height: 10,
            sig: Vec::new(),
        };
        let first = tracker.tx_relay_payment(vec![relay.clone()]).await.unwrap();
        let second = tracker.tx_relay_payment(vec![relay]).await.unwrap();
        assert_ne!(first, second);
        assert_eq!(tracker.next_sequence(), 2);

        let Some(ProtocolEvent::RelayPaymentSubmitted {
            tx_id, sequence, ..
        }) = payments.recv().await
        else {
            panic!("expected payment event");
        };
        assert_eq!(tx_id, first);
        assert_eq!(sequence, 0);
    }
}
