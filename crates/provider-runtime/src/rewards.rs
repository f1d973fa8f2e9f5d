//! # Reward Server
//!
//! Process-wide accumulator of relay payment proofs. Proofs are grouped by
//! epoch and settled through the state tracker once their epoch is old
//! enough.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use parking_lot::Mutex;
use shared_types::RelayRequest;
use tracing::{error, info, warn};

use crate::error::StateTrackerError;
use crate::ports::{EpochUpdatable, RewardLedger, StateTracker};

/// Epochs a proof waits before it is settled.
pub const DEFAULT_SETTLEMENT_DELAY_EPOCHS: u64 = 2;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ProofKey {
    consumer: String,
    session_id: u64,
}

type EpochProofs = HashMap<ProofKey, RelayRequest>;

pub struct RewardServer {
    state_tracker: Arc<dyn StateTracker>,
    settlement_delay_epochs: u64,
    proofs: Mutex<BTreeMap<u64, EpochProofs>>,
    /// Set while a settlement is in flight so epoch ticks don't overlap.
    settling: AtomicBool,
    /// Handle to ourselves for spawning settlement from `update_epoch`.
    this: Weak<RewardServer>,
}

impl RewardServer {
    pub fn new(state_tracker: Arc<dyn StateTracker>) -> Arc<Self> {
        Self::with_delay(state_tracker, DEFAULT_SETTLEMENT_DELAY_EPOCHS)
    }

    pub fn with_delay(
        state_tracker: Arc<dyn StateTracker>,
        settlement_delay_epochs: u64,
    ) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            state_tracker,
            settlement_delay_epochs,
            proofs: Mutex::new(BTreeMap::new()),
            settling: AtomicBool::new(false),
            this: this.clone(),
        })
    }

    #[must_use]
    pub fn settlement_delay_epochs(&self) -> u64 {
        self.settlement_delay_epochs
    }

    /// Epochs that still hold unsettled proofs.
    #[must_use]
    pub fn pending_epochs(&self) -> Vec<u64> {
        self.proofs.lock().keys().copied().collect()
    }

    /// Remove and return every proof old enough to settle at `current_epoch`.
    fn take_due(&self, current_epoch: u64) -> BTreeMap<u64, EpochProofs> {
        let Some(last_due) = current_epoch.checked_sub(self.settlement_delay_epochs) else {
            return BTreeMap::new();
        };
        let mut proofs = self.proofs.lock();
        let keep = proofs.split_off(&last_due.saturating_add(1));
        std::mem::replace(&mut *proofs, keep)
    }

    /// Put proofs back after a failed submission, without clobbering
    /// better proofs that arrived meanwhile.
    fn restore(&self, due: BTreeMap<u64, EpochProofs>) {
        let mut proofs = self.proofs.lock();
        for (epoch, sessions) in due {
            let held = proofs.entry(epoch).or_default();
            for (key, proof) in sessions {
                match held.get(&key) {
                    Some(existing) if existing.cu_sum >= proof.cu_sum => {}
                    _ => {
                        held.insert(key, proof);
                    }
                }
            }
        }
    }
}

impl EpochUpdatable for RewardServer {
    fn update_epoch(&self, epoch: u64) {
        let Some(this) = self.this.upgrade() else {
            return;
        };
        if self.settling.swap(true, Ordering::SeqCst) {
            warn!(epoch, "Previous settlement still running, skipping");
            return;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            self.settling.store(false, Ordering::SeqCst);
            warn!(epoch, "No runtime available for settlement");
            return;
        };
        runtime.spawn(async move {
            if let Err(e) = this.settle(epoch).await {
                error!(epoch, error = %e, "Relay payment settlement failed");
            }
            this.settling.store(false, Ordering::SeqCst);
        });
    }
}

#[async_trait]
impl RewardLedger for RewardServer {
    fn state_tracker(&self) -> &Arc<dyn StateTracker> {
        &self.state_tracker
    }

    fn send_new_proof(&self, proof: RelayRequest) -> bool {
        let key = ProofKey {
            consumer: proof.consumer.clone(),
            session_id: proof.session_id,
        };
        let mut proofs = self.proofs.lock();
        let sessions = proofs.entry(proof.epoch).or_default();
        match sessions.get(&key) {
            Some(existing) if existing.cu_sum >= proof.cu_sum => false,
            _ => {
                sessions.insert(key, proof);
                true
            }
        }
    }

    fn pending_claims(&self) -> usize {
        self.proofs.lock().values().map(HashMap::len).sum()
    }

    async fn settle(&self, current_epoch: u64) -> Result<usize, StateTrackerError> {
        let due = self.take_due(current_epoch);
        let relays: Vec<RelayRequest> = due
            .values()
            .flat_map(|sessions| sessions.values().cloned())
            .collect();
        if relays.is_empty() {
            return Ok(0);
        }

        let count = relays.len();
        match self.state_tracker.tx_relay_payment(relays).await {
            Ok(tx_id) => {
                info!(
                    current_epoch,
                    relays = count,
                    tx_id = %tx_id,
                    "Submitted relay payment"
                );
                Ok(count)
            }
            Err(e) => {
                self.restore(due);
                Err(e)
            }
        }
    }
}
