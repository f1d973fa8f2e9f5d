//! Local epoch clock.

use std::sync::Arc;
use std::time::Duration;

use shared_bus::{EventPublisher, InMemoryEventBus, ProtocolEvent};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::chain_tracker;

/// Publishes `NewEpoch` on the bus at a fixed period.
///
/// Stands in for chain polling when no chain is attached. Dropping the
/// ticker stops it.
pub struct EpochTicker {
    handle: JoinHandle<()>,
}

impl EpochTicker {
    /// Start ticking. The first epoch after `start_epoch` is published one
    /// period from now.
    pub fn spawn(bus: Arc<InMemoryEventBus>, period: Duration, start_epoch: u64) -> Self {
        info!(
            period_ms = chain_tracker::millis(period),
            start_epoch,
            "Starting epoch ticker"
        );
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            ticker.tick().await;
            let mut epoch = start_epoch;
            loop {
                ticker.tick().await;
                epoch += 1;
                let receivers = bus.publish(ProtocolEvent::NewEpoch { epoch }).await;
                debug!(epoch, receivers, "Published epoch");
            }
        });
        Self { handle }
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }
}

impl Drop for EpochTicker {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
