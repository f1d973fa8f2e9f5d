//! # Protocol Events
//!
//! Every event that flows through the shared bus.

use serde::{Deserialize, Serialize};
use shared_types::{ChainSpec, VoteParams, VoteResponse};

/// Chain-level events observed (or emitted) by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProtocolEvent {
    /// An epoch boundary was crossed.
    NewEpoch { epoch: u64 },

    /// On-chain spec metadata changed for one chain.
    SpecUpdated(ChainSpec),

    /// A dispute vote needs a response from providers of this chain.
    VoteRequested(VoteParams),

    /// This provider answered a vote.
    VoteResponded {
        provider: String,
        response: VoteResponse,
    },

    /// The pairing list of a consumer changed for an epoch.
    PairingUpdated {
        epoch: u64,
        consumer: String,
        providers: Vec<String>,
    },

    /// A relay payment transaction was submitted.
    RelayPaymentSubmitted {
        tx_id: String,
        creator: String,
        relays: usize,
        sequence: u64,
    },
}

impl ProtocolEvent {
    /// Get the topic for this event.
    #[must_use]
    pub fn topic(&self) -> EventTopic {
        match self {
            Self::NewEpoch { .. } => EventTopic::Epoch,
            Self::SpecUpdated(_) => EventTopic::Spec,
            Self::VoteRequested(_) | Self::VoteResponded { .. } => EventTopic::Vote,
            Self::PairingUpdated { .. } => EventTopic::Pairing,
            Self::RelayPaymentSubmitted { .. } => EventTopic::Payment,
        }
    }

    /// Chain the event is scoped to, if any.
    #[must_use]
    pub fn chain_id(&self) -> Option<&str> {
        match self {
            Self::SpecUpdated(spec) => Some(&spec.chain_id),
            Self::VoteRequested(params) => Some(&params.chain_id),
            _ => None,
        }
    }
}

/// Event topics for subscription filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventTopic {
    Epoch,
    Spec,
    Vote,
    Pairing,
    Payment,
    /// All events (no filtering).
    All,
}

/// Filter for subscribing to specific events.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    /// Topics to include. Empty means all topics.
    pub topics: Vec<EventTopic>,
    /// Chains to include. Empty means all chains; unscoped events always pass.
    pub chain_ids: Vec<String>,
}

impl EventFilter {
    /// Create a filter that accepts all events.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Create a filter for specific topics.
    #[must_use]
    pub fn topics(topics: Vec<EventTopic>) -> Self {
        Self {
            topics,
            chain_ids: Vec::new(),
        }
    }

    /// Restrict the filter to events of the given chain.
    #[must_use]
    pub fn for_chain(mut self, chain_id: impl Into<String>) -> Self {
        self.chain_ids.push(chain_id.into());
        self
    }

    /// Check if an event matches this filter.
    #[must_use]
    pub fn matches(&self, event: &ProtocolEvent) -> bool {
        let topic_match = self.topics.is_empty()
            || self.topics.contains(&EventTopic::All)
            || self.topics.contains(&event.topic());

        let chain_match = match event.chain_id() {
            Some(chain_id) => {
                self.chain_ids.is_empty() || self.chain_ids.iter().any(|c| c == chain_id)
            }
            None => true,
        };

        topic_match && chain_match
    }
}
