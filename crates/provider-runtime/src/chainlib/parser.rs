//! Spec-driven chain parser.

use std::time::Duration;

use parking_lot::RwLock;
use shared_types::{ApiInterface, BlockStats, ChainSpec};
use tracing::info;

use crate::error::ChainError;
use crate::ports::{ChainParser, SpecUpdatable};

/// Reports block statistics from the latest on-chain spec of its chain.
///
/// Until a spec arrives, a fallback per api interface is reported.
pub struct SpecChainParser {
    api_interface: ApiInterface,
    spec: RwLock<Option<ChainSpec>>,
}

impl SpecChainParser {
    pub fn new(api_interface: &str) -> Result<Self, ChainError> {
        let api_interface = api_interface
            .parse::<ApiInterface>()
            .map_err(|_| ChainError::UnsupportedApiInterface(api_interface.to_string()))?;
        Ok(Self {
            api_interface,
            spec: RwLock::new(None),
        })
    }

    /// The spec currently in effect, if one was delivered.
    #[must_use]
    pub fn spec(&self) -> Option<ChainSpec> {
        self.spec.read().clone()
    }

    fn fallback_stats(api_interface: ApiInterface) -> BlockStats {
        match api_interface {
            // EVM-style chains
            ApiInterface::JsonRpc => BlockStats {
                allowed_block_lag: 2,
                average_block_time: Duration::from_secs(12),
                blocks_to_finalization: 7,
                blocks_in_finalization_data: 3,
            },
            // Tendermint chains finalize on commit
            ApiInterface::TendermintRpc | ApiInterface::Rest | ApiInterface::Grpc => BlockStats {
                allowed_block_lag: 1,
                average_block_time: Duration::from_secs(6),
                blocks_to_finalization: 1,
                blocks_in_finalization_data: 1,
            },
        }
    }
}

impl SpecUpdatable for SpecChainParser {
    fn update_spec(&self, spec: &ChainSpec) {
        info!(
            chain_id = %spec.chain_id,
            api_interface = %self.api_interface,
            average_block_time_ms = spec.average_block_time_ms,
            blocks_to_finalization = spec.blocks_to_finalization,
            "Chain parser spec updated"
        );
        *self.spec.write() = Some(spec.clone());
    }
}

impl ChainParser for SpecChainParser {
    fn api_interface(&self) -> ApiInterface {
        self.api_interface
    }

    fn block_stats(&self) -> BlockStats {
        match self.spec.read().as_ref() {
            Some(spec) => spec.block_stats(),
            None => Self::fallback_stats(self.api_interface),
        }
    }
}
