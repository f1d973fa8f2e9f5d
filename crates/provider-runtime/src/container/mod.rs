//! # Provider Container
//!
//! Turns a loaded [`ProviderConfig`] into everything [`RpcProvider`] is
//! started with: the shared event bus, the default components, the
//! transaction factory, the client context and the endpoint list.
//!
//! ```text
//! ProviderConfig ──► ProviderContainer ──► RpcProvider::start(..)
//!                      ├─ InMemoryEventBus ◄── EpochTicker (optional)
//!                      ├─ DefaultComponents
//!                      ├─ TxFactory + ClientContext
//!                      └─ endpoints + ServeOptions
//! ```

pub mod config;

pub use config::{
    parse_endpoints, ConfigError, ProviderConfig, RejectedOverride, StateTrackerSection, TxConfig,
};

use std::sync::Arc;

use shared_bus::InMemoryEventBus;
use shared_types::EndpointConfig;
use thiserror::Error;
use tracing::info;

use crate::error::{ProviderError, SignerError};
use crate::orchestrator::{RpcProvider, ServeOptions};
use crate::signer::ClientContext;
use crate::statetracker::{EpochTicker, TxFactory};
use crate::wiring::DefaultComponents;

/// Errors assembling the container.
#[derive(Debug, Error)]
pub enum ContainerError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed loading keys: {0}")]
    Keys(#[from] SignerError),
}

/// Everything one provider process runs with.
pub struct ProviderContainer {
    pub config: ProviderConfig,
    pub bus: Arc<InMemoryEventBus>,
    pub components: Arc<DefaultComponents>,
    pub endpoints: Vec<EndpointConfig>,
    pub tx_factory: TxFactory,
    pub client_ctx: ClientContext,
    pub options: ServeOptions,
}

impl ProviderContainer {
    pub fn from_config(config: ProviderConfig) -> Result<Self, ContainerError> {
        config.validate()?;
        let endpoints = config.endpoints()?;
        let keyring = config.keyring()?;
        info!(
            endpoints = endpoints.len(),
            keys = keyring.len(),
            geolocation = config.geolocation,
            "Loaded provider configuration"
        );

        let bus = Arc::new(InMemoryEventBus::with_capacity(
            config.state_tracker.event_capacity,
        ));
        let components = Arc::new(
            DefaultComponents::new(Arc::clone(&bus))
                .with_specs(config.specs.clone())
                .with_settlement_delay(config.state_tracker.settlement_delay_epochs),
        );

        Ok(Self {
            tx_factory: config.tx_factory(),
            client_ctx: config.client_context(keyring),
            options: config.serve_options(),
            bus,
            components,
            endpoints,
            config,
        })
    }

    /// Start the local epoch clock if an epoch duration is configured.
    #[must_use]
    pub fn epoch_ticker(&self) -> Option<EpochTicker> {
        self.config
            .state_tracker
            .epoch_duration()
            .map(|period| EpochTicker::spawn(Arc::clone(&self.bus), period, 0))
    }

    #[must_use]
    pub fn provider(&self) -> RpcProvider {
        RpcProvider::new(self.components.clone())
    }

    /// Start every endpoint and block until Ctrl+C.
    pub async fn run(self) -> Result<(), ProviderError> {
        let _ticker = self.epoch_ticker();
        let mut provider = self.provider();
        provider
            .start(self.tx_factory, self.client_ctx, self.endpoints, self.options)
            .await
    }
}
