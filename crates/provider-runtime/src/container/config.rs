//! # Provider Configuration
//!
//! YAML configuration for one provider process.
//!
//! ```yaml
//! endpoints:
//!   - network-address: 127.0.0.1:2221
//!     chain-id: ETH1
//!     api-interface: jsonrpc
//!     node-url: http://127.0.0.1:8545
//! geolocation: 1
//! parallel-connections: 10
//! tx:
//!   from: provider
//! keys:
//!   provider: 4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318
//! ```
//!
//! Precedence is CLI flags, then `PROVIDER_*` environment variables, then
//! the file. Every section except `endpoints` has defaults.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use shared_bus::DEFAULT_CHANNEL_CAPACITY;
use shared_types::{ChainSpec, EndpointConfig, EndpointError, Geolocation};
use thiserror::Error;

use crate::error::SignerError;
use crate::logging::LogConfig;
use crate::orchestrator::{ServeOptions, DEFAULT_PARALLEL_CONNECTIONS};
use crate::rewards::DEFAULT_SETTLEMENT_DELAY_EPOCHS;
use crate::signer::{ClientContext, InMemoryKeyring};
use crate::statetracker::TxFactory;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed reading config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed parsing config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("config lists no endpoints")]
    NoEndpoints,

    #[error("endpoint #{index} is invalid: {source}")]
    InvalidEndpoint {
        index: usize,
        #[source]
        source: EndpointError,
    },

    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

/// Complete provider configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct ProviderConfig {
    pub endpoints: Vec<EndpointConfig>,
    /// Applied to every endpoint at load time.
    pub geolocation: Geolocation,
    /// Concurrent request cap per chain proxy.
    pub parallel_connections: u32,
    /// Relay cache backend.
    pub cache_address: Option<String>,
    pub tx: TxConfig,
    /// Key name to hex-encoded secp256k1 secret.
    pub keys: BTreeMap<String, String>,
    /// Chain specs known before the chain reports any.
    pub specs: Vec<ChainSpec>,
    pub state_tracker: StateTrackerSection,
    pub log: LogConfig,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            endpoints: Vec::new(),
            geolocation: 0,
            parallel_connections: DEFAULT_PARALLEL_CONNECTIONS,
            cache_address: None,
            tx: TxConfig::default(),
            keys: BTreeMap::new(),
            specs: Vec::new(),
            state_tracker: StateTrackerSection::default(),
            log: LogConfig::default(),
        }
    }
}

/// Transaction settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct TxConfig {
    pub chain_id: String,
    pub gas_adjustment: f64,
    pub gas_prices: String,
    /// Name of the signing key in `keys`.
    pub from: Option<String>,
}

impl Default for TxConfig {
    fn default() -> Self {
        let factory = TxFactory::default();
        Self {
            chain_id: factory.chain_id,
            gas_adjustment: factory.gas_adjustment,
            gas_prices: factory.gas_prices,
            from: None,
        }
    }
}

/// State tracker settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct StateTrackerSection {
    /// Publish a local epoch every this many milliseconds. Unset means epochs
    /// only arrive from the chain.
    pub epoch_duration_ms: Option<u64>,
    /// Capacity of the in-process event bus.
    pub event_capacity: usize,
    /// Epochs a relay proof waits before it is settled.
    pub settlement_delay_epochs: u64,
}

impl Default for StateTrackerSection {
    fn default() -> Self {
        Self {
            epoch_duration_ms: None,
            event_capacity: DEFAULT_CHANNEL_CAPACITY,
            settlement_delay_epochs: DEFAULT_SETTLEMENT_DELAY_EPOCHS,
        }
    }
}

impl StateTrackerSection {
    #[must_use]
    pub fn epoch_duration(&self) -> Option<Duration> {
        self.epoch_duration_ms
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
    }
}

/// Apply one geolocation to every endpoint.
pub fn parse_endpoints(
    raw: Vec<EndpointConfig>,
    geolocation: Geolocation,
) -> Result<Vec<EndpointConfig>, ConfigError> {
    if raw.is_empty() {
        return Err(ConfigError::NoEndpoints);
    }
    raw.into_iter()
        .enumerate()
        .map(|(index, mut endpoint)| {
            endpoint
                .validate()
                .map_err(|source| ConfigError::InvalidEndpoint { index, source })?;
            endpoint.geolocation = geolocation;
            Ok(endpoint)
        })
        .collect()
}

/// An environment override that could not be applied.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{var}={value:?} ignored: {reason}")]
pub struct RejectedOverride {
    pub var: &'static str,
    pub value: String,
    pub reason: &'static str,
}

impl ProviderConfig {
    /// Load and validate a config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&raw)
    }

    pub fn from_yaml(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.endpoints.is_empty() {
            return Err(ConfigError::NoEndpoints);
        }
        if self.parallel_connections == 0 {
            return Err(ConfigError::InvalidValue {
                field: "parallel-connections",
                reason: "must be at least 1".into(),
            });
        }
        if self.state_tracker.event_capacity == 0 {
            return Err(ConfigError::InvalidValue {
                field: "state-tracker.event-capacity",
                reason: "must be at least 1".into(),
            });
        }
        Ok(())
    }

    /// Apply `PROVIDER_*` overrides from the process environment.
    #[must_use = "rejected overrides should be reported once logging is up"]
    pub fn apply_env(&mut self) -> Vec<RejectedOverride> {
        self.apply_env_from(|name| std::env::var(name).ok())
    }

    /// Apply `PROVIDER_*` overrides from `lookup`.
    ///
    /// Unparsable values are skipped and returned, since this runs before
    /// the log subscriber exists.
    pub fn apply_env_from(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Vec<RejectedOverride> {
        let mut rejected = Vec::new();
        if let Some(value) = lookup("PROVIDER_GEOLOCATION") {
            match value.trim().parse() {
                Ok(geolocation) => self.geolocation = geolocation,
                Err(_) => rejected.push(RejectedOverride {
                    var: "PROVIDER_GEOLOCATION",
                    value,
                    reason: "must be an integer",
                }),
            }
        }
        if let Some(value) = lookup("PROVIDER_PARALLEL_CONNECTIONS") {
            match value.trim().parse::<u32>() {
                Ok(n) if n > 0 => self.parallel_connections = n,
                _ => rejected.push(RejectedOverride {
                    var: "PROVIDER_PARALLEL_CONNECTIONS",
                    value,
                    reason: "must be a positive integer",
                }),
            }
        }
        if let Some(value) = lookup("PROVIDER_FROM") {
            self.tx.from = Some(value);
        }
        if let Some(value) = lookup("PROVIDER_LOG_LEVEL") {
            self.log.level = value;
        }
        rejected
    }

    /// Endpoints with the configured geolocation applied.
    pub fn endpoints(&self) -> Result<Vec<EndpointConfig>, ConfigError> {
        parse_endpoints(self.endpoints.clone(), self.geolocation)
    }

    pub fn keyring(&self) -> Result<InMemoryKeyring, SignerError> {
        let mut keyring = InMemoryKeyring::new();
        for (name, secret) in &self.keys {
            keyring.insert_hex(name, secret)?;
        }
        Ok(keyring)
    }

    #[must_use]
    pub fn tx_factory(&self) -> TxFactory {
        TxFactory::new(
            self.tx.chain_id.clone(),
            self.tx.gas_adjustment,
            self.tx.gas_prices.clone(),
        )
    }

    #[must_use]
    pub fn client_context(&self, keyring: InMemoryKeyring) -> ClientContext {
        ClientContext {
            chain_id: self.tx.chain_id.clone(),
            from: self.tx.from.clone(),
            keyring: Arc::new(keyring),
        }
    }

    #[must_use]
    pub fn serve_options(&self) -> ServeOptions {
        ServeOptions {
            parallel_connections: self.parallel_connections,
            cache: self.cache_address.clone(),
        }
    }
}
