//! # Endpoint Configuration
//!
//! One configured (chain, api interface, network address) target the
//! provider serves.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::EndpointError;

/// Geolocation bitmask applied uniformly to every endpoint.
pub type Geolocation = u64;

/// Api interfaces a chain endpoint can expose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiInterface {
    /// JSON-RPC 2.0 over HTTP (EVM style).
    JsonRpc,
    /// Tendermint RPC (JSON-RPC dialect).
    TendermintRpc,
    /// REST over HTTP.
    Rest,
    /// gRPC.
    Grpc,
}

impl ApiInterface {
    /// Wire name as it appears in configuration.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::JsonRpc => "jsonrpc",
            Self::TendermintRpc => "tendermintrpc",
            Self::Rest => "rest",
            Self::Grpc => "grpc",
        }
    }

    /// All known interfaces.
    #[must_use]
    pub fn all() -> [ApiInterface; 4] {
        [Self::JsonRpc, Self::TendermintRpc, Self::Rest, Self::Grpc]
    }
}

impl FromStr for ApiInterface {
    type Err = EndpointError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::all()
            .into_iter()
            .find(|api| api.as_str() == s)
            .ok_or_else(|| EndpointError::UnknownApiInterface(s.to_string()))
    }
}

impl fmt::Display for ApiInterface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unique identity of an endpoint stack.
///
/// Derived from chain id, api interface and network address. Node URL and
/// geolocation do not participate.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EndpointKey(String, String, String);

impl EndpointKey {
    /// Build the key from its three identifying parts.
    #[must_use]
    pub fn new(chain_id: &str, api_interface: &str, network_address: &str) -> Self {
        Self(
            chain_id.to_string(),
            api_interface.to_string(),
            network_address.to_string(),
        )
    }

    #[must_use]
    pub fn chain_id(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn api_interface(&self) -> &str {
        &self.1
    }

    #[must_use]
    pub fn network_address(&self) -> &str {
        &self.2
    }
}

impl fmt::Display for EndpointKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}|{}", self.0, self.1, self.2)
    }
}

/// Static description of one chain endpoint to serve.
///
/// The api interface is kept as the raw configured string; the chain parser
/// is the component that decides whether it is supported.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct EndpointConfig {
    /// Address the serving component listens on.
    pub network_address: String,
    /// Chain identifier (e.g. `ETH1`).
    pub chain_id: String,
    /// Api interface name (e.g. `jsonrpc`).
    pub api_interface: String,
    /// URL of the underlying chain node.
    pub node_url: String,
    /// Geolocation, overwritten uniformly at load time.
    #[serde(default)]
    pub geolocation: Geolocation,
}

impl EndpointConfig {
    /// Create an endpoint with geolocation zero.
    pub fn new(
        network_address: impl Into<String>,
        chain_id: impl Into<String>,
        api_interface: impl Into<String>,
        node_url: impl Into<String>,
    ) -> Self {
        Self {
            network_address: network_address.into(),
            chain_id: chain_id.into(),
            api_interface: api_interface.into(),
            node_url: node_url.into(),
            geolocation: 0,
        }
    }

    /// Identity key of this endpoint.
    #[must_use]
    pub fn key(&self) -> EndpointKey {
        EndpointKey::new(&self.chain_id, &self.api_interface, &self.network_address)
    }

    /// Identifying parameters, used in diagnostics.
    #[must_use]
    pub fn summary(&self) -> EndpointSummary {
        EndpointSummary {
            chain_id: self.chain_id.clone(),
            api_interface: self.api_interface.clone(),
            network_address: self.network_address.clone(),
        }
    }

    /// Check that no identifying field is empty.
    pub fn validate(&self) -> Result<(), EndpointError> {
        let fields = [
            ("network-address", &self.network_address),
            ("chain-id", &self.chain_id),
            ("api-interface", &self.api_interface),
            ("node-url", &self.node_url),
        ];
        for (field, value) in fields {
            if value.trim().is_empty() {
                return Err(EndpointError::EmptyField { field });
            }
        }
        Ok(())
    }
}

impl fmt::Display for EndpointConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} node-url={} geolocation={}",
            self.summary(),
            self.node_url,
            self.geolocation
        )
    }
}

/// The identifying parameters of an endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointSummary {
    pub chain_id: String,
    pub api_interface: String,
    pub network_address: String,
}

impl fmt::Display for EndpointSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "chain-id={} api-interface={} network-address={}",
            self.chain_id, self.api_interface, self.network_address
        )
    }
}
