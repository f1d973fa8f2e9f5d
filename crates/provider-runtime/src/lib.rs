//! # Provider Runtime Library
//!
//! Bootstrap and lifecycle of an RPC-relay provider. The `rpcprovider`
//! binary in `main.rs` is a thin shell over [`RpcProvider`].
//!
//! ## Architectural Patterns
//!
//! - **Hexagonal Architecture**: the orchestrator only sees the traits in
//!   [`ports`]; adapters live beside it and are picked by [`wiring`]
//! - **One stack per endpoint**: every configured endpoint gets its own
//!   parser, proxy, block tracker, reliability manager and session manager
//! - **Shared singletons**: one state tracker and one reward ledger per
//!   process, fed by the in-process event bus

#![allow(clippy::type_complexity)]
#![allow(clippy::too_many_lines)]

pub mod chain_tracker;
pub mod chainlib;
pub mod container;
pub mod error;
pub mod logging;
pub mod orchestrator;
pub mod ports;
pub mod registry;
pub mod reliability;
pub mod rewards;
pub mod server;
pub mod session;
pub mod signer;
pub mod statetracker;
pub mod wiring;

#[cfg(test)]
mod test_support;

pub use chain_tracker::{BlockTrackerConfig, ChainTracker, DEFAULT_TRACKER_MEMORY};
pub use container::{
    ConfigError, ContainerError, ProviderConfig, ProviderContainer, RejectedOverride,
};
pub use error::{
    ChainError, FatalError, ProviderError, SessionError, SignerError, StateTrackerError,
    TrackerError,
};
pub use logging::{init_logging, LogConfig, LoggingError};
pub use orchestrator::{RpcProvider, ServeOptions, DEFAULT_PARALLEL_CONNECTIONS};
pub use registry::{EndpointRegistry, EndpointStack, StackStatus};
pub use server::{ServeContext, ServerHandle};
pub use signer::{ClientContext, InMemoryKeyring, ProviderIdentity};
pub use statetracker::{EpochTicker, ProviderStateTracker, TxFactory};
pub use wiring::{DefaultComponents, ProviderComponents};
