//! # Shared Types Crate
//!
//! Domain values shared across the provider runtime and the event bus.
//!
//! ## Design Principles
//!
//! - **Single Source of Truth**: every value that crosses a crate boundary
//!   (endpoint descriptions, chain statistics, relay claims, vote payloads)
//!   is defined here.
//! - **Identity by Key**: an endpoint is identified by its [`EndpointKey`],
//!   derived from chain id, api interface and network address only.

pub mod chain;
pub mod endpoint;
pub mod errors;
pub mod relay;

pub use chain::*;
pub use endpoint::*;
pub use errors::*;
pub use relay::*;
