//! # Chain Tracker
//!
//! Rolling window of recent block hashes for one chain, fed by a
//! [`crate::ports::ChainFetcher`]. Sizing comes from [`BlockTrackerConfig`],
//! which is derived from the chain's finality parameters rather than
//! configured.

pub mod config;
pub mod tracker;

pub use config::{millis, BlockTrackerConfig, DEFAULT_TRACKER_MEMORY};
pub use tracker::ChainTracker;
