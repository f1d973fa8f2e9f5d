//! # Shared Bus - Protocol Event Distribution
//!
//! Carries chain-level protocol events (epoch rollovers, spec updates, vote
//! requests, pairing changes, payment settlement) from the state tracker's
//! sources to whoever subscribed.
//!
//! ```text
//! ┌──────────────┐                    ┌──────────────────┐
//! │ Event source │                    │  State tracker   │
//! │ (chain poll, │    publish()       │   dispatcher     │
//! │  ticker)     │ ──────┐            │                  │
//! └──────────────┘       │            └──────────────────┘
//!                        ▼                    ↑
//!                  ┌──────────────┐          │
//!                  │  Event Bus   │ ─────────┘
//!                  └──────────────┘  subscribe()
//! ```
//!
//! Delivery order between two subscribers of the same event is not defined.

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod events;
pub mod publisher;
pub mod subscriber;

pub use events::{EventFilter, EventTopic, ProtocolEvent};
pub use publisher::{EventPublisher, InMemoryEventBus};
pub use subscriber::Subscription;

/// Maximum events to buffer per subscriber before the slowest one lags.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1000;
