//! # Error Types
//!
//! Errors raised while validating shared domain values.

use thiserror::Error;

/// Errors raised by [`crate::EndpointConfig`] validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EndpointError {
    /// A required field was empty.
    #[error("endpoint field `{field}` must not be empty")]
    EmptyField { field: &'static str },

    /// The api interface name is not one of the known interfaces.
    #[error("unknown api interface: {0}")]
    UnknownApiInterface(String),
}
