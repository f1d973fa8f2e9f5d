//! Relay payment transactions.

use serde::{Deserialize, Serialize};
use shared_types::RelayRequest;

use crate::error::StateTrackerError;

/// Gas charged for the payment message itself.
pub const BASE_PAYMENT_GAS: u64 = 100_000;
/// Gas charged per relay proof carried.
pub const GAS_PER_RELAY: u64 = 20_000;

/// Settings every outgoing transaction is built with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TxFactory {
    /// Chain the transactions are submitted to.
    pub chain_id: String,
    /// Multiplier applied to the gas estimate.
    pub gas_adjustment: f64,
    /// Price per unit of gas, e.g. `0.000000001ulava`.
    pub gas_prices: String,
}

impl TxFactory {
    pub fn new(
        chain_id: impl Into<String>,
        gas_adjustment: f64,
        gas_prices: impl Into<String>,
    ) -> Self {
        Self {
            chain_id: chain_id.into(),
            gas_adjustment,
            gas_prices: gas_prices.into(),
        }
    }

    pub fn validate(&self) -> Result<(), StateTrackerError> {
        if self.chain_id.trim().is_empty() {
            return Err(StateTrackerError::InvalidTxFactory(
                "chain id must not be empty".into(),
            ));
        }
        if !(self.gas_adjustment.is_finite() && self.gas_adjustment > 0.0) {
            return Err(StateTrackerError::InvalidTxFactory(format!(
                "gas adjustment must be positive, got {}",
                self.gas_adjustment
            )));
        }
        Ok(())
    }

    /// Adjusted gas limit for a payment carrying `relays` proofs.
    #[must_use]
    pub fn estimate_gas(&self, relays: usize) -> u64 {
        let raw = BASE_PAYMENT_GAS + GAS_PER_RELAY * relays as u64;
        (raw as f64 * self.gas_adjustment).ceil() as u64
    }

    /// Build an unsigned payment transaction.
    #[must_use]
    pub fn relay_payment(
        &self,
        creator: String,
        relays: Vec<RelayRequest>,
        sequence: u64,
    ) -> RelayPaymentTx {
        RelayPaymentTx {
            creator,
            chain_id: self.chain_id.clone(),
            sequence,
            gas_limit: self.estimate_gas(relays.len()),
            gas_prices: self.gas_prices.clone(),
            relays,
        }
    }
}

impl Default for TxFactory {
    fn default() -> Self {
        Self::new("lava", 1.5, "0.000000001ulava")
    }
}

/// A relay payment ready for submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelayPaymentTx {
    pub creator: String,
    pub chain_id: String,
    pub sequence: u64,
    pub gas_limit: u64,
    pub gas_prices: String,
    pub relays: Vec<RelayRequest>,
}
