//! # Signer Identity
//!
//! Resolves the provider's signing key once at startup:
//! key name → private key → public key → account address.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use k256::ecdsa::{SigningKey, VerifyingKey};
use sha2::{Digest, Sha256};

use crate::error::SignerError;
use crate::ports::Keyring;

/// Length of a derived account address.
pub const ADDRESS_LEN: usize = 20;

/// Account address derived from a public key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AccAddress([u8; ADDRESS_LEN]);

impl AccAddress {
    /// Derive from SEC1 public key bytes (compressed or uncompressed).
    pub fn from_public_key(sec1: &[u8]) -> Result<Self, SignerError> {
        let key = VerifyingKey::from_sec1_bytes(sec1)
            .map_err(|e| SignerError::MalformedPublicKey(e.to_string()))?;
        let compressed = key.to_encoded_point(true);
        let digest = Sha256::digest(compressed.as_bytes());
        let mut bytes = [0u8; ADDRESS_LEN];
        bytes.copy_from_slice(&digest[..ADDRESS_LEN]);
        Ok(Self(bytes))
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8; ADDRESS_LEN] {
        &self.0
    }
}

impl fmt::Display for AccAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

/// Client-side context the state tracker and signer read from.
#[derive(Clone)]
pub struct ClientContext {
    /// Chain the provider settles payments on.
    pub chain_id: String,
    /// Name of the signing key.
    pub from: Option<String>,
    pub keyring: Arc<dyn Keyring>,
}

impl fmt::Debug for ClientContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientContext")
            .field("chain_id", &self.chain_id)
            .field("from", &self.from)
            .finish_non_exhaustive()
    }
}

/// The resolved signing identity shared by every endpoint stack.
pub struct ProviderIdentity {
    pub key_name: String,
    pub signing_key: SigningKey,
    pub address: AccAddress,
}

impl fmt::Debug for ProviderIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderIdentity")
            .field("key_name", &self.key_name)
            .field("address", &self.address.to_string())
            .finish_non_exhaustive()
    }
}

/// Resolve the key name configured in the client context.
pub fn key_name(client_ctx: &ClientContext) -> Result<String, SignerError> {
    client_ctx
        .from
        .as_deref()
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .ok_or(SignerError::MissingKeyName)
}

/// Address of the key named in the client context.
pub fn address_of(client_ctx: &ClientContext) -> Result<AccAddress, SignerError> {
    let name = key_name(client_ctx)?;
    AccAddress::from_public_key(&client_ctx.keyring.public_key(&name)?)
}

/// Resolve the full signing identity.
pub fn resolve_identity(client_ctx: &ClientContext) -> Result<ProviderIdentity, SignerError> {
    let key_name = key_name(client_ctx)?;
    let signing_key = client_ctx.keyring.private_key(&key_name)?;
    let address = AccAddress::from_public_key(&client_ctx.keyring.public_key(&key_name)?)?;
    Ok(ProviderIdentity {
        key_name,
        signing_key,
        address,
    })
}

/// Keyring holding secp256k1 secrets in memory.
#[derive(Default)]
pub struct InMemoryKeyring {
    keys: HashMap<String, SigningKey>,
}

impl InMemoryKeyring {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a key from its 32-byte hex-encoded secret.
    pub fn insert_hex(&mut self, name: &str, secret_hex: &str) -> Result<(), SignerError> {
        let invalid = |reason: String| SignerError::InvalidSecret {
            name: name.to_string(),
            reason,
        };
        let bytes = hex::decode(secret_hex.trim().trim_start_matches("0x"))
            .map_err(|e| invalid(e.to_string()))?;
        let key = SigningKey::from_slice(&bytes).map_err(|e| invalid(e.to_string()))?;
        self.keys.insert(name.to_string(), key);
        Ok(())
    }

    /// Add a freshly generated key.
    pub fn generate(&mut self, name: &str) {
        let key = SigningKey::random(&mut rand::thread_rng());
        self.keys.insert(name.to_string(), key);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl Keyring for InMemoryKeyring {
    fn private_key(&self, name: &str) -> Result<SigningKey, SignerError> {
        self.keys
            .get(name)
            .cloned()
            .ok_or_else(|| SignerError::KeyNotFound(name.to_string()))
    }

    fn public_key(&self, name: &str) -> Result<Vec<u8>, SignerError> {
        let key = self
            .keys
            .get(name)
            .ok_or_else(|| SignerError::KeyNotFound(name.to_string()))?;
        Ok(key.verifying_key().to_encoded_point(true).as_bytes().to_vec())
    }
}
