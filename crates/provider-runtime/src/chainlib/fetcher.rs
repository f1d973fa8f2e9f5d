//! Chain head fetcher.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use shared_types::ApiInterface;

use crate::error::ChainError;
use crate::ports::{ChainFetcher, ChainProxy};

const REST_LATEST_BLOCK: &str = "cosmos/base/tendermint/v1beta1/blocks/latest";
const REST_BLOCK_BY_HEIGHT: &str = "cosmos/base/tendermint/v1beta1/blocks";

/// Reads block numbers and hashes through a [`ChainProxy`], using the calls
/// native to the proxy's api interface.
pub struct ProxyChainFetcher {
    proxy: Arc<dyn ChainProxy>,
}

impl ProxyChainFetcher {
    pub fn new(proxy: Arc<dyn ChainProxy>) -> Self {
        Self { proxy }
    }
}

fn unexpected(what: &str, value: &Value) -> ChainError {
    ChainError::UnexpectedResponse(format!("{what}: {value}"))
}

fn parse_hex_u64(value: &Value) -> Result<u64, ChainError> {
    let text = value
        .as_str()
        .ok_or_else(|| unexpected("expected hex string", value))?;
    let digits = text.strip_prefix("0x").unwrap_or(text);
    u64::from_str_radix(digits, 16).map_err(|_| unexpected("invalid hex number", value))
}

/// Tendermint encodes heights as decimal strings.
fn parse_decimal_u64(value: &Value) -> Result<u64, ChainError> {
    match value {
        Value::String(text) => text
            .parse()
            .map_err(|_| unexpected("invalid decimal number", value)),
        Value::Number(n) => n
            .as_u64()
            .ok_or_else(|| unexpected("invalid decimal number", value)),
        _ => Err(unexpected("expected number", value)),
    }
}

fn string_at(value: &Value, pointer: &str) -> Result<String, ChainError> {
    value
        .pointer(pointer)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| unexpected(pointer, value))
}

fn value_at<'a>(value: &'a Value, pointer: &str) -> Result<&'a Value, ChainError> {
    value
        .pointer(pointer)
        .ok_or_else(|| unexpected(pointer, value))
}

#[async_trait]
impl ChainFetcher for ProxyChainFetcher {
    async fn fetch_latest_block_num(&self) -> Result<u64, ChainError> {
        match self.proxy.api_interface() {
            ApiInterface::JsonRpc => {
                let result = self.proxy.send_json_rpc("eth_blockNumber", json!([])).await?;
                parse_hex_u64(&result)
            }
            ApiInterface::TendermintRpc => {
                let result = self.proxy.send_json_rpc("status", json!({})).await?;
                parse_decimal_u64(value_at(&result, "/sync_info/latest_block_height")?)
            }
            ApiInterface::Rest => {
                let body = self.proxy.send_rest(REST_LATEST_BLOCK).await?;
                parse_decimal_u64(value_at(&body, "/block/header/height")?)
            }
            api @ ApiInterface::Grpc => Err(ChainError::NoProxyForInterface(api)),
        }
    }

    async fn fetch_block_hash(&self, block_num: u64) -> Result<String, ChainError> {
        match self.proxy.api_interface() {
            ApiInterface::JsonRpc => {
                let result = self
                    .proxy
                    .send_json_rpc(
                        "eth_getBlockByNumber",
                        json!([format!("0x{block_num:x}"), false]),
                    )
                    .await?;
                string_at(&result, "/hash")
            }
            ApiInterface::TendermintRpc => {
                let result = self
                    .proxy
                    .send_json_rpc("block", json!({ "height": block_num.to_string() }))
                    .await?;
                string_at(&result, "/block_id/hash")
            }
            ApiInterface::Rest => {
                let body = self
                    .proxy
                    .send_rest(&format!("{REST_BLOCK_BY_HEIGHT}/{block_num}"))
                    .await?;
                string_at(&body, "/block_id/hash")
            }
            api @ ApiInterface::Grpc => Err(ChainError::NoProxyForInterface(api)),
        }
    }
}
