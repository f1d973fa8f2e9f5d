//! HTTP proxy to a chain node.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Url};
use serde_json::{json, Value};
use shared_types::{ApiInterface, EndpointConfig};
use tokio::sync::Semaphore;
use tracing::debug;

use crate::error::ChainError;
use crate::ports::ChainProxy;

/// Floor for the per-request timeout.
const MIN_REQUEST_TIMEOUT: Duration = Duration::from_secs(1);

/// Timeout applied to one proxied request for a given block time.
#[must_use]
pub fn request_timeout(average_block_time: Duration) -> Duration {
    average_block_time.max(MIN_REQUEST_TIMEOUT)
}

/// Proxies JSON-RPC and REST calls to one chain node.
///
/// At most `parallel_connections` requests are in flight at once.
pub struct HttpChainProxy {
    endpoint: EndpointConfig,
    api_interface: ApiInterface,
    base_url: Url,
    client: Client,
    permits: Arc<Semaphore>,
    next_id: AtomicU64,
}

impl HttpChainProxy {
    pub fn new(
        parallel_connections: u32,
        endpoint: &EndpointConfig,
        average_block_time: Duration,
    ) -> Result<Self, ChainError> {
        if parallel_connections == 0 {
            return Err(ChainError::InvalidParallelConnections);
        }
        let api_interface = endpoint
            .api_interface
            .parse::<ApiInterface>()
            .map_err(|_| ChainError::UnsupportedApiInterface(endpoint.api_interface.clone()))?;
        if api_interface == ApiInterface::Grpc {
            return Err(ChainError::NoProxyForInterface(api_interface));
        }
        let base_url = Url::parse(&endpoint.node_url).map_err(|e| ChainError::InvalidNodeUrl {
            url: endpoint.node_url.clone(),
            reason: e.to_string(),
        })?;

        let client = Client::builder()
            .timeout(request_timeout(average_block_time))
            .pool_max_idle_per_host(parallel_connections as usize)
            .build()
            .map_err(|e| ChainError::Transport(e.to_string()))?;

        Ok(Self {
            endpoint: endpoint.clone(),
            api_interface,
            base_url,
            client,
            permits: Arc::new(Semaphore::new(parallel_connections as usize)),
            next_id: AtomicU64::new(1),
        })
    }

    /// Requests that may still start before callers have to wait.
    #[must_use]
    pub fn available_connections(&self) -> usize {
        self.permits.available_permits()
    }
}

fn transport(e: reqwest::Error) -> ChainError {
    ChainError::Transport(e.to_string())
}

/// Pull `result` out of a JSON-RPC reply, surfacing `error` objects.
pub(crate) fn json_rpc_result(mut body: Value) -> Result<Value, ChainError> {
    if let Some(error) = body.get("error").filter(|e| !e.is_null()) {
        return Err(ChainError::Rpc {
            code: error.get("code").and_then(Value::as_i64).unwrap_or_default(),
            message: error
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        });
    }
    match body.get_mut("result") {
        Some(result) => Ok(result.take()),
        None => Err(ChainError::UnexpectedResponse(
            "json-rpc reply without result".into(),
        )),
    }
}

#[async_trait]
impl ChainProxy for HttpChainProxy {
    fn endpoint(&self) -> &EndpointConfig {
        &self.endpoint
    }

    fn api_interface(&self) -> ApiInterface {
        self.api_interface
    }

    async fn send_json_rpc(&self, method: &str, params: Value) -> Result<Value, ChainError> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| ChainError::Transport("proxy closed".into()))?;
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        debug!(node = %self.base_url, method, id, "Proxying json-rpc call");

        let body: Value = self
            .client
            .post(self.base_url.clone())
            .json(&json!({ "jsonrpc": "2.0", "id": id, "method": method, "params": params }))
            .send()
            .await
            .map_err(transport)?
            .json()
            .await
            .map_err(transport)?;
        json_rpc_result(body)
    }

    async fn send_rest(&self, path: &str) -> Result<Value, ChainError> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| ChainError::Transport("proxy closed".into()))?;
        let url = self
            .base_url
            .join(path)
            .map_err(|e| ChainError::InvalidNodeUrl {
                url: format!("{}{path}", self.base_url),
                reason: e.to_string(),
            })?;
        debug!(%url, "Proxying rest call");

        self.client
            .get(url)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(transport)?
            .json()
            .await
            .map_err(transport)
    }
}
