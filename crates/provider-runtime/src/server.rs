//! # Relay Server
//!
//! The serving component of one endpoint. The orchestrator hands it a
//! [`ServeContext`] and forgets about it; the server owns its listener task
//! and stops when the shutdown watch flips to `true`.
//!
//! Only the operational surface is served here:
//!
//! - `GET /health` - liveness
//! - `GET /status` - endpoint, chain head, epoch and provider address

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use serde::Serialize;
use shared_types::EndpointConfig;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::chain_tracker;
use crate::ports::{
    ChainParser, ChainProxy, RelayServer, ReliabilityManager, RewardLedger, SessionManager,
};
use crate::signer::ProviderIdentity;

/// Everything a serving component is started with.
#[derive(Clone)]
pub struct ServeContext {
    pub endpoint: EndpointConfig,
    pub chain_parser: Arc<dyn ChainParser>,
    pub chain_proxy: Arc<dyn ChainProxy>,
    pub reward_ledger: Arc<dyn RewardLedger>,
    pub session_manager: Arc<dyn SessionManager>,
    pub reliability_manager: Arc<dyn ReliabilityManager>,
    pub identity: Arc<ProviderIdentity>,
    /// Address of the relay cache backend, if one is configured.
    pub cache: Option<String>,
    /// Flips to `true` when the process is shutting down.
    pub shutdown: watch::Receiver<bool>,
}

/// Handle to a started serving component.
#[derive(Debug, Default)]
pub struct ServerHandle {
    task: Option<JoinHandle<()>>,
    local_addr: Option<oneshot::Receiver<SocketAddr>>,
}

impl ServerHandle {
    /// A handle with no task behind it, for servers that run elsewhere.
    #[must_use]
    pub fn detached() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn from_task(task: JoinHandle<()>) -> Self {
        Self {
            task: Some(task),
            local_addr: None,
        }
    }

    /// Address the listener bound to. Resolves once; `None` if binding
    /// failed or the handle has no listener.
    pub async fn local_addr(&mut self) -> Option<SocketAddr> {
        self.local_addr.take()?.await.ok()
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Wait for the server task to finish.
    pub async fn join(mut self) {
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

/// Status body served at `/status`.
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub chain_id: String,
    pub api_interface: String,
    pub network_address: String,
    pub provider: String,
    pub latest_block: u64,
    pub current_epoch: u64,
    pub active_sessions: usize,
    pub pending_claims: usize,
    pub average_block_time_ms: u64,
    pub cache: Option<String>,
}

impl StatusReport {
    #[must_use]
    pub fn collect(ctx: &ServeContext) -> Self {
        Self {
            chain_id: ctx.endpoint.chain_id.clone(),
            api_interface: ctx.endpoint.api_interface.clone(),
            network_address: ctx.endpoint.network_address.clone(),
            provider: ctx.identity.address.to_string(),
            latest_block: ctx.reliability_manager.latest_block(),
            current_epoch: ctx.session_manager.current_epoch(),
            active_sessions: ctx.session_manager.active_sessions(),
            pending_claims: ctx.reward_ledger.pending_claims(),
            average_block_time_ms: chain_tracker::millis(
                ctx.chain_parser.block_stats().average_block_time,
            ),
            cache: ctx.cache.clone(),
        }
    }
}

async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

async fn status(State(ctx): State<Arc<ServeContext>>) -> Json<StatusReport> {
    Json(StatusReport::collect(&ctx))
}

/// Build the router for one endpoint.
pub fn router(ctx: ServeContext) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/status", get(status))
        .with_state(Arc::new(ctx))
}

/// Default serving component: an `axum` listener on the endpoint's address.
#[derive(Debug, Default, Clone, Copy)]
pub struct RpcProviderServer;

impl RpcProviderServer {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl RelayServer for RpcProviderServer {
    fn serve(&self, ctx: ServeContext) -> ServerHandle {
        let addr = ctx.endpoint.network_address.clone();
        let summary = ctx.endpoint.summary();
        let mut shutdown = ctx.shutdown.clone();
        let (addr_tx, addr_rx) = oneshot::channel();
        let app = router(ctx);

        let task = tokio::spawn(async move {
            let listener = match tokio::net::TcpListener::bind(&addr).await {
                Ok(listener) => listener,
                Err(e) => {
                    error!(endpoint = %summary, error = %e, "Failed binding relay listener");
                    return;
                }
            };
            if let Ok(local) = listener.local_addr() {
                let _ = addr_tx.send(local);
            }
            info!(endpoint = %summary, "Relay server listening");

            let stop = async move {
                // An Err means the orchestrator is gone; stop either way.
                let _ = shutdown.wait_for(|stopping| *stopping).await;
            };
            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(stop)
                .await
            {
                error!(endpoint = %summary, error = %e, "Relay server error");
            }
            info!(endpoint = %summary, "Relay server stopped");
        });

        ServerHandle {
            task: Some(task),
            local_addr: Some(addr_rx),
        }
    }
}
