//! `BeaconServer`: Axum HTTP + WebSocket server for one worker.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use axum::Router;
use axum::extract::State;
use axum::extract::ws::WebSocketUpgrade;
use axum::response::{Json, Response};
use axum::routing::get;
use beacon_bus::DistributedLock;
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::config::ServerConfig;
use crate::context::ServerContext;
use crate::errors::{Result, ServerError};
use crate::health::{self, HealthResponse};
use crate::scheduler::PeriodicNotifier;
use crate::websocket::session::run_session;

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Worker context.
    pub ctx: Arc<ServerContext>,
    /// Prometheus handle for `/metrics`.
    pub metrics: PrometheusHandle,
}

/// The worker's server.
pub struct BeaconServer {
    config: ServerConfig,
    ctx: Arc<ServerContext>,
    metrics: PrometheusHandle,
    background_started: AtomicBool,
}

impl BeaconServer {
    /// Create a new server around `ctx`.
    pub fn new(config: ServerConfig, ctx: ServerContext, metrics: PrometheusHandle) -> Self {
        Self {
            config,
            ctx: Arc::new(ctx),
            metrics,
            background_started: AtomicBool::new(false),
        }
    }

    /// Build the Axum router with all routes.
    pub fn router(&self) -> Router {
        let state = AppState {
            ctx: Arc::clone(&self.ctx),
            metrics: self.metrics.clone(),
        };

        Router::new()
            .route(&self.config.ws_path, get(ws_handler))
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler))
            .layer(TraceLayer::new_for_http())
            .with_state(state)
    }

    /// Start the bus subscription and the periodic notifier. Only the first
    /// call does anything.
    pub async fn start_background(&self) {
        if self.background_started.swap(true, Ordering::AcqRel) {
            return;
        }
        let token = self.ctx.shutdown.token();
        let _ = self.ctx.bridge.start_subscription(token.clone()).await;

        let lock = DistributedLock::new(
            Arc::clone(&self.ctx.broker),
            self.config.lock_key.clone(),
            self.config.lock_ttl,
            self.ctx.process.to_string(),
        );
        let notifier = PeriodicNotifier::new(
            self.ctx.process,
            Arc::clone(&self.ctx.bridge),
            lock,
            self.config.broadcast_interval,
        );
        self.ctx.shutdown.track(notifier.spawn(token));
    }

    /// Bind and serve on a background task. The task yields the serve error,
    /// if any.
    ///
    /// The listener keeps accepting during shutdown so late clients receive
    /// the 1001 close instead of a refused TCP connection.
    pub async fn listen(&self) -> Result<(SocketAddr, JoinHandle<std::io::Result<()>>)> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: addr.clone(),
                source,
            })?;
        let local_addr = listener.local_addr()?;
        let router = self.router();

        let handle = tokio::spawn(async move {
            let result = axum::serve(listener, router).await;
            if let Err(e) = &result {
                error!(error = %e, "server stopped");
            }
            result
        });
        info!(
            pid = %self.ctx.process,
            %local_addr,
            ws_path = %self.config.ws_path,
            "worker listening"
        );
        Ok((local_addr, handle))
    }

    /// Worker context.
    pub fn context(&self) -> &Arc<ServerContext> {
        &self.ctx
    }

    /// Get the server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

/// GET `<ws_path>`: upgrade and run a session.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| async move {
        let _ = run_session(socket, state.ctx).await;
    })
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(health::health_check(&state.ctx))
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> String {
    state.metrics.render()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::detached_handle;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use beacon_bus::MemoryBroker;
    use beacon_core::ProcessId;
    use std::time::Duration;
    use tower::ServiceExt;

    fn make_server(config: ServerConfig) -> BeaconServer {
        let ctx = ServerContext::new(ProcessId::from(9), Arc::new(MemoryBroker::new()), &config);
        BeaconServer::new(config, ctx, detached_handle())
    }

    async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let req = Request::builder().uri(uri).body(Body::empty()).unwrap();
        let resp = app.oneshot(req).await.unwrap();
        let status = resp.status();
        let body = axum::body::to_bytes(resp.into_body(), 10_000).await.unwrap();
        (status, serde_json::from_slice(&body).unwrap_or_default())
    }

    #[tokio::test]
    async fn health_endpoint_returns_ok() {
        let server = make_server(ServerConfig::default());
        let (status, body) = get_json(server.router(), "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["pid"], 9);
        assert_eq!(body["bus"], "local-only");
        assert!(body["connections"].is_number());
    }

    #[tokio::test]
    async fn health_reports_draining() {
        let server = make_server(ServerConfig::default());
        let _ = server.context().shutdown.trigger();
        let (_, body) = get_json(server.router(), "/health").await;
        assert_eq!(body["status"], "draining");
    }

    #[tokio::test]
    async fn metrics_endpoint_serves_text() {
        let server = make_server(ServerConfig::default());
        let req = Request::builder().uri("/metrics").body(Body::empty()).unwrap();
        let resp = server.router().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn ws_route_requires_upgrade() {
        let server = make_server(ServerConfig::default());
        let req = Request::builder().uri("/ws").body(Body::empty()).unwrap();
        let resp = server.router().oneshot(req).await.unwrap();
        assert_ne!(resp.status(), StatusCode::OK);
        assert_ne!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn custom_ws_path() {
        let config = ServerConfig {
            ws_path: "/live".into(),
            ..ServerConfig::default()
        };
        let server = make_server(config);
        let req = Request::builder().uri("/ws").body(Body::empty()).unwrap();
        let resp = server.router().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn unknown_route_returns_404() {
        let server = make_server(ServerConfig::default());
        let req = Request::builder().uri("/nonexistent").body(Body::empty()).unwrap();
        let resp = server.router().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn listen_on_free_port() {
        let server = make_server(ServerConfig::default());
        let (addr, handle) = server.listen().await.unwrap();
        assert_ne!(addr.port(), 0);
        handle.abort();
    }

    #[tokio::test]
    async fn bind_failure_is_reported() {
        let server = make_server(ServerConfig::default());
        let (addr, handle) = server.listen().await.unwrap();
        let clash = make_server(ServerConfig {
            port: addr.port(),
            ..ServerConfig::default()
        });
        let err = clash.listen().await.unwrap_err();
        assert!(matches!(err, ServerError::Bind { .. }));
        handle.abort();
    }

    #[tokio::test]
    async fn background_starts_once() {
        let server = make_server(ServerConfig {
            broadcast_interval: Duration::from_secs(60),
            lock_ttl: Duration::from_secs(59),
            ..ServerConfig::default()
        });
        server.start_background().await;
        server.start_background().await;
        let (_, body) = get_json(server.router(), "/health").await;
        assert_eq!(body["bus"], "subscribed");
    }
}
