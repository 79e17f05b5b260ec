//! Proxy Server - Axum HTTP server

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{Request, State, WebSocketUpgrade},
    response::Response,
    Router,
};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use crate::config::ProxyConfig;
use crate::error::StartupError;
use crate::probe::LivenessProber;
use crate::proxy::handlers::{forward_http, forward_websocket};
use crate::proxy::interceptor::Pipeline;
use crate::proxy::upstream::UpstreamClient;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ProxyConfig>,
    pub pipeline: Arc<Pipeline>,
    pub upstream: Arc<UpstreamClient>,
}

/// Proxy server instance
pub struct ProxyServer {
    state: AppState,
}

impl ProxyServer {
    pub fn new(config: ProxyConfig) -> Result<Self, StartupError> {
        let upstream = UpstreamClient::new(&config).map_err(StartupError::HttpClient)?;
        let config = Arc::new(config);

        let state = AppState {
            pipeline: Arc::new(Pipeline::for_config(config.clone())),
            upstream: Arc::new(upstream),
            config,
        };

        Ok(Self { state })
    }

    /// Every path and method goes to the forwarding handler
    pub fn router(&self) -> Router {
        Router::new()
            .fallback(proxy_handler)
            .layer(TraceLayer::new_for_http())
            .with_state(self.state.clone())
    }

    pub async fn bind(self) -> Result<BoundProxy, StartupError> {
        let addr = self.state.config.bind_address();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| StartupError::Bind { addr, source })?;

        Ok(BoundProxy {
            app: self.router(),
            listener,
            config: self.state.config,
        })
    }
}

/// A proxy whose listener is bound but not yet serving
pub struct BoundProxy {
    app: Router,
    listener: TcpListener,
    config: Arc<ProxyConfig>,
}

impl BoundProxy {
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub async fn serve<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = self.listener.local_addr()?;
        tracing::info!("jupyter-web-proxy running on http://localhost:{}", addr.port());
        tracing::info!("Proxying to {}", self.config.target());
        if self.config.allowed_origins().is_empty() {
            tracing::info!("No CORS origins allowed");
        } else {
            let origins: Vec<&str> = self.config.allowed_origins().iter().collect();
            tracing::info!(
                "CORS origins ({}): {}",
                self.config.cors_policy(),
                origins.join(", ")
            );
        }

        axum::serve(self.listener, self.app)
            .with_graceful_shutdown(shutdown)
            .await?;

        tracing::info!("Proxy server stopped");
        Ok(())
    }
}

/// Check that the user's server is up, then bind the listener.
///
/// Nothing is bound when the check fails.
pub async fn start(config: ProxyConfig) -> Result<BoundProxy, StartupError> {
    LivenessProber::new(&config).check().await?;
    ProxyServer::new(config)?.bind().await
}

async fn proxy_handler(
    State(state): State<AppState>,
    ws: Option<WebSocketUpgrade>,
    request: Request,
) -> Response {
    match ws {
        Some(ws) => {
            let (parts, _body) = request.into_parts();
            forward_websocket(&state, ws, &parts).await
        }
        None => forward_http(&state, request).await,
    }
}

/// Shutdown signal handler
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AllowedOrigins, CorsPolicy};
    use axum::body::Body;
    use axum::http::{header, StatusCode};
    use tower::ServiceExt;

    fn server(target: &str) -> ProxyServer {
        let config = ProxyConfig::new(
            target,
            "tok",
            0,
            AllowedOrigins::parse(Some("https://nbfiddle.org")),
            CorsPolicy::Permissive,
        )
        .unwrap();
        ProxyServer::new(config).unwrap()
    }

    #[tokio::test]
    async fn unreachable_upstream_returns_plain_text_500() {
        // Grab a free port, then close it so connections are refused
        let closed = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = closed.local_addr().unwrap().port();
        drop(closed);

        let app = server(&format!("http://127.0.0.1:{}/user/alice", port)).router();
        let response = app
            .oneshot(axum::http::Request::builder().uri("/api/status").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "text/plain");
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], crate::proxy::interceptor::PROXY_ERROR_BODY.as_bytes());
    }

    #[tokio::test]
    async fn bind_uses_loopback() {
        let bound = server("http://127.0.0.1:9/user/alice").bind().await.unwrap();
        let addr = bound.local_addr().unwrap();
        assert!(addr.ip().is_loopback());
        assert_ne!(addr.port(), 0);
    }
}
