//! Shared helpers: mock upstream servers and proxy startup

#![allow(dead_code)]

use std::net::SocketAddr;

use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json};
use axum::routing::get;
use axum::Router;
use jupyter_proxy_core::proxy::ProxyServer;
use jupyter_proxy_core::{AllowedOrigins, CorsPolicy, ProxyConfig};
use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

pub const TOKEN: &str = "secret-token";
pub const ALLOWED_ORIGIN: &str = "https://nbfiddle.org";

/// Serve `app` on a random loopback port
pub async fn spawn_upstream(app: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

/// A port nothing is listening on
pub fn closed_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

pub fn config(upstream: SocketAddr, port: u16, policy: CorsPolicy) -> ProxyConfig {
    ProxyConfig::new(
        &format!("http://{}/user/alice", upstream),
        TOKEN,
        port,
        AllowedOrigins::parse(Some(&format!("{}, http://localhost:5173", ALLOWED_ORIGIN))),
        policy,
    )
    .unwrap()
}

/// Bind a proxy without the status check and serve it in the background
pub async fn spawn_proxy(config: ProxyConfig) -> SocketAddr {
    let bound = ProxyServer::new(config).unwrap().bind().await.unwrap();
    let addr = bound.local_addr().unwrap();
    tokio::spawn(async move {
        bound.serve(std::future::pending()).await.unwrap();
    });
    addr
}

/// JupyterHub users API answering `body` for user `alice` when called with
/// the test token
pub fn hub_api(body: Value) -> Router {
    Router::new().route(
        "/hub/api/users/alice",
        get(move |headers: HeaderMap| {
            let body = body.clone();
            async move {
                let expected = format!("Bearer {}", TOKEN);
                match headers.get(header::AUTHORIZATION) {
                    Some(value) if value == expected.as_str() => Json(body).into_response(),
                    _ => StatusCode::FORBIDDEN.into_response(),
                }
            }
        }),
    )
}

/// Upstream that drops its first connection without answering, then replies
/// `200 ok` to everything
pub async fn spawn_flaky_upstream() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let mut first = true;
        loop {
            let (mut stream, _) = match listener.accept().await {
                Ok(conn) => conn,
                Err(_) => break,
            };
            if first {
                first = false;
                drop(stream);
                continue;
            }
            tokio::spawn(async move {
                let mut request = Vec::new();
                let mut buf = [0u8; 4096];
                loop {
                    let n = stream.read(&mut buf).await.unwrap_or(0);
                    if n == 0 {
                        break;
                    }
                    request.extend_from_slice(&buf[..n]);
                    if request.windows(4).any(|w| w == b"\r\n\r\n") {
                        break;
                    }
                }
                let _ = stream
                    .write_all(
                        b"HTTP/1.1 200 OK\r\ncontent-type: text/plain\r\ncontent-length: 2\r\nconnection: close\r\n\r\nok",
                    )
                    .await;
                let _ = stream.shutdown().await;
            });
        }
    });

    addr
}
