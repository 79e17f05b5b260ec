//! Upstream client for the configured notebook server

use axum::http::Method;
use reqwest::{redirect, Body, Client, Response, Url};
use tokio::net::TcpStream;
use tokio::time::Duration;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Response as HandshakeResponse;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::config::ProxyConfig;
use crate::error::ForwardingError;
use crate::proxy::interceptor::InterceptedRequest;

pub type UpstreamSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Clone)]
pub struct UpstreamClient {
    http_client: Client,
    target: Url,
}

impl UpstreamClient {
    pub fn new(config: &ProxyConfig) -> Result<Self, reqwest::Error> {
        // Redirects go back to the client untouched so the bearer token
        // never follows them to another host.
        let http_client = Client::builder()
            .redirect(redirect::Policy::none())
            .pool_max_idle_per_host(16)
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Duration::from_secs(60))
            .build()?;

        Ok(Self {
            http_client,
            target: config.target().clone(),
        })
    }

    /// Map a local `path?query` onto the upstream target.
    ///
    /// URL parsing would resolve `.` and `..` segments and so forward a
    /// different path than the client sent, possibly outside the target
    /// prefix. Such paths are refused.
    pub fn target_url(&self, path: &str, query: Option<&str>) -> Result<Url, ForwardingError> {
        if has_dot_segment(path) {
            return Err(ForwardingError::DotSegment {
                path: path.to_string(),
            });
        }

        let base = self.target.path().trim_end_matches('/');
        let path = if path.starts_with('/') {
            path.to_string()
        } else {
            format!("/{}", path)
        };

        let mut url = self.target.clone();
        url.set_path(&format!("{}{}", base, path));
        url.set_query(query);
        url.set_fragment(None);

        self.ensure_upstream(&url)?;
        Ok(url)
    }

    fn ensure_upstream(&self, url: &Url) -> Result<(), ForwardingError> {
        if url.origin() == self.target.origin() {
            Ok(())
        } else {
            Err(ForwardingError::ForeignDestination {
                url: url.to_string(),
            })
        }
    }

    /// Send a plain HTTP request, returning the upstream response as-is
    pub async fn send(
        &self,
        method: Method,
        request: InterceptedRequest,
        body: Body,
    ) -> Result<Response, ForwardingError> {
        self.ensure_upstream(&request.url)?;

        let response = self
            .http_client
            .request(method, request.url)
            .headers(request.headers)
            .body(body)
            .send()
            .await?;

        Ok(response)
    }

    /// Open a websocket to the upstream with the request's headers
    pub async fn connect_websocket(
        &self,
        request: InterceptedRequest,
    ) -> Result<(UpstreamSocket, HandshakeResponse), ForwardingError> {
        self.ensure_upstream(&request.url)?;

        let ws_url = websocket_url(&request.url)?;
        let mut upstream_request = ws_url.as_str().into_client_request()?;
        for (name, value) in request.headers.iter() {
            upstream_request.headers_mut().append(name.clone(), value.clone());
        }

        let connection = tokio_tungstenite::connect_async(upstream_request).await?;
        Ok(connection)
    }
}

// A backslash also separates segments in http(s) URLs
fn has_dot_segment(path: &str) -> bool {
    path.split(['/', '\\']).any(|segment| {
        let segment = segment.to_ascii_lowercase().replace("%2e", ".");
        segment == "." || segment == ".."
    })
}

/// `http(s)://` to `ws(s)://`
pub fn websocket_url(url: &Url) -> Result<Url, ForwardingError> {
    let scheme = match url.scheme() {
        "http" => "ws",
        "https" => "wss",
        "ws" | "wss" => return Ok(url.clone()),
        other => {
            return Err(ForwardingError::InvalidUrl(format!(
                "unsupported scheme '{}'",
                other
            )))
        }
    };

    let mut ws_url = url.clone();
    ws_url
        .set_scheme(scheme)
        .map_err(|_| ForwardingError::InvalidUrl(url.to_string()))?;
    Ok(ws_url)
}
