//! Outbound header injection and hop-by-hop header filtering

use std::sync::Arc;

use axum::http::{header, HeaderMap, HeaderName, HeaderValue};

use crate::config::ProxyConfig;
use crate::proxy::interceptor::{ForwardKind, InterceptedRequest, Interceptor};

/// Headers that describe a single connection and must not be forwarded
const HOP_BY_HOP: [HeaderName; 8] = [
    header::CONNECTION,
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
    HeaderName::from_static("keep-alive"),
];

/// Sets the bearer token on every outbound request, and the upstream's own
/// origin on WebSocket handshakes.
pub struct HeaderInjector {
    config: Arc<ProxyConfig>,
}

impl HeaderInjector {
    pub fn new(config: Arc<ProxyConfig>) -> Self {
        Self { config }
    }
}

impl Interceptor for HeaderInjector {
    fn before_forward(&self, request: &mut InterceptedRequest) {
        request
            .headers
            .insert(header::AUTHORIZATION, self.config.authorization().clone());

        if request.kind == ForwardKind::WebSocket {
            // Jupyter rejects websocket connections whose Origin is not its own host
            if let Ok(origin) = HeaderValue::from_str(self.config.upstream_origin()) {
                request.headers.insert(header::ORIGIN, origin);
            }
        }
    }
}

/// Copy end-to-end headers, dropping hop-by-hop ones, anything listed in
/// `Connection`, and `Host`.
pub fn forwardable_headers(source: &HeaderMap) -> HeaderMap {
    let connection_listed: Vec<HeaderName> = source
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();

    let mut headers = HeaderMap::with_capacity(source.len());
    for (name, value) in source.iter() {
        if name == header::HOST
            || HOP_BY_HOP.contains(name)
            || connection_listed.contains(name)
        {
            continue;
        }
        headers.append(name.clone(), value.clone());
    }
    headers
}
