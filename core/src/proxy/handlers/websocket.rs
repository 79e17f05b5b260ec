//! WebSocket upgrade forwarding and frame relay

use axum::body::Body;
use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::http::request::Parts;
use axum::http::{header, HeaderMap, HeaderName};
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use reqwest::Url;
use tokio_tungstenite::tungstenite;

use crate::error::ForwardingError;
use crate::proxy::headers::forwardable_headers;
use crate::proxy::interceptor::{ForwardKind, InterceptedRequest, InterceptedResponse};
use crate::proxy::server::AppState;
use crate::proxy::upstream::UpstreamSocket;

/// Generated afresh by the upstream handshake
const HANDSHAKE_HEADERS: [HeaderName; 4] = [
    header::SEC_WEBSOCKET_KEY,
    header::SEC_WEBSOCKET_VERSION,
    header::SEC_WEBSOCKET_EXTENSIONS,
    header::SEC_WEBSOCKET_ACCEPT,
];

/// Connect to the upstream first, then accept the client's upgrade with
/// whatever sub-protocol the upstream picked.
pub async fn forward_websocket(state: &AppState, ws: WebSocketUpgrade, parts: &Parts) -> Response {
    let url = match state.upstream.target_url(parts.uri.path(), parts.uri.query()) {
        Ok(url) => url,
        Err(e) => return state.pipeline.on_transport_error(state.config.target(), &e),
    };

    let mut outbound = InterceptedRequest {
        url,
        headers: websocket_headers(&parts.headers),
        kind: ForwardKind::WebSocket,
    };
    state.pipeline.before_forward(&mut outbound);

    let url = outbound.url.clone();
    let (upstream, handshake) = match state.upstream.connect_websocket(outbound).await {
        Ok(connection) => connection,
        Err(ForwardingError::WebSocket(tungstenite::Error::Http(refusal))) => {
            tracing::warn!(%url, "Upstream refused WebSocket upgrade with {}", refusal.status());
            return refused_upgrade(state, refusal, request_origin(&parts.headers));
        }
        Err(e) => return state.pipeline.on_transport_error(&url, &e),
    };

    tracing::debug!("WebSocket {} -> {}", parts.uri, url);

    let protocol = handshake
        .headers()
        .get(header::SEC_WEBSOCKET_PROTOCOL)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let ws = match protocol {
        Some(protocol) => ws.protocols([protocol]),
        None => ws,
    };

    ws.on_upgrade(move |socket| relay(socket, upstream, url))
}

/// Pass the upstream's non-101 answer back as an ordinary response
fn refused_upgrade(
    state: &AppState,
    refusal: tungstenite::handshake::client::Response,
    request_origin: Option<String>,
) -> Response {
    let (parts, body) = refusal.into_parts();

    let mut headers = forwardable_headers(&parts.headers);
    // The captured body may be cut short at the end of the handshake read
    headers.remove(header::CONTENT_LENGTH);

    let mut intercepted = InterceptedResponse {
        status: parts.status,
        headers,
        request_origin,
    };
    state.pipeline.after_receive(&mut intercepted);

    let mut response = Response::new(Body::from(body.unwrap_or_default()));
    *response.status_mut() = intercepted.status;
    *response.headers_mut() = intercepted.headers;
    response
}

fn request_origin(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::ORIGIN)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

fn websocket_headers(source: &HeaderMap) -> HeaderMap {
    let mut headers = forwardable_headers(source);
    for name in HANDSHAKE_HEADERS.iter() {
        headers.remove(name);
    }
    headers
}

async fn relay(client: WebSocket, upstream: UpstreamSocket, url: Url) {
    let (mut client_tx, mut client_rx) = client.split();
    let (mut upstream_tx, mut upstream_rx) = upstream.split();

    let client_to_upstream = async {
        while let Some(message) = client_rx.next().await {
            let message = match message {
                Ok(message) => message,
                Err(e) => {
                    tracing::debug!(%url, "client read error, closing relay: {}", e);
                    break;
                }
            };
            let closing = matches!(message, Message::Close(_));
            if upstream_tx.send(into_upstream(message)).await.is_err() || closing {
                break;
            }
        }
    };

    let upstream_to_client = async {
        while let Some(message) = upstream_rx.next().await {
            let message = match message {
                Ok(message) => message,
                Err(e) => {
                    tracing::debug!(%url, "upstream read error, closing relay: {}", e);
                    break;
                }
            };
            let Some(message) = into_client(message) else {
                continue;
            };
            let closing = matches!(message, Message::Close(_));
            if client_tx.send(message).await.is_err() || closing {
                break;
            }
        }
    };

    tokio::select! {
        _ = client_to_upstream => {},
        _ = upstream_to_client => {},
    }

    tracing::debug!(%url, "WebSocket relay closed");
}

fn into_upstream(message: Message) -> tungstenite::Message {
    match message {
        Message::Text(text) => tungstenite::Message::Text(text),
        Message::Binary(data) => tungstenite::Message::Binary(data),
        Message::Ping(data) => tungstenite::Message::Ping(data),
        Message::Pong(data) => tungstenite::Message::Pong(data),
        Message::Close(frame) => tungstenite::Message::Close(frame.map(|f| {
            tungstenite::protocol::CloseFrame {
                code: f.code.into(),
                reason: f.reason,
            }
        })),
    }
}

fn into_client(message: tungstenite::Message) -> Option<Message> {
    let message = match message {
        tungstenite::Message::Text(text) => Message::Text(text),
        tungstenite::Message::Binary(data) => Message::Binary(data),
        tungstenite::Message::Ping(data) => Message::Ping(data),
        tungstenite::Message::Pong(data) => Message::Pong(data),
        tungstenite::Message::Close(frame) => Message::Close(frame.map(|f| CloseFrame {
            code: f.code.into(),
            reason: f.reason,
        })),
        // Raw frames never surface from a read
        tungstenite::Message::Frame(_) => return None,
    };
    Some(message)
}
