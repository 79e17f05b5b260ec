//! Plain HTTP forwarding

use axum::body::{Body, HttpBody};
use axum::extract::Request;
use axum::http::header;
use axum::response::Response;

use crate::proxy::headers::forwardable_headers;
use crate::proxy::interceptor::{ForwardKind, InterceptedRequest, InterceptedResponse};
use crate::proxy::server::AppState;

/// Forward one request to the upstream and relay the response back
pub async fn forward_http(state: &AppState, request: Request) -> Response {
    let (parts, body) = request.into_parts();

    let request_origin = parts
        .headers
        .get(header::ORIGIN)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let url = match state.upstream.target_url(parts.uri.path(), parts.uri.query()) {
        Ok(url) => url,
        Err(e) => return state.pipeline.on_transport_error(state.config.target(), &e),
    };

    let mut outbound = InterceptedRequest {
        url,
        headers: forwardable_headers(&parts.headers),
        kind: ForwardKind::Http,
    };
    state.pipeline.before_forward(&mut outbound);

    let url = outbound.url.clone();
    tracing::debug!("{} {} -> {}", parts.method, parts.uri, url);

    let upstream_response = match state.upstream.send(parts.method, outbound, outbound_body(body)).await {
        Ok(response) => response,
        Err(e) => return state.pipeline.on_transport_error(&url, &e),
    };

    let mut intercepted = InterceptedResponse {
        status: upstream_response.status(),
        headers: forwardable_headers(upstream_response.headers()),
        request_origin,
    };
    state.pipeline.after_receive(&mut intercepted);

    let mut response = Response::new(Body::from_stream(upstream_response.bytes_stream()));
    *response.status_mut() = intercepted.status;
    *response.headers_mut() = intercepted.headers;
    response
}

/// Stream the client body upstream; an empty body stays empty so bodiless
/// requests are not sent chunked.
fn outbound_body(body: Body) -> reqwest::Body {
    if body.size_hint().exact() == Some(0) {
        reqwest::Body::from(Vec::new())
    } else {
        reqwest::Body::wrap_stream(body.into_data_stream())
    }
}
