//! Interception hooks around each forwarded request
//!
//! A [`Pipeline`] runs a fixed list of [`Interceptor`]s: every hook is called
//! synchronously, in registration order, at one of three points of a
//! forwarding operation.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::Response;
use reqwest::Url;

use crate::config::ProxyConfig;
use crate::error::ForwardingError;
use crate::proxy::cors::CorsFilter;
use crate::proxy::headers::HeaderInjector;

pub const PROXY_ERROR_BODY: &str = "An error occurred while proxying request.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForwardKind {
    Http,
    WebSocket,
}

/// An outbound request about to leave the process
#[derive(Debug)]
pub struct InterceptedRequest {
    pub url: Url,
    pub headers: HeaderMap,
    pub kind: ForwardKind,
}

/// An upstream response about to be returned to the client
#[derive(Debug)]
pub struct InterceptedResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    /// `Origin` header of the original client request
    pub request_origin: Option<String>,
}

pub trait Interceptor: Send + Sync {
    fn before_forward(&self, _request: &mut InterceptedRequest) {}

    fn after_receive(&self, _response: &mut InterceptedResponse) {}

    fn on_transport_error(&self, _url: &Url, _error: &ForwardingError) {}
}

/// Logs transport failures so operators can see why a client got a 500
pub struct TransportErrorLog;

impl Interceptor for TransportErrorLog {
    fn on_transport_error(&self, url: &Url, error: &ForwardingError) {
        tracing::error!(target_url = %url, "Proxy error: {}", error);
    }
}

pub struct Pipeline {
    interceptors: Vec<Arc<dyn Interceptor>>,
}

impl Pipeline {
    pub fn new(interceptors: Vec<Arc<dyn Interceptor>>) -> Self {
        Self { interceptors }
    }

    /// Header injection, then CORS, then error logging
    pub fn for_config(config: Arc<ProxyConfig>) -> Self {
        Self::new(vec![
            Arc::new(HeaderInjector::new(config.clone())),
            Arc::new(CorsFilter::new(config)),
            Arc::new(TransportErrorLog),
        ])
    }

    pub fn before_forward(&self, request: &mut InterceptedRequest) {
        for interceptor in &self.interceptors {
            interceptor.before_forward(request);
        }
    }

    pub fn after_receive(&self, response: &mut InterceptedResponse) {
        for interceptor in &self.interceptors {
            interceptor.after_receive(response);
        }
    }

    /// Run the error hooks and build the generic 500 sent to the client
    pub fn on_transport_error(&self, url: &Url, error: &ForwardingError) -> Response {
        for interceptor in &self.interceptors {
            interceptor.on_transport_error(url, error);
        }
        proxy_error_response()
    }
}

pub fn proxy_error_response() -> Response {
    let mut response = Response::new(Body::from(PROXY_ERROR_BODY));
    *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
    response
        .headers_mut()
        .insert(header::CONTENT_TYPE, HeaderValue::from_static("text/plain"));
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct Recorder {
        name: &'static str,
        calls: Arc<Mutex<Vec<String>>>,
    }

    impl Interceptor for Recorder {
        fn before_forward(&self, _request: &mut InterceptedRequest) {
            self.calls.lock().unwrap().push(format!("{}:before", self.name));
        }

        fn after_receive(&self, _response: &mut InterceptedResponse) {
            self.calls.lock().unwrap().push(format!("{}:after", self.name));
        }

        fn on_transport_error(&self, _url: &Url, _error: &ForwardingError) {
            self.calls.lock().unwrap().push(format!("{}:error", self.name));
        }
    }

    #[test]
    fn hooks_run_in_registration_order() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let pipeline = Pipeline::new(vec![
            Arc::new(Recorder { name: "a", calls: calls.clone() }),
            Arc::new(Recorder { name: "b", calls: calls.clone() }),
        ]);

        let url = Url::parse("https://hub.example.org/user/a/api").unwrap();
        let mut request = InterceptedRequest {
            url: url.clone(),
            headers: HeaderMap::new(),
            kind: ForwardKind::Http,
        };
        let mut response = InterceptedResponse {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            request_origin: None,
        };

        pipeline.before_forward(&mut request);
        pipeline.after_receive(&mut response);
        let error = ForwardingError::InvalidUrl("boom".to_string());
        let _ = pipeline.on_transport_error(&url, &error);

        assert_eq!(
            *calls.lock().unwrap(),
            vec!["a:before", "b:before", "a:after", "b:after", "a:error", "b:error"]
        );
    }

    #[test]
    fn transport_error_yields_plain_text_500() {
        let pipeline = Pipeline::new(vec![Arc::new(TransportErrorLog)]);
        let url = Url::parse("https://hub.example.org/user/a/").unwrap();
        let error = ForwardingError::ForeignDestination { url: "https://elsewhere.org/".to_string() };

        let response = pipeline.on_transport_error(&url, &error);
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "text/plain");
    }
}
