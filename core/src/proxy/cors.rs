//! CORS headers for allow-listed browser origins

use std::sync::Arc;

use axum::http::{header, HeaderMap, HeaderValue};

use crate::config::{CorsPolicy, ProxyConfig};
use crate::proxy::interceptor::{InterceptedResponse, Interceptor};

const ALLOW_METHODS: &str = "GET, POST, PUT, DELETE, OPTIONS";

pub struct CorsFilter {
    config: Arc<ProxyConfig>,
}

impl CorsFilter {
    pub fn new(config: Arc<ProxyConfig>) -> Self {
        Self { config }
    }

    /// Apply the configured policy for a request carrying `origin`
    pub fn apply(&self, origin: Option<&str>, headers: &mut HeaderMap) {
        let allowed = origin
            .filter(|o| self.config.allowed_origins().contains(o))
            .and_then(|o| HeaderValue::from_str(o).ok());

        match (allowed, self.config.cors_policy()) {
            (Some(origin), _) => {
                headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, origin);
                headers.insert(
                    header::ACCESS_CONTROL_ALLOW_HEADERS,
                    HeaderValue::from_static("*"),
                );
                headers.insert(
                    header::ACCESS_CONTROL_ALLOW_METHODS,
                    HeaderValue::from_static(ALLOW_METHODS),
                );
                headers.insert(
                    header::ACCESS_CONTROL_ALLOW_CREDENTIALS,
                    HeaderValue::from_static("true"),
                );
            }
            (None, CorsPolicy::Strict) => {
                headers.insert(
                    header::ACCESS_CONTROL_ALLOW_ORIGIN,
                    HeaderValue::from_static("null"),
                );
            }
            (None, CorsPolicy::Permissive) => {}
        }
    }
}

impl Interceptor for CorsFilter {
    fn after_receive(&self, response: &mut InterceptedResponse) {
        self.apply(response.request_origin.as_deref(), &mut response.headers);
    }
}
