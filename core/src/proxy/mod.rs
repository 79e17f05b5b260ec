//! Proxy module - forwarding server and its interception pipeline

pub mod cors;
pub mod handlers;
pub mod headers;
pub mod interceptor;
pub mod server;
pub mod upstream;

pub use cors::CorsFilter;
pub use headers::HeaderInjector;
pub use interceptor::{ForwardKind, InterceptedRequest, InterceptedResponse, Interceptor, Pipeline};
pub use server::{shutdown_signal, start, AppState, BoundProxy, ProxyServer};
