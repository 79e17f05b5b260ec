//! jupyter-web-proxy core library
//! Config, server status probe and the forwarding proxy

pub mod config;
pub mod error;
pub mod probe;
pub mod proxy;

pub use config::{AllowedOrigins, CorsPolicy, ProxyConfig};
pub use error::{ConfigError, ForwardingError, ProbeError, StartupError};
pub use probe::{LivenessProber, ServerStatusRecord};
