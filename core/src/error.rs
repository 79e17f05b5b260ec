//! Error types for startup and forwarding

use std::path::PathBuf;

use thiserror::Error;

/// Invalid or unreadable startup parameters.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid upstream URL '{url}': {reason}")]
    InvalidTarget { url: String, reason: String },

    #[error("upstream URL must use http or https, got '{scheme}'")]
    UnsupportedScheme { scheme: String },

    #[error("bearer token must not be empty")]
    EmptyToken,

    #[error("bearer token contains characters that are not valid in a header")]
    InvalidToken,

    #[error("config file not found: {0:?}")]
    ConfigFileNotFound(PathBuf),

    #[error("failed to read config file {path:?}: {source}")]
    ReadConfigFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path:?}: {source}")]
    ParseConfigFile {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// The pre-flight server status check failed.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("cannot derive a user name from '{url}': expected a path like /user/<name>")]
    MissingUser { url: String },

    #[error("status request for user '{user}' at {base} failed: {source}")]
    Request {
        user: String,
        base: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("status request for user '{user}' at {base} returned HTTP {status}")]
    Status {
        user: String,
        base: String,
        status: reqwest::StatusCode,
    },

    #[error("unable to get server information for user '{user}' at {base}")]
    MissingServers { user: String, base: String },

    #[error("no active servers found for user '{user}' at {base}")]
    NoActiveServers { user: String, base: String },
}

/// A single forwarded request could not reach the upstream.
#[derive(Debug, Error)]
pub enum ForwardingError {
    #[error("upstream request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("upstream websocket handshake failed: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("refusing to forward to {url}: not the configured upstream")]
    ForeignDestination { url: String },

    #[error("refusing to forward '{path}': dot segments would change the upstream path")]
    DotSegment { path: String },

    #[error("cannot build upstream URL: {0}")]
    InvalidUrl(String),
}

/// Anything that stops the proxy from starting.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Probe(#[from] ProbeError),

    #[error("failed to create HTTP client: {0}")]
    HttpClient(#[source] reqwest::Error),

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
}
