use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use axum::http::HeaderValue;
use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

pub const DEFAULT_PORT: u16 = 8010;

const LOCAL_CONFIG_FILE: &str = "jupyter-web-proxy.toml";

/// How responses to requests from non-allowed origins are treated
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum CorsPolicy {
    /// Leave the response untouched
    #[default]
    Permissive,
    /// Answer with `Access-Control-Allow-Origin: null`
    Strict,
}

impl FromStr for CorsPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "permissive" => Ok(Self::Permissive),
            "strict" => Ok(Self::Strict),
            other => Err(format!(
                "unknown CORS policy '{}', expected 'permissive' or 'strict'",
                other
            )),
        }
    }
}

impl fmt::Display for CorsPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Permissive => f.write_str("permissive"),
            Self::Strict => f.write_str("strict"),
        }
    }
}

/// Origins allowed to read proxied responses cross-origin.
///
/// Matching is exact and case-sensitive. Entries are trimmed when the list is
/// built; blank entries are dropped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AllowedOrigins(Vec<String>);

impl AllowedOrigins {
    /// Parse a comma-separated list. `None` yields an empty list.
    pub fn parse(list: Option<&str>) -> Self {
        match list {
            Some(list) => Self::from_entries(list.split(',')),
            None => Self::default(),
        }
    }

    pub fn from_entries<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self(
            entries
                .into_iter()
                .map(|e| e.as_ref().trim().to_string())
                .filter(|e| !e.is_empty())
                .collect(),
        )
    }

    pub fn contains(&self, origin: &str) -> bool {
        self.0.iter().any(|allowed| allowed == origin)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

/// Immutable proxy configuration, built once at startup
#[derive(Clone)]
pub struct ProxyConfig {
    target: Url,
    token: String,
    authorization: HeaderValue,
    upstream_origin: String,
    port: u16,
    allowed_origins: AllowedOrigins,
    cors_policy: CorsPolicy,
}

impl ProxyConfig {
    pub fn new(
        target: &str,
        token: &str,
        port: u16,
        allowed_origins: AllowedOrigins,
        cors_policy: CorsPolicy,
    ) -> Result<Self, ConfigError> {
        let target = Url::parse(target.trim()).map_err(|e| ConfigError::InvalidTarget {
            url: target.to_string(),
            reason: e.to_string(),
        })?;

        if target.scheme() != "http" && target.scheme() != "https" {
            return Err(ConfigError::UnsupportedScheme {
                scheme: target.scheme().to_string(),
            });
        }
        if target.host_str().is_none() {
            return Err(ConfigError::InvalidTarget {
                url: target.to_string(),
                reason: "missing host".to_string(),
            });
        }

        let token = token.trim();
        if token.is_empty() {
            return Err(ConfigError::EmptyToken);
        }
        let mut authorization = HeaderValue::from_str(&format!("Bearer {}", token))
            .map_err(|_| ConfigError::InvalidToken)?;
        authorization.set_sensitive(true);

        let upstream_origin = target.origin().ascii_serialization();

        Ok(Self {
            target,
            token: token.to_string(),
            authorization,
            upstream_origin,
            port,
            allowed_origins,
            cors_policy,
        })
    }

    /// The upstream server URL every request is forwarded under
    pub fn target(&self) -> &Url {
        &self.target
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    /// Pre-built `Bearer <token>` header value
    pub fn authorization(&self) -> &HeaderValue {
        &self.authorization
    }

    /// Scheme, host and port of the upstream, e.g. `https://hub.example.org`
    pub fn upstream_origin(&self) -> &str {
        &self.upstream_origin
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn allowed_origins(&self) -> &AllowedOrigins {
        &self.allowed_origins
    }

    pub fn cors_policy(&self) -> CorsPolicy {
        self.cors_policy
    }

    /// Local listen address. The proxy only ever binds loopback.
    pub fn bind_address(&self) -> String {
        format!("127.0.0.1:{}", self.port)
    }
}

impl fmt::Debug for ProxyConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyConfig")
            .field("target", &self.target.as_str())
            .field("token", &"<redacted>")
            .field("port", &self.port)
            .field("allowed_origins", &self.allowed_origins)
            .field("cors_policy", &self.cors_policy)
            .finish()
    }
}

/// Settings that may come from a config file
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FileConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub cors: CorsConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CorsConfig {
    #[serde(default)]
    pub allowed_origins: Vec<String>,

    #[serde(default)]
    pub policy: CorsPolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_port() -> u16 { DEFAULT_PORT }
fn default_log_level() -> String { "info".to_string() }

/// Default config file path, `~/.config/jupyter-web-proxy/config.toml`
pub fn default_config_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("jupyter-web-proxy")
        .join("config.toml")
}

/// Load the config file, or return defaults if none is found.
///
/// Loading order:
/// 1. Specified path (must exist)
/// 2. ./jupyter-web-proxy.toml
/// 3. default_config_path()
///
/// The first file that exists is used; a file that cannot be read or parsed
/// is an error rather than skipped.
pub fn load_config(path: Option<PathBuf>) -> Result<FileConfig, ConfigError> {
    load_first(path, &[PathBuf::from(LOCAL_CONFIG_FILE), default_config_path()])
}

fn load_first(path: Option<PathBuf>, candidates: &[PathBuf]) -> Result<FileConfig, ConfigError> {
    if let Some(config_path) = path {
        if !config_path.exists() {
            return Err(ConfigError::ConfigFileNotFound(config_path));
        }
        let config = read_config_file(&config_path)?;
        tracing::info!("Loaded config from specified path {:?}", config_path);
        return Ok(config);
    }

    match candidates.iter().find(|candidate| candidate.exists()) {
        Some(config_path) => {
            let config = read_config_file(config_path)?;
            tracing::info!("Loaded config from {:?}", config_path);
            Ok(config)
        }
        None => {
            tracing::debug!("No config file found, using defaults");
            Ok(FileConfig::default())
        }
    }
}

fn read_config_file(path: &Path) -> Result<FileConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadConfigFile {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&content).map_err(|source| ConfigError::ParseConfigFile {
        path: path.to_path_buf(),
        source,
    })
}
