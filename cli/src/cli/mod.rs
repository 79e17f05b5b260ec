pub mod commands;

use clap::Parser;
use std::path::PathBuf;

use jupyter_proxy_core::config::FileConfig;
use jupyter_proxy_core::{AllowedOrigins, ConfigError, CorsPolicy, ProxyConfig};

#[derive(Parser, Debug)]
#[command(name = "jupyter-web-proxy")]
#[command(author, version, about = "Local proxy that forwards HTTP and WebSocket traffic to a Jupyter server with a bearer token")]
pub struct Cli {
    /// URL of the Jupyter server, e.g. https://hub.dandiarchive.org/user/<username>
    #[arg(value_name = "JUPYTER_URL")]
    pub jupyter_url: String,

    /// JupyterHub API token
    #[arg(short, long, env = "JUPYTERHUB_API_TOKEN", hide_env_values = true)]
    pub token: String,

    /// Local proxy port [default: 8010]
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Comma-separated list of allowed CORS origins, e.g. https://nbfiddle.org
    #[arg(short = 'o', long)]
    pub allowed_origins: Option<String>,

    /// Response to origins outside the allow-list: permissive (no CORS headers) or strict (null origin)
    #[arg(long)]
    pub cors_policy: Option<CorsPolicy>,

    /// Path to config file (checked in order: ./jupyter-web-proxy.toml, ~/.config/jupyter-web-proxy/config.toml)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Check the server status and exit without starting the proxy
    #[arg(long)]
    pub check: bool,
}

impl Cli {
    /// Command-line values win over the config file
    pub fn proxy_config(&self, file: &FileConfig) -> Result<ProxyConfig, ConfigError> {
        let allowed_origins = match &self.allowed_origins {
            Some(list) => AllowedOrigins::parse(Some(list)),
            None => AllowedOrigins::from_entries(&file.cors.allowed_origins),
        };

        ProxyConfig::new(
            &self.jupyter_url,
            &self.token,
            self.port.unwrap_or(file.server.port),
            allowed_origins,
            self.cors_policy.unwrap_or(file.cors.policy),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jupyter_proxy_core::config::DEFAULT_PORT;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(args).unwrap()
    }

    #[test]
    fn defaults_apply_without_flags_or_file() {
        let cli = parse(&["jupyter-web-proxy", "https://hub.example.org/user/alice", "-t", "tok"]);
        let config = cli.proxy_config(&FileConfig::default()).unwrap();

        assert_eq!(config.port(), DEFAULT_PORT);
        assert!(config.allowed_origins().is_empty());
        assert_eq!(config.cors_policy(), CorsPolicy::Permissive);
        assert!(!cli.check);
    }

    #[test]
    fn flags_override_config_file() {
        let cli = parse(&[
            "jupyter-web-proxy",
            "https://hub.example.org/user/alice",
            "--token",
            "tok",
            "-p",
            "9999",
            "-o",
            "https://nbfiddle.org, http://localhost:5173",
            "--cors-policy",
            "strict",
        ]);
        let mut file = FileConfig::default();
        file.server.port = 9000;
        file.cors.allowed_origins = vec!["https://other.example".to_string()];

        let config = cli.proxy_config(&file).unwrap();

        assert_eq!(config.port(), 9999);
        assert_eq!(config.bind_address(), "127.0.0.1:9999");
        assert!(config.allowed_origins().contains("http://localhost:5173"));
        assert!(!config.allowed_origins().contains("https://other.example"));
        assert_eq!(config.cors_policy(), CorsPolicy::Strict);
    }

    #[test]
    fn config_file_fills_unset_flags() {
        let cli = parse(&["jupyter-web-proxy", "https://hub.example.org/user/alice", "-t", "tok"]);
        let mut file = FileConfig::default();
        file.server.port = 9000;
        file.cors.allowed_origins = vec![" https://nbfiddle.org ".to_string()];
        file.cors.policy = CorsPolicy::Strict;

        let config = cli.proxy_config(&file).unwrap();

        assert_eq!(config.port(), 9000);
        assert!(config.allowed_origins().contains("https://nbfiddle.org"));
        assert_eq!(config.cors_policy(), CorsPolicy::Strict);
    }

    #[test]
    fn url_argument_is_required() {
        assert!(Cli::try_parse_from(["jupyter-web-proxy", "-t", "tok"]).is_err());
    }

    #[test]
    fn unknown_cors_policy_is_rejected() {
        let result = Cli::try_parse_from([
            "jupyter-web-proxy",
            "https://hub.example.org/user/alice",
            "-t",
            "tok",
            "--cors-policy",
            "deny",
        ]);
        assert!(result.is_err());
    }
}
