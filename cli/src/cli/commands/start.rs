use jupyter_proxy_core::proxy::{self, shutdown_signal};
use jupyter_proxy_core::ProxyConfig;

pub async fn run(config: ProxyConfig) -> anyhow::Result<()> {
    tracing::info!("Starting jupyter-web-proxy...");
    tracing::info!("  Target: {}", config.target());
    tracing::info!("  Port: {}", config.port());

    // Fails before binding when the server status check does
    let server = proxy::start(config).await?;

    tracing::info!("Press Ctrl+C to stop");
    server.serve(shutdown_signal()).await?;

    Ok(())
}
