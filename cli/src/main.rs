use clap::Parser;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{reload, EnvFilter};

mod cli;

use cli::Cli;
use jupyter_proxy_core::config::load_config;

fn env_filter(level: &str) -> anyhow::Result<EnvFilter> {
    Ok(EnvFilter::from_default_env()
        .add_directive(format!("jupyter_web_proxy={}", level).parse()?)
        .add_directive(format!("jupyter_proxy_core={}", level).parse()?)
        .add_directive(format!("tower_http={}", level).parse()?))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging; the config file may change the level below
    let (filter, filter_handle) = reload::Layer::new(env_filter("info")?);
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let file_config = load_config(cli.config.clone())?;
    filter_handle.reload(env_filter(&file_config.logging.level)?)?;

    let config = cli.proxy_config(&file_config)?;

    if cli.check {
        cli::commands::check::run(config).await?;
    } else {
        cli::commands::start::run(config).await?;
    }

    Ok(())
}
