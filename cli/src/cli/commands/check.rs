use jupyter_proxy_core::{LivenessProber, ProxyConfig};

pub async fn run(config: ProxyConfig) -> anyhow::Result<()> {
    let prober = LivenessProber::new(&config);
    let record = prober.check().await?;

    println!("Jupyter Server Status");
    println!("=====================");
    println!();
    println!("  Hub: {}", record.base_url);
    println!("  User: {}", record.user);
    println!(
        "  Server: {}",
        if record.server_name.is_empty() { "default" } else { record.server_name.as_str() }
    );
    println!("  Started: {}", if record.started { "yes" } else { "no" });
    if let Some(last_activity) = &record.last_activity {
        println!("  Last activity: {}", last_activity);
    }

    Ok(())
}
