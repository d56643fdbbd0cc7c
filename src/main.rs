use std::sync::Arc;

use ajax_relay::config::Config;
use ajax_relay::proxy::Proxy;
use ajax_relay::server;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_level(true)
        .init();

    let cfg = Config::load()?;
    let proxy = Arc::new(Proxy::from_config(&cfg)?);

    tokio::select! {
        res = server::listener::run(&cfg, proxy) => {
            res?;
        }

        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received");
        }
    }

    Ok(())
}
