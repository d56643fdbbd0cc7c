use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tracing::info;

use crate::config::Config;
use crate::http::connection::Connection;
use crate::proxy::Proxy;

pub async fn run(cfg: &Config, proxy: Arc<Proxy>) -> anyhow::Result<()> {
    let listener = TcpListener::bind(&cfg.server.listen_addr)
        .await
        .with_context(|| format!("Failed to bind {}", cfg.server.listen_addr))?;
    info!(
        "Listening on {}, relaying to {}",
        cfg.server.listen_addr,
        proxy.forwarder().base_url()
    );

    serve(listener, proxy, cfg.server.max_request_bytes).await
}

/// Accept loop on an already bound listener; one task per connection.
pub async fn serve(
    listener: TcpListener,
    proxy: Arc<Proxy>,
    max_request_bytes: usize,
) -> anyhow::Result<()> {
    loop {
        let (socket, peer) = listener.accept().await?;
        info!("Accepted connection from {}", peer);

        let proxy = Arc::clone(&proxy);
        tokio::spawn(async move {
            let mut conn = Connection::new(socket, peer, proxy, max_request_bytes);
            if let Err(e) = conn.run().await {
                tracing::error!("Connection error from {}: {}", peer, e);
            }
        });
    }
}
