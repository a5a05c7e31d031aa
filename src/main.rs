use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tracing::info;

use vless_gateway::{config::Config, gateway, keepalive};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let config = Config::load()?;
    info!(
        listen_addr = %config.listen_addr(),
        ws_path = %config.ws_path,
        sub_path = %config.sub_path,
        proxy_host = config.proxy_host.as_deref().unwrap_or("-"),
        "Configuration loaded"
    );

    keepalive::spawn(config.keepalive_url.as_deref());

    let addr = config.listen_addr();
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to address {addr}"))?;

    info!(listen_addr = %addr, "Tunnel gateway listening");

    gateway::serve(listener, Arc::new(config)).await
}
