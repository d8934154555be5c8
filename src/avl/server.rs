use super::connection::handle_connection;
use crate::registry::RegistryTx;
use crate::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{debug, error, info};

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Operational safeguard, not a protocol requirement: reclaims
    /// connections from trackers that open a socket and go silent.
    pub idle_timeout: Duration,
    /// Answer unknown devices with a reject byte and hang up instead of
    /// the accept-first default.
    pub strict_handshake: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_secs(300),
            strict_handshake: false,
        }
    }
}

pub async fn run(bind: &str, port: u32, cfg: ServerConfig, registry: RegistryTx) -> Result<()> {
    let listener = TcpListener::bind(format!("{bind}:{port}")).await?;
    serve(listener, cfg, registry).await
}

/// Accept loop: one spawned task per tracker connection. A failed
/// connection is logged and dies alone; the listener keeps accepting.
pub async fn serve(listener: TcpListener, cfg: ServerConfig, registry: RegistryTx) -> Result<()> {
    info!("AVL gateway listening on {}", listener.local_addr()?);
    let cfg = Arc::new(cfg);
    loop {
        let (socket, peer) = listener.accept().await?;
        debug!(%peer, "accepted connection");
        let registry = registry.clone();
        let cfg = cfg.clone();
        tokio::spawn(async move {
            if let Err(err) = handle_connection(socket, peer, registry, cfg).await {
                error!(%peer, %err, "connection task failed");
            }
        });
    }
}
