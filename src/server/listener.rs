use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::info;

use crate::http::connection::Connection;
use crate::server::gateway::Gateway;

pub async fn bind(addr: &str) -> anyhow::Result<TcpListener> {
    let listener = TcpListener::bind(addr).await?;
    info!("Listening on {}", listener.local_addr()?);
    Ok(listener)
}

/// Accepts connections forever, one task per client.
pub async fn run(listener: TcpListener, gateway: Arc<Gateway>) -> anyhow::Result<()> {
    loop {
        let (socket, peer) = listener.accept().await?;
        tracing::debug!("Accepted connection from {}", peer);

        let gateway = Arc::clone(&gateway);
        tokio::spawn(async move {
            let mut conn = Connection::new(socket, peer, gateway);
            if let Err(e) = conn.run().await {
                tracing::error!("Connection error from {}: {}", peer, e);
            }
        });
    }
}
