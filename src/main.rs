use std::sync::Arc;

use hostgate::config::Config;
use hostgate::dns::AddressUpdater;
use hostgate::proxy::{Directory, Forwarder};
use hostgate::server::{Gateway, listener};
use hostgate::store::{FileStore, RecordStore};
use tracing_subscriber::EnvFilter;

/// Entries read into the routing table at startup.
const INITIAL_LOAD_LIMIT: usize = 5000;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .with_level(true)
        .init();

    let cfg = Config::load()?;

    let store = Arc::new(FileStore::open(&cfg.store_path).await?);
    let directory = Arc::new(Directory::new());
    directory.replace_all(store.list_entries(INITIAL_LOAD_LIMIT).await?);

    let forwarder = Forwarder::new(cfg.connect_timeout, cfg.request_timeout)?;
    let updater = AddressUpdater::new(store.clone(), Arc::clone(&directory));
    let gateway = Arc::new(Gateway::new(
        cfg.admin_host.clone(),
        Arc::clone(&directory),
        forwarder,
        updater,
    ));

    let tcp = listener::bind(&cfg.listen_addr).await?;

    tokio::select! {
        res = listener::run(tcp, gateway) => {
            res?;
        }

        res = watch_reloads(store, directory) => {
            res?;
        }

        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received");
        }
    }

    Ok(())
}

/// Re-reads the record store on SIGHUP and feeds the changes to the
/// routing table.
#[cfg(unix)]
async fn watch_reloads(store: Arc<FileStore>, directory: Arc<Directory>) -> anyhow::Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut hangup = signal(SignalKind::hangup())?;
    while hangup.recv().await.is_some() {
        if let Err(e) = store.reload(directory.as_ref()).await {
            tracing::error!(path = %store.path().display(), error = %e, "Record store reload failed");
        }
    }
    Ok(())
}

#[cfg(not(unix))]
async fn watch_reloads(_store: Arc<FileStore>, _directory: Arc<Directory>) -> anyhow::Result<()> {
    std::future::pending().await
}
