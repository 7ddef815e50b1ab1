use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, bail};

pub const DEFAULT_LISTEN: &str = "127.0.0.1:8080";
pub const DEFAULT_STORE_PATH: &str = "hostgate.yaml";

/// Runtime settings, read from the environment.
#[derive(Debug, Clone)]
pub struct Config {
    /// Address the proxy listens on (`LISTEN`)
    pub listen_addr: String,
    /// Administrative host, never proxied (`HOST`)
    pub admin_host: String,
    /// Record store file (`STORE_PATH`)
    pub store_path: PathBuf,
    /// Backend connect timeout (`CONNECT_TIMEOUT_SECS`)
    pub connect_timeout: Duration,
    /// Backend round-trip timeout (`REQUEST_TIMEOUT_SECS`)
    pub request_timeout: Duration,
}

impl Config {
    /// Loads `.env` if present, then reads the process environment.
    pub fn load() -> anyhow::Result<Self> {
        if let Ok(path) = dotenvy::dotenv() {
            tracing::info!(path = %path.display(), "Reading environment variables from .env");
        }
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary variable lookup.
    pub fn from_vars(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let Some(admin_host) = var("HOST") else {
            bail!("HOST environment variable is required");
        };

        let seconds = |key: &str, default: u64| -> anyhow::Result<Duration> {
            match var(key) {
                Some(raw) => raw
                    .parse()
                    .map(Duration::from_secs)
                    .with_context(|| format!("{} must be a whole number of seconds, got {:?}", key, raw)),
                None => Ok(Duration::from_secs(default)),
            }
        };

        Ok(Self {
            listen_addr: var("LISTEN").unwrap_or_else(|| DEFAULT_LISTEN.to_string()),
            admin_host,
            store_path: var("STORE_PATH")
                .unwrap_or_else(|| DEFAULT_STORE_PATH.to_string())
                .into(),
            connect_timeout: seconds("CONNECT_TIMEOUT_SECS", 5)?,
            request_timeout: seconds("REQUEST_TIMEOUT_SECS", 30)?,
        })
    }
}
