use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{ProxyError, Result};
use crate::proxy::directory::Directory;
use crate::store::{Entry, RecordStore};

/// Most entries a single update call touches.
pub const UPDATE_PAGE_SIZE: usize = 1000;

/// Parameters of one address update call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateRequest {
    pub username: String,
    pub password: String,
    pub domain: String,
    pub ip: String,
    pub ip6: String,
}

impl UpdateRequest {
    /// Reads `username`, `password`, `domain`, `ip` and `ip6` from decoded
    /// query parameters. Absent parameters are empty. Credentials are kept
    /// byte for byte; only the addresses are trimmed.
    pub fn from_query(params: &HashMap<String, String>) -> Self {
        let raw = |key: &str| params.get(key).cloned().unwrap_or_default();
        let addr = |key: &str| params.get(key).map(|v| v.trim().to_string()).unwrap_or_default();
        Self {
            username: raw("username"),
            password: raw("password"),
            domain: raw("domain"),
            ip: addr("ip"),
            ip6: addr("ip6"),
        }
    }

    fn is_well_formed(&self) -> bool {
        !self.username.is_empty()
            && !self.password.is_empty()
            && !self.domain.is_empty()
            && (!self.ip.is_empty() || !self.ip6.is_empty())
    }
}

/// Authenticates update calls and rewrites the targets of the caller's
/// entries.
pub struct AddressUpdater {
    store: Arc<dyn RecordStore>,
    directory: Arc<Directory>,
}

impl AddressUpdater {
    pub fn new(store: Arc<dyn RecordStore>, directory: Arc<Directory>) -> Self {
        Self { store, directory }
    }

    /// Applies `request` and returns how many entries changed.
    ///
    /// Every validation and authentication failure is the same
    /// [`ProxyError::BadRequest`]. A failed save stops the batch; entries
    /// saved before it stay updated.
    pub async fn update_address(&self, request: &UpdateRequest) -> Result<usize> {
        if !request.is_well_formed() {
            return Err(ProxyError::BadRequest);
        }

        let credential = self
            .store
            .find_credential(&request.username, &request.password, &request.domain)
            .await
            .map_err(|e| {
                tracing::warn!(error = %e, "Credential lookup failed");
                ProxyError::BadRequest
            })?
            .ok_or_else(|| {
                tracing::warn!(domain = %request.domain, "Address update with unknown credentials");
                ProxyError::BadRequest
            })?;

        let entries = self
            .store
            .find_entries_by_group(&credential.id, UPDATE_PAGE_SIZE)
            .await
            .map_err(|e| {
                tracing::warn!(group = %credential.id, error = %e, "Group lookup failed");
                ProxyError::BadRequest
            })?;

        let mut updated = 0;
        for mut entry in entries {
            let Some(target) = next_target(&entry, &request.ip, &request.ip6) else {
                continue;
            };
            if target == entry.target {
                tracing::debug!(id = %entry.id, target = %target, "Target already current");
                continue;
            }

            let previous = std::mem::replace(&mut entry.target, target);
            self.persist(&entry).await?;
            tracing::info!(
                id = %entry.id,
                host = %entry.host,
                from = %previous,
                to = %entry.target,
                "Backend address updated"
            );
            self.directory.upsert(entry);
            updated += 1;
        }

        Ok(updated)
    }

    async fn persist(&self, entry: &Entry) -> Result<()> {
        self.store.save(entry).await.map_err(|source| {
            tracing::error!(id = %entry.id, error = %source, "Failed to persist entry");
            ProxyError::Persistence {
                id: entry.id.clone(),
                source,
            }
        })
    }
}

/// The target `entry` should have after an update with `ip`/`ip6`, or `None`
/// when neither address applies to it.
pub fn next_target(entry: &Entry, ip: &str, ip6: &str) -> Option<String> {
    let port = split_host_port(&entry.target).map(|(_, port)| port);

    let host = if entry.dns_ipv6 && !ip6.is_empty() {
        format!("[{}]", ip6)
    } else if !ip.is_empty() {
        ip.to_string()
    } else {
        return None;
    };

    Some(match port {
        Some(port) => format!("{}:{}", host, port),
        None => host,
    })
}

/// Splits `host:port` or `[v6]:port`. Targets without a numeric port
/// (including bare IPv6 literals) yield `None`.
pub fn split_host_port(target: &str) -> Option<(&str, &str)> {
    let (host, port) = if let Some(rest) = target.strip_prefix('[') {
        let (host, after) = rest.split_once(']')?;
        (host, after.strip_prefix(':')?)
    } else {
        let (host, port) = target.rsplit_once(':')?;
        if host.contains(':') {
            return None;
        }
        (host, port)
    };

    if port.is_empty() || !port.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some((host, port))
}
