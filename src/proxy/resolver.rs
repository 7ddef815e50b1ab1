//! Host → backend resolution

use std::fmt;
use std::sync::Arc;

use url::Url;

use crate::error::{ProxyError, Result};
use crate::proxy::directory::Directory;
use crate::store::Entry;

/// Scheme used between client and gateway, or gateway and backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    Http,
    Https,
}

impl Scheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scheme::Http => "http",
            Scheme::Https => "https",
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where to send a request, and the entry that decided it.
#[derive(Debug, Clone)]
pub struct Route {
    pub url: Url,
    pub entry: Arc<Entry>,
}

/// Turns a request host into a backend URL using the shared [`Directory`].
#[derive(Debug, Clone)]
pub struct Resolver {
    directory: Arc<Directory>,
}

impl Resolver {
    pub fn new(directory: Arc<Directory>) -> Self {
        Self { directory }
    }

    /// Resolves `host` to a backend.
    ///
    /// The backend scheme follows the entry, not the client: TLS entries are
    /// always dialed over TLS and plain entries never are. A target that is
    /// itself a managed host is refused rather than followed.
    pub fn resolve(&self, host: &str, scheme: Scheme) -> Result<Route> {
        // one snapshot for the whole decision
        let snapshot = self.directory.snapshot();

        let entry = snapshot
            .lookup_by_host(host)
            .ok_or_else(|| ProxyError::NotFound(host.to_string()))?;

        let scheme = match (entry.use_tls, scheme) {
            (false, _) => Scheme::Http,
            (true, Scheme::Http) => Scheme::Https,
            (true, incoming) => incoming,
        };

        if snapshot.has_host(&entry.target) {
            return Err(ProxyError::RecursiveTarget {
                host: host.to_string(),
                target: entry.target.clone(),
            });
        }

        let url = backend_url(scheme, &entry.target)?;
        Ok(Route { url, entry })
    }
}

fn backend_url(scheme: Scheme, target: &str) -> Result<Url> {
    let invalid = |reason: String| ProxyError::InvalidTarget {
        target: target.to_string(),
        reason,
    };

    let url = Url::parse(&format!("{}://{}", scheme, target)).map_err(|e| invalid(e.to_string()))?;
    if url.host_str().is_none_or(str::is_empty) {
        return Err(invalid("missing host".to_string()));
    }
    Ok(url)
}
