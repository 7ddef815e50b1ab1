//! Configuration records and the persistence seam
//!
//! Routing entries and update credentials live in a record store. The core
//! only needs four calls from it ([`RecordStore`]) and pushes change
//! notifications through [`ChangeListener`].

pub mod file;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use file::{FileStore, ReloadSummary};

/// Storage collection the entry assets are filed under.
pub const ENTRY_COLLECTION: &str = "proxies";

/// One virtual-host routing rule plus optional branding assets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    pub id: String,
    /// Virtual host clients connect to
    pub host: String,
    /// Backend address, `host[:port]`
    pub target: String,
    /// Dial the backend over TLS
    #[serde(default)]
    pub use_tls: bool,
    #[serde(default)]
    pub custom_css: String,
    #[serde(default)]
    pub custom_favicon: String,
    /// Credential id whose updates rewrite this entry's target
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dns_group: Option<String>,
    /// Track IPv6 updates instead of IPv4
    #[serde(default)]
    pub dns_ipv6: bool,
}

impl Entry {
    pub fn new(id: impl Into<String>, host: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            host: host.into(),
            target: target.into(),
            use_tls: false,
            custom_css: String::new(),
            custom_favicon: String::new(),
            dns_group: None,
            dns_ipv6: false,
        }
    }

    /// Storage path of this entry's uploaded assets.
    pub fn files_path(&self) -> String {
        format!("{}/{}", ENTRY_COLLECTION, self.id)
    }

    /// Whether responses served for this entry need rewriting at all.
    pub fn has_branding(&self) -> bool {
        !self.custom_css.is_empty() || !self.custom_favicon.is_empty()
    }
}

/// Credentials allowed to move a group of entries to a new address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub id: String,
    pub username: String,
    pub password: String,
    pub domain: String,
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("store format error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Persistent record store consumed by the gateway.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// All entries, up to `limit`.
    async fn list_entries(&self, limit: usize) -> Result<Vec<Entry>, StoreError>;

    /// The credential matching all three fields exactly.
    async fn find_credential(
        &self,
        username: &str,
        password: &str,
        domain: &str,
    ) -> Result<Option<Credential>, StoreError>;

    /// Entries whose `dns_group` is `group_id`, up to `limit`.
    async fn find_entries_by_group(
        &self,
        group_id: &str,
        limit: usize,
    ) -> Result<Vec<Entry>, StoreError>;

    /// Inserts or replaces `entry` by id.
    async fn save(&self, entry: &Entry) -> Result<(), StoreError>;
}

/// Receiver of configuration change events.
///
/// Handlers are short synchronous mutations; the transport delivering the
/// events calls them inline.
pub trait ChangeListener: Send + Sync {
    fn on_create(&self, entry: Entry);
    fn on_update(&self, entry: Entry);
    fn on_delete(&self, id: &str);
}
