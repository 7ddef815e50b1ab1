//! YAML-file record store
//!
//! The whole store is one YAML document with `entries` and `credentials`
//! lists, held in memory and rewritten on every save. Edits made to the file
//! by hand are picked up with [`FileStore::reload`], which turns the
//! difference into change notifications.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use super::{ChangeListener, Credential, Entry, RecordStore, StoreError};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct StoreData {
    #[serde(default)]
    entries: Vec<Entry>,
    #[serde(default)]
    credentials: Vec<Credential>,
}

/// Counts of notifications delivered by a reload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReloadSummary {
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
}

pub struct FileStore {
    path: PathBuf,
    data: RwLock<StoreData>,
}

impl FileStore {
    /// Opens the store at `path`. A missing file is an empty store.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let data = read_data(&path).await?;
        tracing::info!(
            path = %path.display(),
            entries = data.entries.len(),
            credentials = data.credentials.len(),
            "Record store opened"
        );

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Re-reads the file and notifies `listener` of every entry that was
    /// added, changed or removed since the last read.
    pub async fn reload(&self, listener: &dyn ChangeListener) -> Result<ReloadSummary, StoreError> {
        let fresh = read_data(&self.path).await?;
        let mut data = self.data.write().await;

        let mut previous: HashMap<&str, &Entry> =
            data.entries.iter().map(|e| (e.id.as_str(), e)).collect();
        let mut summary = ReloadSummary::default();

        for entry in &fresh.entries {
            match previous.remove(entry.id.as_str()) {
                Some(old) if old == entry => {}
                Some(_) => {
                    listener.on_update(entry.clone());
                    summary.updated += 1;
                }
                None => {
                    listener.on_create(entry.clone());
                    summary.created += 1;
                }
            }
        }

        for id in previous.keys() {
            listener.on_delete(id);
            summary.deleted += 1;
        }

        *data = fresh;
        tracing::info!(
            created = summary.created,
            updated = summary.updated,
            deleted = summary.deleted,
            "Record store reloaded"
        );
        Ok(summary)
    }
}

#[async_trait]
impl RecordStore for FileStore {
    async fn list_entries(&self, limit: usize) -> Result<Vec<Entry>, StoreError> {
        let data = self.data.read().await;
        Ok(data.entries.iter().take(limit).cloned().collect())
    }

    async fn find_credential(
        &self,
        username: &str,
        password: &str,
        domain: &str,
    ) -> Result<Option<Credential>, StoreError> {
        let data = self.data.read().await;
        Ok(data
            .credentials
            .iter()
            .find(|c| c.username == username && c.password == password && c.domain == domain)
            .cloned())
    }

    async fn find_entries_by_group(
        &self,
        group_id: &str,
        limit: usize,
    ) -> Result<Vec<Entry>, StoreError> {
        let data = self.data.read().await;
        Ok(data
            .entries
            .iter()
            .filter(|e| e.dns_group.as_deref() == Some(group_id))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn save(&self, entry: &Entry) -> Result<(), StoreError> {
        let mut data = self.data.write().await;
        let mut next = data.clone();

        match next.entries.iter_mut().find(|e| e.id == entry.id) {
            Some(existing) => *existing = entry.clone(),
            None => next.entries.push(entry.clone()),
        }

        write_data(&self.path, &next).await?;
        *data = next;
        tracing::debug!(id = %entry.id, "Entry saved");
        Ok(())
    }
}

async fn read_data(path: &Path) -> Result<StoreData, StoreError> {
    match tokio::fs::read_to_string(path).await {
        Ok(raw) if raw.trim().is_empty() => Ok(StoreData::default()),
        Ok(raw) => Ok(serde_yaml::from_str(&raw)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(StoreData::default()),
        Err(e) => Err(e.into()),
    }
}

async fn write_data(path: &Path, data: &StoreData) -> Result<(), StoreError> {
    let raw = serde_yaml::to_string(data)?;
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    tokio::fs::write(&tmp, raw).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}
