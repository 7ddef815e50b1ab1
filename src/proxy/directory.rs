//! Routing table
//!
//! The [`Directory`] holds every routing entry by id plus an index from
//! virtual host to id. Readers load an immutable [`Snapshot`]; writers build
//! the next snapshot off to the side and publish it atomically, so a lookup
//! never observes a half-rebuilt index and never waits on a writer.

use std::collections::HashMap;
use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::store::{ChangeListener, Entry};

/// One consistent view of the routing table.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    entries: HashMap<String, Arc<Entry>>,
    host_index: HashMap<String, String>,
}

impl Snapshot {
    fn from_entries(entries: HashMap<String, Arc<Entry>>) -> Self {
        let host_index = build_index(&entries);
        Self {
            entries,
            host_index,
        }
    }

    pub fn lookup_by_host(&self, host: &str) -> Option<Arc<Entry>> {
        let id = self.host_index.get(host)?;
        self.entries.get(id).cloned()
    }

    pub fn has_host(&self, host: &str) -> bool {
        self.host_index.contains_key(host)
    }

    pub fn get(&self, id: &str) -> Option<Arc<Entry>> {
        self.entries.get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Host → id pairs currently indexed.
    pub fn hosts(&self) -> impl Iterator<Item = (&str, &str)> {
        self.host_index.iter().map(|(h, id)| (h.as_str(), id.as_str()))
    }
}

/// Derives the host index from the entries. Duplicate hosts resolve to
/// whichever entry is visited last.
fn build_index(entries: &HashMap<String, Arc<Entry>>) -> HashMap<String, String> {
    let mut index = HashMap::with_capacity(entries.len());

    for entry in entries.values() {
        if let Some(previous) = index.insert(entry.host.clone(), entry.id.clone()) {
            tracing::warn!(
                host = %entry.host,
                kept = %entry.id,
                dropped = %previous,
                "Duplicate host in routing entries"
            );
        }
    }

    index
}

/// Process-wide routing table shared by the resolver, the change feed and
/// the address updater.
#[derive(Debug, Default)]
pub struct Directory {
    current: ArcSwap<Snapshot>,
}

impl Directory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the whole table, e.g. after the startup bulk load.
    pub fn replace_all(&self, entries: impl IntoIterator<Item = Entry>) {
        let entries: HashMap<String, Arc<Entry>> = entries
            .into_iter()
            .map(|e| (e.id.clone(), Arc::new(e)))
            .collect();
        let snapshot = Snapshot::from_entries(entries);
        tracing::info!(entries = snapshot.len(), "Routing table loaded");
        self.current.store(Arc::new(snapshot));
    }

    /// Inserts or replaces `entry` by id.
    pub fn upsert(&self, entry: Entry) {
        let entry = Arc::new(entry);
        tracing::debug!(id = %entry.id, host = %entry.host, target = %entry.target, "Upserting entry");

        self.current.rcu(|snapshot| {
            let mut entries = snapshot.entries.clone();
            entries.insert(entry.id.clone(), Arc::clone(&entry));
            Snapshot::from_entries(entries)
        });
    }

    /// Drops the entry with `id`. Unknown ids are ignored.
    pub fn remove(&self, id: &str) {
        if !self.current.load().entries.contains_key(id) {
            return;
        }
        tracing::debug!(id = %id, "Removing entry");

        self.current.rcu(|snapshot| {
            let mut entries = snapshot.entries.clone();
            entries.remove(id);
            Snapshot::from_entries(entries)
        });
    }

    pub fn lookup_by_host(&self, host: &str) -> Option<Arc<Entry>> {
        self.current.load().lookup_by_host(host)
    }

    pub fn has_host(&self, host: &str) -> bool {
        self.current.load().has_host(host)
    }

    /// The current table. Holding it pins that version for consistent
    /// multi-step reads.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.current.load_full()
    }

    pub fn len(&self) -> usize {
        self.current.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.current.load().is_empty()
    }
}

impl ChangeListener for Directory {
    fn on_create(&self, entry: Entry) {
        self.upsert(entry);
    }

    fn on_update(&self, entry: Entry) {
        self.upsert(entry);
    }

    fn on_delete(&self, id: &str) {
        self.remove(id);
    }
}
