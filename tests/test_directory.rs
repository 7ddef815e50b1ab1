//! Tests for the routing table

use std::sync::Arc;
use std::thread;

use hostgate::proxy::directory::{Directory, Snapshot};
use hostgate::store::{ChangeListener, Entry};

fn assert_consistent(snapshot: &Snapshot) {
    for (host, id) in snapshot.hosts() {
        let entry = snapshot.get(id).expect("indexed id must exist");
        assert_eq!(entry.host, host);
    }
}

#[test]
fn test_upsert_then_lookup() {
    let dir = Directory::new();
    assert!(dir.is_empty());

    dir.upsert(Entry::new("1", "app.example.com", "10.0.0.1:8080"));

    let entry = dir.lookup_by_host("app.example.com").unwrap();
    assert_eq!(entry.id, "1");
    assert_eq!(entry.target, "10.0.0.1:8080");
    assert!(dir.has_host("app.example.com"));
    assert!(!dir.has_host("other.example.com"));
    assert_eq!(dir.len(), 1);
}

#[test]
fn test_upsert_replaces_by_id() {
    let dir = Directory::new();
    dir.upsert(Entry::new("1", "app.example.com", "10.0.0.1"));
    dir.upsert(Entry::new("1", "app.example.com", "10.0.0.2"));

    assert_eq!(dir.len(), 1);
    assert_eq!(dir.lookup_by_host("app.example.com").unwrap().target, "10.0.0.2");
}

#[test]
fn test_remove_is_idempotent() {
    let dir = Directory::new();
    dir.upsert(Entry::new("1", "app.example.com", "10.0.0.1"));

    dir.remove("1");
    dir.remove("1");
    dir.remove("never-existed");

    assert!(dir.lookup_by_host("app.example.com").is_none());
    assert!(!dir.has_host("app.example.com"));
    assert!(dir.is_empty());
}

#[test]
fn test_replace_all_drops_previous_entries() {
    let dir = Directory::new();
    dir.upsert(Entry::new("old", "old.example.com", "10.0.0.1"));

    dir.replace_all(vec![
        Entry::new("a", "a.example.com", "10.0.0.2"),
        Entry::new("b", "b.example.com", "10.0.0.3"),
    ]);

    assert_eq!(dir.len(), 2);
    assert!(!dir.has_host("old.example.com"));
    assert!(dir.has_host("b.example.com"));
}

#[test]
fn test_change_listener_events() {
    let dir = Directory::new();
    let listener: &dyn ChangeListener = &dir;

    listener.on_create(Entry::new("1", "a.example.com", "10.0.0.1"));
    listener.on_update(Entry::new("1", "a.example.com", "10.0.0.9"));
    assert_eq!(dir.lookup_by_host("a.example.com").unwrap().target, "10.0.0.9");

    listener.on_delete("1");
    assert!(dir.is_empty());
}

#[test]
fn test_snapshot_is_stable_across_mutation() {
    let dir = Directory::new();
    dir.upsert(Entry::new("1", "a.example.com", "10.0.0.1"));

    let before = dir.snapshot();
    dir.remove("1");

    assert!(before.has_host("a.example.com"));
    assert!(!dir.has_host("a.example.com"));
}

#[test]
fn test_index_consistent_after_mixed_sequence() {
    let dir = Directory::new();
    let mut seed: u64 = 0x2545_f491_4f6c_dd1d;
    let mut next = || {
        seed ^= seed << 13;
        seed ^= seed >> 7;
        seed ^= seed << 17;
        seed
    };

    for _ in 0..2000 {
        let id = format!("id-{}", next() % 40);
        if next() % 3 == 0 {
            dir.remove(&id);
        } else {
            // few hosts so duplicates and host moves happen often
            let host = format!("h{}.example.com", next() % 15);
            dir.upsert(Entry::new(id, host, "10.0.0.1"));
        }
        assert_consistent(&dir.snapshot());
    }
}

#[test]
fn test_readers_never_see_torn_index() {
    let dir = Arc::new(Directory::new());

    let writer = {
        let dir = Arc::clone(&dir);
        thread::spawn(move || {
            for i in 0..500 {
                let id = format!("id-{}", i % 20);
                dir.upsert(Entry::new(id.clone(), format!("h{}.example.com", i % 7), "10.0.0.1"));
                if i % 5 == 0 {
                    dir.remove(&id);
                }
            }
        })
    };

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let dir = Arc::clone(&dir);
            thread::spawn(move || {
                for _ in 0..500 {
                    assert_consistent(&dir.snapshot());
                    if let Some(entry) = dir.lookup_by_host("h3.example.com") {
                        assert_eq!(entry.host, "h3.example.com");
                    }
                }
            })
        })
        .collect();

    writer.join().unwrap();
    for reader in readers {
        reader.join().unwrap();
    }
}
