//! End-to-end tests for the store: tree workloads that exercise every
//! split/borrow/merge path at both split parities, crash-recovery via
//! reopen, and concurrent access.
//!
//! The interleaved insert/delete orders are chosen to hit all remedial
//! delete actions; after every operation the structural validator runs and
//! every live key is read back.

use loam_common::StoreConfig;
use loam_storage::Store;
use std::path::Path;
use std::sync::Arc;
use tempfile::tempdir;

const ODD_INSERTS: [&str; 52] = [
    "pp", "hh", "n", "x", "jj", "ff", "c", "ss", "mm", "l", "zz", "a", "gg", "j", "u", "ii", "k",
    "q", "rr", "dd", "v", "nn", "s", "ee", "g", "aa", "xx", "w", "e", "r", "vv", "uu", "i", "oo",
    "f", "z", "tt", "h", "b", "m", "d", "t", "y", "yy", "cc", "kk", "ll", "p", "ww", "o", "qq",
    "bb",
];

const ODD_DELETES: [&str; 52] = [
    "rr", "ss", "e", "o", "h", "uu", "tt", "yy", "vv", "v", "bb", "jj", "c", "ee", "qq", "ww", "w",
    "z", "hh", "dd", "ff", "l", "t", "j", "kk", "mm", "nn", "pp", "d", "ll", "b", "m", "zz", "a",
    "s", "f", "oo", "u", "i", "k", "x", "gg", "p", "aa", "y", "xx", "g", "q", "cc", "ii", "n", "r",
];

const EVEN_INSERTS: [&str; 52] = [
    "d", "nn", "m", "uu", "kk", "s", "t", "jj", "ff", "dd", "x", "ii", "ww", "b", "e", "pp", "l",
    "gg", "j", "g", "y", "zz", "w", "k", "a", "qq", "hh", "v", "c", "oo", "f", "u", "o", "xx", "q",
    "i", "ll", "yy", "ss", "ee", "z", "h", "cc", "vv", "aa", "mm", "n", "tt", "r", "p", "bb", "rr",
];

const EVEN_DELETES: [&str; 52] = [
    "ee", "zz", "r", "t", "g", "k", "o", "tt", "cc", "qq", "rr", "oo", "m", "pp", "xx", "x", "j",
    "mm", "ss", "l", "q", "z", "gg", "hh", "nn", "kk", "yy", "p", "aa", "y", "uu", "s", "ff", "h",
    "e", "jj", "ll", "d", "w", "bb", "vv", "u", "n", "b", "v", "c", "ii", "a", "ww", "f", "dd",
    "i",
];

fn config(cache_pages: usize, capacity: usize) -> StoreConfig {
    StoreConfig {
        cache_pages,
        node_capacity: Some(capacity),
        sync_writes: false,
    }
}

/// Inserts every key (value = key), then deletes every key, validating the
/// tree and re-reading all live keys after each operation.
fn run_workload(store: &Store, inserts: &[&str], deletes: &[&str]) {
    for (idx, key) in inserts.iter().enumerate() {
        store.set(key, key).unwrap();
        store.check_tree().unwrap();
        for earlier in &inserts[..=idx] {
            assert_eq!(store.get(earlier).unwrap().as_deref(), Some(*earlier));
        }
    }

    for (idx, key) in deletes.iter().enumerate() {
        store.delete(key).unwrap();
        store.check_tree().unwrap();
        for gone in &deletes[..=idx] {
            assert_eq!(store.get(gone).unwrap(), None, "key {:?} not deleted", gone);
        }
        for live in &deletes[idx + 1..] {
            assert_eq!(store.get(live).unwrap().as_deref(), Some(*live));
        }
    }
}

/// Same as [`run_workload`] but the store is dropped and reopened after
/// every operation, simulating a crash and restart between operations.
fn run_workload_with_reopen(
    stem: &Path,
    cfg: &StoreConfig,
    inserts: &[&str],
    deletes: &[&str],
) {
    let mut store = Store::open(stem, cfg.clone()).unwrap();

    for (idx, key) in inserts.iter().enumerate() {
        store.set(key, key).unwrap();
        store.check_tree().unwrap();

        drop(store);
        store = Store::open(stem, cfg.clone()).unwrap();
        for earlier in &inserts[..=idx] {
            assert_eq!(store.get(earlier).unwrap().as_deref(), Some(*earlier));
        }
    }

    for (idx, key) in deletes.iter().enumerate() {
        store.delete(key).unwrap();
        store.check_tree().unwrap();

        drop(store);
        store = Store::open(stem, cfg.clone()).unwrap();
        for gone in &deletes[..=idx] {
            assert_eq!(store.get(gone).unwrap(), None);
        }
        for live in &deletes[idx + 1..] {
            assert_eq!(store.get(live).unwrap().as_deref(), Some(*live));
        }
    }
}

#[test]
fn test_basic_round_trip() {
    let dir = tempdir().unwrap();
    let store = Store::open(dir.path().join("kv"), config(100, 3)).unwrap();

    store.set("key1", "5").unwrap();
    assert_eq!(store.get("key1").unwrap().as_deref(), Some("5"));
    assert_eq!(store.get("key2").unwrap(), None);
}

#[test]
fn test_overwrite_existing_key() {
    let dir = tempdir().unwrap();
    let store = Store::open(dir.path().join("kv"), config(100, 3)).unwrap();

    store.set("key1", "5").unwrap();
    store.set("key1", "10").unwrap();
    assert_eq!(store.get("key1").unwrap().as_deref(), Some("10"));
}

#[test]
fn test_five_keys_with_splits() {
    let dir = tempdir().unwrap();
    let store = Store::open(dir.path().join("kv"), config(100, 3)).unwrap();

    let pairs = [
        ("key1", "5"),
        ("key2", "10"),
        ("key3", "0"),
        ("key4", "100"),
        ("key5", "-5"),
    ];
    for (key, value) in pairs {
        store.set(key, value).unwrap();
        store.check_tree().unwrap();
    }
    for (key, value) in pairs {
        assert_eq!(store.get(key).unwrap().as_deref(), Some(value));
    }
}

#[test]
fn test_get_missing_key() {
    let dir = tempdir().unwrap();
    let store = Store::open(dir.path().join("kv"), config(1, 4)).unwrap();

    for key in ["a", "b", "c", "d", "e"] {
        store.set(key, key).unwrap();
    }

    assert_eq!(store.get("f").unwrap(), None);
    store.check_tree().unwrap();
}

#[test]
fn test_delete_missing_key_is_noop() {
    let dir = tempdir().unwrap();
    let store = Store::open(dir.path().join("kv"), config(1, 4)).unwrap();

    for key in ["a", "b", "c", "d", "e"] {
        store.set(key, key).unwrap();
    }

    store.delete("f").unwrap();
    store.check_tree().unwrap();
    for key in ["a", "b", "c", "d", "e"] {
        assert_eq!(store.get(key).unwrap().as_deref(), Some(key));
    }
}

#[test]
fn test_set_existing_key_keeps_neighbors() {
    let dir = tempdir().unwrap();
    let store = Store::open(dir.path().join("kv"), config(1, 4)).unwrap();

    for key in ["a", "b", "c", "d", "e"] {
        store.set(key, key).unwrap();
    }

    store.set("a", "a-new").unwrap();
    store.check_tree().unwrap();
    assert_eq!(store.get("a").unwrap().as_deref(), Some("a-new"));
    for key in ["b", "c", "d", "e"] {
        assert_eq!(store.get(key).unwrap().as_deref(), Some(key));
    }
}

#[test]
fn test_odd_capacity_large_cache() {
    let dir = tempdir().unwrap();
    let store = Store::open(dir.path().join("kv"), config(100, 5)).unwrap();
    run_workload(&store, &ODD_INSERTS, &ODD_DELETES);
}

#[test]
fn test_even_capacity_large_cache() {
    let dir = tempdir().unwrap();
    let store = Store::open(dir.path().join("kv"), config(100, 4)).unwrap();
    run_workload(&store, &EVEN_INSERTS, &EVEN_DELETES);
}

#[test]
fn test_odd_capacity_small_cache() {
    let dir = tempdir().unwrap();
    let store = Store::open(dir.path().join("kv"), config(1, 5)).unwrap();
    run_workload(&store, &ODD_INSERTS, &ODD_DELETES);
}

#[test]
fn test_even_capacity_small_cache() {
    let dir = tempdir().unwrap();
    let store = Store::open(dir.path().join("kv"), config(1, 4)).unwrap();
    run_workload(&store, &EVEN_INSERTS, &EVEN_DELETES);
}

#[test]
fn test_odd_capacity_reopen_after_each_operation() {
    let dir = tempdir().unwrap();
    run_workload_with_reopen(
        &dir.path().join("kv"),
        &config(100, 5),
        &ODD_INSERTS,
        &ODD_DELETES,
    );
}

#[test]
fn test_even_capacity_reopen_after_each_operation() {
    let dir = tempdir().unwrap();
    run_workload_with_reopen(
        &dir.path().join("kv"),
        &config(1, 4),
        &EVEN_INSERTS,
        &EVEN_DELETES,
    );
}

#[test]
fn test_durability_across_reopen() {
    let dir = tempdir().unwrap();
    let stem = dir.path().join("kv");
    let cfg = StoreConfig {
        cache_pages: 10,
        node_capacity: Some(3),
        sync_writes: true,
    };

    {
        let store = Store::open(&stem, cfg.clone()).unwrap();
        for key in ["pp", "hh", "n", "x", "jj", "ff", "c"] {
            store.set(key, key).unwrap();
        }
        store.delete("n").unwrap();
    }

    let store = Store::open(&stem, cfg).unwrap();
    store.check_tree().unwrap();
    for key in ["pp", "hh", "x", "jj", "ff", "c"] {
        assert_eq!(store.get(key).unwrap().as_deref(), Some(key));
    }
    assert_eq!(store.get("n").unwrap(), None);
}

#[test]
fn test_insert_delete_inverse() {
    let dir = tempdir().unwrap();
    let store = Store::open(dir.path().join("kv"), config(100, 5)).unwrap();

    let seed = &ODD_INSERTS[..20];
    for key in seed {
        store.set(key, key).unwrap();
    }

    // inserting then deleting a fresh key leaves every lookup unchanged
    store.set("mid", "mid").unwrap();
    store.check_tree().unwrap();
    store.delete("mid").unwrap();
    store.check_tree().unwrap();

    assert_eq!(store.get("mid").unwrap(), None);
    for key in seed {
        assert_eq!(store.get(key).unwrap().as_deref(), Some(*key));
    }
}

#[test]
fn test_default_capacity_bulk() {
    let dir = tempdir().unwrap();
    let stem = dir.path().join("kv");
    let cfg = StoreConfig {
        cache_pages: 64,
        node_capacity: None,
        sync_writes: false,
    };

    let keys: Vec<String> = (0..10)
        .flat_map(|round| ('a'..='z').map(move |c| format!("{}{}", c, round)))
        .collect();

    let mut store = Store::open(&stem, cfg.clone()).unwrap();
    for key in &keys {
        store.set(key, key).unwrap();
    }
    store.check_tree().unwrap();

    // restart midway, as a crashed process would
    drop(store);
    store = Store::open(&stem, cfg).unwrap();
    store.check_tree().unwrap();

    for key in &keys {
        assert_eq!(store.get(key).unwrap().as_deref(), Some(key.as_str()));
    }
    for key in &keys {
        store.delete(key).unwrap();
    }
    store.check_tree().unwrap();
    for key in &keys {
        assert_eq!(store.get(key).unwrap(), None);
    }
}

/// Five threads, each driving the full workload over its own key space
/// (every key suffixed with the thread id).
fn run_concurrent(cache_pages: usize) {
    let dir = tempdir().unwrap();
    let store = Arc::new(Store::open(dir.path().join("kv"), config(cache_pages, 4)).unwrap());

    let handles: Vec<_> = (0..5)
        .map(|thread_id: usize| {
            let store = Arc::clone(&store);
            std::thread::spawn(move || {
                let inserts: Vec<String> = EVEN_INSERTS
                    .iter()
                    .map(|k| format!("{}{}", k, thread_id))
                    .collect();
                let deletes: Vec<String> = EVEN_DELETES
                    .iter()
                    .map(|k| format!("{}{}", k, thread_id))
                    .collect();

                for (idx, key) in inserts.iter().enumerate() {
                    store.set(key, key).unwrap();
                    store.check_tree().unwrap();
                    for earlier in &inserts[..=idx] {
                        assert_eq!(
                            store.get(earlier).unwrap().as_deref(),
                            Some(earlier.as_str())
                        );
                    }
                }
                for (idx, key) in deletes.iter().enumerate() {
                    store.delete(key).unwrap();
                    store.check_tree().unwrap();
                    for gone in &deletes[..=idx] {
                        assert_eq!(store.get(gone).unwrap(), None);
                    }
                    for live in &deletes[idx + 1..] {
                        assert_eq!(store.get(live).unwrap().as_deref(), Some(live.as_str()));
                    }
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }
    store.check_tree().unwrap();
}

#[test]
fn test_concurrent_threads_small_cache() {
    run_concurrent(1);
}

#[test]
fn test_concurrent_threads_large_cache() {
    run_concurrent(500);
}
