//! # Scalable Filter Behaviour Tests
//!
//! ## Test Categories
//!
//! 1. **Growth** - tier count, tier parameters, capacity ceiling
//! 2. **Counting** - duplicate suppression, weighted counts
//! 3. **Accuracy** - no false negatives, bounded false positives
//! 4. **Shared Tiers** - controllers over one keyed store

use std::sync::Arc;

use proptest::prelude::*;
use rand::{distributions::Alphanumeric, Rng};
use scalable_bloom::{
    FileBackedKVStore, InMemoryKVStore, KeyValueStore, KeyedBackendFactory, NamespaceLock,
    ScalableConfig, ScalableConfigBuilder, ScalableFilter, ScalableFilterApi,
};
use tempfile::TempDir;
use tracing_subscriber::EnvFilter;

// =============================================================================
// TEST HELPERS
// =============================================================================

fn standard_config(initial_size: u64) -> ScalableConfig {
    ScalableConfigBuilder::new()
        .initial_size(initial_size)
        .error_probability_bound(0.01)
        .tightening_factor(0.5)
        .growth_factor(2.0)
        .namespace("dedup_stream")
        .seed(1447271)
        .build()
        .unwrap()
}

/// Route tier-growth logs to the test harness; `RUST_LOG=debug` shows them.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn random_keys(count: usize, len: usize) -> Vec<String> {
    let mut rng = rand::thread_rng();
    (0..count)
        .map(|_| {
            (&mut rng)
                .sample_iter(&Alphanumeric)
                .take(len)
                .map(char::from)
                .collect()
        })
        .collect()
}

// =============================================================================
// GROWTH
// =============================================================================

#[test]
fn test_twenty_keys_make_two_tiers() {
    init_tracing();
    let mut filter = ScalableFilter::new(standard_config(100)).unwrap();
    for i in 0..20 {
        filter.insert(format!("key_{}", i).as_bytes()).unwrap();
    }
    assert_eq!(filter.size(), 2);
    assert_eq!(filter.current_filter_limit(), 27);
}

#[test]
fn test_tier_schedule() {
    let filter = ScalableFilter::new(standard_config(100)).unwrap();

    let first = filter.tier_params(0);
    assert_eq!(first.capacity, 100);
    assert!((first.target_probability - 0.005).abs() < 1e-12);
    assert_eq!(first.hash_count, 8);
    assert_eq!(first.identifier, "dedup_stream/0");

    let second = filter.tier_params(1);
    assert_eq!(second.capacity, 200);
    assert!((second.target_probability - 0.0025).abs() < 1e-12);
    assert_eq!(second.hash_count, 9);
    assert_eq!(second.identifier, "dedup_stream/1");

    // Looking at the schedule never allocates
    assert_eq!(filter.size(), 0);
}

#[test]
fn test_keys_follow_namespace() {
    let mut filter = ScalableFilter::new(standard_config(100)).unwrap();
    for i in 0..100 {
        filter.insert(format!("{}", i).as_bytes()).unwrap();
    }

    assert_eq!(filter.key_for_index(5), "dedup_stream/5");
    assert_eq!(
        filter.keys(),
        vec![
            "dedup_stream/0",
            "dedup_stream/1",
            "dedup_stream/2",
            "dedup_stream/3"
        ]
    );
}

#[test]
fn test_ceiling_never_below_count() {
    let mut filter = ScalableFilter::new(standard_config(100)).unwrap();
    for i in 0..500 {
        filter.insert(format!("k{}", i).as_bytes()).unwrap();
        assert!(filter.count() <= filter.current_filter_limit());
    }
}

// =============================================================================
// COUNTING
// =============================================================================

#[test]
fn test_weighted_count_within_tolerance() {
    let mut filter = ScalableFilter::new(standard_config(100)).unwrap();
    for i in 0..100u64 {
        filter
            .insert_weighted(format!("key_{}", i).as_bytes(), i)
            .unwrap();
    }

    let weighted = filter.weighted_count().unwrap();
    assert!(weighted >= 4455, "weighted count {} too low", weighted);
    assert!(weighted <= 4950);
}

#[test]
fn test_duplicate_inserts_leave_counters() {
    let mut filter = ScalableFilter::new(standard_config(100)).unwrap();
    for round in 0..3 {
        for i in 0..50 {
            let accepted = filter.insert(format!("dup_{}", i).as_bytes()).unwrap();
            if round > 0 {
                assert!(!accepted);
            }
        }
    }
    assert!(filter.count() <= 50);
    assert!(filter.count() >= 45);
}

// =============================================================================
// ACCURACY
// =============================================================================

#[test]
fn test_large_single_tier_accuracy() {
    let mut filter = ScalableFilter::new(standard_config(1_000_000)).unwrap();
    for i in 0..20_000 {
        filter.insert(format!("present_{}", i).as_bytes()).unwrap();
    }
    assert_eq!(filter.size(), 1);
    assert!(filter.count() >= 19_800, "only {} counted", filter.count());

    let absent = (0..10_000)
        .filter(|i| !filter.include(format!("absent_{}", i).as_bytes()).unwrap())
        .count();
    assert!(absent >= 9_900, "only {} reported absent", absent);
}

#[test]
fn test_multi_tier_accuracy() {
    let mut filter = ScalableFilter::new(standard_config(10_000)).unwrap();
    for i in 0..20_000 {
        filter.insert(format!("present_{}", i).as_bytes()).unwrap();
    }
    assert!(filter.size() > 1);
    assert!(filter.count() >= 19_400, "only {} counted", filter.count());

    let absent = (0..10_000)
        .filter(|i| !filter.include(format!("absent_{}", i).as_bytes()).unwrap())
        .count();
    assert!(absent >= 9_800, "only {} reported absent", absent);
}

#[test]
fn test_random_keys_are_always_found() {
    let mut filter = ScalableFilter::new(standard_config(100)).unwrap();
    let keys = random_keys(2_000, 16);
    for key in &keys {
        filter.insert(key.as_bytes()).unwrap();
    }
    for key in &keys {
        assert!(filter.include(key.as_bytes()).unwrap(), "lost {}", key);
    }
}

proptest! {
    /// Every inserted key tests present, whatever the configuration
    #[test]
    fn no_false_negatives(
        keys in prop::collection::vec(prop::collection::vec(any::<u8>(), 1..32), 1..300),
        initial_size in 16u64..2_000,
        seed in any::<u32>(),
    ) {
        let config = ScalableConfigBuilder::new()
            .initial_size(initial_size)
            .seed(seed)
            .build()
            .unwrap();
        let mut filter = ScalableFilter::new(config).unwrap();

        for key in &keys {
            filter.insert(key).unwrap();
        }
        for key in &keys {
            prop_assert!(filter.include(key).unwrap());
        }
        prop_assert!(filter.count() <= keys.len() as u64);
    }
}

// =============================================================================
// SHARED TIERS
// =============================================================================

#[test]
fn test_controllers_share_keyed_tiers() {
    init_tracing();
    let store = Arc::new(InMemoryKVStore::new());
    let factory = Arc::new(KeyedBackendFactory::new(store));

    let mut first = ScalableFilter::with_backend(standard_config(100), factory.clone()).unwrap();
    first.insert(b"k1").unwrap();

    let mut second = ScalableFilter::with_backend(standard_config(100), factory).unwrap();
    assert!(second.insert(b"k2").unwrap());

    assert!(second.include(b"k1").unwrap());
    assert!(first.include(b"k2").unwrap());
    assert!(!second.insert(b"k1").unwrap());
}

#[test]
fn test_delete_all_clears_keyed_store() {
    let store = Arc::new(InMemoryKVStore::new());
    let factory = Arc::new(KeyedBackendFactory::new(store.clone()));

    let mut filter = ScalableFilter::with_backend(standard_config(100), factory).unwrap();
    for i in 0..30 {
        filter.insert(format!("k{}", i).as_bytes()).unwrap();
    }
    assert!(filter.size() >= 2);
    assert!(!store.is_empty());

    filter.delete_all().unwrap();

    assert!(store.is_empty());
    for key in filter.keys() {
        assert!(!store.exists(key.as_bytes()).unwrap());
    }
}

#[test]
fn test_file_backed_tiers_survive_restart() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("tiers.db");

    {
        let store = Arc::new(FileBackedKVStore::open(&path).unwrap());
        let factory = Arc::new(KeyedBackendFactory::new(store));
        let mut filter = ScalableFilter::with_backend(standard_config(100), factory).unwrap();
        filter.insert(b"persisted").unwrap();
    }

    let store = Arc::new(FileBackedKVStore::open(&path).unwrap());
    let factory = Arc::new(KeyedBackendFactory::new(store));
    let mut filter = ScalableFilter::with_backend(standard_config(100), factory).unwrap();
    filter.add_filter().unwrap();

    assert!(filter.include(b"persisted").unwrap());
}

#[test]
fn test_file_store_handles_share_tiers() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("tiers.db");
    let locks = dir.path().join("locks");

    let open_filter = || {
        let store = Arc::new(FileBackedKVStore::open(&path).unwrap());
        let factory = Arc::new(KeyedBackendFactory::new(store));
        ScalableFilter::with_backend(standard_config(100), factory).unwrap()
    };
    let mut a = open_filter();
    let mut b = open_filter();

    {
        let _lock = NamespaceLock::acquire(&locks, "dedup_stream").unwrap();
        assert!(a.insert(b"k1").unwrap());
    }
    {
        let _lock = NamespaceLock::acquire(&locks, "dedup_stream").unwrap();
        b.add_filter().unwrap();
        assert!(b.include(b"k1").unwrap());
        assert!(!b.insert(b"k1").unwrap());
        assert!(b.insert(b"k2").unwrap());
    }
    assert!(a.include(b"k2").unwrap());
    drop((a, b));

    let mut reopened = open_filter();
    reopened.add_filter().unwrap();
    assert!(reopened.include(b"k1").unwrap());
    assert!(reopened.include(b"k2").unwrap());
}

#[test]
fn test_namespace_lock_serializes_writers() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(InMemoryKVStore::new());
    let factory = Arc::new(KeyedBackendFactory::new(store));
    let mut filter = ScalableFilter::with_backend(standard_config(100), factory).unwrap();

    let lock = NamespaceLock::acquire(dir.path(), &filter.config().namespace).unwrap();
    assert!(NamespaceLock::acquire(dir.path(), "dedup_stream").is_err());
    filter.insert(b"guarded").unwrap();
    drop(lock);

    assert!(NamespaceLock::acquire(dir.path(), "dedup_stream").is_ok());
}
