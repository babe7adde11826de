//! End-to-end engine tests against the in-process backend.

use std::sync::Arc;

use indexmap::IndexMap;

use strata_backend::KvBackend;
use strata_backend_memory::MemoryBackend;
use strata_cache::{CacheConfig, CacheEventKind, CacheValue, StrataCache, ValueFilter};

async fn cache_with(config: CacheConfig) -> (StrataCache, Arc<MemoryBackend>) {
    let backend = Arc::new(MemoryBackend::new());
    let cache = StrataCache::builder(backend.clone())
        .config(config)
        .connect()
        .await
        .expect("connect should succeed against a healthy backend");
    (cache, backend)
}

async fn default_cache() -> (StrataCache, Arc<MemoryBackend>) {
    cache_with(CacheConfig::default()).await
}

fn map_value() -> CacheValue {
    let mut fields = IndexMap::new();
    fields.insert("id".to_string(), CacheValue::Int(7));
    fields.insert("name".to_string(), CacheValue::from("strata"));
    fields.insert(
        "tags".to_string(),
        CacheValue::List(vec![CacheValue::from("a"), CacheValue::from("b")]),
    );
    CacheValue::Map(fields)
}

#[tokio::test]
async fn test_set_then_get_round_trips_structured_values() {
    let (cache, backend) = default_cache().await;
    let value = map_value();

    assert!(cache.set("alpha", value.clone(), "default", 0).await.unwrap());
    assert_eq!(
        cache.get("alpha", "default", false).await.unwrap(),
        Some(value.clone())
    );

    // A second instance over the same backend sees the value through the
    // remote tier only, exercising the codec round trip.
    let other = StrataCache::builder(backend)
        .connect()
        .await
        .unwrap();
    assert_eq!(
        other.get("alpha", "default", false).await.unwrap(),
        Some(value)
    );
}

#[tokio::test]
async fn test_add_stores_only_when_absent() {
    let (cache, _backend) = default_cache().await;

    assert!(cache.add("k1", CacheValue::from("first"), "default", 0).await.unwrap());
    assert!(!cache.add("k1", CacheValue::from("second"), "default", 0).await.unwrap());
    // The losing add must not have modified the entry.
    assert_eq!(
        cache.get("k1", "default", false).await.unwrap(),
        Some(CacheValue::from("first"))
    );
}

#[tokio::test]
async fn test_replace_stores_only_when_present() {
    let (cache, _backend) = default_cache().await;

    assert!(!cache.replace("k1", CacheValue::from("v"), "default", 0).await.unwrap());
    assert_eq!(cache.get("k1", "default", false).await.unwrap(), None);

    assert!(cache.set("k1", CacheValue::from("v1"), "default", 0).await.unwrap());
    assert!(cache.replace("k1", CacheValue::from("v2"), "default", 0).await.unwrap());
    assert_eq!(
        cache.get("k1", "default", false).await.unwrap(),
        Some(CacheValue::from("v2"))
    );
}

#[tokio::test]
async fn test_add_trusts_remote_existence_over_local() {
    let (cache, backend) = default_cache().await;

    assert!(cache.set("k1", CacheValue::from("v1"), "default", 0).await.unwrap());
    // Another client deleted the key behind our back; the local tier is
    // stale but the remote tier decides.
    let derived = cache.derive_key("k1", "default");
    backend.delete(&derived).await.unwrap();

    assert!(cache.add("k1", CacheValue::from("v2"), "default", 0).await.unwrap());
    assert_eq!(
        cache.get("k1", "default", false).await.unwrap(),
        Some(CacheValue::from("v2"))
    );
}

#[tokio::test]
async fn test_increment_then_decrement_restores_value() {
    let (cache, _backend) = default_cache().await;

    assert_eq!(cache.increment("ctr", 4, "default").await.unwrap(), 4);
    assert_eq!(cache.increment("ctr", 3, "default").await.unwrap(), 7);
    assert_eq!(cache.decrement("ctr", 3, "default").await.unwrap(), 4);
    assert_eq!(cache.decrement("ctr", 4, "default").await.unwrap(), 0);

    // The local mirror follows the backend's authoritative counter.
    assert_eq!(
        cache.get("ctr", "default", false).await.unwrap(),
        Some(CacheValue::Int(0))
    );
}

#[tokio::test]
async fn test_counters_in_non_persistent_group_stay_local() {
    let (cache, backend) = default_cache().await;
    cache.add_non_persistent_groups(["counts"]);

    assert_eq!(cache.increment("ctr", 7, "counts").await.unwrap(), 7);
    assert_eq!(cache.decrement("ctr", 2, "counts").await.unwrap(), 5);
    assert!(backend.is_empty());
}

#[tokio::test]
async fn test_delete_is_idempotent() {
    let (cache, _backend) = default_cache().await;

    cache.set("k1", CacheValue::from("v1"), "default", 0).await.unwrap();
    assert!(cache.delete("k1", "default").await.unwrap());
    assert!(!cache.delete("k1", "default").await.unwrap());
    assert_eq!(cache.get("k1", "default", false).await.unwrap(), None);
}

#[tokio::test]
async fn test_local_hit_does_not_touch_remote_until_forced() {
    let (cache, backend) = default_cache().await;

    cache.set("k1", CacheValue::from("one"), "default", 0).await.unwrap();
    // Simulate another client overwriting the remote copy.
    let derived = cache.derive_key("k1", "default");
    backend.set(&derived, b"two", 0).await.unwrap();

    assert_eq!(
        cache.get("k1", "default", false).await.unwrap(),
        Some(CacheValue::from("one"))
    );
    // force bypasses the local tier and repopulates it.
    assert_eq!(
        cache.get("k1", "default", true).await.unwrap(),
        Some(CacheValue::from("two"))
    );
    assert_eq!(
        cache.get("k1", "default", false).await.unwrap(),
        Some(CacheValue::from("two"))
    );
}

#[tokio::test]
async fn test_get_multi_preserves_order_and_counts_stats() {
    let (cache, backend) = default_cache().await;

    let hit_key = cache.derive_key("k1", "default");
    let miss_key = cache.derive_key("k2", "default");
    backend.set(&hit_key, b"v1", 0).await.unwrap();

    let mut requests = IndexMap::new();
    requests.insert("default".to_string(), vec!["k1".to_string(), "k2".to_string()]);

    let results = cache.get_multi(&requests).await.unwrap();
    let entries: Vec<(&String, &Option<CacheValue>)> = results.iter().collect();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0], (&hit_key, &Some(CacheValue::from("v1"))));
    assert_eq!(entries[1], (&miss_key, &None));

    let stats = cache.stats();
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.misses, 1);
}

#[tokio::test]
async fn test_get_multi_rejects_empty_request() {
    let (cache, _backend) = default_cache().await;
    let err = cache.get_multi(&IndexMap::new()).await.unwrap_err();
    assert!(err.is_policy());
}

#[tokio::test]
async fn test_degraded_instance_behaves_like_non_persistent_groups() {
    let (cache, backend) = cache_with(CacheConfig {
        global_groups: vec!["users".to_string()],
        ..CacheConfig::default()
    })
    .await;

    cache.set("seed", CacheValue::from("v"), "users", 0).await.unwrap();
    let remote_keys_before = backend.keys().len();

    backend.set_failing(true);
    // First failing operation demotes the instance.
    assert_eq!(cache.get("absent", "users", false).await.unwrap(), None);
    assert!(!cache.is_connected());
    backend.set_failing(false);

    // The backend is healthy again, but demotion is one-way: writes stay
    // local and never reach it.
    assert!(cache.set("k2", CacheValue::from("local"), "users", 0).await.unwrap());
    assert!(cache.set("k3", CacheValue::from("local"), "default", 0).await.unwrap());
    assert_eq!(backend.keys().len(), remote_keys_before);
    assert_eq!(
        cache.get("k2", "users", false).await.unwrap(),
        Some(CacheValue::from("local"))
    );
}

#[tokio::test]
async fn test_flush_on_degraded_instance_clears_local_and_reports_false() {
    let (cache, backend) = default_cache().await;

    cache.set("k1", CacheValue::from("v1"), "default", 0).await.unwrap();
    backend.set_failing(true);
    cache.get("absent", "default", false).await.unwrap();
    backend.set_failing(false);

    assert!(!cache.flush(None).await.unwrap());
    // The local tier is emptied regardless of the remote outcome.
    assert_eq!(cache.get("k1", "default", false).await.unwrap(), None);
}

#[tokio::test]
async fn test_full_flush_wipes_backend() {
    let (cache, backend) = default_cache().await;

    cache.set("k1", CacheValue::from("v1"), "default", 0).await.unwrap();
    cache.set("k2", CacheValue::from("v2"), "default", 0).await.unwrap();

    assert!(cache.flush(None).await.unwrap());
    assert!(backend.is_empty());
    assert_eq!(cache.get("k1", "default", false).await.unwrap(), None);
}

#[tokio::test]
async fn test_selective_flush_spares_unflushable_groups_and_foreign_salts() {
    let (cache, backend) = cache_with(CacheConfig {
        key_salt: "abc".to_string(),
        selective_flush: true,
        unflushable_groups: vec!["sessions".to_string()],
        ..CacheConfig::default()
    })
    .await;

    cache.set("p1", CacheValue::from("post"), "posts", 0).await.unwrap();
    cache.set("s1", CacheValue::from("live"), "sessions", 0).await.unwrap();
    // A neighbor deployment's key under a different salt.
    backend.set("other:posts:x", b"keep", 0).await.unwrap();

    assert!(cache.flush(None).await.unwrap());

    let mut keys = backend.keys();
    keys.sort();
    assert_eq!(keys, vec!["abc:sessions:s1", "other:posts:x"]);

    // Unflushable survivors are still readable (local tier was cleared, so
    // this goes through the remote tier).
    assert_eq!(
        cache.get("s1", "sessions", false).await.unwrap(),
        Some(CacheValue::from("live"))
    );
    assert_eq!(cache.get("p1", "posts", false).await.unwrap(), None);
}

#[tokio::test]
async fn test_derived_keys_follow_group_policy_and_tenant() {
    let (cache, _backend) = cache_with(CacheConfig {
        key_salt: "s1".to_string(),
        tenant_prefix: "wp_".to_string(),
        global_groups: vec!["users".to_string()],
        ..CacheConfig::default()
    })
    .await;

    assert_eq!(cache.derive_key("alpha", "users"), "s1:users:alpha");
    assert_eq!(cache.derive_key("alpha", "posts"), "s1wp:posts:alpha");

    cache.switch_tenant("t2_");
    assert_eq!(cache.derive_key("alpha", "posts"), "s1t2:posts:alpha");
    // Global groups are unaffected by tenant switches.
    assert_eq!(cache.derive_key("alpha", "users"), "s1:users:alpha");
}

#[tokio::test]
async fn test_tenant_switch_isolates_entries() {
    let (cache, _backend) = cache_with(CacheConfig {
        tenant_prefix: "t1_".to_string(),
        ..CacheConfig::default()
    })
    .await;

    cache.set("k1", CacheValue::from("tenant-one"), "posts", 0).await.unwrap();
    cache.switch_tenant("t2_");
    assert_eq!(cache.get("k1", "posts", false).await.unwrap(), None);

    cache.switch_tenant("t1_");
    assert_eq!(
        cache.get("k1", "posts", false).await.unwrap(),
        Some(CacheValue::from("tenant-one"))
    );
}

#[tokio::test]
async fn test_suspended_additions_reject_add_but_not_set() {
    let (cache, _backend) = default_cache().await;

    cache.suspend_additions();
    assert!(!cache.add("k1", CacheValue::from("v"), "default", 0).await.unwrap());
    assert!(cache.set("k2", CacheValue::from("v"), "default", 0).await.unwrap());

    cache.resume_additions();
    assert!(cache.add("k1", CacheValue::from("v"), "default", 0).await.unwrap());
}

#[tokio::test]
async fn test_events_are_published_per_operation() {
    let (cache, _backend) = default_cache().await;
    let mut rx = cache.events().subscribe();

    cache.set("k1", CacheValue::from("v"), "default", 0).await.unwrap();
    cache.get("k1", "default", false).await.unwrap();
    cache.get("absent", "default", false).await.unwrap();
    cache.delete("k1", "default").await.unwrap();
    cache.flush(None).await.unwrap();

    let set = rx.recv().await.unwrap();
    assert_eq!(set.kind, CacheEventKind::Set);
    assert!(set.ok);

    let hit = rx.recv().await.unwrap();
    assert_eq!(hit.kind, CacheEventKind::Get);
    assert!(hit.ok);
    assert_eq!(hit.key.as_deref(), Some("k1"));

    let miss = rx.recv().await.unwrap();
    assert_eq!(miss.kind, CacheEventKind::Get);
    assert!(!miss.ok);

    let delete = rx.recv().await.unwrap();
    assert_eq!(delete.kind, CacheEventKind::Delete);
    assert!(delete.ok);

    let flush = rx.recv().await.unwrap();
    assert_eq!(flush.kind, CacheEventKind::Flush);
    assert!(flush.ok);
}

struct Redactor;

impl ValueFilter for Redactor {
    fn filter(&self, value: CacheValue, _key: &str, group: &str) -> CacheValue {
        if group == "secrets" {
            CacheValue::from("[redacted]")
        } else {
            value
        }
    }
}

#[tokio::test]
async fn test_value_filter_applies_on_read_path() {
    let backend = Arc::new(MemoryBackend::new());
    let cache = StrataCache::builder(backend)
        .value_filter(Arc::new(Redactor))
        .connect()
        .await
        .unwrap();

    cache.set("token", CacheValue::from("hunter2"), "secrets", 0).await.unwrap();
    cache.set("title", CacheValue::from("hello"), "posts", 0).await.unwrap();

    assert_eq!(
        cache.get("token", "secrets", false).await.unwrap(),
        Some(CacheValue::from("[redacted]"))
    );
    assert_eq!(
        cache.get("title", "posts", false).await.unwrap(),
        Some(CacheValue::from("hello"))
    );
}

#[tokio::test]
async fn test_stats_report_backend_identity() {
    let (cache, _backend) = default_cache().await;
    let stats = cache.stats();
    assert!(stats.connected);
    assert_eq!(stats.backend_name, "memory");
    assert_eq!(stats.backend_version, None);
    assert_eq!(stats.local_entries, 0);
}
