// tests/cache_ttl.rs
use regwatch::cache::TtlCache;
use regwatch::config::CacheConfig;
use std::time::Duration;
use tokio::time::advance;

#[tokio::test(start_paused = true)]
async fn value_visible_before_ttl_and_gone_after() {
    let cache: TtlCache<&'static str> = TtlCache::new("it", 100, Duration::from_secs(60));
    cache.set("k", "v", Some(Duration::from_millis(100)));

    advance(Duration::from_millis(50)).await;
    assert_eq!(cache.get("k"), Some("v"));

    advance(Duration::from_millis(100)).await;
    assert_eq!(cache.get("k"), None);
}

#[tokio::test(start_paused = true)]
async fn full_cache_evicts_oldest_tenth() {
    let cfg = CacheConfig {
        max_entries: 20,
        ..CacheConfig::default()
    };
    let cache: TtlCache<u32> = TtlCache::from_config("it", &cfg);
    for i in 0..20u32 {
        cache.set(format!("k{i:02}"), i, None);
        advance(Duration::from_millis(1)).await;
    }

    cache.set("new", 99, None);
    // 10% of 20 = 2 oldest entries dropped to make room
    assert_eq!(cache.len(), 19);
    assert_eq!(cache.get("k00"), None);
    assert_eq!(cache.get("k01"), None);
    assert_eq!(cache.get("k02"), Some(2));
    assert_eq!(cache.get("new"), Some(99));
}

#[tokio::test(start_paused = true)]
async fn purge_removes_only_expired() {
    let cache: TtlCache<u8> = TtlCache::new("it", 10, Duration::from_secs(10));
    cache.set("short", 1, Some(Duration::from_secs(1)));
    cache.set("long", 2, None);
    advance(Duration::from_secs(2)).await;
    assert_eq!(cache.purge_expired(), 1);
    assert_eq!(cache.len(), 1);
    assert_eq!(cache.get("long"), Some(2));
}
