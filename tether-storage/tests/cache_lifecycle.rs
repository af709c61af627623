//! Cache configuration, retention and sharing across handles and threads.

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::thread;

use tether_core::{CacheConfig, CacheStrategyKind, Managed};
use tether_storage::{Dao, ObjectCache};
use tether_test_utils::assertions::{assert_distinct_instances, assert_same_instance};
use tether_test_utils::{init_test_tracing, Account, Foo, WithId};

#[test]
fn test_enable_from_config_with_backfill() {
    init_test_tracing();
    let dao = Dao::<Foo>::in_memory();
    for (id, val) in [("a", 1), ("b", 2), ("c", 3)] {
        dao.create(&Managed::new(Foo::new(id, val))).unwrap();
    }

    let config = CacheConfig::new()
        .with_strategy(CacheStrategyKind::Strong)
        .with_backfill(true);
    let cache = dao.enable_object_cache(&config).unwrap();
    assert_eq!(cache.strategy_name(), "strong");
    assert_eq!(cache.size().unwrap(), 3);

    let first = dao.query_for_id(&"b".to_string()).unwrap().unwrap();
    let all = dao.query_for_all().unwrap();
    assert_same_instance(&all[1], &first);
    assert_eq!(cache.stats().unwrap().misses, 0);
}

#[test]
fn test_enable_rejects_invalid_config() {
    let dao = Dao::<Foo>::in_memory();
    let config = CacheConfig::new().with_strategy(CacheStrategyKind::Lru { capacity: 0 });
    let err = dao.enable_object_cache(&config).unwrap_err();
    assert!(!err.is_invalid_argument());
    assert!(dao.object_cache().unwrap().is_none());
}

#[test]
fn test_weak_cache_releases_dropped_instances() {
    init_test_tracing();
    let cache = Arc::new(ObjectCache::weak());
    let dao = Dao::<Foo>::in_memory();
    dao.set_object_cache(Some(Arc::clone(&cache))).unwrap();

    let kept = Managed::new(Foo::new("kept", 1));
    dao.create(&kept).unwrap();
    {
        let dropped = Managed::new(Foo::new("dropped", 2));
        dao.create(&dropped).unwrap();
        assert_eq!(cache.size().unwrap(), 2);
    }
    assert_eq!(cache.size().unwrap(), 1);

    // the row survives; a new instance is loaded and cached again
    let reloaded = dao.query_for_id(&"dropped".to_string()).unwrap().unwrap();
    assert_eq!(reloaded.read().val, 2);
    let again = dao.query_for_id(&"dropped".to_string()).unwrap().unwrap();
    assert_same_instance(&again, &reloaded);
}

#[test]
fn test_lru_cache_evicts_least_recent() {
    let cache = Arc::new(ObjectCache::lru(NonZeroUsize::new(2).unwrap()));
    let dao = Dao::<Foo>::in_memory();
    dao.set_object_cache(Some(Arc::clone(&cache))).unwrap();

    let a = Managed::new(Foo::new("a", 1));
    dao.create(&a).unwrap();
    dao.create(&Managed::new(Foo::new("b", 2))).unwrap();
    dao.create(&Managed::new(Foo::new("c", 3))).unwrap();

    assert_eq!(cache.size().unwrap(), 2);
    assert_eq!(cache.stats().unwrap().evictions, 1);
    let reloaded = dao.query_for_id(&"a".to_string()).unwrap().unwrap();
    assert_distinct_instances(&reloaded, &a);
}

#[test]
fn test_handles_sharing_a_cache_share_instances() {
    let cache = Arc::new(ObjectCache::strong());
    let store_backed = Dao::<Foo>::in_memory();
    store_backed
        .set_object_cache(Some(Arc::clone(&cache)))
        .unwrap();
    let second = Dao::<Foo>::in_memory();
    second.set_object_cache(Some(Arc::clone(&cache))).unwrap();

    let foo = Managed::new(Foo::new("shared", 1));
    store_backed.create(&foo).unwrap();

    // the second handle has no row, but the cache serves the instance
    let found = second.query_for_id(&"shared".to_string()).unwrap().unwrap();
    assert_same_instance(&found, &foo);
}

#[test]
fn test_uuid_keys_and_custom_field_copy() {
    let cache = Arc::new(ObjectCache::strong());
    let dao = Dao::<Account>::in_memory();
    dao.set_object_cache(Some(Arc::clone(&cache))).unwrap();

    let account = Managed::new(Account::new("ann", 100));
    dao.create(&account).unwrap();
    account.write().local_views = 3;

    let mut changed = account.snapshot();
    changed.balance_cents = 900;
    changed.local_views = 0;
    dao.update(&Managed::new(changed)).unwrap();

    assert_eq!(account.read().balance_cents, 900);
    assert_eq!(account.read().local_views, 3);
}

#[test]
fn test_generated_ids_are_cached_under_assigned_key() {
    let cache = Arc::new(ObjectCache::strong());
    let dao = Dao::<WithId>::in_memory();
    dao.set_object_cache(Some(Arc::clone(&cache))).unwrap();

    let first = Managed::new(WithId::new("one"));
    let second = Managed::new(WithId::new("two"));
    dao.create(&first).unwrap();
    dao.create(&second).unwrap();

    assert_eq!(first.id(), Some(1));
    assert_eq!(second.id(), Some(2));
    assert_same_instance(&dao.query_for_id(&2).unwrap().unwrap(), &second);
}

#[test]
fn test_concurrent_handles_on_one_cache() {
    init_test_tracing();
    let cache = Arc::new(ObjectCache::strong());
    let dao = Arc::new(Dao::<Foo>::in_memory());
    dao.set_object_cache(Some(Arc::clone(&cache))).unwrap();

    thread::scope(|scope| {
        for worker in 0..8 {
            let dao = Arc::clone(&dao);
            scope.spawn(move || {
                for i in 0..25 {
                    let id = format!("w{worker}-{i}");
                    let foo = Managed::new(Foo::new(id.clone(), i));
                    dao.create(&foo).unwrap();
                    let found = dao.query_for_id(&id).unwrap().unwrap();
                    assert!(found.same_instance(&foo));
                }
            });
        }
    });

    assert_eq!(cache.size().unwrap(), 200);
    assert_eq!(dao.count_of().unwrap(), 200);
}
