//! Cache providers and preloaded kinds.

mod common;

use common::fixture_with;
use rowguard::config::OrmConfig;
use rowguard::{fields, CacheProvider, Condition, FieldValue, MemoryCache, OrderBy};
use std::sync::Arc;

fn cached() -> (common::Fixture, Arc<MemoryCache>) {
    let cache = Arc::new(MemoryCache::new());
    let fx = fixture_with(Some(cache.clone()), OrmConfig::default());
    (fx, cache)
}

#[test]
fn test_entity_cache_round_trip() {
    let (fx, cache) = cached();
    let items = fx.registry.kind("Item").unwrap();
    items.load(3).unwrap().cache(None).unwrap();
    assert_eq!(cache.len(), 1);

    // the cached copy wins over the store
    fx.adapter.execute("UPDATE test_items SET title = 'stale' WHERE id = 3");
    let reads = fx.adapter.reads();
    let hit = items.load_from_cache(3, false, None).unwrap();
    assert_eq!(hit.value("title").unwrap(), FieldValue::from("Item 1.1"));
    assert_eq!(fx.adapter.reads(), reads);
}

#[test]
fn test_autocache_on_miss() {
    let (fx, cache) = cached();
    let items = fx.registry.kind("Item").unwrap();
    assert_eq!(items.load_from_cache(4, false, None).unwrap().id(), 4);
    assert!(cache.is_empty());

    items.load_from_cache(4, true, None).unwrap();
    assert_eq!(cache.len(), 1);
    let reads = fx.adapter.reads();
    assert_eq!(items.load_from_cache(4, true, None).unwrap().id(), 4);
    assert_eq!(fx.adapter.reads(), reads);
}

#[test]
fn test_cached_sets() {
    let (fx, cache) = cached();
    let items = fx.registry.kind("Item").unwrap();
    items.find("parent_id = 2").cache("leaves", None).unwrap();
    assert_eq!(cache.len(), 3);

    let reads = fx.adapter.reads();
    let mut leaves = items.load_cached_set("leaves").unwrap().unwrap();
    assert_eq!(leaves.count().unwrap(), 2);
    assert_eq!(leaves.ids().unwrap(), vec![6, 7]);
    assert_eq!(fx.adapter.reads(), reads);

    assert!(items.load_cached_set("unknown").unwrap().is_none());
}

#[test]
fn test_cached_set_miss_reads_store() {
    let (fx, cache) = cached();
    let items = fx.registry.kind("Item").unwrap();
    cache.store_record_set("Item", "manual", &[1, 100], None).unwrap();
    let mut set = items.load_cached_set("manual").unwrap().unwrap();
    assert_eq!(set.ids().unwrap(), vec![1]);
}

#[test]
fn test_preloaded_kind_reads_once() {
    let (fx, _) = cached();
    let categories = fx.registry.kind("Category").unwrap();
    let reads = fx.adapter.reads();

    assert_eq!(categories.all().count().unwrap(), 3);
    assert_eq!(fx.adapter.reads(), reads + 1);

    let mut ordered = categories.all_ordered(OrderBy::asc("position"));
    let titles: Vec<FieldValue> = ordered
        .records()
        .unwrap()
        .iter()
        .map(|c| c.raw("title"))
        .collect();
    assert_eq!(titles, vec![FieldValue::from("bikes"), FieldValue::from("games"), FieldValue::from("books")]);
    assert_eq!(categories.find("position > 1").count().unwrap(), 2);
    assert_eq!(categories.load(2).unwrap().raw("title"), FieldValue::from("bikes"));
    assert_eq!(fx.adapter.reads(), reads + 1);

    // random order and raw SQL still go to the store
    categories.find_random(None, None).ids().unwrap();
    categories
        .find(Condition::raw("`position` IN (SELECT 1)"))
        .ids()
        .unwrap();
    assert_eq!(fx.adapter.reads(), reads + 3);
}

#[test]
fn test_preloaded_snapshot_flushed_on_save() {
    let (fx, _) = cached();
    let categories = fx.registry.kind("Category").unwrap();
    assert_eq!(categories.all().count().unwrap(), 3);

    let mut music = categories.create(fields! { "title" => "music", "position" => 4 }).unwrap();
    music.save(true).unwrap();
    assert_eq!(categories.all().count().unwrap(), 4);

    music.drop().unwrap();
    assert_eq!(categories.all().count().unwrap(), 3);
}
