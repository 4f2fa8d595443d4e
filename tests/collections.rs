//! Lazy collections: counting, paging, filtering and relation membership.

mod common;

use common::fixture;
use pretty_assertions::assert_eq;
use rowguard::{fields, FieldValue, Limit, OrderBy, OrmError, Params};

#[test]
fn test_stream_matches_full_load() {
    let fx = fixture();
    let items = fx.registry.kind("Item").unwrap();
    for from in [0, 5] {
        for count in [1, 3, 10] {
            let window = Some(Limit::range(from, count));
            let mut loaded = items.select(None, Some(OrderBy::asc("id")), window);
            let expected = loaded.ids().unwrap();

            let mut paged = items
                .select(None, Some(OrderBy::asc("id")), window)
                .with_portion(2);
            let streamed: Vec<i64> = paged
                .stream()
                .unwrap()
                .map(|e| e.unwrap().id())
                .collect();
            assert_eq!(streamed, expected, "from {from} count {count}");
            assert!(!paged.is_loaded());

            let mut counted = items.select(None, Some(OrderBy::asc("id")), window);
            assert_eq!(counted.count().unwrap(), expected.len() as u64);
        }
    }
}

#[test]
fn test_count_does_not_load() {
    let fx = fixture();
    let items = fx.registry.kind("Item").unwrap();
    let mut roots = items.find("parent_id = 0");
    let reads = fx.adapter.reads();
    assert_eq!(roots.count().unwrap(), 2);
    assert_eq!(fx.adapter.reads(), reads + 1);
    assert!(!roots.is_loaded());

    // the count is remembered
    assert_eq!(roots.count().unwrap(), 2);
    assert_eq!(fx.adapter.reads(), reads + 1);
}

#[test]
fn test_find_by_sql_with_named_params() {
    let fx = fixture();
    let items = fx.registry.kind("Item").unwrap();
    let params = Params::named([
        ("pid", FieldValue::from(2)),
        ("title", FieldValue::from("Item 2%")),
    ]);
    let mut found = items.find_by_sql(
        "SELECT * FROM test_items WHERE parent_id=:pid AND title LIKE :title",
        params,
    );
    assert_eq!(found.count().unwrap(), 2);
    assert_eq!(found.ids().unwrap(), vec![6, 7]);

    let mut windowed = items.find_by_sql("SELECT * FROM test_items ORDER BY id LIMIT 2, 10", Params::None);
    assert_eq!(windowed.count().unwrap(), 5);
    let streamed: Vec<i64> = windowed
        .with_portion(2)
        .stream()
        .unwrap()
        .map(|e| e.unwrap().id())
        .collect();
    assert_eq!(streamed, vec![3, 4, 5, 6, 7]);

    let one = items
        .find_one_by_sql("SELECT * FROM test_items WHERE title = ?", &Params::positional(["Item 2.2"]))
        .unwrap();
    assert_eq!(one.map(|e| e.id()), Some(7));
}

#[test]
fn test_relation_collections() {
    let fx = fixture();
    let items = fx.registry.kind("Item").unwrap();
    let mut root = items.load(1).unwrap();

    assert_eq!(root.many("SubItem").unwrap().count().unwrap(), 2);
    assert_eq!(root.many("Item").unwrap().ids().unwrap(), vec![3, 4, 5]);
    // the join row with extra = two is outside the declared relation
    assert_eq!(root.many("RelatedItem").unwrap().ids().unwrap(), vec![1]);
    assert_eq!(root.many("RelatedItem").unwrap().count().unwrap(), 1);

    let err = root.many("SubSubItem").unwrap_err();
    assert!(matches!(err, OrmError::RelationUndefined { .. }));

    let mut sub = fx.registry.kind("SubItem").unwrap().load(1).unwrap();
    let parent = sub.load_foreign("Item").unwrap().into_entity();
    assert_eq!(parent.map(|p| p.id()), Some(1));
    assert!(sub.many("Item").is_err());
}

#[test]
fn test_filters() {
    let fx = fixture();
    let items = fx.registry.kind("Item").unwrap();
    let mut all = items.all_ordered(OrderBy::asc("id"));

    let mut children = all.filter("parent_id = 1").unwrap();
    assert!(children.is_loaded());
    assert_eq!(children.ids().unwrap(), vec![3, 4, 5]);

    let mut odd = all.filter_with(|e| e.id() % 2 == 1).unwrap();
    assert_eq!(odd.ids().unwrap(), vec![1, 3, 5, 7]);

    let first = all.filter_first("title ~ %.2").unwrap();
    assert_eq!(first.map(|e| e.id()), Some(4));
    assert!(all.filter_first_with(|e| e.id() > 100).unwrap().is_none());

    // a filtered collection keeps its rows across reloads
    children.reload();
    assert_eq!(children.count().unwrap(), 3);
}

#[test]
fn test_reload_refetches() {
    let fx = fixture();
    let items = fx.registry.kind("Item").unwrap();
    let mut roots = items.find("parent_id = 0");
    assert_eq!(roots.count().unwrap(), 2);
    assert!(!roots.is_empty().unwrap());

    fx.adapter.execute("UPDATE test_items SET parent_id = 0 WHERE id = 7");
    assert_eq!(roots.count().unwrap(), 2);
    roots.reload();
    assert_eq!(roots.count().unwrap(), 3);
    assert!(items.find("id > 100").is_empty().unwrap());
}

#[test]
fn test_add_to_plain_relation() {
    let fx = fixture();
    let mut item = fx.registry.kind("Item").unwrap().load(2).unwrap();
    let mut sub = fx
        .registry
        .kind("SubItem")
        .unwrap()
        .create(fields! { "title" => "Subitem 3" })
        .unwrap();

    let subs = item.many("SubItem").unwrap();
    subs.add(&mut sub).unwrap();
    assert!(sub.id() > 0);
    assert_eq!(sub.value("item_id").unwrap(), FieldValue::Int(2));
    assert_eq!(subs.count().unwrap(), 1);
    assert_eq!(fx.adapter.scalar("SELECT subitems_count FROM test_items WHERE id = 2"), 1);

    let mut stranger = fx.registry.kind("Item").unwrap().new_entity();
    assert!(matches!(subs.add(&mut stranger), Err(OrmError::InvalidArgument(_))));
}

#[test]
fn test_unique_many_to_many() {
    let fx = fixture();
    let mut item = fx.registry.kind("Item").unwrap().load(2).unwrap();
    let mut related = fx.registry.kind("RelatedItem").unwrap().load(1).unwrap();

    item.add_related("RelatedItem", &mut related).unwrap();
    item.add_related("RelatedItem", &mut related).unwrap();

    let a = &fx.adapter;
    assert_eq!(a.scalar("SELECT COUNT(*) FROM test_items_relations WHERE item_id = 2"), 1);
    assert_eq!(a.scalar("SELECT link_count FROM test_items_relations WHERE item_id = 2"), 2);
    assert_eq!(item.many("RelatedItem").unwrap().ids().unwrap(), vec![1]);

    // a transient entry is saved before it is linked
    let mut fresh = fx
        .registry
        .kind("RelatedItem")
        .unwrap()
        .create(fields! { "title" => "Related 3" })
        .unwrap();
    item.add_related("RelatedItem", &mut fresh).unwrap();
    assert!(fresh.id() > 0);
    assert_eq!(item.many("RelatedItem").unwrap().count().unwrap(), 2);
}

#[test]
fn test_in_memory_edits() {
    let fx = fixture();
    let items = fx.registry.kind("Item").unwrap();
    let mut all = items.all_ordered(OrderBy::asc("id"));

    let mut middle = all.slice(3, 2).unwrap();
    assert_eq!(middle.ids().unwrap(), vec![3, 4, 5]);
    assert_eq!(all.slice(10, 6).unwrap().ids().unwrap(), vec![7]);

    assert_eq!(all.shift().unwrap().map(|e| e.id()), Some(1));
    assert_eq!(all.pop().unwrap().map(|e| e.id()), Some(7));
    assert_eq!(all.remove(1).unwrap().map(|e| e.id()), Some(3));
    assert!(all.remove(10).unwrap().is_none());
    assert_eq!(all.ids().unwrap(), vec![2, 4, 5, 6]);

    let first = items.load(1).unwrap();
    all.prepend(first).unwrap();
    all.append(items.new_entity()).unwrap();
    assert_eq!(all.ids().unwrap(), vec![1, 2, 4, 5, 6, 0]);
    assert_eq!(all.count().unwrap(), 6);

    let sub = fx.registry.kind("SubItem").unwrap().load(1).unwrap();
    assert!(all.append(sub).is_err());
    // nothing of this reached the store
    assert_eq!(fx.adapter.scalar("SELECT COUNT(*) FROM test_items"), 7);
}

#[test]
fn test_for_each_stops_early() {
    let fx = fixture();
    let items = fx.registry.kind("Item").unwrap();
    let mut all = items.all_ordered(OrderBy::asc("id")).with_portion(2);
    let mut seen = Vec::new();
    all.for_each(|index, entity| {
        seen.push((index, entity.id()));
        Ok(entity.id() < 3)
    })
    .unwrap();
    assert_eq!(seen, vec![(0, 1), (1, 2), (2, 3)]);
    assert!(!all.is_loaded());
}

#[test]
fn test_to_field_maps() {
    let fx = fixture();
    let items = fx.registry.kind("Item").unwrap();
    let maps = items
        .find("parent_id = 2")
        .to_field_maps(&["id", "title", "nope"])
        .unwrap();
    assert_eq!(
        maps,
        vec![
            fields! { "id" => 6, "title" => "Item 2.1", "nope" => FieldValue::Null },
            fields! { "id" => 7, "title" => "Item 2.2", "nope" => FieldValue::Null },
        ]
    );
}

#[test]
fn test_collection_save() {
    let fx = fixture();
    let items = fx.registry.kind("Item").unwrap();
    let mut leaves = items.find("parent_id = 2");
    for entity in leaves.records_mut().unwrap() {
        let title = format!("{} (leaf)", entity.raw("title"));
        entity.set("title", title).unwrap();
    }
    leaves.save(true).unwrap();
    assert_eq!(
        fx.adapter.scalar("SELECT COUNT(*) FROM test_items WHERE title LIKE '%(leaf)'"),
        2
    );
}

#[test]
fn test_add_through_transient_owner_saves_it_once() {
    let fx = fixture();
    let items = fx.registry.kind("Item").unwrap();
    let mut parent = items.create(fields! { "title" => "new parent" }).unwrap();
    let mut child = items.create(fields! { "title" => "new child" }).unwrap();

    // the collection only holds a copy of its owner
    let err = parent.many("Item").unwrap().add(&mut child).unwrap_err();
    assert!(matches!(err, OrmError::InvalidArgument(_)));
    assert_eq!(parent.id(), 0);
    assert_eq!(fx.adapter.scalar("SELECT COUNT(*) FROM test_items"), 7);

    parent.add_related("Item", &mut child).unwrap();
    assert!(parent.id() > 0);
    assert_eq!(child.value("parent_id").unwrap(), FieldValue::Int(parent.id()));

    parent.save(true).unwrap();
    assert_eq!(
        fx.adapter.scalar("SELECT COUNT(*) FROM test_items WHERE title = 'new parent'"),
        1
    );
    assert_eq!(fx.adapter.scalar("SELECT COUNT(*) FROM test_items"), 9);
    assert_eq!(parent.many("Item").unwrap().ids().unwrap(), vec![child.id()]);
}

#[test]
fn test_set_related_by_property_name() {
    let fx = fixture();
    let mut item = fx.registry.kind("Item").unwrap().load(2).unwrap();
    let subs = fx.registry.kind("SubItem").unwrap();

    let mut sub = subs.create(fields! { "title" => "Subitem 3" }).unwrap();
    sub.set_related("item", std::slice::from_mut(&mut item)).unwrap();
    assert_eq!(sub.value("item_id").unwrap(), FieldValue::Int(2));

    let mut batch = vec![
        subs.create(fields! { "title" => "Subitem 4" }).unwrap(),
        subs.create(fields! { "title" => "Subitem 5" }).unwrap(),
    ];
    item.set_related("sub_items", &mut batch).unwrap();
    for entry in &batch {
        assert_eq!(entry.value("item_id").unwrap(), FieldValue::Int(2));
    }

    assert!(matches!(
        item.set_related("gadgets", &mut []),
        Err(OrmError::RelationUndefined { .. })
    ));
    assert!(matches!(sub.set_related("item", &mut []), Err(OrmError::InvalidArgument(_))));
    assert!(matches!(item.set("sub_items", 1), Err(OrmError::InvalidArgument(_))));
}

#[test]
fn test_stream_with_bound_limit() {
    let fx = fixture();
    let items = fx.registry.kind("Item").unwrap();
    let mut first = items
        .find_by_sql("SELECT * FROM test_items ORDER BY id LIMIT ?", Params::positional([3]))
        .with_portion(2);
    assert_eq!(first.count().unwrap(), 3);
    let streamed: Vec<i64> = first
        .stream()
        .unwrap()
        .map(|e| e.unwrap().id())
        .collect();
    assert_eq!(streamed, vec![1, 2, 3]);

    let skipped = items.find_by_sql(
        "SELECT * FROM test_items ORDER BY id LIMIT :n OFFSET :skip",
        Params::named([("n", 2), ("skip", 4)]),
    );
    let ids: Vec<i64> = skipped
        .with_portion(1)
        .stream()
        .unwrap()
        .map(|e| e.unwrap().id())
        .collect();
    assert_eq!(ids, vec![5, 6]);
}
