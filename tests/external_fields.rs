mod common;

use common::fixture;
use rowguard::{FieldValue, Outcome};

#[test]
fn test_reads_side_table() {
    let fx = fixture();
    let items = fx.registry.kind("Item").unwrap();
    let first = items.load(1).unwrap();
    assert_eq!(first.value("info").unwrap(), FieldValue::from("first item"));
    assert_eq!(first.value("rating").unwrap(), FieldValue::Int(5));

    let second = items.load(2).unwrap();
    assert!(second.value("info").unwrap().is_null());
    assert!(items.new_entity().value("info").unwrap().is_null());
}

#[test]
fn test_save_creates_then_updates_side_row() {
    let fx = fixture();
    let items = fx.registry.kind("Item").unwrap();
    let mut item = items.load(2).unwrap();
    item.set("info", "second item").unwrap();
    assert!(item.was_changed());
    assert_eq!(item.save(true).unwrap(), Outcome::Applied);
    assert_eq!(fx.adapter.scalar("SELECT COUNT(*) FROM test_items_info WHERE item_id = 2"), 1);

    let mut fresh = items.load(2).unwrap();
    assert_eq!(fresh.value("info").unwrap(), FieldValue::from("second item"));

    fresh.set("rating", 3).unwrap();
    fresh.save(true).unwrap();
    assert_eq!(fx.adapter.scalar("SELECT COUNT(*) FROM test_items_info WHERE item_id = 2"), 1);
    assert_eq!(fx.adapter.scalar("SELECT rating FROM test_items_info WHERE item_id = 2"), 3);
    assert_eq!(items.load(2).unwrap().value("info").unwrap(), FieldValue::from("second item"));
}

#[test]
fn test_new_entity_with_external_field() {
    let fx = fixture();
    let items = fx.registry.kind("Item").unwrap();
    let mut item = items.new_entity();
    item.set("title", "with info").unwrap();
    item.set("info", "born with it").unwrap();
    item.save(true).unwrap();

    let id = item.id();
    let stored = fx.adapter.scalar(&format!(
        "SELECT COUNT(*) FROM test_items_info WHERE item_id = {id} AND info = 'born with it'"
    ));
    assert_eq!(stored, 1);
}

#[test]
fn test_drop_removes_side_row() {
    let fx = fixture();
    let mut item = fx.registry.kind("Item").unwrap().load(1).unwrap();
    item.drop().unwrap();
    assert_eq!(fx.adapter.scalar("SELECT COUNT(*) FROM test_items_info"), 0);
}
