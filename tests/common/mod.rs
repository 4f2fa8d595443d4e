//! Shared in-memory SQLite fixture for the integration tests.
//!
//! Seven `Item` rows form a two-level tree (items 1 and 2 are roots), item 1
//! owns two sub-items, sub-item 1 owns two sub-sub-items, and item 1 is
//! linked to both related items.
#![allow(dead_code)]

use rowguard::adapter::{ColumnInfo, DatabaseAdapter, Params};
use rowguard::cache::CacheProvider;
use rowguard::config::OrmConfig;
use rowguard::external::ExternalFields;
use rowguard::registry::{HasMany, KindDef, Registry};
use rowguard::sql::Dialect;
use rowguard::{FieldMap, FieldValue, Result, SqliteAdapter};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

pub const SCHEMA: &str = "
CREATE TABLE test_items (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    parent_id INTEGER NOT NULL DEFAULT 0,
    title TEXT NOT NULL DEFAULT '',
    children_count INTEGER NOT NULL DEFAULT 0,
    subitems_count INTEGER NOT NULL DEFAULT 0,
    created_at INTEGER NOT NULL DEFAULT 0,
    updated_at INTEGER NOT NULL DEFAULT 0
);
CREATE TABLE test_subitems (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    item_id INTEGER NOT NULL DEFAULT 0,
    title TEXT NOT NULL DEFAULT '',
    num INTEGER NOT NULL DEFAULT 0
);
CREATE TABLE test_subsubitems (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    subitem_id INTEGER NOT NULL DEFAULT 0,
    title TEXT NOT NULL DEFAULT ''
);
CREATE TABLE related_items (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    title TEXT NOT NULL DEFAULT ''
);
CREATE TABLE test_items_relations (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    item_id INTEGER NOT NULL DEFAULT 0,
    related_item_id INTEGER NOT NULL DEFAULT 0,
    extra TEXT NOT NULL DEFAULT 'one',
    link_count INTEGER NOT NULL DEFAULT 0
);
CREATE TABLE test_items_info (
    item_id INTEGER NOT NULL PRIMARY KEY,
    info TEXT,
    rating INTEGER
);
CREATE TABLE categories (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    title TEXT NOT NULL DEFAULT '',
    position INTEGER NOT NULL DEFAULT 0
);
";

pub const DATA: &str = "
INSERT INTO test_items (id, parent_id, title, children_count, subitems_count) VALUES
    (1, 0, 'Item 1', 3, 2),
    (2, 0, 'Item 2', 2, 0),
    (3, 1, 'Item 1.1', 0, 0),
    (4, 1, 'Item 1.2', 0, 0),
    (5, 1, 'Item 1.3', 0, 0),
    (6, 2, 'Item 2.1', 0, 0),
    (7, 2, 'Item 2.2', 0, 0);
INSERT INTO test_subitems (id, item_id, title, num) VALUES
    (1, 1, 'Subitem 1', 2),
    (2, 1, 'Subitem 2', 1);
INSERT INTO test_subsubitems (id, subitem_id, title) VALUES
    (1, 1, 'Subsubitem 1'),
    (2, 1, 'Subsubitem 2');
INSERT INTO related_items (id, title) VALUES
    (1, 'Related 1'),
    (2, 'Related 2');
INSERT INTO test_items_relations (item_id, related_item_id, extra, link_count) VALUES
    (1, 1, 'one', 1),
    (1, 2, 'two', 1);
INSERT INTO test_items_info (item_id, info, rating) VALUES
    (1, 'first item', 5);
INSERT INTO categories (title, position) VALUES
    ('books', 3),
    ('bikes', 1),
    ('games', 2);
";

/// Adapter wrapper counting the statements that reach the store
pub struct CountingAdapter {
    inner: SqliteAdapter,
    reads: AtomicUsize,
    writes: AtomicUsize,
}

impl CountingAdapter {
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn statements(&self) -> usize {
        self.reads() + self.writes()
    }

    pub fn scalar(&self, sql: &str) -> i64 {
        self.inner
            .fetch_single_value(sql, &Params::None)
            .unwrap()
            .map_or(0, |v| v.as_id())
    }

    /// Run a statement without counting it
    pub fn execute(&self, sql: &str) {
        self.inner.query(sql, &Params::None).unwrap();
    }

    fn read(&self) {
        self.reads.fetch_add(1, Ordering::SeqCst);
    }

    fn write(&self) {
        self.writes.fetch_add(1, Ordering::SeqCst);
    }
}

impl DatabaseAdapter for CountingAdapter {
    fn fetch_rows(&self, sql: &str, params: &Params) -> Result<Vec<FieldMap>> {
        self.read();
        self.inner.fetch_rows(sql, params)
    }

    fn fetch_single_value(&self, sql: &str, params: &Params) -> Result<Option<FieldValue>> {
        self.read();
        self.inner.fetch_single_value(sql, params)
    }

    fn query(&self, sql: &str, params: &Params) -> Result<u64> {
        self.write();
        self.inner.query(sql, params)
    }

    fn insert(&self, table: &str, fields: &FieldMap) -> Result<i64> {
        self.write();
        self.inner.insert(table, fields)
    }

    fn table_columns(&self, table: &str) -> Result<Vec<ColumnInfo>> {
        self.inner.table_columns(table)
    }

    fn tables(&self) -> Result<Vec<String>> {
        self.inner.tables()
    }

    fn begin_transaction(&self) -> Result<()> {
        self.inner.begin_transaction()
    }

    fn commit(&self) -> Result<()> {
        self.inner.commit()
    }

    fn rollback(&self) -> Result<()> {
        self.inner.rollback()
    }

    fn in_transaction(&self) -> bool {
        self.inner.in_transaction()
    }

    fn dialect(&self) -> Dialect {
        self.inner.dialect()
    }
}

pub struct Fixture {
    pub adapter: Arc<CountingAdapter>,
    pub registry: Arc<Registry>,
}

pub fn kinds() -> Vec<KindDef> {
    vec![
        KindDef::new("Item")
            .table("test_items")
            .has_many("Item", HasMany::new("parent_id").counter("children_count"))
            .has_many("SubItem", HasMany::new("item_id").counter("subitems_count"))
            .has_many(
                "RelatedItem",
                HasMany::through("ItemsRelation").unique().counter("link_count"),
            )
            .has_many("ItemsRelation", HasMany::new("item_id").condition("extra = one"))
            .belongs_to("Item", "parent_id")
            .on_init(|kind| {
                ExternalFields::new()
                    .parent_key("item_id")
                    .field("info", "test_items_info", None)
                    .field("rating", "test_items_info", None)
                    .install(kind);
                Ok(())
            }),
        KindDef::new("SubItem")
            .table("test_subitems")
            .belongs_to("Item", "item_id")
            .has_many("SubSubItem", HasMany::new("subitem_id")),
        KindDef::new("SubSubItem")
            .table("test_subsubitems")
            .belongs_to("SubItem", "subitem_id"),
        KindDef::new("RelatedItem").has_many("ItemsRelation", HasMany::new("related_item_id")),
        KindDef::new("ItemsRelation")
            .table("test_items_relations")
            .belongs_to("Item", "item_id")
            .belongs_to("RelatedItem", "related_item_id"),
        KindDef::new("Category").preload(),
    ]
}

pub fn fixture() -> Fixture {
    fixture_with(None, OrmConfig::default())
}

pub fn fixture_with(cache: Option<Arc<dyn CacheProvider>>, config: OrmConfig) -> Fixture {
    let inner = SqliteAdapter::open_in_memory().unwrap();
    for sql in rowguard::migration::SqlDumpParser::new(format!("{SCHEMA}{DATA}")).statements() {
        inner.query(&sql, &Params::None).unwrap();
    }
    let adapter = Arc::new(CountingAdapter {
        inner,
        reads: AtomicUsize::new(0),
        writes: AtomicUsize::new(0),
    });

    let mut builder = Registry::builder(adapter.clone()).config(config);
    if let Some(cache) = cache {
        builder = builder.cache(cache);
    }
    for def in kinds() {
        builder = builder.declare(def);
    }
    Fixture {
        adapter,
        registry: builder.build(),
    }
}
