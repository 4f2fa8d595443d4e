//! Class registry.
//!
//! The registry owns the adapter, the optional cache provider and the
//! configuration, plus one [`ClassMetadata`] per registered entity kind.
//! Kinds are declared up front with [`KindDef`] and resolved lazily: the first
//! [`Registry::kind`] call reads the live column list from the store, checks
//! every declared relation and runs the kind's init hook. Later calls return
//! the same metadata.
//!
//! # Examples
//!
//! ```
//! use rowguard::adapter::{DatabaseAdapter, Params, SqliteAdapter};
//! use rowguard::registry::{HasMany, KindDef, Registry};
//! use std::sync::Arc;
//!
//! # fn main() -> rowguard::Result<()> {
//! let db = SqliteAdapter::open_in_memory()?;
//! db.query("CREATE TABLE posts (id INTEGER PRIMARY KEY, title TEXT DEFAULT '', comments_count INTEGER DEFAULT 0)", &Params::None)?;
//! db.query("CREATE TABLE comments (id INTEGER PRIMARY KEY, post_id INTEGER DEFAULT 0)", &Params::None)?;
//!
//! let registry = Registry::builder(Arc::new(db))
//!     .declare(KindDef::new("Post").has_many("Comment", HasMany::new("post_id").counter("comments_count")))
//!     .declare(KindDef::new("Comment").belongs_to("Post", "post_id"))
//!     .build();
//!
//! let posts = registry.kind("Post")?;
//! assert_eq!(posts.table(), "posts");
//! # Ok(())
//! # }
//! ```

mod def;
mod hooks;

pub use def::{ClassMetadata, HasMany, InitFn, KindDef, RelationType};
pub use hooks::{GetterFn, SetterFn, Trigger, TriggerEvent, TriggerFn, TriggerOutcome};

use crate::adapter::{DatabaseAdapter, Params};
use crate::cache::CacheProvider;
use crate::config::OrmConfig;
use crate::entity::Kind;
use crate::error::{OrmError, Result};
use crate::sql;
use crate::value::FieldMap;
use dashmap::DashMap;
use once_cell::sync::OnceCell;
use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError, RwLock};
use std::thread::{self, ThreadId};

/// Counter column a child kind keeps up to date on one of its parents
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CounterRef {
    /// Parent kind holding the counter
    pub parent: String,
    /// Column on the child pointing at the parent
    pub foreign_key: String,
    /// Counter column on the parent
    pub counter: String,
}

/// Registry of entity kinds bound to one store
pub struct Registry {
    adapter: Arc<dyn DatabaseAdapter>,
    cache: Option<Arc<dyn CacheProvider>>,
    config: OrmConfig,
    defs: DashMap<String, KindDef>,
    classes: DashMap<String, Arc<OnceCell<Arc<ClassMetadata>>>>,
    init: Mutex<InitState>,
    init_done: Condvar,
    tables: RwLock<Vec<String>>,
    preloaded: DashMap<String, Arc<Vec<FieldMap>>>,
}

/// Kinds whose relations were checked and init hook ran, plus the one
/// thread currently initializing kinds
#[derive(Default)]
struct InitState {
    ready: HashSet<String>,
    running: HashSet<String>,
    owner: Option<ThreadId>,
}

/// Finishes one kind's initialization, also when the init hook panics
struct InitTicket<'a> {
    registry: &'a Registry,
    name: String,
    cell: Arc<OnceCell<Arc<ClassMetadata>>>,
    owner: bool,
    ready: bool,
}

impl Drop for InitTicket<'_> {
    fn drop(&mut self) {
        let mut state = self.registry.lock_init();
        state.running.remove(&self.name);
        if self.ready {
            state.ready.insert(self.name.clone());
        } else {
            self.registry
                .classes
                .remove_if(&self.name, |_, cell| Arc::ptr_eq(cell, &self.cell));
        }
        if self.owner {
            state.owner = None;
            self.registry.init_done.notify_all();
        }
    }
}

/// Builder for [`Registry`]
pub struct RegistryBuilder {
    adapter: Arc<dyn DatabaseAdapter>,
    cache: Option<Arc<dyn CacheProvider>>,
    config: OrmConfig,
    defs: Vec<KindDef>,
}

impl RegistryBuilder {
    #[must_use]
    pub fn cache(mut self, cache: Arc<dyn CacheProvider>) -> Self {
        self.cache = Some(cache);
        self
    }

    #[must_use]
    pub fn config(mut self, config: OrmConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn declare(mut self, def: KindDef) -> Self {
        self.defs.push(def);
        self
    }

    pub fn build(self) -> Arc<Registry> {
        let defs = DashMap::new();
        for def in self.defs {
            defs.insert(def.name.clone(), def);
        }
        Arc::new(Registry {
            adapter: self.adapter,
            cache: self.cache,
            config: self.config,
            defs,
            classes: DashMap::new(),
            init: Mutex::new(InitState::default()),
            init_done: Condvar::new(),
            tables: RwLock::new(Vec::new()),
            preloaded: DashMap::new(),
        })
    }
}

impl Registry {
    pub fn builder(adapter: Arc<dyn DatabaseAdapter>) -> RegistryBuilder {
        RegistryBuilder {
            adapter,
            cache: None,
            config: OrmConfig::default(),
            defs: Vec::new(),
        }
    }

    /// Build a registry over the SQLite database named in `config`.
    ///
    /// A Redis cache is attached when `cache.redis_url` is set and the
    /// `redis-cache` feature is enabled.
    ///
    /// # Errors
    ///
    /// Returns `OrmError::Driver` when the database cannot be opened and
    /// `OrmError::Cache` when the Redis URL is malformed.
    #[cfg(feature = "sqlite")]
    pub fn from_config(config: OrmConfig) -> Result<RegistryBuilder> {
        let adapter = crate::adapter::SqliteAdapter::from_config(&config)?;
        #[allow(unused_mut)]
        let mut builder = Self::builder(Arc::new(adapter));
        #[cfg(feature = "redis-cache")]
        if let Some(url) = &config.cache.redis_url {
            builder = builder.cache(Arc::new(crate::cache::RedisCache::open(url)?));
        }
        Ok(builder.config(config))
    }

    /// Declare a kind after the registry was built.
    ///
    /// # Errors
    ///
    /// Returns `OrmError::InvalidArgument` when a kind with the same name is
    /// already registered.
    pub fn declare(&self, def: KindDef) -> Result<()> {
        if self.is_registered(&def.name) {
            return Err(OrmError::InvalidArgument(format!(
                "class {} is already registered",
                def.name
            )));
        }
        self.defs.insert(def.name.clone(), def);
        Ok(())
    }

    pub fn adapter(&self) -> &Arc<dyn DatabaseAdapter> {
        &self.adapter
    }

    pub fn cache(&self) -> Option<&Arc<dyn CacheProvider>> {
        self.cache.as_ref()
    }

    pub fn config(&self) -> &OrmConfig {
        &self.config
    }

    pub fn is_registered(&self, kind: &str) -> bool {
        self.classes
            .get(kind)
            .is_some_and(|cell| cell.value().get().is_some())
    }

    /// Handle on a kind, registering it first when needed.
    ///
    /// # Arguments
    ///
    /// * `name` - Declared kind name, e.g. `"Item"`
    ///
    /// # Errors
    ///
    /// * `OrmError::UnknownClass` - the kind was never declared
    /// * `OrmError::UnknownTable` - its table does not exist
    /// * `OrmError::RelationUndefined`, `OrmError::AmbiguousRelation`,
    ///   `OrmError::InvalidArgument` - a declared relation is inconsistent
    pub fn kind(self: &Arc<Self>, name: &str) -> Result<Kind> {
        let meta = self.register(name)?;
        Ok(Kind::new(Arc::clone(self), meta))
    }

    /// Resolve the metadata of a kind, registering it on first use.
    ///
    /// Concurrent first calls build the metadata once. Relations are checked
    /// and the init hook runs once per kind, after the metadata is visible,
    /// so kinds referencing each other (or themselves) resolve without
    /// recursion. Other threads asking for the kind meanwhile block until the
    /// init hook has returned.
    ///
    /// # Errors
    ///
    /// Same as [`Registry::kind`].
    pub fn register(self: &Arc<Self>, name: &str) -> Result<Arc<ClassMetadata>> {
        let def = self
            .defs
            .get(name)
            .map(|d| d.value().clone())
            .ok_or_else(|| OrmError::UnknownClass(name.to_string()))?;

        let cell = self
            .classes
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .value()
            .clone();
        let meta = Arc::clone(cell.get_or_try_init(|| self.build_metadata(&def))?);

        let Some(mut ticket) = self.claim_init(name, &cell) else {
            return Ok(meta);
        };
        let current = self
            .classes
            .get(name)
            .is_some_and(|c| Arc::ptr_eq(c.value(), &cell));
        if !current {
            // a failed initialization dropped this metadata while we waited
            drop(ticket);
            return self.register(name);
        }
        self.validate_relations(&meta)?;
        log::debug!(
            "registered class {} on table {} ({} fields)",
            meta.name,
            meta.table,
            meta.fields.len()
        );
        if let Some(init) = &def.init {
            init(&Kind::new(Arc::clone(self), Arc::clone(&meta)))?;
        }
        ticket.ready = true;
        Ok(meta)
    }

    /// Wait until `name` can be initialized by this thread.
    ///
    /// Returns `None` when the kind is ready, or when this thread is already
    /// initializing it further up the stack. Only one thread initializes
    /// kinds at a time, so relation checks that register each other never
    /// wait on one another.
    fn claim_init(
        &self,
        name: &str,
        cell: &Arc<OnceCell<Arc<ClassMetadata>>>,
    ) -> Option<InitTicket<'_>> {
        let me = thread::current().id();
        let mut state = self.lock_init();
        let owner = loop {
            if state.ready.contains(name) {
                return None;
            }
            match state.owner {
                Some(owner) if owner == me => {
                    if state.running.contains(name) {
                        return None;
                    }
                    break false;
                }
                Some(_) => {
                    state = self
                        .init_done
                        .wait(state)
                        .unwrap_or_else(PoisonError::into_inner);
                }
                None => {
                    state.owner = Some(me);
                    break true;
                }
            }
        };
        state.running.insert(name.to_string());
        Some(InitTicket {
            registry: self,
            name: name.to_string(),
            cell: Arc::clone(cell),
            owner,
            ready: false,
        })
    }

    fn lock_init(&self) -> MutexGuard<'_, InitState> {
        self.init.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn build_metadata(&self, def: &KindDef) -> Result<Arc<ClassMetadata>> {
        let table = def.table_name();
        if !self.table_exists(&table)? {
            return Err(OrmError::UnknownTable {
                kind: def.name.clone(),
                table,
            });
        }
        let columns = self.adapter.table_columns(&table)?;
        let fields = columns.iter().map(|c| c.name.clone()).collect();
        let defaults = columns
            .into_iter()
            .map(|c| (c.name, c.default))
            .collect::<FieldMap>();
        Ok(Arc::new(ClassMetadata::new(def, fields, defaults)))
    }

    fn table_exists(&self, table: &str) -> Result<bool> {
        let known = self
            .tables
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .any(|t| t == table);
        if known {
            return Ok(true);
        }
        let fresh = self.adapter.tables()?;
        let exists = fresh.iter().any(|t| t == table);
        *self.tables.write().unwrap_or_else(PoisonError::into_inner) = fresh;
        Ok(exists)
    }

    fn validate_relations(self: &Arc<Self>, meta: &ClassMetadata) -> Result<()> {
        for (kind, params) in &meta.has_many {
            let other = self.register(kind)?;
            if kind != &meta.name && other.has_many_params(&meta.name).is_some() {
                return Err(OrmError::AmbiguousRelation(meta.name.clone(), kind.clone()));
            }
            match (&params.through, &params.foreign_key) {
                (Some(through), _) => {
                    let join = self.register(through)?;
                    if meta.has_many_params(through).is_none() || other.has_many_params(through).is_none() {
                        return Err(OrmError::InvalidArgument(format!(
                            "{} has many {kind} through {through}, but {through} is not related to both",
                            meta.name
                        )));
                    }
                    if let Some(counter) = &params.counter {
                        if !join.has_field(counter) {
                            return Err(missing_column(through, counter));
                        }
                    }
                }
                (None, Some(fk)) => {
                    if !other.has_field(fk) {
                        return Err(missing_column(kind, fk));
                    }
                    if let Some(counter) = &params.counter {
                        if !meta.has_field(counter) {
                            return Err(missing_column(&meta.name, counter));
                        }
                    }
                }
                (None, None) => {
                    return Err(OrmError::InvalidArgument(format!(
                        "{} has many {kind} without a foreign key",
                        meta.name
                    )));
                }
            }
        }

        for (kind, fk) in &meta.belongs_to {
            let parent = self.register(kind)?;
            if !meta.has_field(fk) {
                return Err(missing_column(&meta.name, fk));
            }
            let declared = parent
                .has_many_params(&meta.name)
                .and_then(|p| p.foreign_key.as_deref());
            if declared != Some(fk.as_str()) {
                return Err(OrmError::RelationUndefined {
                    from: meta.name.clone(),
                    to: kind.clone(),
                });
            }
        }
        Ok(())
    }

    /// How `kind` relates to `other`.
    ///
    /// `HasMany` when `kind` declares has-many of `other`, otherwise
    /// `BelongsTo` when `other` declares has-many of `kind`, otherwise `None`.
    ///
    /// # Errors
    ///
    /// Fails when either kind cannot be registered.
    pub fn relation_type_with(self: &Arc<Self>, kind: &str, other: &str) -> Result<RelationType> {
        let meta = self.register(kind)?;
        let other_meta = self.register(other)?;
        if meta.has_many_params(other).is_some() {
            Ok(RelationType::HasMany)
        } else if other_meta.has_many_params(kind).is_some() {
            Ok(RelationType::BelongsTo)
        } else {
            Ok(RelationType::None)
        }
    }

    /// Parameters of the relation between `kind` and `other`.
    ///
    /// For a `BelongsTo` relation these are the parent's has-many parameters.
    ///
    /// # Errors
    ///
    /// Returns `OrmError::RelationUndefined` when the kinds are unrelated.
    pub fn relation_params_with(self: &Arc<Self>, kind: &str, other: &str) -> Result<HasMany> {
        let params = match self.relation_type_with(kind, other)? {
            RelationType::HasMany => self.register(kind)?.has_many_params(other).cloned(),
            RelationType::BelongsTo => self.register(other)?.has_many_params(kind).cloned(),
            RelationType::None => None,
        };
        params.ok_or_else(|| OrmError::RelationUndefined {
            from: kind.to_string(),
            to: other.to_string(),
        })
    }

    /// Kinds related to `kind` by relations of type `relation`, in declaration order
    ///
    /// # Errors
    ///
    /// Fails when `kind` cannot be registered.
    pub fn class_relations(self: &Arc<Self>, kind: &str, relation: RelationType) -> Result<Vec<String>> {
        let meta = self.register(kind)?;
        Ok(match relation {
            RelationType::HasMany => meta.has_many.iter().map(|(k, _)| k.clone()).collect(),
            RelationType::BelongsTo => meta.belongs_to.iter().map(|(k, _)| k.clone()).collect(),
            RelationType::None => Vec::new(),
        })
    }

    /// Counter columns that rows of `kind` maintain on their parents.
    ///
    /// # Arguments
    ///
    /// * `kind` - Child kind
    /// * `skip` - Parent kind to leave out, if any
    ///
    /// # Errors
    ///
    /// Fails when `kind` or one of its parents cannot be registered.
    pub fn class_counters(self: &Arc<Self>, kind: &str, skip: Option<&str>) -> Result<Vec<CounterRef>> {
        let meta = self.register(kind)?;
        let mut counters = Vec::new();
        for (parent, fk) in &meta.belongs_to {
            if skip == Some(parent.as_str()) {
                continue;
            }
            let params = self.relation_params_with(kind, parent)?;
            if let Some(counter) = params.counter {
                counters.push(CounterRef {
                    parent: parent.clone(),
                    foreign_key: fk.clone(),
                    counter,
                });
            }
        }
        Ok(counters)
    }

    /// Table snapshot of a preloaded kind, fetched on first use
    pub(crate) fn preloaded_rows(&self, meta: &ClassMetadata) -> Result<Arc<Vec<FieldMap>>> {
        if let Some(rows) = self.preloaded.get(&meta.name) {
            return Ok(Arc::clone(rows.value()));
        }
        let query = sql::select_query(&meta.table, None, None, None, self.adapter.dialect());
        let rows = Arc::new(self.adapter.fetch_rows(&query, &Params::None)?);
        log::debug!("preloaded {} rows of {}", rows.len(), meta.name);
        self.preloaded.insert(meta.name.clone(), Arc::clone(&rows));
        Ok(rows)
    }

    /// Forget the table snapshot of a preloaded kind
    pub fn flush_preloaded(&self, kind: &str) {
        self.preloaded.remove(kind);
    }
}

fn missing_column(kind: &str, column: &str) -> OrmError {
    OrmError::InvalidArgument(format!("{kind} has no column {column}"))
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("declared", &self.defs.len())
            .field("registered", &self.classes.len())
            .field("cache", &self.cache.is_some())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(all(test, feature = "sqlite"))]
mod tests {
    use super::*;
    use crate::adapter::SqliteAdapter;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn store() -> Arc<dyn DatabaseAdapter> {
        let db = SqliteAdapter::open_in_memory().unwrap();
        for ddl in [
            "CREATE TABLE nodes (id INTEGER PRIMARY KEY, parent_id INTEGER DEFAULT 0, children_count INTEGER DEFAULT 0, title TEXT DEFAULT 'untitled')",
            "CREATE TABLE tags (id INTEGER PRIMARY KEY, name TEXT DEFAULT '')",
            "CREATE TABLE node_tags (id INTEGER PRIMARY KEY, node_id INTEGER DEFAULT 0, tag_id INTEGER DEFAULT 0, hits INTEGER DEFAULT 0)",
        ] {
            db.query(ddl, &Params::None).unwrap();
        }
        Arc::new(db)
    }

    fn node() -> KindDef {
        KindDef::new("Node")
            .has_many("Node", HasMany::new("parent_id").counter("children_count"))
            .has_many("NodeTag", HasMany::new("node_id"))
            .has_many("Tag", HasMany::through("NodeTag").unique().counter("hits"))
            .belongs_to("Node", "parent_id")
    }

    fn tag() -> KindDef {
        KindDef::new("Tag").has_many("NodeTag", HasMany::new("tag_id"))
    }

    fn node_tag() -> KindDef {
        KindDef::new("NodeTag")
            .belongs_to("Node", "node_id")
            .belongs_to("Tag", "tag_id")
    }

    fn registry() -> Arc<Registry> {
        Registry::builder(store())
            .declare(node())
            .declare(tag())
            .declare(node_tag())
            .build()
    }

    #[test]
    fn test_register_reads_columns_and_defaults() {
        let registry = registry();
        let meta = registry.register("Node").unwrap();
        assert_eq!(meta.table, "nodes");
        assert_eq!(meta.fields, vec!["id", "parent_id", "children_count", "title"]);
        assert_eq!(meta.defaults["title"].as_str(), Some("untitled"));
        assert!(Arc::ptr_eq(&meta, &registry.register("Node").unwrap()));
    }

    #[test]
    fn test_unknown_class_and_table() {
        let registry = registry();
        assert!(matches!(registry.register("Ghost"), Err(OrmError::UnknownClass(_))));

        registry.declare(KindDef::new("Orphan")).unwrap();
        assert!(matches!(
            registry.register("Orphan"),
            Err(OrmError::UnknownTable { .. })
        ));
    }

    #[test]
    fn test_relation_types() {
        let registry = registry();
        assert_eq!(registry.relation_type_with("Node", "Tag").unwrap(), RelationType::HasMany);
        assert_eq!(registry.relation_type_with("NodeTag", "Node").unwrap(), RelationType::BelongsTo);
        assert_eq!(registry.relation_type_with("Tag", "Node").unwrap(), RelationType::BelongsTo);
        assert_eq!(registry.relation_type_with("Node", "Node").unwrap(), RelationType::HasMany);

        let params = registry.relation_params_with("NodeTag", "Tag").unwrap();
        assert_eq!(params.foreign_key.as_deref(), Some("tag_id"));
    }

    #[test]
    fn test_class_counters() {
        let registry = registry();
        let counters = registry.class_counters("Node", None).unwrap();
        assert_eq!(
            counters,
            vec![CounterRef {
                parent: "Node".into(),
                foreign_key: "parent_id".into(),
                counter: "children_count".into(),
            }]
        );
        assert!(registry.class_counters("Node", Some("Node")).unwrap().is_empty());
        assert!(registry.class_counters("NodeTag", None).unwrap().is_empty());
    }

    #[test]
    fn test_reciprocal_has_many_is_rejected() {
        let registry = Registry::builder(store())
            .declare(KindDef::new("Node").has_many("Tag", HasMany::new("node_id")))
            .declare(KindDef::new("Tag").has_many("Node", HasMany::new("parent_id")))
            .build();
        assert!(matches!(
            registry.register("Node"),
            Err(OrmError::AmbiguousRelation(_, _))
        ));
        assert!(!registry.is_registered("Node"));
    }

    #[test]
    fn test_belongs_to_needs_matching_has_many() {
        let registry = Registry::builder(store())
            .declare(KindDef::new("Node"))
            .declare(KindDef::new("NodeTag").belongs_to("Node", "node_id"))
            .build();
        assert!(matches!(
            registry.register("NodeTag"),
            Err(OrmError::RelationUndefined { .. })
        ));
    }

    #[test]
    fn test_init_runs_once() {
        static CALLS: AtomicUsize = AtomicUsize::new(0);
        let registry = Registry::builder(store())
            .declare(tag().on_init(|_| {
                CALLS.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }))
            .declare(node())
            .declare(node_tag())
            .build();
        registry.kind("Tag").unwrap();
        registry.kind("Tag").unwrap();
        registry.kind("Node").unwrap();
        assert_eq!(CALLS.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_concurrent_callers_wait_for_init_hook() {
        let saves = Arc::new(AtomicUsize::new(0));
        let hook_saves = Arc::clone(&saves);
        let registry = Registry::builder(store())
            .declare(tag().on_init(move |kind| {
                std::thread::sleep(std::time::Duration::from_millis(20));
                let saves = Arc::clone(&hook_saves);
                kind.on(Trigger::Save, move |_, _| {
                    saves.fetch_add(1, Ordering::SeqCst);
                    Ok(TriggerOutcome::Continue)
                });
                Ok(())
            }))
            .declare(node())
            .declare(node_tag())
            .build();

        std::thread::scope(|scope| {
            scope.spawn(|| {
                registry.kind("Tag").unwrap();
            });
            scope.spawn(|| {
                std::thread::sleep(std::time::Duration::from_millis(5));
                let mut tag = registry.kind("Tag").unwrap().new_entity();
                tag.set("name", "late").unwrap();
                tag.save(true).unwrap();
            });
        });
        assert_eq!(saves.load(Ordering::SeqCst), 1);
        assert!(registry.is_registered("Tag"));
    }

    #[test]
    fn test_failed_init_hook_unregisters_kind() {
        let registry = Registry::builder(store())
            .declare(tag().on_init(|_| Err(OrmError::InvalidArgument("no tags today".into()))))
            .declare(node())
            .declare(node_tag())
            .build();
        assert!(registry.kind("Tag").is_err());
        assert!(!registry.is_registered("Tag"));
        // the hook runs again on the next attempt
        assert!(registry.kind("Tag").is_err());
    }

    #[test]
    fn test_declare_after_registration_fails() {
        let registry = registry();
        registry.register("Tag").unwrap();
        assert!(registry.declare(tag()).is_err());
    }
}
